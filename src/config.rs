//! Configuration types for menu scanning.
//!
//! All pipeline behaviour is controlled through [`ScanConfig`], built via its
//! [`ScanConfigBuilder`]. The HTTP service has its own [`ServerConfig`] for
//! transport concerns (bind address, database path, CORS).

use crate::error::ScanError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Upload ceiling of the basic normalizer: 3.3 MiB.
pub const BASIC_UPLOAD_CEILING: usize = (3.3 * 1024.0 * 1024.0) as usize;

/// Monthly AI extractions granted to a free account.
pub const FREE_TIER_LIMIT: u32 = 5;

/// Configuration for a menu scan.
///
/// Built via [`ScanConfig::builder()`] or using [`ScanConfig::default()`].
///
/// # Example
/// ```rust
/// use tastecheq::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .max_dimensions(1600, 1600)
///     .target_bytes(800 * 1024)
///     .free_tier_limit(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// Which normalizer variant runs before extraction. Default: [`Normalization::Refined`].
    pub normalization: Normalization,

    /// Absolute size ceiling of the basic normalizer, in bytes. Default: 3.3 MiB.
    pub max_upload_bytes: usize,

    /// Maximum width after resizing, in pixels. Default: 2000.
    pub max_width: u32,

    /// Maximum height after resizing, in pixels. Default: 2000.
    ///
    /// Width and height are capped together so the aspect ratio is kept.
    /// Menus photographed on a phone are routinely 4000 px tall; the VLM and
    /// Tesseract both read 2000 px text reliably.
    pub max_height: u32,

    /// Byte-size the refined normalizer aims to get under. Default: 1 MiB.
    pub target_bytes: usize,

    /// First JPEG quality tried by the refined normalizer (1–100). Default: 90.
    pub initial_quality: u8,

    /// Quality decrement per re-encode. Default: 10.
    pub quality_step: u8,

    /// Lowest JPEG quality the refined normalizer will use. Default: 40.
    ///
    /// Below ~40 JPEG ringing around glyphs hurts OCR more than the extra
    /// bytes hurt upload time, so the loop stops here even if still too big.
    pub min_quality: u8,

    /// Free-tier AI extractions per calendar month. Default: 5.
    pub free_tier_limit: u32,

    /// LLM model identifier. If None, uses `gemini-2.0-flash`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama"). If None along
    /// with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per menu. Default: 4096.
    ///
    /// A dense two-column menu runs to ~150 items; at ~20 tokens per JSON
    /// object 4 096 leaves headroom without letting a runaway reply bill.
    pub max_tokens: usize,

    /// Custom extraction prompt. If None, uses [`crate::prompts::MENU_EXTRACTION_PROMPT`].
    pub extraction_prompt: Option<String>,

    /// Tesseract language code(s) for the local strategy. Default: "eng".
    pub ocr_language: String,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            normalization: Normalization::default(),
            max_upload_bytes: BASIC_UPLOAD_CEILING,
            max_width: 2000,
            max_height: 2000,
            target_bytes: 1024 * 1024,
            initial_quality: 90,
            quality_step: 10,
            min_quality: 40,
            free_tier_limit: FREE_TIER_LIMIT,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            extraction_prompt: None,
            ocr_language: "eng".to_string(),
            download_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("normalization", &self.normalization)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("target_bytes", &self.target_bytes)
            .field("initial_quality", &self.initial_quality)
            .field("quality_step", &self.quality_step)
            .field("min_quality", &self.min_quality)
            .field("free_tier_limit", &self.free_tier_limit)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("ocr_language", &self.ocr_language)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ScanProgressCallback>"),
            )
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ScanConfig`].
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn normalization(mut self, n: Normalization) -> Self {
        self.config.normalization = n;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.config.max_width = width.max(16);
        self.config.max_height = height.max(16);
        self
    }

    pub fn target_bytes(mut self, bytes: usize) -> Self {
        self.config.target_bytes = bytes;
        self
    }

    pub fn quality_range(mut self, initial: u8, min: u8, step: u8) -> Self {
        self.config.initial_quality = initial.clamp(1, 100);
        self.config.min_quality = min.clamp(1, 100);
        self.config.quality_step = step.max(1);
        self
    }

    pub fn free_tier_limit(mut self, n: u32) -> Self {
        self.config.free_tier_limit = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ScanError> {
        let c = &self.config;
        if c.min_quality > c.initial_quality {
            return Err(ScanError::InvalidConfig(format!(
                "min quality {} exceeds initial quality {}",
                c.min_quality, c.initial_quality
            )));
        }
        if c.target_bytes == 0 {
            return Err(ScanError::InvalidConfig(
                "target bytes must be ≥ 1".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ScanError::InvalidConfig(
                "upload ceiling must be ≥ 1".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(ScanError::InvalidConfig("OCR language is empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image normalizer variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Type check plus a hard size ceiling; bytes pass through untouched.
    Basic,
    /// Proportional resize plus quality-stepped JPEG re-encode. (default)
    #[default]
    Refined,
}

/// Which extraction strategy produced (or should produce) the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// In-process OCR followed by the line heuristics. Free.
    #[default]
    Ocr,
    /// Hosted vision-language model behind the quota gate.
    Ai,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Ocr => f.write_str("OCR"),
            ExtractionMode::Ai => f.write_str("AI"),
        }
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// Transport settings for the HTTP service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind. Default: `0.0.0.0:3000`.
    pub bind: String,
    /// SQLite database file. `None` keeps everything in memory.
    pub database: Option<PathBuf>,
    /// Largest accepted request body in bytes. Default: 8 MiB.
    ///
    /// Base64 inflates by 4/3, so a 3.3 MiB photo arrives as ~4.4 MiB JSON.
    pub max_body_bytes: usize,
    /// CORS preflight cache lifetime in seconds. Default: 3600.
    pub cors_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            database: None,
            max_body_bytes: 8 * 1024 * 1024,
            cors_max_age_secs: 60 * 60,
        }
    }
}
