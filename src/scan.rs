//! Scan entry points: input → normalized image → candidates.
//!
//! One call is one scan cycle. The normalizer runs on the blocking pool; the
//! extraction strategy decides where the text comes from. Progress events go
//! to `config.progress_callback`.

use crate::config::{ExtractionMode, ScanConfig};
use crate::error::ScanError;
use crate::extract::{Extraction, ExtractionStrategy};
use crate::menu::MenuItemCandidate;
use crate::pipeline::input;
use crate::pipeline::normalize::{normalize_image, NormalizedImage};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// What was sent to the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub name: String,
    pub mime: String,
    pub original_bytes: usize,
    pub normalized_bytes: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
}

/// Result of one scan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutput {
    pub mode: ExtractionMode,
    pub image: ImageInfo,
    pub source_text: String,
    pub candidates: Vec<MenuItemCandidate>,
    pub duration_ms: u64,
}

/// Scan a menu photo from a local path or HTTP/HTTPS URL.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use tastecheq::{scan_menu, DirectAiExtractor, LlmVisionModel, ScanConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(ScanConfig::default());
/// let model = Arc::new(LlmVisionModel::from_config(&config)?);
/// let strategy = DirectAiExtractor::new(model, config.clone());
/// let output = scan_menu("menu.jpg", &strategy, &config).await?;
/// for item in &output.candidates {
///     println!("{} {}", item.name, item.price.as_deref().unwrap_or(""));
/// }
/// # Ok(())
/// # }
/// ```
pub async fn scan_menu(
    input_str: impl AsRef<str>,
    strategy: &dyn ExtractionStrategy,
    config: &ScanConfig,
) -> Result<ScanOutput, ScanError> {
    let input_str = input_str.as_ref();
    info!("Starting {} scan: {}", strategy.mode(), input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    scan_bytes(resolved.bytes, &resolved.mime, &resolved.name, strategy, config).await
}

/// Scan an image already in memory. `declared_mime` may be empty.
pub async fn scan_bytes(
    bytes: Vec<u8>,
    declared_mime: &str,
    name: &str,
    strategy: &dyn ExtractionStrategy,
    config: &ScanConfig,
) -> Result<ScanOutput, ScanError> {
    let start = Instant::now();
    let original_bytes = bytes.len();

    let normalized = {
        let mime = declared_mime.to_string();
        let cfg = config.clone();
        tokio::task::spawn_blocking(move || normalize_image(&bytes, &mime, &cfg))
            .await
            .map_err(|e| ScanError::Internal(format!("normalizer task panicked: {e}")))??
    };

    let Extraction {
        mode,
        source_text,
        items,
    } = extract_with_events(&normalized, strategy, config).await?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!("{} scan of '{}' → {} candidates in {}ms", mode, name, items.len(), duration_ms);

    Ok(ScanOutput {
        mode,
        image: ImageInfo {
            name: name.to_string(),
            mime: normalized.mime,
            original_bytes,
            normalized_bytes: normalized.bytes.len(),
            width: normalized.width,
            height: normalized.height,
            quality: normalized.quality,
        },
        source_text,
        candidates: items,
        duration_ms,
    })
}

/// Run the strategy, firing start/complete/error callbacks around it.
pub async fn extract_with_events(
    image: &NormalizedImage,
    strategy: &dyn ExtractionStrategy,
    config: &ScanConfig,
) -> Result<Extraction, ScanError> {
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_scan_start(strategy.mode());
    }
    match strategy.extract(image, cb).await {
        Ok(extraction) => {
            if let Some(cb) = cb {
                cb.on_scan_complete(extraction.items.len());
            }
            Ok(extraction)
        }
        Err(e) => {
            warn!("{} extraction failed: {}", strategy.mode(), e);
            if let Some(cb) = cb {
                cb.on_scan_error(&e.to_string());
            }
            Err(e)
        }
    }
}

/// Synchronous wrapper around [`scan_menu`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn scan_sync(
    input_str: impl AsRef<str>,
    strategy: &dyn ExtractionStrategy,
    config: &ScanConfig,
) -> Result<ScanOutput, ScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scan_menu(input_str, strategy, config))
}
