//! # tastecheq
//!
//! Turn a photo of a restaurant menu into structured menu items, then keep a
//! per-restaurant catalog of those items and each diner's tastings of them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Normalize  type check, resize, quality-stepped JPEG (spawn_blocking)
//!  ├─ 3. Extract    OCR + line heuristics, or a vision model behind a quota
//!  ├─ 4. Review     edit / split / merge / remove candidates
//!  └─ 5. Reconcile  new vs duplicate vs update against the catalog, then apply
//! ```
//!
//! Two extraction modes exist. **OCR** runs Tesseract in-process (feature
//! `tesseract`) and parses the text with price heuristics; it is free and
//! unlimited. **AI** sends the image to a vision-language model and parses the
//! JSON array it returns; on the server it is metered per account per calendar
//! month ([`QuotaGate`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tastecheq::{scan_menu, DirectAiExtractor, LlmVisionModel, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider from EDGEQUAKE_LLM_PROVIDER / GEMINI_API_KEY / OPENAI_API_KEY …
//!     let config = Arc::new(ScanConfig::default());
//!     let model = Arc::new(LlmVisionModel::from_config(&config)?);
//!     let strategy = DirectAiExtractor::new(model, config.clone());
//!
//!     let output = scan_menu("menu.jpg", &strategy, &config).await?;
//!     for item in &output.candidates {
//!         println!("{:<30} {}", item.name, item.price.as_deref().unwrap_or("-"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `tastecheq` binary (clap + anyhow + indicatif) |
//! | `tesseract` | off     | In-process OCR via leptess; links libtesseract |
//!
//! Without `tesseract`, [`pipeline::ocr::default_engine`] returns
//! [`ScanError::OcrUnavailable`] and only AI extraction works.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod account;
pub mod config;
pub mod error;
pub mod extract;
pub mod menu;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod quota;
pub mod ratings;
pub mod reconcile;
pub mod scan;
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use account::Account;
pub use config::{ExtractionMode, Normalization, ScanConfig, ScanConfigBuilder, ServerConfig};
pub use error::{ErrorKind, ScanError, StoreError};
pub use extract::{
    AiMenuService, DirectAiExtractor, Extraction, ExtractionStrategy, LocalOcrExtractor, RemoteAiExtractor,
};
pub use menu::{CandidateField, CandidateList, MenuItem, MenuItemCandidate, MenuItemUpdate, NewMenuItem};
pub use pipeline::vision::{LlmVisionModel, VisionModel};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
pub use quota::{MonthKey, QuotaGate, UsageSnapshot};
pub use ratings::{ItemSummary, Rating, TastingLog, TastingRecord};
pub use reconcile::{apply_reconciliation, reconcile, BatchReport, Classification, Reconciliation};
pub use scan::{scan_bytes, scan_menu, scan_sync, ImageInfo, ScanOutput};
pub use store::SqliteStore;
