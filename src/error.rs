//! Error types for the tastecheq library.
//!
//! Two error types reflect two layers:
//!
//! * [`ScanError`] — a scan, extraction, quota or batch operation failed.
//!   Every variant is local to one pipeline invocation; none is fatal to the
//!   hosting session. The user-facing taxonomy (input rejection, extraction
//!   failure, quota exhaustion, persistence failure) is recoverable from the
//!   variant via [`ScanError::kind`].
//!
//! * [`StoreError`] — the persistence layer refused or failed an operation.
//!   Stores return it directly; the pipeline wraps it in [`ScanError::Store`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the scanning pipeline.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Input rejection ───────────────────────────────────────────────────
    /// The supplied file is not an image.
    #[error("Please select an image file (got '{mime}').")]
    NotAnImage { mime: String },

    /// The supplied file exceeds the upload ceiling.
    #[error("File is too large ({size} bytes). Please select an image under {limit} bytes.")]
    FileTooLarge { size: usize, limit: usize },

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The image bytes could not be decoded.
    #[error("Could not decode image: {detail}")]
    ImageDecode { detail: String },

    /// Re-encoding the normalized image failed.
    #[error("Could not encode image: {detail}")]
    ImageEncode { detail: String },

    // ── Extraction failures ───────────────────────────────────────────────
    /// The local OCR engine failed.
    #[error("OCR failed. Please try another image.\n{detail}")]
    OcrFailed { detail: String },

    /// No local OCR engine is compiled in.
    #[error("Local OCR is not available in this build.\nRebuild with `--features tesseract` or use the AI mode.")]
    OcrUnavailable,

    /// The remote extraction call failed (transport, upstream or HTTP error).
    #[error("AI parsing failed: {detail}")]
    AiParsingFailed { detail: String },

    /// The model replied, but no JSON array of menu items could be read from it.
    #[error("Failed to parse AI response: {detail}")]
    AiResponseUnparsable { detail: String },

    /// No vision provider could be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Quota / identity ──────────────────────────────────────────────────
    /// The free-tier monthly ceiling for AI extraction has been reached.
    #[error("Free tier AI usage limit reached ({used}/{limit} this month). Upgrade for unlimited.")]
    QuotaExceeded { used: u32, limit: u32 },

    /// No valid session accompanied the request.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The caller is authenticated but not allowed to perform the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ── Persistence ───────────────────────────────────────────────────────
    /// A batch add/update stopped part-way. Items already written stay written.
    #[error("Failed to add or update items after {added} added and {updated} updated: {detail}")]
    BatchFailed {
        added: usize,
        updated: usize,
        detail: String,
    },

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error taxonomy the UI reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong file type, oversized file, unreadable input.
    InputRejected,
    /// OCR or AI extraction failed; the image is kept for a retry.
    ExtractionFailed,
    /// The free tier is exhausted; no remote call was made.
    QuotaExhausted,
    /// Writing reconciled items failed.
    PersistenceFailed,
    /// Identity or permission problem.
    AccessDenied,
    /// Configuration or internal fault.
    Other,
}

impl ScanError {
    /// Classify the error for user-facing reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::NotAnImage { .. }
            | ScanError::FileTooLarge { .. }
            | ScanError::FileNotFound { .. }
            | ScanError::DownloadFailed { .. }
            | ScanError::ImageDecode { .. }
            | ScanError::ImageEncode { .. } => ErrorKind::InputRejected,
            ScanError::OcrFailed { .. }
            | ScanError::OcrUnavailable
            | ScanError::AiParsingFailed { .. }
            | ScanError::AiResponseUnparsable { .. }
            | ScanError::ProviderNotConfigured { .. } => ErrorKind::ExtractionFailed,
            ScanError::QuotaExceeded { .. } => ErrorKind::QuotaExhausted,
            ScanError::BatchFailed { .. } | ScanError::Store(_) => ErrorKind::PersistenceFailed,
            ScanError::Unauthenticated | ScanError::Forbidden(_) => ErrorKind::AccessDenied,
            ScanError::InvalidConfig(_) | ScanError::Internal(_) => ErrorKind::Other,
        }
    }
}

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A live item with the same name (case-insensitive) exists for the restaurant.
    #[error("A menu item named '{name}' already exists for this restaurant.")]
    DuplicateName { name: String },

    /// The addressed record does not exist or was deleted.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// A required field was missing or blank.
    #[error("Missing fields: {0}")]
    MissingFields(String),

    /// Star ratings run from 1 to 5.
    #[error("Rating must be between 1 and 5 stars, got {stars}")]
    InvalidRating { stars: u8 },

    /// SQLite reported an error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("Database connection is poisoned")]
    Poisoned,
}
