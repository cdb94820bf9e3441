//! Pipeline stages for turning a menu photo into item candidates.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──┬──▶ ocr ────▶ lines      (local)
//! (URL/path)  (resize,  │   (tesseract) (heuristics)
//!             re-encode)└──▶ encode ──▶ vision    (remote)
//!                           (base64)   (VLM + JSON slice)
//! ```
//!
//! 1. [`input`]     — load a user-supplied path or URL into memory
//! 2. [`normalize`] — MIME check, size ceiling or resize + JPEG re-encode;
//!    CPU-bound, run in `spawn_blocking`
//! 3. [`ocr`]       — local text recognition behind the [`ocr::OcrEngine`] trait
//! 4. [`lines`]     — line-buffering price heuristics over raw OCR text
//! 5. [`encode`]    — base64 / data-URL handling for the multimodal request
//! 6. [`vision`]    — the VLM call and JSON-array extraction; the only stage
//!    with network I/O besides URL download

pub mod encode;
pub mod input;
pub mod lines;
pub mod normalize;
pub mod ocr;
pub mod vision;
