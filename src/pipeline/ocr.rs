//! Local optical character recognition.
//!
//! [`OcrEngine`] is synchronous and CPU-bound; [`crate::extract::LocalOcrExtractor`]
//! runs it on the blocking pool. The Tesseract engine is only compiled with
//! the `tesseract` feature, since it links the system `libtesseract`.

use super::normalize::NormalizedImage;
use crate::config::ScanConfig;
use crate::error::ScanError;
use std::sync::Arc;

/// Recognizes text in one image.
pub trait OcrEngine: Send + Sync {
    /// Return the recognized text, one menu line per text line.
    ///
    /// `progress` receives fractions in `0.0..=1.0`, non-decreasing.
    fn recognize(&self, image: &NormalizedImage, progress: &dyn Fn(f32)) -> Result<String, ScanError>;
}

/// The engine compiled into this build.
#[cfg(feature = "tesseract")]
pub fn default_engine(config: &ScanConfig) -> Result<Arc<dyn OcrEngine>, ScanError> {
    Ok(Arc::new(tesseract::TesseractEngine::new(&config.ocr_language)?))
}

/// The engine compiled into this build.
#[cfg(not(feature = "tesseract"))]
pub fn default_engine(config: &ScanConfig) -> Result<Arc<dyn OcrEngine>, ScanError> {
    let _ = config;
    Err(ScanError::OcrUnavailable)
}

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractEngine;

#[cfg(feature = "tesseract")]
mod tesseract {
    use super::*;
    use leptess::LepTess;
    use tracing::debug;

    /// Tesseract via `leptess`. A fresh `LepTess` handle per call, since the
    /// handle is not `Sync`.
    pub struct TesseractEngine {
        language: String,
    }

    impl TesseractEngine {
        /// Fails early when the language data is not installed.
        pub fn new(language: &str) -> Result<Self, ScanError> {
            LepTess::new(None, language).map_err(|e| ScanError::OcrFailed {
                detail: format!(
                    "Failed to initialize Tesseract with language '{language}': {e}. \
                     Make sure the language data is installed."
                ),
            })?;
            Ok(Self {
                language: language.to_string(),
            })
        }
    }

    impl OcrEngine for TesseractEngine {
        fn recognize(&self, image: &NormalizedImage, progress: &dyn Fn(f32)) -> Result<String, ScanError> {
            progress(0.0);
            let mut lt = LepTess::new(None, &self.language).map_err(|e| ScanError::OcrFailed {
                detail: format!("Failed to initialize Tesseract: {e}"),
            })?;
            progress(0.1);

            lt.set_image_from_mem(&image.bytes)
                .map_err(|e| ScanError::OcrFailed {
                    detail: format!("Failed to load image: {e}"),
                })?;
            progress(0.3);

            let text = lt.get_utf8_text().map_err(|e| ScanError::OcrFailed {
                detail: format!("Failed to read text: {e}"),
            })?;
            progress(1.0);

            debug!("Tesseract recognized {} chars", text.len());
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn default_engine_unavailable_without_feature() {
        let err = default_engine(&ScanConfig::default()).err().unwrap();
        assert!(matches!(err, ScanError::OcrUnavailable));
    }

    struct FixedEngine(&'static str);

    impl OcrEngine for FixedEngine {
        fn recognize(&self, _image: &NormalizedImage, progress: &dyn Fn(f32)) -> Result<String, ScanError> {
            progress(0.5);
            progress(1.0);
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn engine_is_object_safe_and_reports_progress() {
        let engine: Arc<dyn OcrEngine> = Arc::new(FixedEngine("Tea $2"));
        let seen = std::sync::Mutex::new(Vec::new());
        let image = NormalizedImage {
            bytes: vec![],
            mime: "image/png".into(),
            width: None,
            height: None,
            quality: None,
        };
        let text = engine
            .recognize(&image, &|f| seen.lock().unwrap().push(f))
            .unwrap();
        assert_eq!(text, "Tea $2");
        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);
    }
}
