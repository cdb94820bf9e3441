//! Text extraction strategies.
//!
//! [`ExtractionStrategy`] has three implementations:
//!
//! * [`LocalOcrExtractor`] — in-process OCR plus the line heuristics. Free.
//! * [`RemoteAiExtractor`] — posts the image to a tastecheq server, which
//!   runs the vision model behind the quota gate ([`AiMenuService`]).
//! * [`DirectAiExtractor`] — calls a vision model in-process with the caller's
//!   own provider credentials. No quota applies.
//!
//! None of them retries. Local failures surface as [`ScanError::OcrFailed`],
//! remote ones as [`ScanError::AiParsingFailed`], and a quota refusal as
//! [`ScanError::QuotaExceeded`].

use crate::account::Account;
use crate::config::{ExtractionMode, ScanConfig};
use crate::error::ScanError;
use crate::menu::MenuItemCandidate;
use crate::pipeline::normalize::NormalizedImage;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::{encode, lines, vision};
use crate::progress::ProgressCallback;
use crate::prompts::AI_SOURCE_TEXT;
use crate::quota::{QuotaGate, UsageSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidates plus the text they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub mode: ExtractionMode,
    /// Raw OCR text, or a placeholder for AI extraction.
    pub source_text: String,
    pub items: Vec<MenuItemCandidate>,
}

/// Turns a normalized image into menu item candidates.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn mode(&self) -> ExtractionMode;

    async fn extract(
        &self,
        image: &NormalizedImage,
        progress: Option<&ProgressCallback>,
    ) -> Result<Extraction, ScanError>;
}

// ── Local ────────────────────────────────────────────────────────────────

/// OCR on the blocking pool, then [`lines::parse_menu_lines`].
pub struct LocalOcrExtractor {
    engine: Arc<dyn OcrEngine>,
}

impl LocalOcrExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    /// Use the engine compiled into this build.
    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        Ok(Self::new(crate::pipeline::ocr::default_engine(config)?))
    }
}

#[async_trait]
impl ExtractionStrategy for LocalOcrExtractor {
    fn mode(&self) -> ExtractionMode {
        ExtractionMode::Ocr
    }

    async fn extract(
        &self,
        image: &NormalizedImage,
        progress: Option<&ProgressCallback>,
    ) -> Result<Extraction, ScanError> {
        let engine = Arc::clone(&self.engine);
        let image = image.clone();
        let progress = progress.cloned();

        let text = tokio::task::spawn_blocking(move || {
            engine.recognize(&image, &|fraction| {
                if let Some(cb) = &progress {
                    cb.on_recognition_progress(fraction.clamp(0.0, 1.0));
                }
            })
        })
        .await
        .map_err(|e| ScanError::OcrFailed {
            detail: format!("OCR task panicked: {e}"),
        })?
        .map_err(|e| match e {
            ScanError::OcrFailed { .. } | ScanError::OcrUnavailable => e,
            other => ScanError::OcrFailed {
                detail: other.to_string(),
            },
        })?;

        let source_text = text.trim().to_string();
        let items = lines::parse_menu_lines(&source_text);
        debug!("OCR produced {} chars, {} candidates", source_text.len(), items.len());
        Ok(Extraction {
            mode: ExtractionMode::Ocr,
            source_text,
            items,
        })
    }
}

// ── Remote ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    count: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
}

/// Client for a tastecheq server's extraction endpoint.
pub struct RemoteAiExtractor {
    client: reqwest::Client,
    base_url: String,
    session: Option<String>,
}

impl RemoteAiExtractor {
    pub fn new(base_url: impl Into<String>, session: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, session)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, session: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.session {
            Some(token) => builder.header(reqwest::header::COOKIE, format!("session={token}")),
            None => builder,
        }
    }

    /// The caller's AI usage for the current month.
    pub async fn usage(&self) -> Result<UsageSnapshot, ScanError> {
        let response = self
            .request(reqwest::Method::GET, "/api/usage")
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ScanError::AiParsingFailed {
                detail: format!("usage query returned HTTP {}", response.status()),
            });
        }
        response.json().await.map_err(|e| ScanError::AiResponseUnparsable {
            detail: e.to_string(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> ScanError {
    ScanError::AiParsingFailed {
        detail: e.to_string(),
    }
}

#[async_trait]
impl ExtractionStrategy for RemoteAiExtractor {
    fn mode(&self) -> ExtractionMode {
        ExtractionMode::Ai
    }

    async fn extract(
        &self,
        image: &NormalizedImage,
        _progress: Option<&ProgressCallback>,
    ) -> Result<Extraction, ScanError> {
        let payload = image.data_url();
        let response = self
            .request(reqwest::Method::POST, "/api/gemini-menu")
            .json(&ExtractRequest {
                image_base64: &payload,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            warn!("Extraction endpoint returned HTTP {}", status);
            return Err(match status.as_u16() {
                401 => ScanError::Unauthenticated,
                429 => ScanError::QuotaExceeded {
                    used: body.count.unwrap_or_default(),
                    limit: body.limit.unwrap_or_default(),
                },
                _ => ScanError::AiParsingFailed {
                    detail: body.error.unwrap_or_else(|| format!("HTTP {status}")),
                },
            });
        }

        let items: Vec<MenuItemCandidate> =
            response.json().await.map_err(|e| ScanError::AiResponseUnparsable {
                detail: e.to_string(),
            })?;
        Ok(Extraction {
            mode: ExtractionMode::Ai,
            source_text: AI_SOURCE_TEXT.to_string(),
            items: items.into_iter().map(MenuItemCandidate::normalized).collect(),
        })
    }
}

// ── In-process vision model ──────────────────────────────────────────────

/// Calls the vision model directly, without a server or quota.
pub struct DirectAiExtractor {
    model: Arc<dyn vision::VisionModel>,
    config: Arc<ScanConfig>,
}

impl DirectAiExtractor {
    pub fn new(model: Arc<dyn vision::VisionModel>, config: Arc<ScanConfig>) -> Self {
        Self { model, config }
    }
}

#[async_trait]
impl ExtractionStrategy for DirectAiExtractor {
    fn mode(&self) -> ExtractionMode {
        ExtractionMode::Ai
    }

    async fn extract(
        &self,
        image: &NormalizedImage,
        _progress: Option<&ProgressCallback>,
    ) -> Result<Extraction, ScanError> {
        let items = vision::extract_items(self.model.as_ref(), encode::image_data(image), &self.config).await?;
        Ok(Extraction {
            mode: ExtractionMode::Ai,
            source_text: AI_SOURCE_TEXT.to_string(),
            items,
        })
    }
}

// ── Server side ──────────────────────────────────────────────────────────

/// The extraction endpoint's logic: quota check, model call, charge.
#[derive(Clone)]
pub struct AiMenuService {
    model: Arc<dyn vision::VisionModel>,
    quota: QuotaGate,
    config: Arc<ScanConfig>,
}

impl AiMenuService {
    pub fn new(model: Arc<dyn vision::VisionModel>, quota: QuotaGate, config: Arc<ScanConfig>) -> Self {
        Self { model, quota, config }
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    /// Extract items from a posted `imageBase64` payload for `account`.
    ///
    /// The counter is charged only when the model call and parse succeed.
    pub async fn extract(&self, account: &Account, payload: &str) -> Result<Vec<MenuItemCandidate>, ScanError> {
        let (_, b64) = encode::strip_data_url_prefix(payload);
        if !encode::is_valid_base64(b64) {
            return Err(ScanError::ImageDecode {
                detail: "imageBase64 is empty or not valid base64".into(),
            });
        }

        let ticket = self.quota.authorize(account)?;
        let items = vision::extract_items(self.model.as_ref(), encode::payload_image_data(payload), &self.config).await?;
        let count = self.quota.record_success(ticket)?;
        info!(
            "AI extraction for {}: {} items (usage {})",
            account.id,
            items.len(),
            count.map_or_else(|| "unmetered".to_string(), |c| c.to_string())
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::MonthKey;
    use crate::store::{SqliteStore, UsageStore};
    use edgequake_llm::ImageData;
    use std::sync::Mutex;

    struct FixedEngine(Result<&'static str, &'static str>);

    impl OcrEngine for FixedEngine {
        fn recognize(&self, _image: &NormalizedImage, progress: &dyn Fn(f32)) -> Result<String, ScanError> {
            progress(0.5);
            progress(1.0);
            self.0
                .map(str::to_string)
                .map_err(|detail| ScanError::Internal(detail.to_string()))
        }
    }

    struct CannedModel(Result<&'static str, &'static str>);

    #[async_trait]
    impl vision::VisionModel for CannedModel {
        async fn describe(&self, _prompt: &str, _image: ImageData) -> Result<String, ScanError> {
            self.0
                .map(str::to_string)
                .map_err(|detail| ScanError::AiParsingFailed { detail: detail.into() })
        }
    }

    struct Fractions(Mutex<Vec<f32>>);

    impl crate::progress::ScanProgressCallback for Fractions {
        fn on_recognition_progress(&self, fraction: f32) {
            self.0.lock().unwrap().push(fraction);
        }
    }

    fn image() -> NormalizedImage {
        NormalizedImage {
            bytes: b"ABC".to_vec(),
            mime: "image/png".into(),
            width: None,
            height: None,
            quality: None,
        }
    }

    fn free_user() -> Account {
        Account {
            id: "u1".into(),
            name: "Ana".into(),
            is_admin: false,
            is_paid: false,
        }
    }

    fn service(reply: Result<&'static str, &'static str>, used: u32) -> (Arc<SqliteStore>, AiMenuService) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        for _ in 0..used {
            store.increment_usage("u1", &MonthKey::current()).unwrap();
        }
        let quota = QuotaGate::new(store.clone(), 5);
        let svc = AiMenuService::new(Arc::new(CannedModel(reply)), quota, Arc::new(ScanConfig::default()));
        (store, svc)
    }

    #[tokio::test]
    async fn local_extractor_parses_lines_and_reports_progress() {
        let extractor = LocalOcrExtractor::new(Arc::new(FixedEngine(Ok("Salad\n$8\n"))));
        let fractions = Arc::new(Fractions(Mutex::new(Vec::new())));
        let cb: ProgressCallback = fractions.clone();
        let out = extractor.extract(&image(), Some(&cb)).await.unwrap();
        assert_eq!(out.source_text, "Salad\n$8");
        assert_eq!(out.items, vec![MenuItemCandidate::new("Salad").with_price("$8")]);
        assert_eq!(*fractions.0.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[tokio::test]
    async fn local_failures_become_ocr_failed() {
        let extractor = LocalOcrExtractor::new(Arc::new(FixedEngine(Err("engine crashed"))));
        let err = extractor.extract(&image(), None).await.unwrap_err();
        assert!(matches!(err, ScanError::OcrFailed { .. }));
        assert!(err.to_string().starts_with("OCR failed"));
    }

    #[test]
    fn direct_extractor_uses_placeholder_text() {
        let extractor = DirectAiExtractor::new(
            Arc::new(CannedModel(Ok(r#"[{"name": "Tea", "price": "$2"}]"#))),
            Arc::new(ScanConfig::default()),
        );
        let out = tokio_test::block_on(extractor.extract(&image(), None)).unwrap();
        assert_eq!(out.source_text, AI_SOURCE_TEXT);
        assert_eq!(out.mode, ExtractionMode::Ai);
        assert_eq!(out.items.len(), 1);
    }

    #[tokio::test]
    async fn service_charges_only_on_success() {
        let (store, svc) = service(Ok(r#"[{"name": "Tea"}]"#), 4);
        let items = svc.extract(&free_user(), "data:image/jpeg;base64,QUJD").await.unwrap();
        assert_eq!(items, vec![MenuItemCandidate::new("Tea")]);
        assert_eq!(store.usage("u1", &MonthKey::current()).unwrap(), 5);

        let err = svc.extract(&free_user(), "QUJD").await.unwrap_err();
        assert!(matches!(err, ScanError::QuotaExceeded { used: 5, limit: 5 }));
        assert_eq!(store.usage("u1", &MonthKey::current()).unwrap(), 5);
    }

    #[tokio::test]
    async fn service_failure_leaves_counter() {
        let (store, svc) = service(Ok("I could not find a menu."), 4);
        let err = svc.extract(&free_user(), "QUJD").await.unwrap_err();
        assert!(matches!(err, ScanError::AiResponseUnparsable { .. }));
        assert_eq!(store.usage("u1", &MonthKey::current()).unwrap(), 4);

        let (store, svc) = service(Err("upstream 503"), 4);
        let err = svc.extract(&free_user(), "QUJD").await.unwrap_err();
        assert!(matches!(err, ScanError::AiParsingFailed { .. }));
        assert_eq!(store.usage("u1", &MonthKey::current()).unwrap(), 4);
    }

    #[tokio::test]
    async fn service_rejects_bad_payload_before_quota() {
        let (store, svc) = service(Ok("[]"), 0);
        let err = svc.extract(&free_user(), "").await.unwrap_err();
        assert!(matches!(err, ScanError::ImageDecode { .. }));
        assert_eq!(store.usage("u1", &MonthKey::current()).unwrap(), 0);
    }
}
