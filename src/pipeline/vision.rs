//! Vision-model interaction: send a menu photo, read back a JSON item list.
//!
//! The model is asked for a JSON array but is free to wrap it in prose or
//! code fences. [`extract_json_array`] slices the first balanced `[...]` span
//! out of the reply and [`parse_candidates_json`] turns it into candidates.
//!
//! There are no retries: a failed call surfaces as
//! [`ScanError::AiParsingFailed`] and the caller decides whether to try again.
//! Quota is only charged for successful extractions, so a retry is never
//! billed twice.

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::menu::MenuItemCandidate;
use crate::prompts::MENU_EXTRACTION_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default provider when nothing else is configured.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Default model for menu extraction.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// A model that answers a text prompt about one image.
///
/// The server's extraction service holds one of these; tests substitute a
/// canned implementation.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe(&self, prompt: &str, image: ImageData) -> Result<String, ScanError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ScanConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider from config and environment.
    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn describe(&self, prompt: &str, image: ImageData) -> Result<String, ScanError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];

        match self.provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => {
                debug!(
                    "Vision call: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => {
                warn!("Vision call failed after {:?}: {}", start.elapsed(), e);
                Err(ScanError::AiParsingFailed {
                    detail: e.to_string(),
                })
            }
        }
    }
}

/// Stands in when no provider could be resolved; every call fails with the
/// resolution error.
pub struct UnavailableModel {
    provider: String,
    hint: String,
}

impl UnavailableModel {
    pub fn new(cause: ScanError) -> Self {
        match cause {
            ScanError::ProviderNotConfigured { provider, hint } => Self { provider, hint },
            other => Self {
                provider: "unknown".to_string(),
                hint: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl VisionModel for UnavailableModel {
    async fn describe(&self, _prompt: &str, _image: ImageData) -> Result<String, ScanError> {
        Err(ScanError::ProviderNotConfigured {
            provider: self.provider.clone(),
            hint: self.hint.clone(),
        })
    }
}

/// Ask the model for the menu items on `image` and parse its reply.
pub async fn extract_items(
    model: &dyn VisionModel,
    image: ImageData,
    config: &ScanConfig,
) -> Result<Vec<MenuItemCandidate>, ScanError> {
    let prompt = config
        .extraction_prompt
        .as_deref()
        .unwrap_or(MENU_EXTRACTION_PROMPT);
    let reply = model.describe(prompt, image).await?;
    parse_candidates_json(&reply)
}

fn build_options(config: &ScanConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. Gemini, when `GEMINI_API_KEY` is set.
/// 5. Whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &ScanConfig) -> Result<Arc<dyn LLMProvider>, ScanError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Some(prov), Some(env_model)) = (
        env_non_empty("EDGEQUAKE_LLM_PROVIDER"),
        env_non_empty("EDGEQUAKE_MODEL"),
    ) {
        return create_vision_provider(&prov, &env_model);
    }

    if env_non_empty("GEMINI_API_KEY").is_some() {
        return create_vision_provider(DEFAULT_PROVIDER, model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScanError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

// ── Reply parsing ────────────────────────────────────────────────────────

/// The first balanced `[...]` span of `reply`, ignoring brackets inside JSON
/// string literals. `None` if there is no `[` or it is never closed.
pub fn extract_json_array(reply: &str) -> Option<&str> {
    let start = reply.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in reply[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&reply[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    price: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    sub_category: Option<String>,
}

/// Parse a model reply into candidates.
///
/// Numeric prices are kept as their JSON text. Entries without a name are
/// dropped.
pub fn parse_candidates_json(reply: &str) -> Result<Vec<MenuItemCandidate>, ScanError> {
    let span = extract_json_array(reply).ok_or_else(|| ScanError::AiResponseUnparsable {
        detail: "no JSON array in model reply".to_string(),
    })?;
    let raw: Vec<RawItem> =
        serde_json::from_str(span).map_err(|e| ScanError::AiResponseUnparsable {
            detail: e.to_string(),
        })?;

    let items = raw
        .into_iter()
        .filter_map(|r| {
            let price = match r.price {
                Some(serde_json::Value::String(s)) => Some(s),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            let c = MenuItemCandidate {
                name: r.name?,
                price,
                description: r.description,
                category: r.category,
                sub_category: r.sub_category,
            }
            .normalized();
            (!c.name.is_empty()).then_some(c)
        })
        .collect();
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedModel {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VisionModel for CannedModel {
        async fn describe(&self, prompt: &str, _image: ImageData) -> Result<String, ScanError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|detail| ScanError::AiParsingFailed { detail })
        }
    }

    fn image() -> ImageData {
        ImageData::new("QUJD", "image/png")
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ScanConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn extracts_array_from_prose() {
        let reply = "Sure! Here you go:\n```json\n[{\"name\": \"Tea\"}]\n```\nEnjoy [really].";
        assert_eq!(extract_json_array(reply), Some("[{\"name\": \"Tea\"}]"));
    }

    #[test]
    fn nested_and_quoted_brackets_are_balanced() {
        let reply = r#"[{"name": "Combo [2 pc]", "tags": ["a", "b"]}] trailing ]"#;
        assert_eq!(
            extract_json_array(reply),
            Some(r#"[{"name": "Combo [2 pc]", "tags": ["a", "b"]}]"#)
        );
    }

    #[test]
    fn missing_or_unclosed_bracket() {
        assert_eq!(extract_json_array("no items here"), None);
        assert_eq!(extract_json_array("[{\"name\": \"x\"}"), None);
    }

    #[test]
    fn parses_items_with_numeric_price() {
        let items = parse_candidates_json(
            r#"[{"name": " Cheeseburger ", "price": "$12", "description": "Beef"},
                {"name": "Soda", "price": 2.5},
                {"price": "$1"},
                {"name": "  "}]"#,
        )
        .unwrap();
        assert_eq!(
            items,
            vec![
                MenuItemCandidate::new("Cheeseburger")
                    .with_price("$12")
                    .with_description("Beef"),
                MenuItemCandidate::new("Soda").with_price("2.5"),
            ]
        );
    }

    #[test]
    fn invalid_json_span_is_unparsable() {
        let err = parse_candidates_json("[not json]").unwrap_err();
        assert!(matches!(err, ScanError::AiResponseUnparsable { .. }));
        let err = parse_candidates_json("sorry, I can't read that").unwrap_err();
        assert!(matches!(err, ScanError::AiResponseUnparsable { .. }));
    }

    #[tokio::test]
    async fn extract_items_uses_default_prompt() {
        let model = CannedModel {
            reply: Ok(r#"[{"name": "Salad", "price": "$8"}]"#.into()),
            prompts: Mutex::new(Vec::new()),
        };
        let items = extract_items(&model, image(), &ScanConfig::default()).await.unwrap();
        assert_eq!(items, vec![MenuItemCandidate::new("Salad").with_price("$8")]);
        assert_eq!(model.prompts.lock().unwrap()[0], MENU_EXTRACTION_PROMPT);
    }

    #[tokio::test]
    async fn unavailable_model_reports_hint() {
        let model = UnavailableModel::new(ScanError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "set GEMINI_API_KEY".into(),
        });
        let err = model.describe("p", image()).await.unwrap_err();
        assert!(err.to_string().contains("set GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn extract_items_propagates_model_failure() {
        let model = CannedModel {
            reply: Err("upstream 503".into()),
            prompts: Mutex::new(Vec::new()),
        };
        let config = ScanConfig::builder().extraction_prompt("list items").build().unwrap();
        let err = extract_items(&model, image(), &config).await.unwrap_err();
        assert!(matches!(err, ScanError::AiParsingFailed { .. }));
        assert_eq!(model.prompts.lock().unwrap()[0], "list items");
    }
}
