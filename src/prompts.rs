//! Prompts for VLM-based menu extraction.
//!
//! Callers can override the default via
//! [`crate::config::ScanConfig::extraction_prompt`]; the constant here is used
//! only when no override is provided.

/// Default instruction sent alongside the menu photo.
///
/// The reply is expected to contain a JSON array; surrounding prose is
/// tolerated because [`crate::pipeline::vision::extract_json_array`] slices
/// the first balanced `[...]` span out of whatever the model says.
pub const MENU_EXTRACTION_PROMPT: &str = r#"Extract all menu items from this image. Return a JSON array of objects with name, price if available, and description fields. Example: [{"name": "Cheeseburger", "price": "$12", "description": "Beef patty, cheese, lettuce, tomato"}]"#;

/// Placeholder shown in place of raw OCR text when the AI strategy ran.
pub const AI_SOURCE_TEXT: &str = "[TasteCheq AI parsed menu]";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_asks_for_json_array_fields() {
        assert!(MENU_EXTRACTION_PROMPT.contains("JSON array"));
        for field in ["name", "price", "description"] {
            assert!(MENU_EXTRACTION_PROMPT.contains(field), "missing {field}");
        }
    }
}
