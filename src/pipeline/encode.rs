//! Image payload encoding: normalized bytes or client data URLs → `ImageData`.
//!
//! Clients post `imageBase64` either as a bare base64 string or as a full
//! `data:image/...;base64,` URL. The prefix, when present, names the MIME
//! type; otherwise PNG is assumed.

use super::normalize::NormalizedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static DATA_URL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,").unwrap());

/// MIME assumed for payloads without a data-URL prefix.
pub const DEFAULT_PAYLOAD_MIME: &str = "image/png";

/// Split a posted image payload into `(mime, base64)`.
pub fn strip_data_url_prefix(payload: &str) -> (&str, &str) {
    let payload = payload.trim();
    match DATA_URL_PREFIX.captures(payload) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let mime = caps.get(1).map_or(DEFAULT_PAYLOAD_MIME, |m| m.as_str());
            (mime, &payload[whole..])
        }
        None => (DEFAULT_PAYLOAD_MIME, payload),
    }
}

/// `true` when the payload decodes as base64.
pub fn is_valid_base64(b64: &str) -> bool {
    !b64.is_empty() && STANDARD.decode(b64).is_ok()
}

/// Wrap a posted payload for the vision model.
///
/// `detail: "high"` lets tiling providers read menu fine print instead of a
/// single low-resolution overview tile.
pub fn payload_image_data(payload: &str) -> ImageData {
    let (mime, b64) = strip_data_url_prefix(payload);
    debug!("Image payload: {} ({} base64 chars)", mime, b64.len());
    ImageData::new(b64, mime).with_detail("high")
}

/// Wrap a normalized image for the vision model.
pub fn image_data(image: &NormalizedImage) -> ImageData {
    ImageData::new(image.base64(), image.mime.clone()).with_detail("high")
}
