//! Image normalization: validate the upload and shrink it for extraction.
//!
//! Two variants, picked by [`crate::config::Normalization`]:
//!
//! * **Basic** — MIME check plus a hard size ceiling; bytes pass through.
//! * **Refined** — MIME check, proportional downscale to fit the configured
//!   box (never upscaled), then JPEG re-encode stepping quality down until the
//!   result fits `target_bytes` or `min_quality` is reached.
//!
//! Both are pure CPU work with no I/O; callers on an async runtime should run
//! them inside `spawn_blocking` (see [`crate::scan`]).

use crate::config::{Normalization, ScanConfig};
use crate::error::ScanError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

/// The image handed to an extraction strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// Pixel size after resizing. `None` when the basic variant skipped decoding.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// JPEG quality used by the refined variant.
    pub quality: Option<u8>,
}

impl NormalizedImage {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64())
    }
}

/// Normalize `bytes` according to `config.normalization`.
pub fn normalize_image(
    bytes: &[u8],
    declared_mime: &str,
    config: &ScanConfig,
) -> Result<NormalizedImage, ScanError> {
    let mime = check_mime(bytes, declared_mime)?;
    match config.normalization {
        Normalization::Basic => normalize_basic(bytes, mime, config.max_upload_bytes),
        Normalization::Refined => normalize_refined(bytes, config),
    }
}

/// Accept a declared `image/*` type, or sniff the bytes when nothing was declared.
fn check_mime(bytes: &[u8], declared: &str) -> Result<String, ScanError> {
    let declared = declared.trim().to_ascii_lowercase();
    if declared.starts_with("image/") {
        return Ok(declared);
    }
    if !declared.is_empty() {
        return Err(ScanError::NotAnImage { mime: declared });
    }
    image::guess_format(bytes)
        .ok()
        .and_then(format_mime)
        .map(str::to_string)
        .ok_or_else(|| ScanError::NotAnImage {
            mime: "unknown".to_string(),
        })
}

fn format_mime(format: ImageFormat) -> Option<&'static str> {
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => return None,
    };
    Some(mime)
}

fn normalize_basic(bytes: &[u8], mime: String, ceiling: usize) -> Result<NormalizedImage, ScanError> {
    if bytes.len() > ceiling {
        return Err(ScanError::FileTooLarge {
            size: bytes.len(),
            limit: ceiling,
        });
    }
    Ok(NormalizedImage {
        bytes: bytes.to_vec(),
        mime,
        width: None,
        height: None,
        quality: None,
    })
}

fn normalize_refined(bytes: &[u8], config: &ScanConfig) -> Result<NormalizedImage, ScanError> {
    let img = image::load_from_memory(bytes).map_err(|e| ScanError::ImageDecode {
        detail: e.to_string(),
    })?;
    let img = fit_within(img, config.max_width, config.max_height);
    let (width, height) = img.dimensions();
    let (encoded, quality) = encode_to_target(&img, config)?;

    debug!(
        "Normalized {} bytes → {}x{} JPEG q{} ({} bytes)",
        bytes.len(),
        width,
        height,
        quality,
        encoded.len()
    );

    Ok(NormalizedImage {
        bytes: encoded,
        mime: "image/jpeg".to_string(),
        width: Some(width),
        height: Some(height),
        quality: Some(quality),
    })
}

/// Downscale proportionally so both sides fit the box. Smaller images are
/// returned as-is.
pub fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= max_width && h <= max_height {
        return img;
    }
    img.resize(max_width, max_height, FilterType::Lanczos3)
}

/// JPEG-encode at decreasing quality until the output fits `target_bytes`.
/// Returns the last encoding tried once `min_quality` is reached or the
/// quality stops moving.
fn encode_to_target(img: &DynamicImage, config: &ScanConfig) -> Result<(Vec<u8>, u8), ScanError> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut quality = config.initial_quality;
    loop {
        let encoded = encode_jpeg(&rgb, quality)?;
        if encoded.len() <= config.target_bytes || quality <= config.min_quality {
            return Ok((encoded, quality));
        }
        let next = quality
            .saturating_sub(config.quality_step)
            .max(config.min_quality);
        if next == quality {
            return Ok((encoded, quality));
        }
        quality = next;
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ScanError> {
    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| ScanError::ImageEncode {
            detail: e.to_string(),
        })?;
    Ok(buf)
}
