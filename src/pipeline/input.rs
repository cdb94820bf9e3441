//! Input resolution: turn a user-supplied path or URL into image bytes.
//!
//! The declared MIME type comes from the file extension for local paths and
//! from `Content-Type` for downloads. It is only a hint: the normalizer
//! checks it and falls back to sniffing the bytes.

use crate::error::ScanError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Image bytes plus what we know about where they came from.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub bytes: Vec<u8>,
    /// Declared MIME type, e.g. `image/jpeg`. Empty when unknown.
    pub mime: String,
    /// File name for display and logging.
    pub name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the image named by `input`, downloading it when it is a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedImage, ScanError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

async fn resolve_local(path_str: &str) -> Result<ResolvedImage, ScanError> {
    let path = PathBuf::from(path_str);
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::FileNotFound { path });
        }
        Err(e) => {
            return Err(ScanError::Internal(format!(
                "Failed to read '{}': {}",
                path.display(),
                e
            )))
        }
    };

    debug!("Resolved local image: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedImage {
        bytes,
        mime: mime_from_extension(&path).unwrap_or_default().to_string(),
        name: file_name(&path),
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedImage, ScanError> {
    info!("Downloading image from: {}", url);
    let failed = |reason: String| ScanError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let name = extract_filename(url);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes ({})", bytes.len(), name);

    let mime = mime
        .or_else(|| mime_from_extension(Path::new(&name)).map(str::to_string))
        .unwrap_or_default();
    Ok(ResolvedImage {
        bytes: bytes.to_vec(),
        mime,
        name,
    })
}

/// MIME type implied by a file extension, if it names an image format.
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string()
}

/// Last path segment of the URL when it looks like a file name.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded-image".to_string()
}
