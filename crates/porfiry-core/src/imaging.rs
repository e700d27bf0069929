//! Screenshot bytes: loading, normalization and data URIs

use crate::error::AssemblyError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

/// Where an OCR image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrInput {
    /// Local path or `http(s)` URL
    Path(String),
    /// Base64-encoded image bytes
    Base64(String),
}

/// MIME type guessed from a file name; PNG when unknown
#[must_use]
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}

/// `data:<mime>;base64,<bytes>` with the MIME type taken from `name`
#[must_use]
pub fn data_uri(bytes: &[u8], name: &str) -> String {
    format!("data:{};base64,{}", mime_for_name(name), BASE64.encode(bytes))
}

/// Decode any supported image and re-encode it as RGB PNG
///
/// # Errors
/// - `AssemblyError::InvalidInput` if `bytes` is not a decodable image
pub fn normalize_to_png(bytes: &[u8]) -> Result<Vec<u8>, AssemblyError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| AssemblyError::invalid_input(format!("undecodable image: {e}")))?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| AssemblyError::invalid_input(format!("PNG encoding failed: {e}")))?;
    Ok(out)
}

/// Decode a base64 payload, tolerating a `data:` prefix and whitespace
///
/// # Errors
/// - `AssemblyError::InvalidInput` on malformed base64
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, AssemblyError> {
    let trimmed = payload.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, body)) if prefix.starts_with("data:") => body,
        _ => trimmed,
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| AssemblyError::invalid_input(format!("invalid base64 image: {e}")))
}

/// Read a screenshot file from disk
///
/// # Errors
/// - `AssemblyError::NotFound` if `path` is not an existing file
/// - `AssemblyError::InvalidInput` if it cannot be read
pub async fn read_screenshot(path: &str) -> Result<Vec<u8>, AssemblyError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(AssemblyError::not_found(format!("file {path}"))),
    }
    tokio::fs::read(path)
        .await
        .map_err(|e| AssemblyError::invalid_input(format!("failed reading {path}: {e}")))
}

/// Loads OCR input images from disk, the network or inline payloads
#[derive(Debug, Clone)]
pub struct ImageLoader {
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl ImageLoader {
    /// Create loader with a bound on remote fetches
    #[must_use]
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            fetch_timeout,
        }
    }

    /// Load raw bytes for `source`
    ///
    /// # Errors
    /// - `AssemblyError::NotFound` for a missing local file
    /// - `AssemblyError::InvalidInput` for bad base64 or a failed fetch
    pub async fn load(&self, source: &OcrInput) -> Result<Vec<u8>, AssemblyError> {
        match source {
            OcrInput::Base64(payload) => decode_base64(payload),
            OcrInput::Path(path) if is_remote(path) => self.fetch(path).await,
            OcrInput::Path(path) => read_screenshot(path).await,
        }
    }

    /// Load `source` and normalize it to base64 PNG for an OCR backend
    ///
    /// # Errors
    /// See [`load`](Self::load) and [`normalize_to_png`].
    pub async fn load_png_base64(&self, source: &OcrInput) -> Result<String, AssemblyError> {
        let bytes = self.load(source).await?;
        let png = normalize_to_png(&bytes)?;
        Ok(BASE64.encode(png))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssemblyError> {
        let loading = |e: reqwest::Error| AssemblyError::invalid_input(format!("error loading image {url}: {e}"));
        let response = self
            .http
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(loading)?
            .error_for_status()
            .map_err(loading)?;
        let bytes = response.bytes().await.map_err(loading)?;
        Ok(bytes.to_vec())
    }
}

fn is_remote(path: &str) -> bool {
    let lowered = path.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}
