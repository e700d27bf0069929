//! Testing utilities for Porfiry workspace
//!
//! Shared test doubles and fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use futures::{stream, StreamExt};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use porfiry_core::{CapabilityError, ChatRequest, ModelCapability, OcrCapability, TokenStream};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;

/// Model that replays a fixed token script and records what it was asked
#[derive(Debug, Default)]
pub struct ScriptedModel {
    tokens: Vec<String>,
    fail_after: Option<(usize, String)>,
    refuse: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Fail with `message` after `count` tokens were streamed
    #[must_use]
    pub fn failing_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }

    /// Refuse every call before producing output
    #[must_use]
    pub fn unreachable(mut self, message: impl Into<String>) -> Self {
        self.refuse = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().last().cloned()
    }

    fn record(&self, request: ChatRequest) -> Result<(), CapabilityError> {
        self.requests.lock().push(request);
        match &self.refuse {
            Some(message) => Err(CapabilityError::Transport {
                backend: "scripted".into(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn backend_error(message: &str) -> CapabilityError {
    CapabilityError::Backend {
        backend: "scripted".into(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ModelCapability for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, CapabilityError> {
        self.record(request)?;
        match &self.fail_after {
            Some((_, message)) => Err(backend_error(message)),
            None => Ok(self.tokens.concat()),
        }
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, CapabilityError> {
        self.record(request)?;
        let mut items: Vec<Result<String, CapabilityError>> = self.tokens.iter().cloned().map(Ok).collect();
        if let Some((count, message)) = &self.fail_after {
            items.truncate(*count);
            items.push(Err(backend_error(message)));
        }
        Ok(stream::iter(items).boxed())
    }
}

/// Controls a [`GatedOcr`] from the test body
#[derive(Debug, Clone)]
pub struct OcrGate {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl OcrGate {
    /// Wait until the worker has received a request
    pub async fn started(&self) {
        self.started.notified().await;
    }

    /// Let the in-flight request finish
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// OCR worker that holds each request until released
#[derive(Debug)]
pub struct GatedOcr {
    text: String,
    gate: OcrGate,
    seen: Mutex<Vec<String>>,
}

impl GatedOcr {
    pub fn new(text: impl Into<String>) -> (Self, OcrGate) {
        let gate = OcrGate {
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let ocr = Self {
            text: text.into(),
            gate: gate.clone(),
            seen: Mutex::new(Vec::new()),
        };
        (ocr, gate)
    }

    /// Base64 PNG payloads received so far
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl OcrCapability for GatedOcr {
    fn model(&self) -> &str {
        "gated-ocr"
    }

    async fn extract(&self, png_base64: String) -> Result<String, CapabilityError> {
        self.seen.lock().push(png_base64);
        self.gate.started.notify_one();
        self.gate.release.notified().await;
        Ok(self.text.clone())
    }

    async fn extract_stream(&self, png_base64: String) -> Result<TokenStream, CapabilityError> {
        self.seen.lock().push(png_base64);
        let words: Vec<Result<String, CapabilityError>> = self
            .text
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(stream::iter(words).boxed())
    }
}

/// Solid-colour image encoded as `format`
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), format)
        .unwrap();
    out
}

/// Small PNG
pub fn png_bytes() -> Vec<u8> {
    image_bytes(4, 3, ImageFormat::Png)
}

/// Write a small image named `name` into `dir`; the format follows the
/// extension (JPEG for `.jpg`/`.jpeg`, PNG otherwise)
pub fn write_image(dir: &Path, name: &str) -> PathBuf {
    let lowered = name.to_ascii_lowercase();
    let format = if lowered.ends_with(".jpg") || lowered.ends_with(".jpeg") {
        ImageFormat::Jpeg
    } else {
        ImageFormat::Png
    };
    let path = dir.join(name);
    std::fs::write(&path, image_bytes(4, 3, format)).unwrap();
    path
}

/// Temporary directory holding one image per name
pub fn screenshot_dir(names: &[&str]) -> (tempfile::TempDir, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let paths = names
        .iter()
        .map(|name| write_image(dir.path(), name).to_string_lossy().into_owned())
        .collect();
    (dir, paths)
}
