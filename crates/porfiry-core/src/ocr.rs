//! OCR service
//!
//! The OCR worker serves one image at a time. Every call, one-shot or
//! streamed, goes through the same [`SingleFlight`] gate; a second caller is
//! told the worker is busy instead of waiting.

use crate::capability::OcrCapability;
use crate::config::OcrConfig;
use crate::error::AssemblyError;
use crate::imaging::{ImageLoader, OcrInput};
use futures::stream::BoxStream;
use futures::StreamExt;
use porfiry_relay::{relay_text, RelayOptions, SingleFlight};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Gate name of the OCR worker
pub const OCR_CAPABILITY: &str = "ocr";

/// Worker status for health endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrStatus {
    /// A request is in flight
    pub busy: bool,
    /// OCR model name
    pub model: String,
}

/// Single-flight front of an OCR capability
#[derive(Clone)]
pub struct OcrService {
    backend: Arc<dyn OcrCapability>,
    gate: SingleFlight,
    loader: ImageLoader,
    relay: RelayOptions,
}

impl std::fmt::Debug for OcrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrService")
            .field("model", &self.backend.model())
            .field("busy", &self.gate.is_busy())
            .finish_non_exhaustive()
    }
}

impl OcrService {
    /// Create with default fetch and idle timeouts
    #[must_use]
    pub fn new(backend: Arc<dyn OcrCapability>) -> Self {
        Self::from_config(backend, &OcrConfig::default())
    }

    /// Create from configuration
    #[must_use]
    pub fn from_config(backend: Arc<dyn OcrCapability>, config: &OcrConfig) -> Self {
        Self {
            backend,
            gate: SingleFlight::new(OCR_CAPABILITY),
            loader: ImageLoader::new(Duration::from_secs(config.fetch_timeout_secs)),
            relay: RelayOptions::default()
                .with_chunk_timeout(Some(Duration::from_secs(config.stream_idle_timeout_secs)))
                .with_terminal_empty_chunk(true),
        }
    }

    /// With custom relay options for [`ocr_stream`](Self::ocr_stream)
    #[inline]
    #[must_use]
    pub fn with_relay_options(mut self, relay: RelayOptions) -> Self {
        self.relay = relay;
        self
    }

    /// Busy flag and model name
    #[must_use]
    pub fn status(&self) -> OcrStatus {
        OcrStatus {
            busy: self.gate.is_busy(),
            model: self.backend.model().to_string(),
        }
    }

    /// Extract all text from one image
    ///
    /// # Errors
    /// - `AssemblyError::Busy` if another OCR request is in flight
    /// - `AssemblyError::NotFound` for a missing local file
    /// - `AssemblyError::InvalidInput` for an undecodable image or failed fetch
    /// - `AssemblyError::CapabilityFailure` if the worker fails
    pub async fn ocr(&self, input: OcrInput) -> Result<String, AssemblyError> {
        self.gate
            .run(|| async {
                let png = self.loader.load_png_base64(&input).await?;
                tracing::info!(model = %self.backend.model(), "ocr started");
                let text = self.backend.extract(png).await.map_err(|e| {
                    tracing::warn!(error = %e, "ocr failed");
                    AssemblyError::from(e)
                })?;
                tracing::info!(chars = text.len(), "ocr finished");
                Ok::<_, AssemblyError>(text)
            })
            .await
    }

    /// Extract text from the image at `path` as a stream of chunks
    ///
    /// The slot is held from admission until the stream ends or is dropped.
    /// The last item is always an empty chunk; a failure after output began
    /// arrives as an `[ERROR]` chunk just before it.
    ///
    /// # Errors
    /// Failures before streaming starts: `Busy`, `NotFound`, `InvalidInput`
    /// or `CapabilityFailure`.
    pub async fn ocr_stream(&self, path: &str) -> Result<BoxStream<'static, String>, AssemblyError> {
        let permit = self.gate.try_acquire()?;
        let png = self
            .loader
            .load_png_base64(&OcrInput::Path(path.to_string()))
            .await?;

        tracing::info!(model = %self.backend.model(), path, "ocr stream started");
        let tokens = self.backend.extract_stream(png).await.map_err(|e| {
            tracing::warn!(error = %e, "ocr stream failed to open");
            AssemblyError::from(e)
        })?;

        Ok(permit.guard(relay_text(tokens, self.relay)).boxed())
    }

    /// Check whether a request holds the worker
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }
}

/// Frame one chunk as a server-sent event
///
/// Every line of the chunk becomes its own `data:` line, so an empty chunk
/// yields the terminating `data: \n\n`.
#[must_use]
pub fn sse_frame(chunk: &str) -> String {
    let mut frame = String::with_capacity(chunk.len() + 8);
    for line in chunk.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}
