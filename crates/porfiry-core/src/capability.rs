//! External capability seams
//!
//! The text model and the OCR worker are opaque collaborators. Both can
//! answer in one piece or as a token stream; the stream is what the relay
//! forwards.

use crate::error::CapabilityError;
use crate::message::ChatRequest;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Incremental model output
pub type TokenStream = BoxStream<'static, Result<String, CapabilityError>>;

/// Text/vision model that answers a message list
#[async_trait]
pub trait ModelCapability: Send + Sync {
    /// Model name for logs and health output
    fn model(&self) -> &str;

    /// Complete answer in one piece
    ///
    /// # Errors
    /// - `CapabilityError` if the backend is unreachable or errors
    async fn complete(&self, request: ChatRequest) -> Result<String, CapabilityError>;

    /// Answer as a token stream
    ///
    /// # Errors
    /// - `CapabilityError` if the stream cannot be opened; failures after
    ///   that arrive as stream items
    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, CapabilityError>;
}

/// Text extraction from a single image
#[async_trait]
pub trait OcrCapability: Send + Sync {
    /// Model name for logs and status output
    fn model(&self) -> &str;

    /// Extract all text from a base64 PNG
    ///
    /// # Errors
    /// - `CapabilityError` if the backend is unreachable or errors
    async fn extract(&self, png_base64: String) -> Result<String, CapabilityError>;

    /// Extract text as a token stream
    ///
    /// # Errors
    /// - `CapabilityError` if the stream cannot be opened
    async fn extract_stream(&self, png_base64: String) -> Result<TokenStream, CapabilityError>;
}
