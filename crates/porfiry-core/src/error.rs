//! Error types for report assembly
//!
//! Provides error handling for:
//! - Screenshot ordering and lookup failures
//! - Admission rejections of single-flight capabilities
//! - Model and OCR backend failures
//! - Malformed image payloads
//! - Report persistence

use porfiry_relay::RelayError;
use porfiry_shots::RegistryError;

/// Main assembly error type
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// Reorder given a sequence that is not a permutation
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Capability already serving a request
    #[error("{capability} busy, try again later")]
    Busy {
        /// Guarded capability name
        capability: String,
    },

    /// Model or OCR backend unreachable or erroring
    #[error("capability failure: {0}")]
    CapabilityFailure(String),

    /// Unknown path, screenshot or report
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request or image payload
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Report store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AssemblyError {
    /// Create invalid input error
    #[inline]
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Create not found error
    #[inline]
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Whether the core would retry this error on its own
    ///
    /// Never: busy rejections must be re-requested by the caller and
    /// capability failures are surfaced as they are.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Check if this is an admission-control rejection
    #[inline]
    #[must_use]
    pub fn is_admission_rejection(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<RegistryError> for AssemblyError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidOrder { reason } => Self::InvalidOrder(reason),
            RegistryError::NotFound(id) => Self::NotFound(format!("screenshot {id}")),
        }
    }
}

impl From<RelayError> for AssemblyError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Busy { capability } => Self::Busy { capability },
        }
    }
}

impl From<CapabilityError> for AssemblyError {
    fn from(err: CapabilityError) -> Self {
        Self::CapabilityFailure(err.to_string())
    }
}

/// Failures talking to a model or OCR backend
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// Transport failure (connect, timeout, broken body)
    #[error("{backend} unreachable: {message}")]
    Transport {
        /// Backend name
        backend: String,
        /// Transport error text
        message: String,
    },

    /// Non-success HTTP status
    #[error("{backend} returned {status}: {body}")]
    Status {
        /// Backend name
        backend: String,
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Backend reported an error inside the response
    #[error("{backend} error: {message}")]
    Backend {
        /// Backend name
        backend: String,
        /// Reported message
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Report store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the store file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not valid JSON of the expected shape
    #[error("malformed store document: {0}")]
    Format(#[from] serde_json::Error),

    /// Background store task did not finish
    #[error("store task failed: {0}")]
    Task(String),
}
