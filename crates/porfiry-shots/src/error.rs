//! Error types for the screenshot registry

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Requested order is not a permutation of the current display names
    #[error("invalid order: {reason}")]
    InvalidOrder {
        /// What made the order unacceptable
        reason: String,
    },

    /// No record with the given identity
    #[error("screenshot not found: {0}")]
    NotFound(String),
}

impl RegistryError {
    /// Create invalid order error
    #[inline]
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidOrder {
            reason: reason.into(),
        }
    }
}
