//! Error types for the relay

/// Relay and admission errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Capability already serving a request
    #[error("{capability} busy")]
    Busy {
        /// Guarded capability name
        capability: String,
    },
}

impl RelayError {
    /// Create busy error
    #[inline]
    #[must_use]
    pub fn busy(capability: impl Into<String>) -> Self {
        Self::Busy {
            capability: capability.into(),
        }
    }

    /// Check if this is an admission rejection
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}
