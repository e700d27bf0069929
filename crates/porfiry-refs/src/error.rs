//! Error types for reference resolution

/// Errors building resolver configuration
///
/// Resolution itself cannot fail; only the mention syntax is validated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Mention trigger phrase is empty or whitespace
    #[error("mention phrase must not be empty")]
    EmptyMentionPhrase,

    /// Mention pattern failed to compile
    #[error("invalid mention pattern: {0}")]
    InvalidPattern(String),
}

impl From<regex::Error> for ResolveError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidPattern(err.to_string())
    }
}
