//! Per-request stream session state
//!
//! ```text
//! Idle ──first chunk──▶ Streaming ──end──▶ Completed
//!                           │                  │
//!                           └──failure──▶ Failed ──reset──▶ Idle
//! ```
//!
//! There is no cancelled phase: a consumer that stops reading simply drops
//! the session.

use crate::relay::RelayChunk;

/// Phase of one relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayPhase {
    /// Nothing received yet
    #[default]
    Idle,
    /// Tokens are arriving
    Streaming,
    /// Upstream ended normally
    Completed,
    /// Upstream failed; see [`StreamSession::error`]
    Failed,
}

/// Accumulated text and outcome of one request/response cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSession {
    accumulated: String,
    phase: RelayPhase,
    error: Option<String>,
}

impl StreamSession {
    /// Create idle session
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one relayed chunk
    ///
    /// Chunks arriving after the session finished are ignored.
    pub fn observe(&mut self, chunk: &RelayChunk) {
        if self.is_done() {
            return;
        }
        match chunk {
            RelayChunk::Token(text) => {
                self.phase = RelayPhase::Streaming;
                self.accumulated.push_str(text);
            }
            RelayChunk::Failure(message) => {
                self.phase = RelayPhase::Failed;
                self.error = Some(message.clone());
            }
            RelayChunk::End => self.phase = RelayPhase::Completed,
        }
    }

    /// Mark the end of the source when no [`RelayChunk::End`] is relayed
    pub fn finish(&mut self) {
        if !self.is_done() {
            self.phase = RelayPhase::Completed;
        }
    }

    /// Text received so far, without any error marker
    #[inline]
    #[must_use]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    /// Failure message, if the session failed
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Check whether the session reached a terminal phase
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.phase, RelayPhase::Completed | RelayPhase::Failed)
    }

    /// Consume into the full text, or the failure message
    ///
    /// # Errors
    /// Returns the failure message of a failed session.
    pub fn into_result(self) -> Result<String, String> {
        match self.error {
            Some(message) => Err(message),
            None => Ok(self.accumulated),
        }
    }

    /// Back to idle for the next cycle
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_through_success() {
        let mut session = StreamSession::new();
        assert_eq!(session.phase(), RelayPhase::Idle);

        session.observe(&RelayChunk::Token("Hello, ".into()));
        assert_eq!(session.phase(), RelayPhase::Streaming);
        session.observe(&RelayChunk::Token("world".into()));
        session.finish();

        assert_eq!(session.phase(), RelayPhase::Completed);
        assert_eq!(session.clone().into_result(), Ok("Hello, world".to_string()));

        session.reset();
        assert_eq!(session, StreamSession::new());
    }

    #[test]
    fn failure_is_terminal() {
        let mut session = StreamSession::new();
        session.observe(&RelayChunk::Token("part".into()));
        session.observe(&RelayChunk::Failure("timeout".into()));
        session.observe(&RelayChunk::Token("late".into()));
        session.finish();

        assert_eq!(session.phase(), RelayPhase::Failed);
        assert_eq!(session.accumulated(), "part");
        assert_eq!(session.error(), Some("timeout"));
        assert_eq!(session.into_result(), Err("timeout".to_string()));
    }
}
