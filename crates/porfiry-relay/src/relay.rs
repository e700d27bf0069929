//! Token relay
//!
//! Forwards an upstream token source chunk by chunk. Once output has begun,
//! the transport has no way to report an error out of band, so upstream
//! failures become one human-readable [`RelayChunk::Failure`] marker and the
//! sequence ends.

use futures::{stream, Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

/// One item of a relayed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayChunk {
    /// Text forwarded from upstream, never empty
    Token(String),
    /// Upstream failed or stalled; always the last content chunk
    Failure(String),
    /// Explicit empty terminator, only with
    /// [`RelayOptions::terminal_empty_chunk`]
    End,
}

impl RelayChunk {
    /// Wire text of the chunk
    ///
    /// A failure renders as `\n[ERROR] <message>`.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Token(text) => text,
            Self::Failure(message) => format!("\n[ERROR] {message}"),
            Self::End => String::new(),
        }
    }

    /// Check if this is the failure marker
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Relay behaviour knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Longest wait for the next upstream chunk; `None` waits forever
    pub chunk_timeout: Option<Duration>,
    /// Finish with [`RelayChunk::End`], also after a failure
    pub terminal_empty_chunk: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            chunk_timeout: Some(Duration::from_secs(120)),
            terminal_empty_chunk: false,
        }
    }
}

impl RelayOptions {
    /// Set the idle timeout between chunks
    #[inline]
    #[must_use]
    pub fn with_chunk_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Enable or disable the terminating empty chunk
    #[inline]
    #[must_use]
    pub fn with_terminal_empty_chunk(mut self, enabled: bool) -> Self {
        self.terminal_empty_chunk = enabled;
        self
    }
}

enum RelayState<S> {
    Open(Pin<Box<S>>),
    Closing,
    Done,
}

/// Relay `source` to the caller
///
/// Lazy, finite and not restartable. Each upstream token is yielded as soon
/// as it arrives; empty tokens are skipped. An upstream error or an idle
/// timeout yields a single [`RelayChunk::Failure`] and ends the sequence.
/// Dropping the returned stream drops `source`.
pub fn relay<S, E>(source: S, options: RelayOptions) -> impl Stream<Item = RelayChunk>
where
    S: Stream<Item = Result<String, E>>,
    E: Display,
{
    stream::unfold(RelayState::Open(Box::pin(source)), move |state| async move {
        match state {
            RelayState::Open(mut source) => loop {
                let next = match options.chunk_timeout {
                    Some(limit) => match tokio::time::timeout(limit, source.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::warn!(timeout_secs = limit.as_secs(), "upstream stalled");
                            let message = format!("no output for {}s", limit.as_secs());
                            return Some((RelayChunk::Failure(message), RelayState::Closing));
                        }
                    },
                    None => source.next().await,
                };
                match next {
                    Some(Ok(token)) if token.is_empty() => continue,
                    Some(Ok(token)) => return Some((RelayChunk::Token(token), RelayState::Open(source))),
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "upstream failed mid-stream");
                        return Some((RelayChunk::Failure(err.to_string()), RelayState::Closing));
                    }
                    None => return closing(options),
                }
            },
            RelayState::Closing => closing(options),
            RelayState::Done => None,
        }
    })
}

fn closing<S>(options: RelayOptions) -> Option<(RelayChunk, RelayState<S>)> {
    options
        .terminal_empty_chunk
        .then_some((RelayChunk::End, RelayState::Done))
}

/// Relay and render every chunk as wire text
pub fn relay_text<S, E>(source: S, options: RelayOptions) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<String, E>>,
    E: Display,
{
    relay(source, options).map(RelayChunk::into_text)
}
