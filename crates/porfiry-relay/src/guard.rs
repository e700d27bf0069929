//! Single-flight admission control
//!
//! A [`SingleFlight`] guards one external capability that can serve a single
//! request at a time (the OCR worker, optionally the report model):
//! - Acquisition is a non-blocking test-and-set on a one-permit semaphore
//! - A second caller gets [`RelayError::Busy`] immediately, it never queues
//! - The permit is released on drop, so every exit path frees the slot
//!
//! Handles are cheap to clone and are passed to request handlers by value.

use crate::error::RelayError;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Named single-slot gate around a shared capability
#[derive(Debug, Clone)]
pub struct SingleFlight {
    capability: Arc<str>,
    slot: Arc<Semaphore>,
}

impl SingleFlight {
    /// Create an idle gate for `capability`
    #[must_use]
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: Arc::from(capability.into()),
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Capability name used in logs and busy errors
    #[inline]
    #[must_use]
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Take the slot without waiting
    ///
    /// # Errors
    /// - `RelayError::Busy` if another request holds the slot
    pub fn try_acquire(&self) -> Result<FlightPermit, RelayError> {
        match Arc::clone(&self.slot).try_acquire_owned() {
            Ok(permit) => {
                tracing::debug!(capability = %self.capability, "flight slot acquired");
                Ok(FlightPermit {
                    capability: Arc::clone(&self.capability),
                    _permit: permit,
                })
            }
            Err(_) => {
                tracing::warn!(capability = %self.capability, "rejected: capability busy");
                Err(RelayError::busy(self.capability.as_ref()))
            }
        }
    }

    /// Run `body` while holding the slot
    ///
    /// `body` is not even constructed when the slot is taken. The slot is
    /// released when the body finishes, fails or is dropped.
    ///
    /// # Errors
    /// - `RelayError::Busy` (converted into `E`) if the slot is taken
    /// - Whatever `body` returns
    pub async fn run<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RelayError>,
    {
        let _permit = self.try_acquire()?;
        body().await
    }

    /// Acquire the slot and hold it for the whole life of `stream`
    ///
    /// # Errors
    /// - `RelayError::Busy` if the slot is taken
    pub fn guard_stream<S: Stream>(&self, stream: S) -> Result<Guarded<S>, RelayError> {
        Ok(self.try_acquire()?.guard(stream))
    }

    /// Check whether a request currently holds the slot
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

/// Proof of holding a [`SingleFlight`] slot; released on drop
#[derive(Debug)]
pub struct FlightPermit {
    capability: Arc<str>,
    _permit: OwnedSemaphorePermit,
}

impl FlightPermit {
    /// Tie this permit to `stream`: released when it ends or is dropped
    #[must_use]
    pub fn guard<S: Stream>(self, stream: S) -> Guarded<S> {
        Guarded {
            inner: Box::pin(stream),
            permit: Some(self),
        }
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        tracing::debug!(capability = %self.capability, "flight slot released");
    }
}

/// Stream that owns a [`FlightPermit`] until exhausted
///
/// The permit is dropped as soon as the inner stream yields `None`, so the
/// slot frees up even if the consumer keeps the stream around.
pub struct Guarded<S> {
    inner: Pin<Box<S>>,
    permit: Option<FlightPermit>,
}

impl<S> Guarded<S> {
    /// Check whether the permit is still held
    #[inline]
    #[must_use]
    pub fn is_holding(&self) -> bool {
        self.permit.is_some()
    }
}

impl<S: Stream> Stream for Guarded<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            this.permit = None;
        }
        polled
    }
}

impl<S> std::fmt::Debug for Guarded<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded")
            .field("holding", &self.permit.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};

    #[test]
    fn second_acquire_is_rejected() {
        let gate = SingleFlight::new("ocr");
        let first = gate.try_acquire().unwrap();
        assert!(gate.is_busy());

        let err = gate.try_acquire().unwrap_err();
        assert_eq!(err, RelayError::busy("ocr"));
        assert_eq!(err.to_string(), "ocr busy");

        drop(first);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_ok());
    }

    #[test]
    fn clones_share_the_slot() {
        let gate = SingleFlight::new("ocr");
        let other = gate.clone();
        let _permit = gate.try_acquire().unwrap();
        assert!(other.is_busy());
        assert!(other.try_acquire().is_err());
    }

    #[tokio::test]
    async fn run_releases_after_failure() {
        let gate = SingleFlight::new("ocr");
        let result: Result<(), RelayError> = gate
            .run(|| async { Err(RelayError::busy("inner")) })
            .await;
        assert!(result.is_err());
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn run_rejects_without_building_body() {
        let gate = SingleFlight::new("ocr");
        let _held = gate.try_acquire().unwrap();
        let mut built = false;
        let result: Result<(), RelayError> = gate
            .run(|| {
                built = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(RelayError::Busy { .. })));
        assert!(!built);
    }

    #[tokio::test]
    async fn guarded_stream_releases_at_end() {
        let gate = SingleFlight::new("ocr");
        let mut guarded = gate.guard_stream(stream::iter(["a", "b"])).unwrap();
        assert!(gate.is_busy());

        assert_eq!(guarded.next().await, Some("a"));
        assert!(gate.is_busy());
        assert_eq!(guarded.next().await, Some("b"));
        assert_eq!(guarded.next().await, None);
        assert!(!guarded.is_holding());
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn guarded_stream_releases_when_dropped_early() {
        let gate = SingleFlight::new("ocr");
        let mut guarded = gate.guard_stream(stream::iter(1..10)).unwrap();
        assert_eq!(guarded.next().await, Some(1));
        drop(guarded);
        assert!(!gate.is_busy());
    }
}
