//! Porfiry Relay - streamed output and single-flight admission
//!
//! Two cooperating pieces sit between a request handler and an external
//! capability (text model, OCR worker):
//! - [`relay`]: forwards upstream tokens as they arrive and turns a
//!   mid-stream failure into one inline `[ERROR]` marker
//! - [`SingleFlight`]: fail-fast gate allowing one in-flight request per
//!   capability
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use porfiry_relay::{relay_text, RelayOptions, SingleFlight};
//!
//! # async fn example(upstream: impl futures::Stream<Item = Result<String, std::io::Error>>) {
//! let gate = SingleFlight::new("ocr");
//! let chunks = relay_text(upstream, RelayOptions::default());
//! let mut guarded = gate.guard_stream(chunks).expect("idle");
//! while let Some(chunk) = guarded.next().await {
//!     print!("{chunk}");
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod guard;
pub mod relay;
pub mod session;

pub use error::RelayError;
pub use guard::{FlightPermit, Guarded, SingleFlight};
pub use relay::{relay, relay_text, RelayChunk, RelayOptions};
pub use session::{RelayPhase, StreamSession};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
