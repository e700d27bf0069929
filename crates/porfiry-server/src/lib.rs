//! Porfiry Server - HTTP service and command line
//!
//! Exposes report assembly over HTTP:
//! - Model generation, whole or streamed
//! - Saved report storage
//! - The single-flight OCR worker, with server-sent event streaming

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod api;
pub mod cli;
pub mod reply;
pub mod state;

pub use api::routes;
pub use state::AppState;
