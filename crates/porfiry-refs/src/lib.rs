//! Porfiry Refs - screenshot reference resolution
//!
//! Rewrites Markdown produced by the model (or typed by an analyst) so every
//! mention of a screenshot points at its final target:
//! - **Inline links** `![alt](screenshot1.png)`
//! - **Wiki links** `![[screenshot1.png]]`
//! - **Numbered mentions** `Screenshot 2: login form`
//!
//! # Architecture
//!
//! ```text
//! text ──scan──▶ [Reference{InlineLink | WikiLink | NumberedMention}]
//!                        │
//!   ReferenceMapping ────┤ (name → target, registry order, fallback targets)
//!                        ▼
//!                   resolve ──▶ text'
//! ```
//!
//! Resolution is a pure function of the text and an explicit
//! [`ReferenceMapping`]; nothing is read from shared state.
//!
//! # Example
//!
//! ```rust
//! use porfiry_refs::{resolve, ReferenceMapping};
//!
//! let mapping = ReferenceMapping::from_pairs([
//!     ("screenshot1.png", "https://cdn/1.png"),
//!     ("screenshot2.png", "https://cdn/2.png"),
//! ]);
//! let out = resolve("![login](screenshot2.png)", &mapping);
//! assert_eq!(out, "![login](https://cdn/2.png)");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod mapping;
pub mod rename;
pub mod resolve;
pub mod scan;
pub mod tidy;

pub use error::ResolveError;
pub use mapping::ReferenceMapping;
pub use rename::propagate_rename;
pub use resolve::{resolve, resolve_with};
pub use scan::{scan, MentionSyntax, Reference, ReferenceKind};
pub use tidy::{strip_embedded_images, tidy_linebreaks};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
