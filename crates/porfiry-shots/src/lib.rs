//! Porfiry Shots - ordered screenshot registry
//!
//! Owns the ordered sequence of screenshots attached to a report and the
//! positional display names the rest of the pipeline refers to them by:
//! - `screenshot1.png`, `screenshot2.jpg`, ... assigned from position
//! - duplicate uploads (same original filename) collapse onto one record
//! - every structural change is followed by a renumber pass whose
//!   [`RenameMap`] lets callers rewrite text that used the old names
//!
//! # Example
//!
//! ```rust
//! use porfiry_shots::ScreenshotRegistry;
//!
//! let mut registry = ScreenshotRegistry::new();
//! registry.add("/tmp/0af3.png", "login.png");
//! registry.add("/tmp/91c2.PNG", "admin.png");
//! assert_eq!(registry.current_order(), vec!["screenshot1.png", "screenshot2.png"]);
//!
//! let renames = registry
//!     .reorder(&["screenshot2.png", "screenshot1.png"])
//!     .unwrap();
//! assert_eq!(renames.get("screenshot1.png").map(String::as_str), Some("screenshot2.png"));
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod error;
pub mod registry;
pub mod types;

pub use error::RegistryError;
pub use registry::{RenameMap, ScreenshotRegistry};
pub use types::{display_name_for, extension_of, ScreenshotRecord, ShotId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
