//! Screenshot record types
//!
//! A record is identified by a [`ShotId`] that never changes, while its
//! display name follows its position in the registry.

use serde::{Deserialize, Serialize};
use std::path::Path;
use ulid::Ulid;

/// Stable screenshot identity (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShotId(pub Ulid);

impl ShotId {
    /// Generate new screenshot ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ShotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attached screenshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    /// Stable identity
    pub id: ShotId,
    /// Positional name (`screenshot<N><ext>`), empty until the first renumber
    pub display_name: String,
    /// Where the image bytes live
    pub source_path: String,
    /// Filename as uploaded, used for duplicate detection
    pub original_filename: String,
}

impl ScreenshotRecord {
    pub(crate) fn new(source_path: String, original_filename: String) -> Self {
        Self {
            id: ShotId::new(),
            display_name: String::new(),
            source_path,
            original_filename,
        }
    }

    /// Lower-cased extension of the source path, dot included
    #[inline]
    #[must_use]
    pub fn extension(&self) -> String {
        extension_of(&self.source_path)
    }
}

/// Lower-cased extension of `path` including the leading dot, or empty
#[must_use]
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Display name for the 1-based `position` with extension `ext`
#[inline]
#[must_use]
pub fn display_name_for(position: usize, ext: &str) -> String {
    format!("screenshot{position}{ext}")
}
