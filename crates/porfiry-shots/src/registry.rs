//! Ordered screenshot registry
//!
//! The registry is the only writer of display names. Every structural
//! change (add, remove, reorder) ends with a renumber pass, so no caller
//! can observe a record whose name disagrees with its position.

use crate::error::RegistryError;
use crate::types::{display_name_for, ScreenshotRecord, ShotId};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Old display name -> new display name, in registry order
///
/// Only names that actually changed are present. Records that had no name
/// yet (freshly added) never appear.
pub type RenameMap = IndexMap<String, String>;

/// Ordered collection of screenshots
#[derive(Debug, Clone, Default)]
pub struct ScreenshotRegistry {
    records: Vec<ScreenshotRecord>,
}

impl ScreenshotRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a screenshot
    ///
    /// Uploading the same original filename twice is a no-op that returns
    /// the identity of the record already present.
    pub fn add(
        &mut self,
        source_path: impl Into<String>,
        original_filename: impl Into<String>,
    ) -> ShotId {
        let original_filename = original_filename.into();
        if let Some(existing) = self
            .records
            .iter()
            .find(|r| r.original_filename == original_filename)
        {
            tracing::debug!(
                original = %original_filename,
                name = %existing.display_name,
                "duplicate screenshot ignored"
            );
            return existing.id;
        }

        let record = ScreenshotRecord::new(source_path.into(), original_filename);
        let id = record.id;
        self.records.push(record);

        // Appending never shifts existing positions, so the map is empty.
        let renames = self.renumber();
        debug_assert!(renames.is_empty());
        id
    }

    /// Remove a screenshot and close the gap it leaves
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if no record has `id`
    pub fn remove(&mut self, id: ShotId) -> Result<RenameMap, RegistryError> {
        let idx = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let removed = self.records.remove(idx);
        tracing::debug!(name = %removed.display_name, "screenshot removed");
        Ok(self.renumber())
    }

    /// Rearrange records to follow `new_order` (a sequence of display names)
    ///
    /// # Errors
    /// - `RegistryError::InvalidOrder` unless `new_order` is a permutation of
    ///   [`current_order`](Self::current_order)
    pub fn reorder<S: AsRef<str>>(&mut self, new_order: &[S]) -> Result<RenameMap, RegistryError> {
        if new_order.len() != self.records.len() {
            return Err(RegistryError::invalid_order(format!(
                "got {} names, registry holds {}",
                new_order.len(),
                self.records.len()
            )));
        }

        let mut seen = HashSet::with_capacity(new_order.len());
        let mut positions = Vec::with_capacity(new_order.len());
        for name in new_order {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(RegistryError::invalid_order(format!("duplicate name '{name}'")));
            }
            let idx = self
                .records
                .iter()
                .position(|r| r.display_name == name)
                .ok_or_else(|| RegistryError::invalid_order(format!("unknown name '{name}'")))?;
            positions.push(idx);
        }

        let mut old = std::mem::take(&mut self.records).into_iter().map(Some).collect::<Vec<_>>();
        self.records = positions
            .into_iter()
            .filter_map(|idx| old[idx].take())
            .collect();

        Ok(self.renumber())
    }

    /// Recompute every display name from position and extension
    ///
    /// Idempotent: a second call without an intervening change returns an
    /// empty map.
    pub fn renumber(&mut self) -> RenameMap {
        let mut renames = RenameMap::new();
        for (idx, record) in self.records.iter_mut().enumerate() {
            let new_name = display_name_for(idx + 1, &record.extension());
            if record.display_name != new_name {
                if !record.display_name.is_empty() {
                    renames.insert(record.display_name.clone(), new_name.clone());
                }
                record.display_name = new_name;
            }
        }
        if !renames.is_empty() {
            tracing::debug!(count = renames.len(), "screenshots renumbered");
        }
        renames
    }

    /// Display names in registry order
    #[must_use]
    pub fn current_order(&self) -> Vec<String> {
        self.records.iter().map(|r| r.display_name.clone()).collect()
    }

    /// Records in registry order
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[ScreenshotRecord] {
        &self.records
    }

    /// Look up a record by identity
    #[must_use]
    pub fn get(&self, id: ShotId) -> Option<&ScreenshotRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Look up a record by its current display name
    #[must_use]
    pub fn by_name(&self, display_name: &str) -> Option<&ScreenshotRecord> {
        self.records.iter().find(|r| r.display_name == display_name)
    }

    /// Number of screenshots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry_with(paths: &[(&str, &str)]) -> ScreenshotRegistry {
        let mut registry = ScreenshotRegistry::new();
        for (path, orig) in paths {
            registry.add(*path, *orig);
        }
        registry
    }

    #[test]
    fn add_assigns_positional_names() {
        let registry = registry_with(&[("/t/1.PNG", "a.png"), ("/t/2.jpg", "b.jpg")]);
        assert_eq!(registry.current_order(), vec!["screenshot1.png", "screenshot2.jpg"]);
    }

    #[test]
    fn add_duplicate_returns_existing_identity() {
        let mut registry = ScreenshotRegistry::new();
        let first = registry.add("/t/1.png", "a.png");
        let again = registry.add("/t/other.png", "a.png");
        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.records()[0].source_path, "/t/1.png");
    }

    #[test]
    fn renumber_is_idempotent() {
        let mut registry = registry_with(&[("/t/1.png", "a.png"), ("/t/2.png", "b.png")]);
        registry.reorder(&["screenshot2.png", "screenshot1.png"]).unwrap();
        assert!(registry.renumber().is_empty());
        assert!(registry.renumber().is_empty());
    }

    #[test]
    fn reorder_swaps_names_and_reports_both() {
        let mut registry = registry_with(&[("/t/a.png", "a.png"), ("/t/b.png", "b.png")]);
        let a = registry.by_name("screenshot1.png").unwrap().id;

        let renames = registry.reorder(&["screenshot2.png", "screenshot1.png"]).unwrap();

        assert_eq!(renames.len(), 2);
        assert_eq!(renames["screenshot1.png"], "screenshot2.png");
        assert_eq!(renames["screenshot2.png"], "screenshot1.png");
        assert_eq!(registry.by_name("screenshot2.png").unwrap().id, a);
    }

    #[test]
    fn reorder_identity_is_empty_rename() {
        let mut registry = registry_with(&[("/t/a.png", "a.png"), ("/t/b.png", "b.png")]);
        let renames = registry.reorder(&["screenshot1.png", "screenshot2.png"]).unwrap();
        assert!(renames.is_empty());
    }

    #[test]
    fn reorder_rejects_non_permutations() {
        let mut registry = registry_with(&[("/t/a.png", "a.png"), ("/t/b.png", "b.png")]);

        let short = registry.reorder(&["screenshot1.png"]);
        assert!(matches!(short, Err(RegistryError::InvalidOrder { .. })));

        let dup = registry.reorder(&["screenshot1.png", "screenshot1.png"]);
        assert!(matches!(dup, Err(RegistryError::InvalidOrder { .. })));

        let unknown = registry.reorder(&["screenshot1.png", "screenshot9.png"]);
        assert!(matches!(unknown, Err(RegistryError::InvalidOrder { .. })));

        // Failed reorders leave the registry untouched
        assert_eq!(registry.current_order(), vec!["screenshot1.png", "screenshot2.png"]);
    }

    #[test]
    fn remove_closes_gap() {
        let mut registry = registry_with(&[
            ("/t/a.png", "a.png"),
            ("/t/b.jpg", "b.jpg"),
            ("/t/c.png", "c.png"),
        ]);
        let b = registry.by_name("screenshot2.jpg").unwrap().id;

        let renames = registry.remove(b).unwrap();

        assert_eq!(registry.current_order(), vec!["screenshot1.png", "screenshot2.png"]);
        assert_eq!(renames.len(), 1);
        assert_eq!(renames["screenshot3.png"], "screenshot2.png");
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let mut registry = ScreenshotRegistry::new();
        assert!(matches!(
            registry.remove(ShotId::new()),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn extension_change_across_positions() {
        let mut registry = registry_with(&[("/t/a.png", "a.png"), ("/t/b.jpg", "b.jpg")]);
        let renames = registry.reorder(&["screenshot2.jpg", "screenshot1.png"]).unwrap();
        assert_eq!(registry.current_order(), vec!["screenshot1.jpg", "screenshot2.png"]);
        assert_eq!(renames["screenshot2.jpg"], "screenshot1.jpg");
        assert_eq!(renames["screenshot1.png"], "screenshot2.png");
    }
}
