//! Reference mapping value object
//!
//! Pairs the `display name -> target` lookup with the registry order it was
//! built from. It is a view, rebuilt before every resolution pass.

use std::collections::HashMap;

/// Display name -> target, plus registry order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMapping {
    targets: HashMap<String, String>,
    order: Vec<String>,
}

impl ReferenceMapping {
    /// Create empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(display name, target)` pairs given in registry order
    #[must_use]
    pub fn from_pairs<I, N, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let mut mapping = Self::new();
        for (name, target) in pairs {
            mapping.push(name, target);
        }
        mapping
    }

    /// Build from an explicit order and a target lookup
    ///
    /// Names in `order` without a target stay in the order (so numbered
    /// mentions keep their positions) but are never used as a target.
    #[must_use]
    pub fn with_order<I, S>(order: I, targets: HashMap<String, String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets,
            order: order.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a name at the end of the order with its target
    pub fn push(&mut self, name: impl Into<String>, target: impl Into<String>) {
        let name = name.into();
        self.targets.insert(name.clone(), target.into());
        self.order.push(name);
    }

    /// Target for an exact display name
    #[inline]
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&str> {
        self.targets.get(name).map(String::as_str)
    }

    /// Target for the 1-based position in the order
    #[must_use]
    pub fn target_at(&self, position: usize) -> Option<&str> {
        let name = self.order.get(position.checked_sub(1)?)?;
        self.target(name)
    }

    /// Display names in registry order
    #[inline]
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Check whether `value` is already one of the resolved targets
    #[must_use]
    pub fn is_target(&self, value: &str) -> bool {
        self.targets.values().any(|t| t == value)
    }

    /// Fresh fallback iterator: targets in registry order, consumed once
    pub fn fallback(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().filter_map(|name| self.target(name))
    }

    /// Number of names in the order
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if mapping is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_at_is_one_based() {
        let mapping = ReferenceMapping::from_pairs([("a.png", "A"), ("b.png", "B")]);
        assert_eq!(mapping.target_at(1), Some("A"));
        assert_eq!(mapping.target_at(2), Some("B"));
        assert_eq!(mapping.target_at(0), None);
        assert_eq!(mapping.target_at(3), None);
    }

    #[test]
    fn fallback_skips_names_without_target() {
        let mut targets = HashMap::new();
        targets.insert("b.png".to_string(), "B".to_string());
        let mapping = ReferenceMapping::with_order(["a.png", "b.png"], targets);

        assert_eq!(mapping.fallback().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(mapping.target_at(1), None);
        assert_eq!(mapping.target_at(2), Some("B"));
    }

    #[test]
    fn is_target_checks_values() {
        let mapping = ReferenceMapping::from_pairs([("a.png", "data:image/png;base64,AA")]);
        assert!(mapping.is_target("data:image/png;base64,AA"));
        assert!(!mapping.is_target("a.png"));
    }
}
