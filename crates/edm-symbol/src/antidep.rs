//! Reverse reference index
//!
//! Tracks, for every element, the `(owner, slot)` pairs whose binding
//! currently resolves to it. [`crate::ArtifactSet`] keeps it in step with
//! every bind, unbind and removal, so commands never walk the model to
//! discover who points at an element.

use edm_artifact::{BindingSlot, ElementId};
use std::collections::{BTreeMap, BTreeSet};

/// A binding identified by its owner and slot
pub type BindingRef = (ElementId, BindingSlot);

/// target -> referencing bindings
#[derive(Debug, Clone, Default)]
pub struct AntiDependencyIndex {
    by_target: BTreeMap<ElementId, BTreeSet<BindingRef>>,
}

impl AntiDependencyIndex {
    /// Create empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `binding` resolves to `target`
    pub fn link(&mut self, target: ElementId, binding: BindingRef) {
        self.by_target.entry(target).or_default().insert(binding);
    }

    /// Forget that `binding` resolves to `target`
    pub fn unlink(&mut self, target: ElementId, binding: BindingRef) {
        if let Some(set) = self.by_target.get_mut(&target) {
            set.remove(&binding);
            if set.is_empty() {
                self.by_target.remove(&target);
            }
        }
    }

    /// Remove and return every reference to `target`
    pub fn take(&mut self, target: ElementId) -> BTreeSet<BindingRef> {
        self.by_target.remove(&target).unwrap_or_default()
    }

    /// Bindings resolving to `target`, ordered by owner id then slot
    #[must_use]
    pub fn referrers(&self, target: ElementId) -> Vec<BindingRef> {
        self.by_target
            .get(&target)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of targets with at least one referrer
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    /// Check if no reference is recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.by_target.clear();
    }
}
