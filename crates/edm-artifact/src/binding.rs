//! ItemBinding - deferred symbolic references
//!
//! An [`ItemBinding`] names its target by [`SymbolKey`] and caches the
//! resolved [`ElementId`]. Resolution itself is done by the symbol layer.

use crate::id::ElementId;
use crate::name::SymbolKey;
use serde::{Deserialize, Serialize};

/// Resolution state of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BindingStatus {
    /// Not resolved, or nothing matched the name
    #[default]
    Unknown,

    /// More than one element matched the name
    Duplicate,

    /// Exactly one element matched; the target can be trusted
    Known,
}

/// Symbolic reference from one element to another
///
/// # Invariants
/// - `target.is_some()` if and only if `status == Known`
/// - changing the name always invalidates the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBinding {
    ref_name: SymbolKey,
    target: Option<ElementId>,
    status: BindingStatus,
}

impl ItemBinding {
    /// Create unresolved binding
    #[inline]
    #[must_use]
    pub fn new(ref_name: SymbolKey) -> Self {
        Self {
            ref_name,
            target: None,
            status: BindingStatus::Unknown,
        }
    }

    /// Symbolic name
    #[inline]
    #[must_use]
    pub fn ref_name(&self) -> &SymbolKey {
        &self.ref_name
    }

    /// Resolved target (only when `Known`)
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<ElementId> {
        self.target
    }

    /// Resolution status
    #[inline]
    #[must_use]
    pub fn status(&self) -> BindingStatus {
        self.status
    }

    /// Check if binding is resolved
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.status == BindingStatus::Known
    }

    /// Set the symbolic name without resolving it
    pub fn set_ref_name(&mut self, ref_name: SymbolKey) {
        self.ref_name = ref_name;
        self.invalidate();
    }

    /// Record a unique match
    pub fn resolve_to(&mut self, target: ElementId) {
        self.target = Some(target);
        self.status = BindingStatus::Known;
    }

    /// Record an ambiguous match
    pub fn mark_duplicate(&mut self) {
        self.target = None;
        self.status = BindingStatus::Duplicate;
    }

    /// Forget the cached target
    pub fn invalidate(&mut self) {
        self.target = None;
        self.status = BindingStatus::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ModelSpace;

    fn key(name: &str) -> SymbolKey {
        SymbolKey::parse(ModelSpace::Conceptual, name).unwrap()
    }

    #[test]
    fn binding_starts_unknown() {
        let binding = ItemBinding::new(key("Model.Customer"));
        assert_eq!(binding.status(), BindingStatus::Unknown);
        assert!(binding.target().is_none());
    }

    #[test]
    fn binding_resolve_sets_known() {
        let mut binding = ItemBinding::new(key("Model.Customer"));
        binding.resolve_to(ElementId::new(7));
        assert!(binding.is_known());
        assert_eq!(binding.target(), Some(ElementId::new(7)));
    }

    #[test]
    fn binding_set_ref_name_invalidates_target() {
        let mut binding = ItemBinding::new(key("Model.Customer"));
        binding.resolve_to(ElementId::new(7));
        binding.set_ref_name(key("Model.Client"));
        assert_eq!(binding.status(), BindingStatus::Unknown);
        assert!(binding.target().is_none());
        assert_eq!(binding.ref_name(), &key("Model.Client"));
    }

    #[test]
    fn binding_duplicate_has_no_target() {
        let mut binding = ItemBinding::new(key("Model.Customer"));
        binding.resolve_to(ElementId::new(1));
        binding.mark_duplicate();
        assert_eq!(binding.status(), BindingStatus::Duplicate);
        assert!(binding.target().is_none());
    }
}
