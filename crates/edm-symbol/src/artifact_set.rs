//! ArtifactSet - the mutation surface over an artifact
//!
//! Every structural edit goes through [`ArtifactSet`] so that the symbol
//! table and the reverse reference index always describe the current
//! tree. Bindings are resolved explicitly: [`ArtifactSet::set_ref_name`]
//! only records a name, [`ArtifactSet::rebind`] performs the lookup.

use crate::antidep::{AntiDependencyIndex, BindingRef};
use crate::error::SymbolError;
use crate::index::{SymbolLookup, SymbolTable};
use crate::validation::validate_identifier;
use edm_artifact::{
    Artifact, BindingSlot, BindingStatus, Element, ElementData, ElementId, ElementKind,
    ItemBinding, SymbolKey,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// A binding that is not `Known`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedBinding {
    /// Element holding the binding
    pub owner: ElementId,
    /// Kind of the owner
    pub owner_kind: ElementKind,
    /// Slot of the binding
    pub slot: BindingSlot,
    /// Name that failed to resolve
    pub ref_name: SymbolKey,
    /// `Unknown` or `Duplicate`
    pub status: BindingStatus,
}

/// Artifact plus its symbol table and reverse index
#[derive(Debug)]
pub struct ArtifactSet {
    artifact: Artifact,
    symbols: SymbolTable,
    anti_deps: AntiDependencyIndex,
    /// Bindings whose name changed since they were last resolved
    dirty: BTreeSet<BindingRef>,
}

impl ArtifactSet {
    /// Index an artifact and resolve all of its bindings
    #[must_use]
    pub fn new(artifact: Artifact) -> Self {
        let mut set = Self {
            artifact,
            symbols: SymbolTable::new(),
            anti_deps: AntiDependencyIndex::new(),
            dirty: BTreeSet::new(),
        };
        set.reindex();
        set.resolve_all();
        set
    }

    /// Read access to the model
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Lookup element, failing if absent
    ///
    /// # Errors
    /// Returns error if the element does not exist
    pub fn element(&self, id: ElementId) -> Result<&Element, SymbolError> {
        Ok(self.artifact.element(id)?)
    }

    /// Lookup a symbol
    #[must_use]
    pub fn lookup_symbol(&self, key: &SymbolKey) -> SymbolLookup {
        self.symbols.lookup(key)
    }

    /// Element uniquely declaring `key`
    #[must_use]
    pub fn find(&self, key: &SymbolKey) -> Option<ElementId> {
        self.symbols.lookup(key).unique()
    }

    /// Elements declaring symbols nested below `owner`
    #[must_use]
    pub fn members_of(&self, owner: &SymbolKey) -> Vec<ElementId> {
        self.symbols.members_of(owner)
    }

    /// Fail if anything already declares `key`
    ///
    /// # Errors
    /// Returns [`SymbolError::DuplicateSymbol`]
    pub fn ensure_unique(&self, key: &SymbolKey) -> Result<(), SymbolError> {
        if self.symbols.contains(key) {
            Err(SymbolError::DuplicateSymbol(key.clone()))
        } else {
            Ok(())
        }
    }

    /// Bindings currently resolved to `target`
    #[must_use]
    pub fn anti_dependencies(&self, target: ElementId) -> Vec<BindingRef> {
        self.anti_deps.referrers(target)
    }

    /// Owners of a kind whose bindings resolve to `target`
    #[must_use]
    pub fn anti_dependencies_of_kind(&self, target: ElementId, kind: ElementKind) -> Vec<ElementId> {
        let mut owners: Vec<ElementId> = self
            .anti_deps
            .referrers(target)
            .into_iter()
            .map(|(owner, _)| owner)
            .filter(|owner| self.artifact.get(*owner).is_some_and(|e| e.kind() == kind))
            .collect();
        owners.dedup();
        owners
    }

    /// First child of `parent` named `base`, `base1`, `base2`, ... not taken
    #[must_use]
    pub fn unique_name(&self, parent: ElementId, base: &str) -> String {
        let taken: BTreeSet<&str> = self
            .artifact
            .get(parent)
            .map(|p| {
                p.children()
                    .iter()
                    .filter_map(|c| self.artifact.get(*c).and_then(Element::name))
                    .collect()
            })
            .unwrap_or_default();
        if !taken.contains(base) {
            return base.to_string();
        }
        (1u32..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    /// Create a child element and register its symbol
    ///
    /// Duplicate symbols are allowed here (they resolve as `Duplicate`);
    /// callers that need uniqueness check with [`Self::ensure_unique`].
    ///
    /// # Errors
    /// Returns error if the name is not an identifier or the parent is missing
    pub fn add_element(
        &mut self,
        parent: ElementId,
        name: Option<&str>,
        data: ElementData,
    ) -> Result<ElementId, SymbolError> {
        if let Some(name) = name {
            validate_identifier(name)?;
        }
        let kind = data.kind();
        let id = self
            .artifact
            .insert(parent, name.map(str::to_string), data)?;
        if let Some(key) = self.artifact.symbol_of(id) {
            self.register(&key, id);
        }
        debug!(%id, %kind, name = name.unwrap_or(""), "element added");
        Ok(id)
    }

    /// Remove an element and its subtree
    ///
    /// Bindings elsewhere that resolved into the removed subtree are
    /// invalidated (status `Unknown`) and left for the caller to rebind,
    /// repoint or delete. Returns the removed elements.
    ///
    /// # Errors
    /// Returns error if the element is missing or a root
    pub fn remove_element(&mut self, id: ElementId) -> Result<Vec<Element>, SymbolError> {
        let symbols = self.subtree_symbols(id);
        let removed = self.artifact.remove_subtree(id)?;
        let members: BTreeSet<ElementId> = removed.iter().map(Element::id).collect();

        for (member, key) in &symbols {
            self.unregister(key, *member);
        }

        for element in &removed {
            for (slot, binding) in element.bindings() {
                if let Some(target) = binding.target() {
                    self.anti_deps.unlink(target, (element.id(), slot));
                }
                self.dirty.remove(&(element.id(), slot));
            }
        }
        for element in &removed {
            for (owner, slot) in self.anti_deps.take(element.id()) {
                if members.contains(&owner) {
                    continue;
                }
                if let Some(binding) = self
                    .artifact
                    .element_mut(owner)
                    .ok()
                    .and_then(|e| e.binding_mut(slot))
                {
                    binding.invalidate();
                    self.dirty.insert((owner, slot));
                }
            }
        }
        debug!(%id, count = removed.len(), "subtree removed");
        Ok(removed)
    }

    /// Re-parent an element
    ///
    /// Symbols of the moved subtree are re-registered and every binding
    /// that resolved into it is repointed at the new names.
    ///
    /// # Errors
    /// Returns error if the move is not structurally valid
    pub fn move_element(&mut self, id: ElementId, new_parent: ElementId) -> Result<(), SymbolError> {
        let before = self.subtree_symbols(id);
        self.artifact.set_parent(id, new_parent)?;
        self.reregister(&before);
        debug!(%id, parent = %new_parent, "element moved");
        Ok(())
    }

    /// Rename an element
    ///
    /// Symbols of the element and its members are re-registered, and every
    /// binding that resolved to any of them is repointed and rebound.
    ///
    /// # Errors
    /// Returns error if the name is not a valid identifier
    pub fn rename(&mut self, id: ElementId, new_name: &str) -> Result<(), SymbolError> {
        validate_identifier(new_name)?;
        let before = self.subtree_symbols(id);
        self.artifact
            .element_mut(id)?
            .set_name(Some(new_name.to_string()));
        self.reregister(&before);
        debug!(%id, name = new_name, "element renamed");
        Ok(())
    }

    fn subtree_symbols(&self, id: ElementId) -> BTreeMap<ElementId, SymbolKey> {
        self.artifact
            .subtree(id)
            .into_iter()
            .filter_map(|member| self.artifact.symbol_of(member).map(|k| (member, k)))
            .collect()
    }

    fn reregister(&mut self, before: &BTreeMap<ElementId, SymbolKey>) {
        for (member, old_key) in before {
            let new_key = self.artifact.symbol_of(*member);
            if new_key.as_ref() == Some(old_key) {
                continue;
            }
            self.unregister(old_key, *member);
            let Some(new_key) = new_key else {
                continue;
            };
            self.register(&new_key, *member);

            for (owner, slot) in self.anti_deps.referrers(*member) {
                if let Some(binding) = self
                    .artifact
                    .element_mut(owner)
                    .ok()
                    .and_then(|e| e.binding_mut(slot))
                {
                    binding.set_ref_name(new_key.clone());
                }
                self.anti_deps.unlink(*member, (owner, slot));
                self.rebind_unchecked(owner, slot);
            }
        }
    }

    fn register(&mut self, key: &SymbolKey, id: ElementId) {
        let count = self.symbols.insert(key, id);
        if count > 1 {
            // existing referrers are now ambiguous
            self.mark_referrers_dirty(key);
        } else {
            self.mark_unresolved_dirty(key);
        }
    }

    fn unregister(&mut self, key: &SymbolKey, id: ElementId) {
        self.symbols.remove(key, id);
        // a duplicate may have become unique
        self.mark_unresolved_dirty(key);
    }

    fn mark_referrers_dirty(&mut self, key: &SymbolKey) {
        if let SymbolLookup::Ambiguous(ids) = self.symbols.lookup(key) {
            for id in ids {
                self.dirty.extend(self.anti_deps.referrers(id));
            }
        }
    }

    fn mark_unresolved_dirty(&mut self, key: &SymbolKey) {
        let pending: Vec<BindingRef> = self
            .artifact
            .elements()
            .flat_map(|e| {
                e.bindings()
                    .filter(|(_, b)| !b.is_known() && b.ref_name() == key)
                    .map(move |(slot, _)| (e.id(), slot))
            })
            .collect();
        self.dirty.extend(pending);
    }

    /// Set the symbolic name of a binding without resolving it
    ///
    /// Creates the binding if the slot was empty. The binding becomes
    /// `Unknown` and is queued for [`Self::resolve_dirty`].
    ///
    /// # Errors
    /// Returns error if the owner is missing
    pub fn set_ref_name(
        &mut self,
        owner: ElementId,
        slot: BindingSlot,
        key: SymbolKey,
    ) -> Result<(), SymbolError> {
        let element = self.artifact.element_mut(owner)?;
        let old_target = match element.binding_mut(slot) {
            Some(binding) => {
                let old = binding.target();
                binding.set_ref_name(key);
                old
            }
            None => {
                element.set_binding(slot, ItemBinding::new(key));
                None
            }
        };
        if let Some(old) = old_target {
            self.anti_deps.unlink(old, (owner, slot));
        }
        self.dirty.insert((owner, slot));
        Ok(())
    }

    /// Resolve a binding against the symbol table
    ///
    /// # Errors
    /// Returns error if the owner or binding is missing
    pub fn rebind(&mut self, owner: ElementId, slot: BindingSlot) -> Result<BindingStatus, SymbolError> {
        if self.artifact.element(owner)?.binding(slot).is_none() {
            return Err(SymbolError::MissingBinding { owner, slot });
        }
        Ok(self.rebind_unchecked(owner, slot))
    }

    fn rebind_unchecked(&mut self, owner: ElementId, slot: BindingSlot) -> BindingStatus {
        self.dirty.remove(&(owner, slot));
        let Some(binding) = self.artifact.get(owner).and_then(|e| e.binding(slot)) else {
            return BindingStatus::Unknown;
        };
        let key = binding.ref_name().clone();
        let old_target = binding.target();
        let lookup = self.symbols.lookup(&key);

        if let Some(old) = old_target {
            self.anti_deps.unlink(old, (owner, slot));
        }
        let Some(binding) = self
            .artifact
            .element_mut(owner)
            .ok()
            .and_then(|e| e.binding_mut(slot))
        else {
            return BindingStatus::Unknown;
        };
        match lookup {
            SymbolLookup::Unique(target) => {
                binding.resolve_to(target);
                self.anti_deps.link(target, (owner, slot));
            }
            SymbolLookup::Ambiguous(_) => binding.mark_duplicate(),
            SymbolLookup::Missing => binding.invalidate(),
        }
        let status = binding.status();
        trace!(%owner, %slot, %key, ?status, "rebind");
        status
    }

    /// Point a binding at a concrete element by its symbol, and resolve it
    ///
    /// # Errors
    /// Returns error if either element is missing or the target has no symbol
    pub fn bind_to(
        &mut self,
        owner: ElementId,
        slot: BindingSlot,
        target: ElementId,
    ) -> Result<BindingStatus, SymbolError> {
        self.artifact.element(target)?;
        let key = self
            .artifact
            .symbol_of(target)
            .ok_or(SymbolError::NoSymbol(target))?;
        self.set_ref_name(owner, slot, key)?;
        self.rebind(owner, slot)
    }

    /// Drop a binding
    ///
    /// # Errors
    /// Returns error if the owner is missing
    pub fn clear_binding(&mut self, owner: ElementId, slot: BindingSlot) -> Result<(), SymbolError> {
        if let Some(binding) = self.artifact.element_mut(owner)?.remove_binding(slot) {
            if let Some(target) = binding.target() {
                self.anti_deps.unlink(target, (owner, slot));
            }
        }
        self.dirty.remove(&(owner, slot));
        Ok(())
    }

    /// Resolve every binding queued since the last call
    ///
    /// Returns the number of bindings processed.
    pub fn resolve_dirty(&mut self) -> usize {
        let pending = std::mem::take(&mut self.dirty);
        let count = pending.len();
        for (owner, slot) in pending {
            self.rebind_unchecked(owner, slot);
        }
        count
    }

    /// Rebind every binding in an element's subtree
    ///
    /// Resolving one element's references is only meaningful once the whole
    /// subtree exists, so commands call this after building one.
    pub fn normalize_and_resolve(&mut self, id: ElementId) {
        for member in self.artifact.subtree(id) {
            let slots: Vec<BindingSlot> = self
                .artifact
                .get(member)
                .map(|e| e.bindings().map(|(slot, _)| slot).collect())
                .unwrap_or_default();
            for slot in slots {
                self.rebind_unchecked(member, slot);
            }
        }
    }

    /// Rebind every binding that is not `Known`
    pub fn resolve_all(&mut self) {
        let pending: Vec<BindingRef> = self
            .artifact
            .elements()
            .flat_map(|e| {
                e.bindings()
                    .filter(|(_, b)| !b.is_known())
                    .map(move |(slot, _)| (e.id(), slot))
            })
            .collect();
        for (owner, slot) in pending {
            self.rebind_unchecked(owner, slot);
        }
        self.dirty.clear();
    }

    /// Bindings anywhere in the model that are not `Known`
    #[must_use]
    pub fn unresolved_bindings(&self) -> Vec<UnresolvedBinding> {
        self.artifact
            .elements()
            .flat_map(|e| {
                e.bindings()
                    .filter(|(_, b)| !b.is_known())
                    .map(move |(slot, b)| UnresolvedBinding {
                        owner: e.id(),
                        owner_kind: e.kind(),
                        slot,
                        ref_name: b.ref_name().clone(),
                        status: b.status(),
                    })
            })
            .collect()
    }

    /// Edit an element's payload in place
    ///
    /// # Errors
    /// Returns error if the element is missing or the edit changes its kind
    /// (the edit is reverted in that case)
    pub fn update_data<F>(&mut self, id: ElementId, edit: F) -> Result<(), SymbolError>
    where
        F: FnOnce(&mut ElementData),
    {
        let element = self.artifact.element_mut(id)?;
        let original = element.data().clone();
        edit(element.data_mut());
        let (from, to) = (original.kind(), element.kind());
        if from != to {
            *element.data_mut() = original;
            return Err(SymbolError::KindChanged { id, from, to });
        }
        Ok(())
    }

    /// Cheap copy of the current model
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Artifact {
        self.artifact.clone()
    }

    /// Replace the model with a snapshot and rebuild the indexes
    pub fn restore(&mut self, snapshot: Artifact) {
        self.artifact = snapshot;
        self.reindex();
        debug!(elements = self.artifact.len(), "artifact restored from snapshot");
    }

    /// Rebuild the symbol table and reverse index from the tree
    ///
    /// Cached binding targets are trusted; call [`Self::resolve_all`] to
    /// re-check them.
    pub fn reindex(&mut self) {
        self.symbols.clear();
        self.anti_deps.clear();
        self.dirty.clear();
        for element in self.artifact.elements() {
            if let Some(key) = self.artifact.symbol_of(element.id()) {
                self.symbols.insert(&key, element.id());
            }
            for (slot, binding) in element.bindings() {
                if let Some(target) = binding.target() {
                    self.anti_deps.link(target, (element.id(), slot));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edm_artifact::{ModelSpace, PropertyFacets};

    fn set_with_customer() -> (ArtifactSet, ElementId, ElementId) {
        let mut set = ArtifactSet::new(Artifact::new("Model").unwrap());
        let schema = set.artifact().schema(ModelSpace::Conceptual);
        let customer = set
            .add_element(schema, Some("Customer"), ElementData::EntityType { is_abstract: false })
            .unwrap();
        let id = set
            .add_element(customer, Some("Id"), ElementData::Property(PropertyFacets::primitive("Int32").with_key()))
            .unwrap();
        (set, customer, id)
    }

    #[test]
    fn new_resolves_container_mapping() {
        let set = ArtifactSet::new(Artifact::new("Model").unwrap());
        assert!(set.unresolved_bindings().is_empty());
    }

    #[test]
    fn set_ref_name_defers_resolution() {
        let (mut set, customer, _) = set_with_customer();
        let container = set.artifact().container(ModelSpace::Conceptual);
        let es = set
            .add_element(container, Some("Customers"), ElementData::EntitySet { is_view: false })
            .unwrap();
        let key = set.artifact().symbol_of(customer).unwrap();
        set.set_ref_name(es, BindingSlot::Type, key).unwrap();

        let binding = set.element(es).unwrap().binding(BindingSlot::Type).unwrap();
        assert_eq!(binding.status(), BindingStatus::Unknown);

        assert_eq!(set.resolve_dirty(), 1);
        assert_eq!(set.element(es).unwrap().binding_target(BindingSlot::Type), Some(customer));
        assert_eq!(set.anti_dependencies(customer), vec![(es, BindingSlot::Type)]);
    }

    #[test]
    fn forward_reference_resolves_when_symbol_appears() {
        let mut set = ArtifactSet::new(Artifact::new("Model").unwrap());
        let schema = set.artifact().schema(ModelSpace::Conceptual);
        let container = set.artifact().container(ModelSpace::Conceptual);
        let es = set
            .add_element(container, Some("Orders"), ElementData::EntitySet { is_view: false })
            .unwrap();
        let key = SymbolKey::parse(ModelSpace::Conceptual, "Model.Order").unwrap();
        set.set_ref_name(es, BindingSlot::Type, key).unwrap();
        set.resolve_dirty();
        assert_eq!(set.unresolved_bindings().len(), 1);

        let order = set
            .add_element(schema, Some("Order"), ElementData::EntityType { is_abstract: false })
            .unwrap();
        set.resolve_dirty();
        assert_eq!(set.element(es).unwrap().binding_target(BindingSlot::Type), Some(order));
    }

    #[test]
    fn duplicate_declaration_marks_binding_duplicate() {
        let (mut set, customer, _) = set_with_customer();
        let container = set.artifact().container(ModelSpace::Conceptual);
        let es = set
            .add_element(container, Some("Customers"), ElementData::EntitySet { is_view: false })
            .unwrap();
        set.bind_to(es, BindingSlot::Type, customer).unwrap();

        let schema = set.artifact().schema(ModelSpace::Conceptual);
        set.add_element(schema, Some("Customer"), ElementData::ComplexType)
            .unwrap();
        set.resolve_dirty();
        let binding = set.element(es).unwrap().binding(BindingSlot::Type).unwrap();
        assert_eq!(binding.status(), BindingStatus::Duplicate);
        assert!(set.anti_dependencies(customer).is_empty());
    }

    #[test]
    fn rename_repoints_member_references() {
        let (mut set, customer, id) = set_with_customer();
        let container = set.artifact().container(ModelSpace::Conceptual);
        let es = set
            .add_element(container, Some("Customers"), ElementData::EntitySet { is_view: false })
            .unwrap();
        set.bind_to(es, BindingSlot::Type, customer).unwrap();
        let mapping_root = set.artifact().schema(ModelSpace::Mapping);
        let sp = set
            .add_element(mapping_root, None, ElementData::ScalarProperty)
            .unwrap();
        set.bind_to(sp, BindingSlot::Property, id).unwrap();

        set.rename(customer, "Client").unwrap();

        let es_binding = set.element(es).unwrap().binding(BindingSlot::Type).unwrap();
        assert_eq!(es_binding.ref_name().to_string(), "c:Model.Client");
        assert_eq!(es_binding.target(), Some(customer));
        let sp_binding = set.element(sp).unwrap().binding(BindingSlot::Property).unwrap();
        assert_eq!(sp_binding.ref_name().to_string(), "c:Model.Client.Id");
        assert_eq!(sp_binding.target(), Some(id));
        assert!(set.unresolved_bindings().is_empty());
    }

    #[test]
    fn remove_invalidates_outside_referrers() {
        let (mut set, customer, _) = set_with_customer();
        let container = set.artifact().container(ModelSpace::Conceptual);
        let es = set
            .add_element(container, Some("Customers"), ElementData::EntitySet { is_view: false })
            .unwrap();
        set.bind_to(es, BindingSlot::Type, customer).unwrap();

        set.remove_element(customer).unwrap();

        let binding = set.element(es).unwrap().binding(BindingSlot::Type).unwrap();
        assert_eq!(binding.status(), BindingStatus::Unknown);
        assert_eq!(set.unresolved_bindings().len(), 1);
        assert!(set.find(&SymbolKey::parse(ModelSpace::Conceptual, "Model.Customer.Id").unwrap()).is_none());
    }

    #[test]
    fn restore_rebuilds_indexes() {
        let (mut set, customer, _) = set_with_customer();
        let snapshot = set.snapshot();
        set.rename(customer, "Client").unwrap();
        set.restore(snapshot);

        let key = SymbolKey::parse(ModelSpace::Conceptual, "Model.Customer").unwrap();
        assert_eq!(set.find(&key), Some(customer));
        let renamed = SymbolKey::parse(ModelSpace::Conceptual, "Model.Client").unwrap();
        assert!(set.find(&renamed).is_none());
    }

    #[test]
    fn unique_name_appends_counter() {
        let (set, _, _) = set_with_customer();
        let schema = set.artifact().schema(ModelSpace::Conceptual);
        assert_eq!(set.unique_name(schema, "Customer"), "Customer1");
        assert_eq!(set.unique_name(schema, "Order"), "Order");
    }

    #[test]
    fn update_data_rejects_kind_change() {
        let (mut set, customer, _) = set_with_customer();
        let err = set
            .update_data(customer, |data| *data = ElementData::ComplexType)
            .unwrap_err();
        assert!(matches!(err, SymbolError::KindChanged { .. }));
        assert_eq!(set.element(customer).unwrap().kind(), ElementKind::EntityType);
    }
}
