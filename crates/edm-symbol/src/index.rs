//! Symbol table with radix tree
//!
//! Provides [`SymbolTable`], mapping normalized [`SymbolKey`]s to the
//! elements that declare them, using radix_trie for exact and
//! member-prefix lookups.

use edm_artifact::{ElementId, SymbolKey};
use radix_trie::{Trie, TrieCommon};

/// Outcome of a symbol lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolLookup {
    /// Exactly one element declares the symbol
    Unique(ElementId),

    /// Several elements declare the symbol
    Ambiguous(Vec<ElementId>),

    /// Nothing declares the symbol
    Missing,
}

impl SymbolLookup {
    /// The unique match, if any
    #[inline]
    #[must_use]
    pub fn unique(&self) -> Option<ElementId> {
        match self {
            Self::Unique(id) => Some(*id),
            _ => None,
        }
    }
}

/// Symbol table keyed by space-scoped qualified names
///
/// Several elements may declare the same symbol while a model is
/// transiently invalid; lookups report that as [`SymbolLookup::Ambiguous`]
/// instead of picking one.
#[derive(Debug)]
pub struct SymbolTable {
    /// Trie key (`c/Model/Customer`) -> declaring elements, in insert order
    trie: Trie<String, Vec<ElementId>>,
}

impl SymbolTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { trie: Trie::new() }
    }

    /// Register `id` as a declarer of `key`
    ///
    /// Returns the number of declarers after insertion.
    pub fn insert(&mut self, key: &SymbolKey, id: ElementId) -> usize {
        let trie_key = key.to_trie_key();
        if let Some(ids) = self.trie.get_mut(&trie_key) {
            if !ids.contains(&id) {
                ids.push(id);
            }
            return ids.len();
        }
        self.trie.insert(trie_key, vec![id]);
        1
    }

    /// Unregister `id` as a declarer of `key`
    ///
    /// Returns `true` if the pair was present.
    pub fn remove(&mut self, key: &SymbolKey, id: ElementId) -> bool {
        let trie_key = key.to_trie_key();
        let Some(ids) = self.trie.get_mut(&trie_key) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|x| *x != id);
        let removed = ids.len() != before;
        if ids.is_empty() {
            self.trie.remove(&trie_key);
        }
        removed
    }

    /// Lookup a symbol
    #[must_use]
    pub fn lookup(&self, key: &SymbolKey) -> SymbolLookup {
        match self.trie.get(&key.to_trie_key()).map(Vec::as_slice) {
            None | Some([]) => SymbolLookup::Missing,
            Some([id]) => SymbolLookup::Unique(*id),
            Some(ids) => SymbolLookup::Ambiguous(ids.to_vec()),
        }
    }

    /// Check whether anything declares `key`
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &SymbolKey) -> bool {
        self.lookup(key) != SymbolLookup::Missing
    }

    /// Elements declaring any symbol nested below `owner`
    ///
    /// For an entity type this is every property and navigation property;
    /// for a container, every set and function import (and set end).
    #[must_use]
    pub fn members_of(&self, owner: &SymbolKey) -> Vec<ElementId> {
        let prefix = owner.member_prefix();
        self.trie
            .get_raw_descendant(&prefix)
            .map(|sub| {
                sub.iter()
                    .filter(|(k, _)| k.starts_with(&prefix))
                    .flat_map(|(_, ids)| ids.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of distinct symbols
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.trie.len()
    }

    /// Check if table is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    /// Drop every symbol
    pub fn clear(&mut self) {
        self.trie = Trie::new();
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edm_artifact::ModelSpace;

    fn key(name: &str) -> SymbolKey {
        SymbolKey::parse(ModelSpace::Conceptual, name).unwrap()
    }

    #[test]
    fn lookup_reports_unique_match() {
        let mut table = SymbolTable::new();
        table.insert(&key("Model.Customer"), ElementId::new(1));
        assert_eq!(
            table.lookup(&key("Model.Customer")),
            SymbolLookup::Unique(ElementId::new(1))
        );
        assert_eq!(table.lookup(&key("Model.Order")), SymbolLookup::Missing);
    }

    #[test]
    fn lookup_reports_duplicates() {
        let mut table = SymbolTable::new();
        assert_eq!(table.insert(&key("Model.Customer"), ElementId::new(1)), 1);
        assert_eq!(table.insert(&key("Model.Customer"), ElementId::new(2)), 2);
        assert!(matches!(
            table.lookup(&key("Model.Customer")),
            SymbolLookup::Ambiguous(ids) if ids.len() == 2
        ));
    }

    #[test]
    fn remove_last_declarer_drops_symbol() {
        let mut table = SymbolTable::new();
        table.insert(&key("Model.Customer"), ElementId::new(1));
        assert!(table.remove(&key("Model.Customer"), ElementId::new(1)));
        assert!(!table.remove(&key("Model.Customer"), ElementId::new(1)));
        assert!(table.is_empty());
    }

    #[test]
    fn spaces_do_not_collide() {
        let mut table = SymbolTable::new();
        table.insert(&key("Model.Customer"), ElementId::new(1));
        let storage = SymbolKey::parse(ModelSpace::Storage, "Model.Customer").unwrap();
        assert_eq!(table.lookup(&storage), SymbolLookup::Missing);
    }

    #[test]
    fn members_of_excludes_sibling_prefixes() {
        let mut table = SymbolTable::new();
        table.insert(&key("Model.Customer"), ElementId::new(1));
        table.insert(&key("Model.Customer.Id"), ElementId::new(2));
        table.insert(&key("Model.Customer.Name"), ElementId::new(3));
        table.insert(&key("Model.Customers.Id"), ElementId::new(4));

        let mut members = table.members_of(&key("Model.Customer"));
        members.sort();
        assert_eq!(members, vec![ElementId::new(2), ElementId::new(3)]);
    }
}
