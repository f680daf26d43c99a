//! Qualified names for model elements
//!
//! Provides [`QualifiedName`] (dotted, hierarchical names as they appear in
//! model attributes) and [`SymbolKey`] (a qualified name scoped to one model
//! space, the unit the symbol table is keyed by).

use crate::kind::ModelSpace;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Dotted, hierarchical name of a model element
///
/// # Examples
/// - `["Model", "Customer"]` → `Model.Customer`
/// - `["ModelContainer", "Customers"]` → `ModelContainer.Customers`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName(Vec<String>);

impl QualifiedName {
    /// Create new name from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Create name from a single segment
    #[inline]
    #[must_use]
    pub fn single(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Empty name
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Get name segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if name is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get last segment (the local name)
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Get parent name (if not empty)
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Append a segment, returning new name
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Append every segment of a dotted string (e.g. a namespace)
    #[must_use]
    pub fn extend_dotted(&self, dotted: &str) -> Self {
        let mut new = self.clone();
        new.0
            .extend(dotted.split('.').filter(|s| !s.is_empty()).map(str::to_string));
        new
    }

    /// Check if this name is a prefix of another
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.0.len() <= other.0.len() && self.0 == other.0[..self.0.len()]
    }

    /// Replace the prefix `from` with `to`
    ///
    /// Returns `None` if `from` is not a prefix of this name.
    #[must_use]
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        if !from.is_prefix_of(self) {
            return None;
        }
        let mut segments = to.0.clone();
        segments.extend_from_slice(&self.0[from.0.len()..]);
        Some(Self(segments))
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for QualifiedName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = s
            .split('.')
            .map(|seg| {
                if seg.is_empty() {
                    Err(NameError::EmptySegment)
                } else if seg.contains(|c: char| !c.is_alphanumeric() && c != '_') {
                    Err(NameError::InvalidSegment(seg.to_string()))
                } else {
                    Ok(seg.to_string())
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }
}

impl Default for QualifiedName {
    fn default() -> Self {
        Self::root()
    }
}

/// A qualified name within one model space
///
/// Symbol tables are per space: `Model.Customer` in the conceptual model and
/// `Model.Store.Customer` in the storage model never collide, and mapping
/// elements have no symbols at all.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolKey {
    space: ModelSpace,
    name: QualifiedName,
}

impl SymbolKey {
    /// Create key
    #[inline]
    #[must_use]
    pub fn new(space: ModelSpace, name: QualifiedName) -> Self {
        Self { space, name }
    }

    /// Parse a dotted name into a key
    ///
    /// # Errors
    /// Returns error if the name has empty or invalid segments
    pub fn parse(space: ModelSpace, dotted: &str) -> Result<Self, NameError> {
        Ok(Self::new(space, dotted.parse()?))
    }

    /// Model space
    #[inline]
    #[must_use]
    pub fn space(&self) -> ModelSpace {
        self.space
    }

    /// Qualified name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Local (last segment) name
    #[inline]
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.name.last()
    }

    /// Key of a member of this symbol (e.g. a property of an entity type)
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        Self {
            space: self.space,
            name: self.name.child(segment),
        }
    }

    /// Trie-compatible key (space prefix, slash-separated)
    #[must_use]
    pub fn to_trie_key(&self) -> String {
        let mut key = String::from(self.space.key_prefix());
        for segment in self.name.segments() {
            key.push('/');
            key.push_str(segment);
        }
        key
    }

    /// Prefix shared by the trie keys of every member below this symbol
    #[must_use]
    pub fn member_prefix(&self) -> String {
        let mut key = self.to_trie_key();
        key.push('/');
        key
    }

    /// Rebase onto a renamed ancestor
    #[must_use]
    pub fn rebase(&self, from: &SymbolKey, to: &SymbolKey) -> Option<Self> {
        if self.space != from.space || from.space != to.space {
            return None;
        }
        self.name.rebase(&from.name, &to.name).map(|name| Self {
            space: self.space,
            name,
        })
    }
}

impl Display for SymbolKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space.key_prefix(), self.name)
    }
}

/// Errors related to qualified names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Empty segment in name
    #[error("name contains empty segment")]
    EmptySegment,

    /// Invalid segment characters
    #[error("invalid segment: {0} (must be alphanumeric or underscore)")]
    InvalidSegment(String),
}
