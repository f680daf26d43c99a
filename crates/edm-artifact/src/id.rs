//! Stable element identifiers

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Arena index of an element
///
/// Ids are never reused within one artifact, so an id held across a
/// deletion simply stops resolving instead of aliasing a new element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    /// Wrap a raw id
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Display for ElementId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
