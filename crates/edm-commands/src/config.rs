//! Processor configuration
//!
//! Loaded from TOML or built with `with_*` methods:
//!
//! ```toml
//! max_rule_passes = 8
//! require_resolved_bindings = true
//! entity_set_suffix = { suffix = "Set" }
//! ```

use crate::error::CommandResult;
use serde::{Deserialize, Serialize};

/// How commands invent entity-set names for entity types
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySetNaming {
    /// English plural of the type name (`Customer` -> `Customers`)
    #[default]
    Pluralize,

    /// Type name plus a fixed suffix (`Customer` -> `CustomerSet`)
    Suffix(String),
}

impl EntitySetNaming {
    /// Entity-set name for a type name
    #[must_use]
    pub fn apply(&self, type_name: &str) -> String {
        match self {
            Self::Pluralize => pluralize(type_name),
            Self::Suffix(suffix) => format!("{type_name}{suffix}"),
        }
    }
}

/// Simple English pluralization for generated names
#[must_use]
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let consonant_y = lower.ends_with('y')
        && !matches!(lower.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'));
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|end| lower.ends_with(end)) {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Command processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum rule passes per transaction (rules may enqueue commands that register rules)
    pub max_rule_passes: usize,
    /// Maximum depth of nested `invoke_single_command` calls
    pub max_nesting_depth: usize,
    /// Fail the commit if any binding is not `Known`
    pub require_resolved_bindings: bool,
    /// Restore the pre-transaction model when a transaction fails
    pub rollback_on_error: bool,
    /// Naming policy for generated entity sets
    pub entity_set_suffix: EntitySetNaming,
}

impl ProcessorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML
    ///
    /// # Errors
    /// Returns error if the document is not valid TOML for this struct
    pub fn from_toml_str(source: &str) -> CommandResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// With max rule passes
    #[inline]
    #[must_use]
    pub fn with_max_rule_passes(mut self, passes: usize) -> Self {
        self.max_rule_passes = passes;
        self
    }

    /// With max nesting depth
    #[inline]
    #[must_use]
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// With commit-time binding check on or off
    #[inline]
    #[must_use]
    pub fn with_require_resolved_bindings(mut self, required: bool) -> Self {
        self.require_resolved_bindings = required;
        self
    }

    /// With rollback on error on or off
    #[inline]
    #[must_use]
    pub fn with_rollback_on_error(mut self, rollback: bool) -> Self {
        self.rollback_on_error = rollback;
        self
    }

    /// With entity-set naming policy
    #[inline]
    #[must_use]
    pub fn with_entity_set_naming(mut self, naming: EntitySetNaming) -> Self {
        self.entity_set_suffix = naming;
        self
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_rule_passes: 8,
            max_nesting_depth: 32,
            require_resolved_bindings: true,
            rollback_on_error: true,
            entity_set_suffix: EntitySetNaming::Pluralize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_handles_common_endings() {
        assert_eq!(pluralize("Customer"), "Customers");
        assert_eq!(pluralize("Category"), "Categories");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Address"), "Addresses");
        assert_eq!(pluralize("Box"), "Boxes");
    }

    #[test]
    fn suffix_naming_appends() {
        let naming = EntitySetNaming::Suffix("Set".into());
        assert_eq!(naming.apply("Customer"), "CustomerSet");
    }

    #[test]
    fn from_toml_overrides_defaults() {
        let config = ProcessorConfig::from_toml_str(
            "max_rule_passes = 3\nentity_set_suffix = { suffix = \"Set\" }\n",
        )
        .unwrap();
        assert_eq!(config.max_rule_passes, 3);
        assert!(config.require_resolved_bindings);
        assert_eq!(config.entity_set_suffix, EntitySetNaming::Suffix("Set".into()));
    }

    #[test]
    fn from_toml_accepts_unit_variant() {
        let config = ProcessorConfig::from_toml_str("entity_set_suffix = \"pluralize\"").unwrap();
        assert_eq!(config.entity_set_suffix, EntitySetNaming::Pluralize);
    }

    #[test]
    fn from_toml_rejects_bad_types() {
        assert!(ProcessorConfig::from_toml_str("max_rule_passes = \"many\"").is_err());
    }
}
