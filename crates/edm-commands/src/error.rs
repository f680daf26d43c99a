//! Error types for the command engine
//!
//! Separates three severities:
//! - business-rule failures the user can fix and retry ([`ValidationFailure`])
//! - structural failures in the command graph (programming errors)
//! - reconciliation failures while updating from a database

use crate::prereq::CommandId;
use edm_artifact::{ArtifactError, ElementId};
use edm_symbol::{SymbolError, UnresolvedBinding};
use std::fmt::{self, Display, Formatter};

/// Result alias for command operations
pub type CommandResult<T> = Result<T, CommandError>;

/// Main command error type
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Business rule violated; recoverable by the user
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    /// Expected parent element not found
    #[error("{command}: cannot locate parent item ({what})")]
    CannotLocateParentItem { command: &'static str, what: String },

    /// Expected referenced element not found
    #[error("{command}: cannot locate referenced item ({what})")]
    CannotLocateReferencedItem { command: &'static str, what: String },

    /// Element could not be created
    #[error("{command}: item creation failed ({what})")]
    ItemCreationFailure { command: &'static str, what: String },

    /// Parent element of a new item could not be created
    #[error("{command}: parent item creation failed ({what})")]
    ParentItemCreationFailure { command: &'static str, what: String },

    /// A prerequisite had not produced its output when it was needed
    #[error("prerequisite {prereq} has not produced an output")]
    PrerequisiteNotSatisfied { prereq: CommandId },

    /// Prerequisites form a cycle
    #[error("prerequisite cycle among commands {0:?}")]
    PrerequisiteCycle(Vec<CommandId>),

    /// Bindings left unresolved at commit
    #[error("{} binding(s) left unresolved at commit", .0.len())]
    UnresolvedBindings(Vec<UnresolvedBinding>),

    /// Rule/command cascade did not settle
    #[error("integrity rules still pending after {passes} passes")]
    RuleCascadeLimit { passes: usize },

    /// Nested command invocation too deep
    #[error("nested command depth {depth} exceeds the limit")]
    NestingTooDeep { depth: usize },

    /// Invariant or argument check failed
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Database reconciliation failed
    #[error("update model from database failed: {0}")]
    UpdateModelFromDatabase(String),

    /// Symbol-layer error
    #[error("symbol error: {0}")]
    Symbol(#[from] SymbolError),

    /// Arena error
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl CommandError {
    /// Check if the user can fix the input and retry
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Symbol(SymbolError::InvalidIdentifier { .. } | SymbolError::DuplicateSymbol(_))
        )
    }

    /// Create a precondition error
    #[inline]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Create a referenced-item error
    #[inline]
    pub fn missing_reference(command: &'static str, what: impl Into<String>) -> Self {
        Self::CannotLocateReferencedItem {
            command,
            what: what.into(),
        }
    }

    /// Create a parent-item error
    #[inline]
    pub fn missing_parent(command: &'static str, what: impl Into<String>) -> Self {
        Self::CannotLocateParentItem {
            command,
            what: what.into(),
        }
    }
}

/// Business-rule violations shown to the user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    /// Not an identifier
    #[error("'{name}' is not a valid name: {reason}")]
    InvalidName { name: String, reason: String },

    /// Name already taken in its scope
    #[error("the name '{name}' is already used in {scope}")]
    DuplicateName { name: String, scope: String },

    /// Member named like its declaring type
    #[error("member '{0}' cannot have the same name as its declaring type")]
    MemberNamedLikeType(String),

    /// Inheritance would form a loop
    #[error("'{derived}' cannot derive from '{base}': circular inheritance")]
    CircularInheritance { derived: String, base: String },

    /// Type already has a base
    #[error("'{derived}' already derives from '{base}'")]
    AlreadyDerived { derived: String, base: String },

    /// Complex type would contain itself
    #[error("complex type '{outer}' cannot contain '{inner}': circular definition")]
    CircularComplexType { outer: String, inner: String },

    /// Referential constraint does not fit the association
    #[error("invalid referential constraint: {0}")]
    InvalidReferentialConstraint(String),

    /// Facet combination not allowed
    #[error("invalid facet: {0}")]
    InvalidFacet(String),

    /// Not a known primitive type
    #[error("unknown primitive type '{0}'")]
    UnknownPrimitiveType(String),
}

/// Lower-severity reconciliation problem recorded on the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateWarning {
    /// User-facing description
    pub message: String,
    /// Element the warning is about, if it exists
    pub element: Option<ElementId>,
}

impl UpdateWarning {
    /// Create warning
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>, element: Option<ElementId>) -> Self {
        Self {
            message: message.into(),
            element,
        }
    }
}

impl Display for UpdateWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.element {
            Some(id) => write!(f, "{} ({id})", self.message),
            None => f.write_str(&self.message),
        }
    }
}
