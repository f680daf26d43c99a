//! EDM Symbol System
//!
//! Name resolution for EDM artifacts.
//!
//! # Overview
//!
//! The symbol system provides:
//! - **SymbolTable**: Qualified-name lookup via radix tree
//! - **AntiDependencyIndex**: Who currently points at an element
//! - **ArtifactSet**: The mutation surface that keeps both in step with the tree
//!
//! # Example
//!
//! ```rust
//! use edm_artifact::{Artifact, BindingSlot, ElementData, ModelSpace};
//! use edm_symbol::ArtifactSet;
//!
//! let mut set = ArtifactSet::new(Artifact::new("Model").unwrap());
//! let schema = set.artifact().schema(ModelSpace::Conceptual);
//! let container = set.artifact().container(ModelSpace::Conceptual);
//!
//! let customer = set
//!     .add_element(schema, Some("Customer"), ElementData::EntityType { is_abstract: false })
//!     .unwrap();
//! let customers = set
//!     .add_element(container, Some("Customers"), ElementData::EntitySet { is_view: false })
//!     .unwrap();
//! set.bind_to(customers, BindingSlot::Type, customer).unwrap();
//!
//! assert_eq!(set.anti_dependencies(customer), vec![(customers, BindingSlot::Type)]);
//! ```

#![warn(missing_docs)]

pub mod antidep;
mod artifact_set;
mod error;
pub mod index;
pub mod validation;

// Re-exports
pub use antidep::{AntiDependencyIndex, BindingRef};
pub use artifact_set::{ArtifactSet, UnresolvedBinding};
pub use error::SymbolError;
pub use index::{SymbolLookup, SymbolTable};
pub use validation::{is_valid_identifier, validate_identifier};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for symbol operations
    pub use crate::{ArtifactSet, BindingRef, SymbolError, SymbolLookup, UnresolvedBinding};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
