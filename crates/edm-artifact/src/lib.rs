//! EDM Artifact Model
//!
//! The in-memory element graph edited by designer commands: a conceptual
//! model (C-Space), a storage model (S-Space) and the mapping between them
//! (M-Space), all held in one arena.
//!
//! # Core Concepts
//!
//! - [`Artifact`]: Persistent arena owning the three trees
//! - [`Element`]: One node, with a kind-specific [`ElementData`] payload
//! - [`ItemBinding`]: Symbolic reference to another element
//! - [`SymbolKey`]: Qualified name scoped to a [`ModelSpace`]
//! - [`cascade_action`]: What happens to a reference when its target is deleted
//!
//! Resolution of bindings lives one layer up, in `edm-symbol`.
//!
//! # Example
//!
//! ```rust
//! use edm_artifact::{Artifact, ElementData, ModelSpace};
//!
//! let mut artifact = Artifact::new("Model").unwrap();
//! let schema = artifact.schema(ModelSpace::Conceptual);
//! let customer = artifact
//!     .insert(schema, Some("Customer".into()), ElementData::EntityType { is_abstract: false })
//!     .unwrap();
//!
//! assert_eq!(artifact.symbol_of(customer).unwrap().to_string(), "c:Model.Customer");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod binding;
mod element;
mod id;
mod kind;
mod name;
pub mod primitive;

pub use artifact::{Artifact, ArtifactError};
pub use binding::{BindingStatus, ItemBinding};
pub use element::{
    ConstraintRole, Element, ElementData, FunctionReturn, Multiplicity, OnDeleteAction,
    PropertyFacets, StoreGeneratedPattern,
};
pub use id::ElementId;
pub use kind::{cascade_action, BindingSlot, CascadeAction, ElementKind, ModelSpace};
pub use name::{NameError, QualifiedName, SymbolKey};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
