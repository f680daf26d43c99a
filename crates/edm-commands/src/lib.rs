//! EDM Command Engine
//!
//! Transactional designer commands over an [`edm_symbol::ArtifactSet`].
//!
//! # Core Concepts
//!
//! - [`Command`]: One edit, run through `pre_invoke -> process_prereqs ->
//!   invoke_internal -> post_invoke`
//! - [`CommandProcessor`]: Orders a batch by prerequisites and runs it as one
//!   transaction, with rollback on error
//! - [`CommandProcessorContext`]: The active transaction handed to commands
//!   and rules; supports nested commands and deferred work
//! - [`IntegrityRule`]: Batch-level fixups run after the commands
//! - [`Deferred`]: A command argument that is either a value or the output
//!   of another queued command
//!
//! # Example
//!
//! ```rust
//! use edm_artifact::Artifact;
//! use edm_commands::prelude::*;
//!
//! let mut editing = EditingContext::new(Artifact::new("Model").unwrap());
//!
//! let mut processor = CommandProcessor::new("Add Customer");
//! let created = create_entity_type_with_set_and_key(&mut processor, "Customer", "Id", "Int32").unwrap();
//! processor.invoke(&mut editing).unwrap();
//!
//! let customer = created.entity_type.output().unwrap();
//! let set = created.entity_set.output().unwrap();
//! assert_eq!(editing.artifact().element(set).unwrap().name(), Some("Customers"));
//! assert_eq!(
//!     edm_commands::model::entity_set_of(editing.artifacts(), customer),
//!     Some(set)
//! );
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod command;
pub mod commands;
mod config;
mod context;
mod editing;
mod error;
pub mod model;
mod ordering;
mod prereq;
mod processor;
pub mod rules;
mod validation;

// Re-exports
pub use command::Command;
pub use commands::update_from_db::sanitize_identifier;
pub use commands::*;
pub use config::{pluralize, EntitySetNaming, ProcessorConfig};
pub use context::{CommandProcessorContext, Transaction, TransactionReport};
pub use editing::EditingContext;
pub use error::{CommandError, CommandResult, UpdateWarning, ValidationFailure};
pub use prereq::{CommandHandle, CommandId, Deferred, Prereq};
pub use processor::CommandProcessor;
pub use rules::{
    EnforceEntitySetMappingRules, InferReferentialConstraints, IntegrityRule,
    PropagateViewKeysToStorageModel,
};
pub use validation::CommandValidation;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and running commands

    pub use crate::commands::*;
    pub use crate::{
        Command, CommandError, CommandHandle, CommandProcessor, CommandProcessorContext,
        CommandResult, Deferred, EditingContext, IntegrityRule, ProcessorConfig,
        ValidationFailure,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
