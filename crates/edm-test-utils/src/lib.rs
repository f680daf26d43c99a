//! Testing utilities for the EDM workspace
//!
//! Shared fixtures, tracing setup and assertions. Fixtures are built
//! through the public commands so they exercise the same paths as hosts.

#![allow(missing_docs)]

use edm_artifact::{Artifact, ElementId, ModelSpace, Multiplicity};
use edm_commands::{
    create_entity_type_with_set_and_key, AssociationOutput, CommandProcessor,
    CreateConceptualAssociationCommand, CreateEntitySetCommand, CreateEntityTypeCommand,
    CreateFragmentScalarPropertyCommand, CreatePropertyCommand, EditingContext, ProcessorConfig,
    PropertyType,
};
use edm_symbol::ArtifactSet;
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Empty model in namespace `Model`
pub fn empty_editing_context() -> EditingContext {
    EditingContext::new(Artifact::new("Model").unwrap())
}

/// Empty model with explicit configuration
pub fn editing_context_with(config: ProcessorConfig) -> EditingContext {
    EditingContext::with_config(Artifact::new("Model").unwrap(), config)
}

/// Conceptual entity type with a key and an entity set
#[derive(Debug, Clone, Copy)]
pub struct EntityFixture {
    pub entity_type: ElementId,
    pub key: ElementId,
    pub entity_set: ElementId,
}

/// Create `name` with an `Int32` key `Id` and the default entity set
pub fn add_entity(editing: &mut EditingContext, name: &str) -> EntityFixture {
    let mut processor = CommandProcessor::new(format!("Add {name}"));
    let created = create_entity_type_with_set_and_key(&mut processor, name, "Id", "Int32").unwrap();
    processor.invoke(editing).unwrap();
    EntityFixture {
        entity_type: created.entity_type.output().unwrap(),
        key: created.key.output().unwrap(),
        entity_set: created.entity_set.output().unwrap(),
    }
}

/// Add a primitive property to a type
pub fn add_property(editing: &mut EditingContext, owner: ElementId, name: &str, type_name: &str) -> ElementId {
    CommandProcessor::invoke_single_command(
        editing,
        CreatePropertyCommand::new(name, owner, PropertyType::primitive(type_name)).unwrap(),
    )
    .unwrap()
}

/// `Customer 1 -- * Order`, with `Order.CustomerId` and navigation
/// properties `Orders` / `Customer`
#[derive(Debug, Clone)]
pub struct CustomerOrderModel {
    pub customer: EntityFixture,
    pub order: EntityFixture,
    pub order_customer_id: ElementId,
    pub association: AssociationOutput,
}

/// Build [`CustomerOrderModel`] in the conceptual space
pub fn customer_order_model(editing: &mut EditingContext) -> CustomerOrderModel {
    let customer = add_entity(editing, "Customer");
    add_property(editing, customer.entity_type, "Name", "String");
    let order = add_entity(editing, "Order");
    let order_customer_id = add_property(editing, order.entity_type, "CustomerId", "Int32");

    let association = CommandProcessor::invoke_single_command(
        editing,
        CreateConceptualAssociationCommand::new(
            "CustomerOrder",
            customer.entity_type,
            Multiplicity::One,
            order.entity_type,
            Multiplicity::Many,
        )
        .unwrap()
        .with_navigation_properties(Some("Orders"), Some("Customer"))
        .unwrap(),
    )
    .unwrap();

    CustomerOrderModel {
        customer,
        order,
        order_customer_id,
        association,
    }
}

/// Storage entity type, its entity set and its columns by name
#[derive(Debug, Clone)]
pub struct StorageTable {
    pub entity_type: ElementId,
    pub entity_set: ElementId,
    pub columns: BTreeMap<String, ElementId>,
}

impl StorageTable {
    /// Column by name; panics if missing
    pub fn column(&self, name: &str) -> ElementId {
        self.columns[name]
    }
}

/// Create a storage table; columns are `(name, store type, is_key)`
pub fn add_storage_table(editing: &mut EditingContext, name: &str, columns: &[(&str, &str, bool)]) -> StorageTable {
    let mut processor = CommandProcessor::new(format!("Add table {name}"));
    let table = processor.enqueue(CreateEntityTypeCommand::new(name, ModelSpace::Storage).unwrap());
    let set = processor.enqueue(CreateEntitySetCommand::new(name, &table).unwrap());
    let handles: Vec<_> = columns
        .iter()
        .map(|(column, store_type, is_key)| {
            let command = CreatePropertyCommand::new(*column, &table, PropertyType::primitive(*store_type)).unwrap();
            let command = if *is_key { command.key() } else { command };
            ((*column).to_string(), processor.enqueue(command))
        })
        .collect();
    processor.invoke(editing).unwrap();

    StorageTable {
        entity_type: table.output().unwrap(),
        entity_set: set.output().unwrap(),
        columns: handles
            .into_iter()
            .map(|(name, handle)| (name, handle.output().unwrap()))
            .collect(),
    }
}

/// Map properties of `entity_type` onto columns, one scalar mapping each
pub fn map_properties(editing: &mut EditingContext, entity_type: ElementId, pairs: &[(ElementId, ElementId)]) {
    let mut processor = CommandProcessor::new("Map properties");
    for (property, column) in pairs {
        processor.enqueue(CreateFragmentScalarPropertyCommand::new(entity_type, *property, *column));
    }
    processor.invoke(editing).unwrap();
}

/// Panic listing every binding that is not `Known`
pub fn assert_all_bindings_known(artifacts: &ArtifactSet) {
    let unresolved = artifacts.unresolved_bindings();
    assert!(
        unresolved.is_empty(),
        "unresolved bindings: {}",
        unresolved
            .iter()
            .map(|u| format!("{} {:?} -> {} ({:?})", u.owner_kind, u.slot, u.ref_name, u.status))
            .collect::<Vec<_>>()
            .join(", ")
    );
}

/// Name of an element; panics if it has none
pub fn name_of(editing: &EditingContext, id: ElementId) -> String {
    editing.artifact().element(id).unwrap().name().unwrap().to_string()
}
