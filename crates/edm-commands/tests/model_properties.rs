//! End-to-end behaviour of the designer commands

use edm_artifact::{BindingSlot, ElementKind, ModelSpace, Multiplicity, StoreGeneratedPattern};
use edm_commands::model;
use edm_commands::prelude::*;
use edm_symbol::SymbolLookup;
use edm_test_utils::{
    add_entity, add_property, add_storage_table, assert_all_bindings_known, customer_order_model,
    empty_editing_context, init_tracing, map_properties, name_of,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn missing_argument_fails_instead_of_proceeding() {
    init_tracing();
    let mut editing = empty_editing_context();
    let before = editing.artifact().len();

    let err = CommandProcessor::invoke_single_command(
        &mut editing,
        CreatePropertyCommand::new("Name", Deferred::empty(), PropertyType::primitive("String")).unwrap(),
    )
    .unwrap_err();

    assert!(matches!(err, CommandError::Precondition(_)));
    assert_eq!(editing.artifact().len(), before);
}

#[test]
fn failed_producer_leaves_consumer_unrun() {
    let mut editing = empty_editing_context();
    add_entity(&mut editing, "Customer");
    let before = editing.artifact().len();

    let mut processor = CommandProcessor::new("Duplicate");
    let duplicate = processor.enqueue(CreateEntityTypeCommand::new("Customer", ModelSpace::Conceptual).unwrap());
    let property = processor.enqueue(
        CreatePropertyCommand::new("Name", &duplicate, PropertyType::primitive("String")).unwrap(),
    );
    let err = processor.invoke(&mut editing).unwrap_err();

    assert!(err.is_recoverable());
    assert_eq!(property.output(), None);
    assert_eq!(editing.artifact().len(), before);
}

#[test]
fn rename_keeps_every_reference_resolved() {
    let mut editing = empty_editing_context();
    let model = customer_order_model(&mut editing);

    let old = CommandProcessor::invoke_single_command(
        &mut editing,
        RenameCommand::new(model.customer.entity_type, "Client").unwrap(),
    )
    .unwrap();
    CommandProcessor::invoke_single_command(
        &mut editing,
        RenameCommand::new(model.association.association, "Purchases").unwrap(),
    )
    .unwrap();

    assert_eq!(old, "Customer");
    assert_all_bindings_known(editing.artifacts());
    let artifact = editing.artifact();
    let set_type = artifact.element(model.customer.entity_set).unwrap().binding(BindingSlot::Type).unwrap();
    assert_eq!(set_type.ref_name().to_string(), "c:Model.Client");
    assert_eq!(set_type.target(), Some(model.customer.entity_type));

    let orders_nav = model.association.navigation_properties[0].unwrap();
    let from_role = artifact.element(orders_nav).unwrap().binding(BindingSlot::FromRole).unwrap();
    assert_eq!(from_role.ref_name().to_string(), "c:Model.Purchases.Customer");
    assert_eq!(from_role.target(), Some(model.association.ends[0]));
}

#[test]
fn renaming_an_end_renames_its_set_ends() {
    let mut editing = empty_editing_context();
    let model = customer_order_model(&mut editing);
    let association = &model.association;

    CommandProcessor::invoke_single_command(
        &mut editing,
        RenameCommand::new(association.ends[0], "Buyer").unwrap(),
    )
    .unwrap();

    assert_eq!(name_of(&editing, association.set_ends[0]), "Buyer");
    assert_eq!(name_of(&editing, association.set_ends[1]), "Order");
    let key = editing.artifact().symbol_of(association.set_ends[0]).unwrap();
    assert!(key.to_string().ends_with(".CustomerOrder.Buyer"));
    assert_eq!(
        editing.artifacts().lookup_symbol(&key),
        SymbolLookup::Unique(association.set_ends[0])
    );
    let role = editing
        .artifact()
        .element(association.set_ends[0])
        .unwrap()
        .binding(BindingSlot::Role)
        .unwrap();
    assert_eq!(role.target(), Some(association.ends[0]));
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn rename_rejects_sibling_clash() {
    let mut editing = empty_editing_context();
    let model = customer_order_model(&mut editing);
    let err = CommandProcessor::invoke_single_command(
        &mut editing,
        RenameCommand::new(model.order.entity_type, "Customer").unwrap(),
    )
    .unwrap_err();
    assert!(matches!(err, CommandError::Validation(ValidationFailure::DuplicateName { .. })));
    assert_eq!(name_of(&editing, model.order.entity_type), "Order");
}

#[test]
fn scalar_mapping_is_created_once() {
    let mut editing = empty_editing_context();
    let customer = add_entity(&mut editing, "Customer");
    let table = add_storage_table(&mut editing, "CustomerTable", &[("CustomerId", "int", true)]);

    let first = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateFragmentScalarPropertyCommand::new(customer.entity_type, customer.key, table.column("CustomerId")),
    )
    .unwrap();
    let second = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateFragmentScalarPropertyCommand::new(customer.entity_type, customer.key, table.column("CustomerId")),
    )
    .unwrap();

    assert_eq!(first, second);
    let type_mappings = model::type_mappings_of(editing.artifacts(), customer.entity_type);
    assert_eq!(type_mappings.len(), 1);
    let fragments = model::fragments_of(editing.artifact(), type_mappings[0]);
    assert_eq!(fragments.len(), 1);
    assert_eq!(
        editing.artifact().children_of_kind(fragments[0], ElementKind::ScalarProperty),
        vec![first]
    );
}

#[test]
fn deleting_a_type_removes_everything_that_needed_it() {
    let mut editing = empty_editing_context();
    let model = customer_order_model(&mut editing);
    let table = add_storage_table(&mut editing, "CustomerTable", &[("CustomerId", "int", true)]);
    map_properties(&mut editing, model.customer.entity_type, &[(model.customer.key, table.column("CustomerId"))]);

    let removed = CommandProcessor::invoke_single_command(
        &mut editing,
        DeleteEFElementCommand::new(model.customer.entity_type),
    )
    .unwrap();

    let artifact = editing.artifact();
    assert!(removed > 1);
    for gone in [
        model.customer.entity_type,
        model.customer.entity_set,
        model.association.association,
        model.association.association_set,
    ] {
        assert!(!artifact.contains(gone), "{gone} survived");
    }
    assert!(!artifact.contains(model.association.navigation_properties[1].unwrap()));
    assert!(artifact.of_kind(ModelSpace::Mapping, ElementKind::EntityTypeMapping).is_empty());
    assert!(artifact.contains(model.order.entity_type));
    assert!(artifact.contains(table.entity_type));
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn deleting_a_base_type_reparents_derived_types() {
    let mut editing = empty_editing_context();
    let person = add_entity(&mut editing, "Person");
    let customer = add_entity(&mut editing, "Customer");
    let vip = add_entity(&mut editing, "Vip");
    CommandProcessor::invoke_single_command(&mut editing, CreateInheritanceCommand::new(customer.entity_type, person.entity_type)).unwrap();
    CommandProcessor::invoke_single_command(&mut editing, CreateInheritanceCommand::new(vip.entity_type, customer.entity_type)).unwrap();

    CommandProcessor::invoke_single_command(&mut editing, DeleteEFElementCommand::new(customer.entity_type)).unwrap();

    let artifact = editing.artifact();
    assert!(!artifact.contains(customer.entity_type));
    assert_eq!(model::base_type(artifact, vip.entity_type), Some(person.entity_type));
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn deleting_the_only_base_makes_derived_a_root() {
    let mut editing = empty_editing_context();
    let person = add_entity(&mut editing, "Person");
    let customer = add_entity(&mut editing, "Customer");
    CommandProcessor::invoke_single_command(&mut editing, CreateInheritanceCommand::new(customer.entity_type, person.entity_type)).unwrap();

    CommandProcessor::invoke_single_command(&mut editing, DeleteEFElementCommand::new(person.entity_type)).unwrap();

    let artifact = editing.artifact();
    assert_eq!(model::base_type(artifact, customer.entity_type), None);
    let keys: Vec<String> = model::key_properties(artifact, customer.entity_type)
        .into_iter()
        .map(|k| name_of(&editing, k))
        .collect();
    assert_eq!(keys, vec!["Id".to_string()]);
    let set = model::entity_set_of(editing.artifacts(), customer.entity_type).unwrap();
    assert_eq!(name_of(&editing, set), "Customers");
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn consumer_sees_producer_output() {
    let mut editing = empty_editing_context();
    let mut processor = CommandProcessor::new("Customer with name");
    let customer = processor.enqueue(CreateEntityTypeCommand::new("Customer", ModelSpace::Conceptual).unwrap());
    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    customer.subscribe(move |id| *sink.borrow_mut() = Some(*id));
    let name = processor.enqueue(
        CreatePropertyCommand::new("Name", &customer, PropertyType::primitive("String")).unwrap(),
    );
    processor.invoke(&mut editing).unwrap();

    let customer = customer.output().unwrap();
    let name = name.output().unwrap();
    assert_eq!(*seen.borrow(), Some(customer));
    assert_eq!(editing.artifact().element(name).unwrap().parent(), Some(customer));
}

#[test]
fn explicit_prerequisite_overrides_enqueue_order() {
    let mut editing = empty_editing_context();
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut processor = CommandProcessor::new("Ordered");
    let first = processor.enqueue(CreateEntityTypeCommand::new("First", ModelSpace::Conceptual).unwrap());
    let second = processor.enqueue(CreateEntityTypeCommand::new("Second", ModelSpace::Conceptual).unwrap());
    for (handle, label) in [(&first, "First"), (&second, "Second")] {
        let order = Rc::clone(&order);
        handle.subscribe(move |_| order.borrow_mut().push(label));
    }
    processor.add_prerequisite(first.id(), second.id());
    processor.invoke(&mut editing).unwrap();

    assert_eq!(*order.borrow(), vec!["Second", "First"]);
}

#[test]
fn combined_helper_builds_keyed_type_with_set() {
    let mut editing = empty_editing_context();
    let mut processor = CommandProcessor::new("Add Customer");
    let created = create_entity_type_with_set_and_key(&mut processor, "Customer", "Id", "Int32").unwrap();
    let report = processor.invoke(&mut editing).unwrap();

    let customer = created.entity_type.output().unwrap();
    let key = created.key.output().unwrap();
    let set = created.entity_set.output().unwrap();
    let artifact = editing.artifact();
    let schema = artifact.schema(ModelSpace::Conceptual);

    assert_eq!(report.commands, vec!["CreateEntityType", "CreateProperty", "CreateEntitySet"]);
    assert_eq!(artifact.children_of_kind(schema, ElementKind::EntityType), vec![customer]);
    assert_eq!(model::declared_keys(artifact, customer), vec![key]);
    let facets = artifact.element(key).unwrap().facets().unwrap().clone();
    assert_eq!(name_of(&editing, key), "Id");
    assert_eq!(facets.type_name.as_deref(), Some("Int32"));
    assert_eq!(facets.store_generated, StoreGeneratedPattern::Identity);
    assert!(!facets.nullable);

    let container = artifact.container(ModelSpace::Conceptual);
    assert_eq!(artifact.children_of_kind(container, ElementKind::EntitySet), vec![set]);
    assert_eq!(name_of(&editing, set), "Customers");
    let binding = artifact.element(set).unwrap().binding(BindingSlot::Type).unwrap();
    assert!(binding.is_known());
    assert_eq!(binding.target(), Some(customer));
}

#[test]
fn association_builds_ends_set_and_navigation() {
    let mut editing = empty_editing_context();
    let customer = add_entity(&mut editing, "Customer");
    let order = add_entity(&mut editing, "Order");

    let output = CommandProcessor::invoke_single_command(
        &mut editing,
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

    let artifact = editing.artifact();
    assert_eq!(artifact.of_kind(ModelSpace::Conceptual, ElementKind::Association), vec![output.association]);
    assert_eq!(model::association_ends(artifact, output.association), output.ends.to_vec());
    assert_eq!(model::end_type(artifact, output.ends[0]), Some(customer.entity_type));
    assert_eq!(model::end_type(artifact, output.ends[1]), Some(order.entity_type));
    assert_eq!(artifact.of_kind(ModelSpace::Conceptual, ElementKind::AssociationSet), vec![output.association_set]);
    for (set_end, entity_set) in output.set_ends.iter().zip([customer.entity_set, order.entity_set]) {
        assert_eq!(artifact.element(*set_end).unwrap().binding_target(BindingSlot::EntitySet), Some(entity_set));
    }

    let [Some(orders), Some(back)] = output.navigation_properties else {
        panic!("navigation properties missing");
    };
    assert_eq!(artifact.element(orders).unwrap().parent(), Some(customer.entity_type));
    assert_eq!(artifact.element(orders).unwrap().binding_target(BindingSlot::FromRole), Some(output.ends[0]));
    assert_eq!(artifact.element(orders).unwrap().binding_target(BindingSlot::ToRole), Some(output.ends[1]));
    assert_eq!(artifact.element(back).unwrap().parent(), Some(order.entity_type));
    assert_eq!(artifact.element(back).unwrap().binding_target(BindingSlot::FromRole), Some(output.ends[1]));
    assert_eq!(artifact.element(back).unwrap().binding_target(BindingSlot::ToRole), Some(output.ends[0]));
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn inheritance_folds_derived_set_into_base_set() {
    let mut editing = empty_editing_context();
    let person = add_entity(&mut editing, "Person");
    let model = customer_order_model(&mut editing);
    let customer_set_end = model.association.set_ends[0];

    CommandProcessor::invoke_single_command(
        &mut editing,
        CreateInheritanceCommand::new(model.customer.entity_type, person.entity_type),
    )
    .unwrap();

    let artifact = editing.artifact();
    assert!(!artifact.contains(model.customer.entity_set));
    let base = artifact.element(model.customer.entity_type).unwrap().binding(BindingSlot::BaseType).unwrap();
    assert!(base.is_known());
    assert_eq!(base.target(), Some(person.entity_type));
    assert_eq!(
        artifact.element(customer_set_end).unwrap().binding_target(BindingSlot::EntitySet),
        Some(person.entity_set)
    );
    assert_eq!(model::entity_set_of(editing.artifacts(), model.customer.entity_type), Some(person.entity_set));
    // the derived key merged into the root key
    assert!(!artifact.contains(model.customer.key));
    assert_eq!(model::key_properties(artifact, model.customer.entity_type), vec![person.key]);
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn inheritance_rejects_cycles() {
    let mut editing = empty_editing_context();
    let person = add_entity(&mut editing, "Person");
    let customer = add_entity(&mut editing, "Customer");
    CommandProcessor::invoke_single_command(&mut editing, CreateInheritanceCommand::new(customer.entity_type, person.entity_type)).unwrap();

    let err = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateInheritanceCommand::new(person.entity_type, customer.entity_type),
    )
    .unwrap_err();
    assert!(matches!(err, CommandError::Validation(ValidationFailure::CircularInheritance { .. })));
}

#[test]
fn inheritance_rejects_member_clash() {
    let mut editing = empty_editing_context();
    let person = add_entity(&mut editing, "Person");
    add_property(&mut editing, person.entity_type, "Name", "String");
    let customer = add_entity(&mut editing, "Customer");
    add_property(&mut editing, customer.entity_type, "Name", "String");

    let err = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateInheritanceCommand::new(customer.entity_type, person.entity_type),
    )
    .unwrap_err();
    assert!(err.is_recoverable());
    assert!(editing.artifact().contains(customer.entity_set));
}

#[test]
fn delete_inheritance_restores_own_set_and_keys() {
    let mut editing = empty_editing_context();
    let person = add_entity(&mut editing, "Person");
    let model = customer_order_model(&mut editing);
    CommandProcessor::invoke_single_command(
        &mut editing,
        CreateInheritanceCommand::new(model.customer.entity_type, person.entity_type),
    )
    .unwrap();

    let new_set = CommandProcessor::invoke_single_command(
        &mut editing,
        DeleteInheritanceCommand::new(model.customer.entity_type),
    )
    .unwrap();

    let artifact = editing.artifact();
    assert_eq!(model::base_type(artifact, model.customer.entity_type), None);
    assert_eq!(name_of(&editing, new_set), "Customers");
    assert_eq!(
        artifact.element(model.association.set_ends[0]).unwrap().binding_target(BindingSlot::EntitySet),
        Some(new_set)
    );
    let keys = model::declared_keys(artifact, model.customer.entity_type);
    assert_eq!(keys.len(), 1);
    assert_ne!(keys[0], person.key);
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn referential_constraint_requires_principal_keys() {
    let mut editing = empty_editing_context();
    let model = customer_order_model(&mut editing);
    let name = model::find_property_in_chain(editing.artifact(), model.customer.entity_type, "Name").unwrap();

    let err = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateReferentialConstraintCommand::new(
            model.association.ends[0],
            model.association.ends[1],
            vec![name],
            vec![model.order_customer_id],
        )
        .unwrap(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Validation(ValidationFailure::InvalidReferentialConstraint(_))
    ));

    let constraint = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateReferentialConstraintCommand::new(
            model.association.ends[0],
            model.association.ends[1],
            vec![model.customer.key],
            vec![model.order_customer_id],
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(
        model::referential_constraint_of(editing.artifact(), model.association.association),
        Some(constraint)
    );
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn deleting_a_constrained_property_drops_the_constraint() {
    let mut editing = empty_editing_context();
    let model = customer_order_model(&mut editing);
    CommandProcessor::invoke_single_command(
        &mut editing,
        CreateReferentialConstraintCommand::new(
            model.association.ends[0],
            model.association.ends[1],
            vec![model.customer.key],
            vec![model.order_customer_id],
        )
        .unwrap(),
    )
    .unwrap();

    CommandProcessor::invoke_single_command(&mut editing, DeleteEFElementCommand::new(model.order_customer_id)).unwrap();

    assert_eq!(model::referential_constraint_of(editing.artifact(), model.association.association), None);
    assert!(editing.artifact().contains(model.association.association));
    assert_all_bindings_known(editing.artifacts());
}
