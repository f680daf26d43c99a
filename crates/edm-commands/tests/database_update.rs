//! Reconciling the model with database snapshots and procedures

use edm_artifact::{ElementData, ElementId, ElementKind, FunctionReturn, ModelSpace, Multiplicity};
use edm_commands::model;
use edm_commands::prelude::*;
use edm_test_utils::{
    add_storage_table, assert_all_bindings_known, empty_editing_context, init_tracing, name_of,
};
use pretty_assertions::assert_eq;

fn table(name: &str, columns: Vec<DatabaseColumn>) -> DatabaseTable {
    DatabaseTable {
        name: name.to_string(),
        is_view: false,
        columns,
    }
}

fn procedure(name: &str, columns: Vec<DatabaseColumn>) -> DatabaseProcedure {
    DatabaseProcedure {
        name: name.to_string(),
        schema: Some("dbo".to_string()),
        is_composable: false,
        columns,
    }
}

fn shop_snapshot() -> DatabaseSnapshot {
    DatabaseSnapshot {
        tables: vec![
            table(
                "Customer",
                vec![
                    DatabaseColumn::new("Id", "int").key().identity(),
                    DatabaseColumn::new("Name", "nvarchar").not_null(),
                ],
            ),
            table(
                "Order",
                vec![
                    DatabaseColumn::new("Id", "int").key().identity(),
                    DatabaseColumn::new("CustomerId", "int").not_null(),
                    DatabaseColumn::new("Total", "money"),
                ],
            ),
        ],
        foreign_keys: vec![DatabaseForeignKey {
            name: "FK_Order_Customer".to_string(),
            principal_table: "Customer".to_string(),
            principal_columns: vec!["Id".to_string()],
            dependent_table: "Order".to_string(),
            dependent_columns: vec!["CustomerId".to_string()],
        }],
        procedures: vec![
            procedure(
                "GetCustomers",
                vec![DatabaseColumn::new("Id", "int"), DatabaseColumn::new("Name", "nvarchar")],
            ),
            procedure("CountOrders", vec![DatabaseColumn::new("Count", "int")]),
        ],
    }
}

fn conceptual_type(editing: &EditingContext, name: &str) -> ElementId {
    let schema = editing.artifact().schema(ModelSpace::Conceptual);
    editing
        .artifact()
        .find_child(schema, ElementKind::EntityType, name)
        .unwrap()
}

fn storage_column(editing: &EditingContext, table: &str, column: &str) -> ElementId {
    let schema = editing.artifact().schema(ModelSpace::Storage);
    let table = editing
        .artifact()
        .find_child(schema, ElementKind::EntityType, table)
        .unwrap();
    editing
        .artifact()
        .find_child(table, ElementKind::Property, column)
        .unwrap()
}

fn store_name(editing: &EditingContext, column: ElementId) -> Option<String> {
    let element = editing.artifact().element(column).unwrap();
    element.facets().unwrap().store_name.clone()
}

fn update(editing: &mut EditingContext, snapshot: DatabaseSnapshot) -> CommandResult<UpdateSummary> {
    CommandProcessor::invoke_single_command(editing, UpdateModelFromDatabaseCommand::new(snapshot))
}

#[test]
fn new_tables_become_mapped_entity_types() {
    init_tracing();
    let mut editing = empty_editing_context();
    let summary = update(&mut editing, shop_snapshot()).unwrap();

    assert_eq!(summary.entity_types.len(), 2);
    assert_eq!(summary.properties.len(), 5);
    assert_eq!(summary.warnings, 0);

    let customer = conceptual_type(&editing, "Customer");
    let artifact = editing.artifact();
    let names: Vec<String> = model::properties(artifact, customer)
        .into_iter()
        .map(|p| name_of(&editing, p))
        .collect();
    assert_eq!(names, vec!["Id".to_string(), "Name".to_string()]);
    let key = model::key_properties(artifact, customer);
    assert_eq!(key.len(), 1);
    assert_eq!(name_of(&editing, key[0]), "Id");

    let set = model::entity_set_of(editing.artifacts(), customer).unwrap();
    assert_eq!(name_of(&editing, set), "Customers");
    let type_mappings = model::type_mappings_of(editing.artifacts(), customer);
    assert_eq!(type_mappings.len(), 1);
    let fragments = model::fragments_of(artifact, type_mappings[0]);
    assert_eq!(fragments.len(), 1);
    assert_eq!(
        artifact.children_of_kind(fragments[0], ElementKind::ScalarProperty).len(),
        2
    );
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn foreign_keys_become_constrained_associations() {
    let mut editing = empty_editing_context();
    let summary = update(&mut editing, shop_snapshot()).unwrap();

    assert_eq!(summary.associations.len(), 1);
    let association = summary.associations[0];
    let customer = conceptual_type(&editing, "Customer");
    let order = conceptual_type(&editing, "Order");
    let artifact = editing.artifact();

    assert_eq!(name_of(&editing, association), "FK_Order_Customer");
    let ends = model::association_ends(artifact, association);
    assert_eq!(model::end_type(artifact, ends[0]), Some(customer));
    assert_eq!(model::end_type(artifact, ends[1]), Some(order));
    assert!(matches!(
        artifact.element(ends[0]).unwrap().data(),
        ElementData::AssociationEnd { multiplicity: Multiplicity::One, .. }
    ));
    assert!(model::referential_constraint_of(artifact, association).is_some());
    assert!(artifact.find_child(customer, ElementKind::NavigationProperty, "Orders").is_some());
    assert!(artifact.find_child(order, ElementKind::NavigationProperty, "Customer").is_some());
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn unmatched_foreign_key_keeps_association_with_warning() {
    let mut editing = empty_editing_context();
    let mut snapshot = shop_snapshot();
    snapshot.tables[1]
        .columns
        .push(DatabaseColumn::new("Region", "geography"));
    snapshot.foreign_keys[0].dependent_columns = vec!["Region".to_string()];
    snapshot.procedures.clear();

    let mut processor = CommandProcessor::new("Update");
    let handle = processor.enqueue(UpdateModelFromDatabaseCommand::new(snapshot));
    let report = processor.invoke(&mut editing).unwrap();
    let summary = handle.output().unwrap();

    // unsupported column, then the constraint it breaks
    assert_eq!(summary.warnings, 2);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[1].message.contains("FK_Order_Customer"));
    let association = summary.associations[0];
    assert_eq!(report.warnings[1].element, Some(association));
    assert!(editing.artifact().contains(association));
    assert_eq!(model::referential_constraint_of(editing.artifact(), association), None);
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn procedures_become_function_imports() {
    let mut editing = empty_editing_context();
    let summary = update(&mut editing, shop_snapshot()).unwrap();
    assert_eq!(summary.function_imports.len(), 2);

    let artifact = editing.artifact();
    let container = artifact.container(ModelSpace::Conceptual);
    let get_customers = artifact
        .find_child(container, ElementKind::FunctionImport, "GetCustomers")
        .unwrap();
    assert!(matches!(
        artifact.element(get_customers).unwrap().data(),
        ElementData::FunctionImport { return_type: FunctionReturn::ComplexType, .. }
    ));
    let result_type = artifact
        .element(get_customers)
        .unwrap()
        .binding_target(edm_artifact::BindingSlot::Type)
        .unwrap();
    assert_eq!(name_of(&editing, result_type), "GetCustomers_Result");
    assert_eq!(model::properties(artifact, result_type).len(), 2);

    let count_orders = artifact
        .find_child(container, ElementKind::FunctionImport, "CountOrders")
        .unwrap();
    assert_eq!(
        artifact.element(count_orders).unwrap().data(),
        &ElementData::FunctionImport {
            return_type: FunctionReturn::Primitive("Int32".to_string()),
            is_composable: false,
        }
    );
    assert_eq!(
        artifact
            .of_kind(ModelSpace::Mapping, ElementKind::FunctionImportMapping)
            .len(),
        2
    );
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn repeated_update_adds_only_new_columns() {
    let mut editing = empty_editing_context();
    update(&mut editing, shop_snapshot()).unwrap();
    let before = editing.artifact().len();

    let mut snapshot = shop_snapshot();
    snapshot.tables[0]
        .columns
        .push(DatabaseColumn::new("Email", "nvarchar"));
    snapshot.foreign_keys.clear();
    let summary = update(&mut editing, snapshot).unwrap();

    assert!(summary.entity_types.is_empty());
    assert_eq!(summary.properties.len(), 1);
    assert!(summary.function_imports.is_empty());
    let customer = conceptual_type(&editing, "Customer");
    let email = model::find_property_in_chain(editing.artifact(), customer, "Email").unwrap();
    assert!(editing.artifact().element(email).unwrap().facets().unwrap().nullable);
    // storage column, conceptual property, scalar mapping
    assert_eq!(editing.artifact().len(), before + 3);
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn new_column_on_unmapped_table_fails() {
    let mut editing = empty_editing_context();
    add_storage_table(&mut editing, "Legacy", &[("Id", "int", true)]);
    let before = editing.artifact().len();

    let snapshot = DatabaseSnapshot {
        tables: vec![table(
            "Legacy",
            vec![DatabaseColumn::new("Id", "int").key(), DatabaseColumn::new("Notes", "ntext")],
        )],
        ..DatabaseSnapshot::default()
    };
    let err = update(&mut editing, snapshot).unwrap_err();

    assert!(matches!(err, CommandError::UpdateModelFromDatabase(_)));
    assert_eq!(editing.artifact().len(), before);
}

#[test]
fn table_without_key_is_skipped_with_warning() {
    let mut editing = empty_editing_context();
    let snapshot = DatabaseSnapshot {
        tables: vec![table("AuditLog", vec![DatabaseColumn::new("Message", "nvarchar")])],
        ..DatabaseSnapshot::default()
    };
    let summary = update(&mut editing, snapshot).unwrap();

    assert_eq!(summary.warnings, 1);
    assert!(summary.entity_types.is_empty());
    let schema = editing.artifact().schema(ModelSpace::Storage);
    assert!(editing.artifact().children_of_kind(schema, ElementKind::EntityType).is_empty());
}

#[test]
fn snapshot_json_drives_the_update() {
    let json = r#"{
        "tables": [
            { "name": "Product", "columns": [
                { "name": "Sku", "store_type": "varchar", "nullable": false, "is_key": true, "max_length": 20 },
                { "name": "Unit Price", "store_type": "decimal" }
            ] }
        ]
    }"#;
    let mut editing = empty_editing_context();
    update(&mut editing, DatabaseSnapshot::from_json_str(json).unwrap()).unwrap();

    let product = conceptual_type(&editing, "Product");
    let artifact = editing.artifact();
    let sku = model::find_property_in_chain(artifact, product, "Sku").unwrap();
    let facets = artifact.element(sku).unwrap().facets().unwrap();
    assert_eq!(facets.type_name.as_deref(), Some("String"));
    assert_eq!(facets.max_length, Some(20));
    assert!(facets.is_key);
    assert!(model::find_property_in_chain(artifact, product, "Unit_Price").is_some());
}

#[test]
fn clashing_column_names_get_distinct_members() {
    let product = || {
        table(
            "Product",
            vec![
                DatabaseColumn::new("Id", "int").key(),
                DatabaseColumn::new("Unit Price", "money"),
                DatabaseColumn::new("Unit_Price", "money"),
            ],
        )
    };
    let mut editing = empty_editing_context();
    let summary = update(
        &mut editing,
        DatabaseSnapshot {
            tables: vec![product()],
            ..DatabaseSnapshot::default()
        },
    )
    .unwrap();
    assert_eq!(summary.properties.len(), 3);
    assert_eq!(summary.warnings, 0);

    let first = storage_column(&editing, "Product", "Unit_Price");
    let second = storage_column(&editing, "Product", "Unit_Price1");
    assert_eq!(store_name(&editing, first), Some("Unit Price".to_string()));
    assert_eq!(store_name(&editing, second), Some("Unit_Price".to_string()));
    let conceptual = conceptual_type(&editing, "Product");
    assert!(model::find_property_in_chain(editing.artifact(), conceptual, "Unit_Price1").is_some());

    let before = editing.artifact().len();
    let mut refreshed = product();
    refreshed.columns.push(DatabaseColumn::new("Unit-Price", "money"));
    let summary = update(
        &mut editing,
        DatabaseSnapshot {
            tables: vec![refreshed],
            ..DatabaseSnapshot::default()
        },
    )
    .unwrap();
    assert_eq!(summary.properties.len(), 1);
    assert_eq!(editing.artifact().len(), before + 3);
    let third = storage_column(&editing, "Product", "Unit_Price2");
    assert_eq!(store_name(&editing, third), Some("Unit-Price".to_string()));
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn view_keys_follow_conceptual_keys() {
    let mut editing = empty_editing_context();
    let snapshot = DatabaseSnapshot {
        tables: vec![DatabaseTable {
            name: "CustomerView".to_string(),
            is_view: true,
            columns: vec![
                DatabaseColumn::new("Id", "int").not_null(),
                DatabaseColumn::new("Name", "nvarchar"),
            ],
        }],
        ..DatabaseSnapshot::default()
    };
    update(&mut editing, snapshot).unwrap();
    let view = conceptual_type(&editing, "CustomerView");
    let name = model::find_property_in_chain(editing.artifact(), view, "Name").unwrap();
    let id = model::find_property_in_chain(editing.artifact(), view, "Id").unwrap();

    let mut processor = CommandProcessor::new("Re-key view");
    processor.enqueue(SetPropertyFacetsCommand::new(name).key(true));
    processor.enqueue(SetPropertyFacetsCommand::new(id).key(false));
    let report = processor.invoke(&mut editing).unwrap();

    assert_eq!(report.rules, vec![("PropagateViewKeysToStorageModel", view)]);
    let artifact = editing.artifact();
    let name_column = artifact.element(storage_column(&editing, "CustomerView", "Name")).unwrap();
    assert!(name_column.is_key());
    assert!(!name_column.facets().unwrap().nullable);
    assert!(!artifact.element(storage_column(&editing, "CustomerView", "Id")).unwrap().is_key());
}

#[test]
fn matching_import_needs_a_storage_function() {
    let mut editing = empty_editing_context();
    let created = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(procedure("Missing", Vec::new())),
    )
    .unwrap();
    assert_eq!(created, None);
}

#[test]
fn composable_functions_are_imported_only_on_request() {
    let mut editing = empty_editing_context();
    CommandProcessor::invoke_single_command(
        &mut editing,
        CreateStorageFunctionCommand::new("TopCustomers").unwrap().composable(true),
    )
    .unwrap();
    let mut top = procedure("TopCustomers", vec![DatabaseColumn::new("Total", "money")]);
    top.is_composable = true;

    let skipped = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(top.clone()),
    )
    .unwrap();
    assert_eq!(skipped, None);

    let created = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(top).allow_composable(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(created.result_type, None);
    assert_eq!(
        editing.artifact().element(created.function_import).unwrap().data(),
        &ElementData::FunctionImport {
            return_type: FunctionReturn::Primitive("Decimal".to_string()),
            is_composable: true,
        }
    );
}

#[test]
fn matching_import_name_override_must_be_free() {
    let mut editing = empty_editing_context();
    for name in ["GetOrders", "ListOrders"] {
        CommandProcessor::invoke_single_command(&mut editing, CreateStorageFunctionCommand::new(name).unwrap()).unwrap();
    }
    CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(procedure("GetOrders", Vec::new())),
    )
    .unwrap()
    .unwrap();

    let err = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(procedure("ListOrders", Vec::new()))
            .with_name("GetOrders")
            .unwrap(),
    )
    .unwrap_err();
    assert!(matches!(err, CommandError::Validation(ValidationFailure::DuplicateName { .. })));

    let renamed = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(procedure("ListOrders", Vec::new()))
            .with_name("AllOrders")
            .unwrap(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(name_of(&editing, renamed.function_import), "AllOrders");
}

#[test]
fn unsupported_result_column_is_skipped_with_warning() {
    let mut editing = empty_editing_context();
    CommandProcessor::invoke_single_command(&mut editing, CreateStorageFunctionCommand::new("Locations").unwrap()).unwrap();

    let mut processor = CommandProcessor::new("Import");
    let handle = processor.enqueue(CreateMatchingFunctionImportCommand::new(procedure(
        "Locations",
        vec![DatabaseColumn::new("Name", "nvarchar"), DatabaseColumn::new("Shape", "geometry")],
    )));
    let report = processor.invoke(&mut editing).unwrap();
    let created = handle.output().unwrap().unwrap();

    let result_type = created.result_type.unwrap();
    assert_eq!(name_of(&editing, result_type), "Locations_Result");
    assert_eq!(model::properties(editing.artifact(), result_type).len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].element, Some(result_type));
    assert_eq!(
        result_columns(&editing, created.type_mapping.unwrap()),
        vec![("Name".to_string(), "Name".to_string())]
    );
}

#[test]
fn single_unsupported_result_column_creates_no_import() {
    let mut editing = empty_editing_context();
    CommandProcessor::invoke_single_command(&mut editing, CreateStorageFunctionCommand::new("Shapes").unwrap()).unwrap();

    let mut processor = CommandProcessor::new("Import");
    let handle = processor.enqueue(CreateMatchingFunctionImportCommand::new(procedure(
        "Shapes",
        vec![DatabaseColumn::new("Shape", "geometry")],
    )));
    let report = processor.invoke(&mut editing).unwrap();

    assert!(matches!(handle.output(), Some(None)));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].message.contains("Shape"));
    let artifact = editing.artifact();
    assert!(artifact
        .of_kind(ModelSpace::Conceptual, ElementKind::FunctionImport)
        .is_empty());
    assert!(artifact
        .of_kind(ModelSpace::Mapping, ElementKind::FunctionImportMapping)
        .is_empty());
}

fn result_columns(editing: &EditingContext, type_mapping: ElementId) -> Vec<(String, String)> {
    let artifact = editing.artifact();
    artifact
        .children_of_kind(type_mapping, ElementKind::ResultScalarProperty)
        .into_iter()
        .map(|scalar| {
            let element = artifact.element(scalar).unwrap();
            let property = element.binding_target(edm_artifact::BindingSlot::Property).unwrap();
            let ElementData::ResultScalarProperty { column } = element.data() else {
                panic!("not a result scalar property");
            };
            (name_of(editing, property), column.clone())
        })
        .collect()
}

#[test]
fn generated_result_type_records_its_columns() {
    let mut editing = empty_editing_context();
    CommandProcessor::invoke_single_command(&mut editing, CreateStorageFunctionCommand::new("OrderTotals").unwrap()).unwrap();

    let created = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(procedure(
            "OrderTotals",
            vec![
                DatabaseColumn::new("Order Id", "int"),
                DatabaseColumn::new("Order_Id", "int"),
                DatabaseColumn::new("Total", "money"),
            ],
        )),
    )
    .unwrap()
    .unwrap();

    let type_mapping = created.type_mapping.unwrap();
    let artifact = editing.artifact();
    assert_eq!(artifact.element(type_mapping).unwrap().parent(), Some(created.mapping));
    assert_eq!(
        artifact
            .element(type_mapping)
            .unwrap()
            .binding_target(edm_artifact::BindingSlot::Type),
        created.result_type
    );
    assert_eq!(
        result_columns(&editing, type_mapping),
        vec![
            ("Order_Id".to_string(), "Order Id".to_string()),
            ("Order_Id1".to_string(), "Order_Id".to_string()),
            ("Total".to_string(), "Total".to_string()),
        ]
    );
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn existing_result_type_is_mapped_by_column_name() {
    let mut editing = empty_editing_context();
    CommandProcessor::invoke_single_command(&mut editing, CreateStorageFunctionCommand::new("TopProducts").unwrap()).unwrap();
    let summary = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateComplexTypeCommand::new("ProductSummary").unwrap(),
    )
    .unwrap();
    for (name, type_name) in [("Product_Name", "String"), ("Rank", "Int32")] {
        CommandProcessor::invoke_single_command(
            &mut editing,
            CreatePropertyCommand::new(name, summary, PropertyType::primitive(type_name)).unwrap(),
        )
        .unwrap();
    }

    let created = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateMatchingFunctionImportCommand::new(procedure(
            "TopProducts",
            vec![DatabaseColumn::new("Product Name", "nvarchar")],
        ))
        .with_return_type(ImportReturnType::ComplexType(summary)),
    )
    .unwrap()
    .unwrap();

    assert_eq!(created.result_type, None);
    let type_mapping = created.type_mapping.unwrap();
    assert_eq!(
        result_columns(&editing, type_mapping),
        vec![
            ("Product_Name".to_string(), "Product Name".to_string()),
            ("Rank".to_string(), "Rank".to_string()),
        ]
    );
}

#[test]
fn deleting_a_result_property_drops_its_column_mapping() {
    let mut editing = empty_editing_context();
    update(&mut editing, shop_snapshot()).unwrap();
    let artifact = editing.artifact();
    let result_type = artifact
        .find_child(
            artifact.schema(ModelSpace::Conceptual),
            ElementKind::ComplexType,
            "GetCustomers_Result",
        )
        .unwrap();
    let type_mapping = artifact
        .of_kind(ModelSpace::Mapping, ElementKind::FunctionImportTypeMapping)[0];
    assert_eq!(result_columns(&editing, type_mapping).len(), 2);
    let name = model::find_property_in_chain(artifact, result_type, "Name").unwrap();

    CommandProcessor::invoke_single_command(&mut editing, DeleteEFElementCommand::new(name)).unwrap();

    assert_eq!(
        result_columns(&editing, type_mapping),
        vec![("Id".to_string(), "Id".to_string())]
    );
    assert_all_bindings_known(editing.artifacts());
}

#[test]
fn result_type_mapping_is_created_once() {
    let mut editing = empty_editing_context();
    update(&mut editing, shop_snapshot()).unwrap();
    let artifact = editing.artifact();
    let type_mapping = artifact
        .of_kind(ModelSpace::Mapping, ElementKind::FunctionImportTypeMapping)[0];
    let mapping = artifact.element(type_mapping).unwrap().parent().unwrap();
    let result_type = artifact
        .element(type_mapping)
        .unwrap()
        .binding_target(edm_artifact::BindingSlot::Type)
        .unwrap();
    let before = artifact.len();

    let again = CommandProcessor::invoke_single_command(
        &mut editing,
        CreateFunctionImportTypeMappingCommand::new(mapping, result_type)
            .with_default_scalar_properties(Default::default()),
    )
    .unwrap();

    assert_eq!(again, type_mapping);
    assert_eq!(editing.artifact().len(), before);
}
