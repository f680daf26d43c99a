//! Reconciling the model with a database description
//!
//! The database side is handed in as a [`DatabaseSnapshot`], usually
//! deserialized from JSON produced by a schema reader.

use crate::command::Command;
use crate::commands::association::{CreateConceptualAssociationCommand, CreateReferentialConstraintCommand};
use crate::commands::entity::{CreateEntitySetCommand, CreateEntityTypeCommand};
use crate::commands::function_import::{CreateMatchingFunctionImportCommand, CreateStorageFunctionCommand};
use crate::commands::mapping::CreateFragmentScalarPropertyCommand;
use crate::commands::property::{CreatePropertyCommand, PropertyType};
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult, UpdateWarning};
use crate::model;
use crate::rules::{IntegrityRule, PropagateViewKeysToStorageModel};
use edm_artifact::{primitive, Artifact, ElementId, ElementKind, ModelSpace, Multiplicity, StoreGeneratedPattern};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Tables, views, foreign keys and procedures read from a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    /// Tables and views
    #[serde(default)]
    pub tables: Vec<DatabaseTable>,
    /// Foreign keys between the tables
    #[serde(default)]
    pub foreign_keys: Vec<DatabaseForeignKey>,
    /// Procedures and database functions
    #[serde(default)]
    pub procedures: Vec<DatabaseProcedure>,
}

impl DatabaseSnapshot {
    /// Parse a snapshot from JSON
    ///
    /// # Errors
    /// Returns an update error if the JSON does not describe a snapshot
    pub fn from_json_str(json: &str) -> CommandResult<Self> {
        serde_json::from_str(json).map_err(|e| CommandError::UpdateModelFromDatabase(e.to_string()))
    }
}

/// Table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseTable {
    /// Table name as the database spells it
    pub name: String,
    /// Views get their keys propagated from the conceptual model
    #[serde(default)]
    pub is_view: bool,
    /// Columns in declaration order
    pub columns: Vec<DatabaseColumn>,
}

/// Column of a table, view or procedure result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseColumn {
    /// Column name as the database spells it
    pub name: String,
    /// Database type name, e.g. `nvarchar`
    pub store_type: String,
    /// Defaults to true
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Part of the primary key
    #[serde(default)]
    pub is_key: bool,
    /// Value generated on insert
    #[serde(default)]
    pub is_identity: bool,
    /// Declared length for string and binary types
    #[serde(default)]
    pub max_length: Option<u32>,
}

fn default_nullable() -> bool {
    true
}

impl DatabaseColumn {
    /// Nullable column of `store_type`
    #[must_use]
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            nullable: true,
            is_key: false,
            is_identity: false,
            max_length: None,
        }
    }

    /// Primary-key column
    #[must_use]
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self.nullable = false;
        self
    }

    /// Identity column
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Non-nullable column
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Foreign key between two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseForeignKey {
    /// Constraint name, used for the association
    pub name: String,
    /// Referenced table
    pub principal_table: String,
    /// Referenced key columns
    pub principal_columns: Vec<String>,
    /// Referencing table
    pub dependent_table: String,
    /// Referencing columns, paired with `principal_columns`
    pub dependent_columns: Vec<String>,
}

/// Stored procedure or function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseProcedure {
    /// Procedure name as the database spells it
    pub name: String,
    /// Owning database schema
    #[serde(default)]
    pub schema: Option<String>,
    /// Usable inside queries
    #[serde(default)]
    pub is_composable: bool,
    /// Result-set columns
    #[serde(default)]
    pub columns: Vec<DatabaseColumn>,
}

/// What an update added to the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// New conceptual entity types
    pub entity_types: Vec<ElementId>,
    /// New conceptual properties
    pub properties: Vec<ElementId>,
    /// New conceptual associations
    pub associations: Vec<ElementId>,
    /// New function imports
    pub function_imports: Vec<ElementId>,
    /// Number of warnings recorded
    pub warnings: usize,
}

/// Map a database name onto an identifier
///
/// Characters that cannot appear in an identifier become `_`, and a leading
/// digit gets an `_` prefix.
#[must_use]
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Tables added in this run: column name -> (storage column, conceptual property)
#[derive(Debug)]
struct AddedTable {
    entity_type: ElementId,
    columns: BTreeMap<String, (ElementId, Option<ElementId>)>,
}

/// Bring the storage, conceptual and mapping models up to date with a
/// database snapshot
///
/// New tables get storage and conceptual entity types, entity sets and
/// mappings; new columns on known tables get properties and mappings;
/// foreign keys between tables added in this run become associations with
/// referential constraints; procedures become storage functions with
/// matching function imports. Problems that only affect one constraint or
/// column are recorded as warnings.
#[derive(Debug, Clone)]
pub struct UpdateModelFromDatabaseCommand {
    snapshot: DatabaseSnapshot,
}

impl UpdateModelFromDatabaseCommand {
    /// Reconcile the model with `snapshot`
    #[must_use]
    pub fn new(snapshot: DatabaseSnapshot) -> Self {
        Self { snapshot }
    }

    fn add_table(
        cpc: &mut CommandProcessorContext<'_>,
        table: &DatabaseTable,
        summary: &mut UpdateSummary,
    ) -> CommandResult<Option<AddedTable>> {
        let name = sanitize_identifier(&table.name);
        let mut keys: BTreeSet<&str> = table
            .columns
            .iter()
            .filter(|c| c.is_key)
            .map(|c| c.name.as_str())
            .collect();
        if keys.is_empty() && table.is_view {
            keys = table
                .columns
                .iter()
                .filter(|c| !c.nullable)
                .map(|c| c.name.as_str())
                .collect();
        }
        if keys.is_empty() {
            summary.warnings += 1;
            cpc.warn(UpdateWarning::new(
                format!("table '{}' has no primary key and was not imported", table.name),
                None,
            ));
            return Ok(None);
        }
        let unsupported_key = table.columns.iter().find(|c| {
            keys.contains(c.name.as_str()) && primitive::edm_type_for_store(&c.store_type).is_none()
        });
        if let Some(column) = unsupported_key {
            summary.warnings += 1;
            cpc.warn(UpdateWarning::new(
                format!(
                    "key column '{}' of '{}' has unsupported type '{}'; table not imported",
                    column.name, table.name, column.store_type
                ),
                None,
            ));
            return Ok(None);
        }

        let store_type = cpc.invoke_single_command(CreateEntityTypeCommand::new(&name, ModelSpace::Storage)?)?;
        let mut store_set_command = CreateEntitySetCommand::new(&name, store_type)?;
        if table.is_view {
            store_set_command = store_set_command.as_view();
        }
        cpc.invoke_single_command(store_set_command)?;

        let entity_type = cpc.invoke_single_command(
            CreateEntityTypeCommand::new(&name, ModelSpace::Conceptual)?.with_unique_name(),
        )?;
        cpc.invoke_single_command(CreateEntitySetCommand::with_default_name(entity_type))?;
        summary.entity_types.push(entity_type);

        let mut added = AddedTable {
            entity_type,
            columns: BTreeMap::new(),
        };
        for column in &table.columns {
            let is_key = keys.contains(column.name.as_str());
            let column_name = unique_member_name(cpc, store_type, &sanitize_identifier(&column.name));
            let mut store_column =
                CreatePropertyCommand::new(&column_name, store_type, PropertyType::primitive(&column.store_type))?
                    .with_store_name(&column.name)
                    .with_nullable(column.nullable && !is_key);
            if is_key {
                store_column = store_column.key();
            }
            if column.is_identity {
                store_column = store_column.with_store_generated(StoreGeneratedPattern::Identity);
            }
            if let Some(max_length) = column.max_length {
                store_column = store_column.with_max_length(max_length);
            }
            let store_column = cpc.invoke_single_command(store_column)?;
            let property = Self::add_conceptual_property(cpc, entity_type, column, is_key, store_column, summary)?;
            added
                .columns
                .insert(column.name.clone(), (store_column, property));
        }
        if table.is_view {
            PropagateViewKeysToStorageModel::add_rule(cpc, entity_type);
        }
        Ok(Some(added))
    }

    /// Conceptual property and its scalar mapping for a new column
    fn add_conceptual_property(
        cpc: &mut CommandProcessorContext<'_>,
        entity_type: ElementId,
        column: &DatabaseColumn,
        is_key: bool,
        store_column: ElementId,
        summary: &mut UpdateSummary,
    ) -> CommandResult<Option<ElementId>> {
        let Some(edm) = primitive::edm_type_for_store(&column.store_type) else {
            summary.warnings += 1;
            cpc.warn(UpdateWarning::new(
                format!(
                    "column '{}' has unsupported type '{}' and was not mapped",
                    column.name, column.store_type
                ),
                Some(store_column),
            ));
            return Ok(None);
        };
        let name = unique_member_name(cpc, entity_type, &sanitize_identifier(&column.name));
        let mut command = CreatePropertyCommand::new(name, entity_type, PropertyType::primitive(edm))?
            .with_nullable(column.nullable && !is_key);
        if is_key {
            command = command.key();
        }
        if column.is_identity {
            command = command.with_store_generated(StoreGeneratedPattern::Identity);
        }
        if let Some(max_length) = column.max_length {
            command = command.with_max_length(max_length);
        }
        let property = cpc.invoke_single_command(command)?;
        cpc.invoke_single_command(CreateFragmentScalarPropertyCommand::new(entity_type, property, store_column))?;
        summary.properties.push(property);
        Ok(Some(property))
    }

    fn add_columns(
        cpc: &mut CommandProcessorContext<'_>,
        table: &DatabaseTable,
        store_type: ElementId,
        summary: &mut UpdateSummary,
    ) -> CommandResult<()> {
        let new_columns: Vec<&DatabaseColumn> = table
            .columns
            .iter()
            .filter(|c| find_store_column(cpc.artifact(), store_type, &c.name).is_none())
            .collect();
        if new_columns.is_empty() {
            return Ok(());
        }

        let mapped = model::store_entity_set_of(cpc.artifacts(), store_type)
            .map(|set| model::types_mapped_to(cpc.artifacts(), set))
            .unwrap_or_default();
        let Some(entity_type) = mapped.first().copied() else {
            return Err(CommandError::UpdateModelFromDatabase(format!(
                "no conceptual entity type is mapped to table '{}'",
                table.name
            )));
        };

        for column in new_columns {
            let column_name = unique_member_name(cpc, store_type, &sanitize_identifier(&column.name));
            let store_column = cpc.invoke_single_command(
                CreatePropertyCommand::new(column_name, store_type, PropertyType::primitive(&column.store_type))?
                    .with_store_name(&column.name)
                    .with_nullable(column.nullable),
            )?;
            Self::add_conceptual_property(cpc, entity_type, column, false, store_column, summary)?;
        }
        if table.is_view {
            PropagateViewKeysToStorageModel::add_rule(cpc, entity_type);
        }
        Ok(())
    }

    fn add_foreign_key(
        cpc: &mut CommandProcessorContext<'_>,
        fk: &DatabaseForeignKey,
        added: &BTreeMap<String, AddedTable>,
        summary: &mut UpdateSummary,
    ) -> CommandResult<()> {
        let (Some(principal), Some(dependent)) = (added.get(&fk.principal_table), added.get(&fk.dependent_table)) else {
            debug!(foreign_key = %fk.name, "foreign key between existing tables skipped");
            return Ok(());
        };
        let nullable_dependent = fk.dependent_columns.iter().any(|name| {
            dependent
                .columns
                .get(name)
                .and_then(|(column, _)| cpc.artifact().get(*column))
                .and_then(|c| c.facets())
                .is_some_and(|f| f.nullable)
        });
        let principal_multiplicity = if nullable_dependent {
            Multiplicity::ZeroOrOne
        } else {
            Multiplicity::One
        };

        let principal_name = model::display_name(cpc.artifact(), principal.entity_type);
        let dependent_name = model::display_name(cpc.artifact(), dependent.entity_type);
        let to_dependents = cpc.config().entity_set_suffix.apply(&dependent_name);
        let to_dependents = unique_member_name(cpc, principal.entity_type, &to_dependents);
        let to_principal = unique_member_name(cpc, dependent.entity_type, &principal_name);

        let association = cpc.invoke_single_command(
            CreateConceptualAssociationCommand::new(
                sanitize_identifier(&fk.name),
                principal.entity_type,
                principal_multiplicity,
                dependent.entity_type,
                Multiplicity::Many,
            )?
            .with_unique_name()
            .with_navigation_properties(Some(&to_dependents), Some(&to_principal))?,
        )?;
        summary.associations.push(association.association);

        let lookup = |table: &AddedTable, names: &[String]| -> Option<Vec<ElementId>> {
            names
                .iter()
                .map(|n| table.columns.get(n).and_then(|(_, property)| *property))
                .collect()
        };
        let (Some(principal_properties), Some(dependent_properties)) =
            (lookup(principal, &fk.principal_columns), lookup(dependent, &fk.dependent_columns))
        else {
            summary.warnings += 1;
            cpc.warn(UpdateWarning::new(
                format!(
                    "referential constraint for '{}' skipped: columns could not be matched to properties",
                    fk.name
                ),
                Some(association.association),
            ));
            return Ok(());
        };

        let constraint = CreateReferentialConstraintCommand::new(
            association.ends[0],
            association.ends[1],
            principal_properties,
            dependent_properties,
        )
        .and_then(|command| cpc.invoke_single_command(command));
        match constraint {
            Ok(_) => Ok(()),
            Err(err) if err.is_recoverable() => {
                summary.warnings += 1;
                cpc.warn(UpdateWarning::new(
                    format!("referential constraint for '{}' skipped: {err}", fk.name),
                    Some(association.association),
                ));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn add_procedure(
        cpc: &mut CommandProcessorContext<'_>,
        procedure: &DatabaseProcedure,
        summary: &mut UpdateSummary,
    ) -> CommandResult<()> {
        let name = sanitize_identifier(&procedure.name);
        let schema = cpc.artifact().schema(ModelSpace::Storage);
        if cpc
            .artifact()
            .find_child(schema, ElementKind::Function, &name)
            .is_none()
        {
            let mut function = CreateStorageFunctionCommand::new(&name)?.composable(procedure.is_composable);
            if let Some(store_schema) = &procedure.schema {
                function = function.with_store_schema(store_schema);
            }
            cpc.invoke_single_command(function)?;
        } else if cpc
            .artifact()
            .find_child(
                cpc.artifact().container(ModelSpace::Conceptual),
                ElementKind::FunctionImport,
                &name,
            )
            .is_some()
        {
            debug!(procedure = %procedure.name, "function import already present");
            return Ok(());
        }
        if let Some(created) = cpc.invoke_single_command(CreateMatchingFunctionImportCommand::new(procedure.clone()))? {
            summary.function_imports.push(created.function_import);
        }
        Ok(())
    }
}

/// Storage column of `store_type` read from database column `db_name`
fn find_store_column(artifact: &Artifact, store_type: ElementId, db_name: &str) -> Option<ElementId> {
    let sanitized = sanitize_identifier(db_name);
    artifact
        .children_of_kind(store_type, ElementKind::Property)
        .into_iter()
        .find(|column| {
            artifact.get(*column).is_some_and(|e| match e.facets().and_then(|f| f.store_name.as_deref()) {
                Some(store_name) => store_name == db_name,
                None => e.name() == Some(sanitized.as_str()),
            })
        })
}

/// `base`, or `base1`, `base2`, ... if a member in the chain already uses it
fn unique_member_name(cpc: &CommandProcessorContext<'_>, owner: ElementId, base: &str) -> String {
    let taken = model::member_names_in_chain(cpc.artifacts(), owner);
    let owner_name = model::display_name(cpc.artifact(), owner);
    let free = |candidate: &str| !taken.contains(candidate) && candidate != owner_name;
    if free(base) {
        return base.to_string();
    }
    (1u32..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| free(candidate))
        .unwrap_or_else(|| base.to_string())
}

impl Command for UpdateModelFromDatabaseCommand {
    type Output = UpdateSummary;

    fn name(&self) -> &'static str {
        "UpdateModelFromDatabase"
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<UpdateSummary> {
        let mut summary = UpdateSummary::default();
        let storage_schema = cpc.artifact().schema(ModelSpace::Storage);
        let mut added = BTreeMap::new();

        for table in &self.snapshot.tables {
            let existing = cpc.artifact().find_child(
                storage_schema,
                ElementKind::EntityType,
                &sanitize_identifier(&table.name),
            );
            match existing {
                Some(store_type) => Self::add_columns(cpc, table, store_type, &mut summary)?,
                None => {
                    if let Some(table_added) = Self::add_table(cpc, table, &mut summary)? {
                        added.insert(table.name.clone(), table_added);
                    }
                }
            }
        }
        for fk in &self.snapshot.foreign_keys {
            Self::add_foreign_key(cpc, fk, &added, &mut summary)?;
        }
        for procedure in &self.snapshot.procedures {
            Self::add_procedure(cpc, procedure, &mut summary)?;
        }

        info!(
            entity_types = summary.entity_types.len(),
            properties = summary.properties.len(),
            associations = summary.associations.len(),
            function_imports = summary.function_imports.len(),
            warnings = summary.warnings,
            "model updated from database"
        );
        Ok(summary)
    }
}
