//! Storage functions, function imports and matching imports for procedures

use crate::command::Command;
use crate::commands::entity::CreateComplexTypeCommand;
use crate::commands::mapping::{CreateFunctionImportMappingCommand, CreateFunctionImportTypeMappingCommand};
use crate::commands::property::{CreatePropertyCommand, PropertyType};
use crate::commands::update_from_db::{sanitize_identifier, DatabaseColumn, DatabaseProcedure};
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult, UpdateWarning};
use crate::model;
use crate::validation::CommandValidation;
use edm_artifact::{primitive, BindingSlot, ElementData, ElementId, ElementKind, FunctionReturn, ModelSpace};
use std::collections::BTreeSet;
use tracing::debug;

/// Create a function (stored procedure) in the storage schema
#[derive(Debug, Clone)]
pub struct CreateStorageFunctionCommand {
    name: String,
    store_schema: Option<String>,
    is_composable: bool,
}

impl CreateStorageFunctionCommand {
    /// Function `name`
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn new(name: impl Into<String>) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        Ok(Self {
            name,
            store_schema: None,
            is_composable: false,
        })
    }

    /// Database schema owning the procedure
    #[must_use]
    pub fn with_store_schema(mut self, schema: impl Into<String>) -> Self {
        self.store_schema = Some(schema.into());
        self
    }

    /// Composable (table- or scalar-valued function)
    #[must_use]
    pub fn composable(mut self, is_composable: bool) -> Self {
        self.is_composable = is_composable;
        self
    }
}

impl Command for CreateStorageFunctionCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateStorageFunction"
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let schema = cpc.artifact().schema(ModelSpace::Storage);
        CommandValidation::validate_unique_child(cpc.artifact(), schema, &self.name)?;
        Ok(cpc.artifacts_mut().add_element(
            schema,
            Some(&self.name),
            ElementData::Function {
                store_schema: self.store_schema.clone(),
                is_composable: self.is_composable,
            },
        )?)
    }
}

/// Return type of a function import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportReturnType {
    /// No result set
    None,

    /// Collection of a primitive
    Primitive(String),

    /// Collection of a complex type
    ComplexType(ElementId),

    /// Collection of an entity type, drawn from its entity set
    EntityType(ElementId),
}

/// Create a function import in the conceptual container
#[derive(Debug, Clone)]
pub struct CreateFunctionImportCommand {
    name: String,
    return_type: ImportReturnType,
    is_composable: bool,
}

impl CreateFunctionImportCommand {
    /// Function import `name` returning `return_type`
    ///
    /// # Errors
    /// Returns a validation error for a bad name or unknown primitive
    pub fn new(name: impl Into<String>, return_type: ImportReturnType) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        if let ImportReturnType::Primitive(type_name) = &return_type {
            CommandValidation::validate_primitive(type_name)?;
        }
        Ok(Self {
            name,
            return_type,
            is_composable: false,
        })
    }

    /// Mark composable
    #[must_use]
    pub fn composable(mut self, is_composable: bool) -> Self {
        self.is_composable = is_composable;
        self
    }
}

impl Command for CreateFunctionImportCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateFunctionImport"
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let container = cpc.artifact().container(ModelSpace::Conceptual);
        CommandValidation::validate_unique_child(cpc.artifact(), container, &self.name)?;

        let (return_type, target, entity_set) = match &self.return_type {
            ImportReturnType::None => (FunctionReturn::None, None, None),
            ImportReturnType::Primitive(name) => (FunctionReturn::Primitive(name.clone()), None, None),
            ImportReturnType::ComplexType(complex) => {
                CommandValidation::validate_in_space(
                    cpc.artifact(),
                    *complex,
                    ElementKind::ComplexType,
                    ModelSpace::Conceptual,
                    self.name(),
                )?;
                (FunctionReturn::ComplexType, Some(*complex), None)
            }
            ImportReturnType::EntityType(entity_type) => {
                CommandValidation::validate_conceptual_entity_type(cpc.artifact(), *entity_type, self.name())?;
                let set = model::entity_set_of(cpc.artifacts(), *entity_type).ok_or_else(|| {
                    CommandError::missing_reference(
                        self.name(),
                        format!("entity set of '{}'", model::display_name(cpc.artifact(), *entity_type)),
                    )
                })?;
                (FunctionReturn::EntityType, Some(*entity_type), Some(set))
            }
        };

        let import = cpc.artifacts_mut().add_element(
            container,
            Some(&self.name),
            ElementData::FunctionImport {
                return_type,
                is_composable: self.is_composable,
            },
        )?;
        if let Some(target) = target {
            cpc.artifacts_mut().bind_to(import, BindingSlot::Type, target)?;
        }
        if let Some(set) = entity_set {
            cpc.artifacts_mut().bind_to(import, BindingSlot::EntitySet, set)?;
        }
        Ok(import)
    }
}

/// Elements created by [`CreateMatchingFunctionImportCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingFunctionImport {
    /// The new function import
    pub function_import: ElementId,
    /// Its mapping onto the storage function
    pub mapping: ElementId,
    /// Complex type generated for a multi-column result
    pub result_type: Option<ElementId>,
    /// Result-type mapping, present when the import returns a complex type
    pub type_mapping: Option<ElementId>,
}

/// Create a function import (and its mapping) for a database procedure
///
/// Produces nothing when the storage model has no matching function, when
/// the function is composable and composable imports were not requested,
/// when a composable function has no result set, or when a single result
/// column has a type with no EDM counterpart. Complex results also get a
/// result-type mapping recording the column behind each property.
#[derive(Debug, Clone)]
pub struct CreateMatchingFunctionImportCommand {
    procedure: DatabaseProcedure,
    name_override: Option<String>,
    return_override: Option<ImportReturnType>,
    allow_composable: bool,
}

impl CreateMatchingFunctionImportCommand {
    /// Import for `procedure`, named after its storage function
    #[must_use]
    pub fn new(procedure: DatabaseProcedure) -> Self {
        Self {
            procedure,
            name_override: None,
            return_override: None,
            allow_composable: false,
        }
    }

    /// Use `name` for the import instead of a unique name derived from the
    /// function
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn with_name(mut self, name: impl Into<String>) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        self.name_override = Some(name);
        Ok(self)
    }

    /// Use `return_type` instead of deriving it from the result columns
    #[must_use]
    pub fn with_return_type(mut self, return_type: ImportReturnType) -> Self {
        self.return_override = Some(return_type);
        self
    }

    /// Also import composable functions
    #[must_use]
    pub fn allow_composable(mut self) -> Self {
        self.allow_composable = true;
        self
    }

    /// Return type for the import, and the complex type generated for it
    ///
    /// `None` when the result set cannot be described, which means no
    /// import is created.
    fn derive_return_type(
        &self,
        cpc: &mut CommandProcessorContext<'_>,
        import_name: &str,
        property_names: &[String],
    ) -> CommandResult<Option<(ImportReturnType, Option<ElementId>)>> {
        if let Some(explicit) = &self.return_override {
            return Ok(Some((explicit.clone(), None)));
        }
        match self.procedure.columns.as_slice() {
            [] => Ok(Some((ImportReturnType::None, None))),
            [column] => match primitive::edm_type_for_store(&column.store_type) {
                Some(edm) => Ok(Some((ImportReturnType::Primitive(edm.to_string()), None))),
                None => {
                    cpc.warn(UpdateWarning::new(
                        format!(
                            "result column '{}' of '{}' has unsupported type '{}'; no function import created",
                            column.name, self.procedure.name, column.store_type
                        ),
                        None,
                    ));
                    Ok(None)
                }
            },
            columns => {
                let complex = cpc.invoke_single_command(
                    CreateComplexTypeCommand::new(format!("{import_name}_Result"))?.with_unique_name(),
                )?;
                for (column, property_name) in columns.iter().zip(property_names) {
                    let Some(edm) = primitive::edm_type_for_store(&column.store_type) else {
                        cpc.warn(UpdateWarning::new(
                            format!(
                                "result column '{}' of '{}' has unsupported type '{}' and was skipped",
                                column.name, self.procedure.name, column.store_type
                            ),
                            Some(complex),
                        ));
                        continue;
                    };
                    cpc.invoke_single_command(
                        CreatePropertyCommand::new(property_name.as_str(), complex, PropertyType::primitive(edm))?
                            .with_nullable(column.nullable),
                    )?;
                }
                Ok(Some((ImportReturnType::ComplexType(complex), Some(complex))))
            }
        }
    }
}

/// Property name for each result column: sanitized, numbered on clashes
fn result_property_names(columns: &[DatabaseColumn]) -> Vec<String> {
    let mut taken = BTreeSet::new();
    columns
        .iter()
        .map(|column| {
            let base = sanitize_identifier(&column.name);
            let name = std::iter::once(base.clone())
                .chain((1u32..).map(|n| format!("{base}{n}")))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or(base);
            taken.insert(name.clone());
            name
        })
        .collect()
}

impl Command for CreateMatchingFunctionImportCommand {
    type Output = Option<MatchingFunctionImport>;

    fn name(&self) -> &'static str {
        "CreateMatchingFunctionImport"
    }

    fn invoke_internal(
        &mut self,
        cpc: &mut CommandProcessorContext<'_>,
    ) -> CommandResult<Option<MatchingFunctionImport>> {
        let storage_schema = cpc.artifact().schema(ModelSpace::Storage);
        let function_name = sanitize_identifier(&self.procedure.name);
        let Some(function) = cpc
            .artifact()
            .find_child(storage_schema, ElementKind::Function, &function_name)
        else {
            debug!(procedure = %self.procedure.name, "no matching storage function");
            return Ok(None);
        };
        let is_composable = matches!(
            cpc.artifact().element(function)?.data(),
            ElementData::Function { is_composable: true, .. }
        );
        if is_composable && !self.allow_composable {
            debug!(procedure = %self.procedure.name, "composable function not imported");
            return Ok(None);
        }

        let container = cpc.artifact().container(ModelSpace::Conceptual);
        let import_name = match &self.name_override {
            Some(name) => {
                CommandValidation::validate_unique_child(cpc.artifact(), container, name)?;
                name.clone()
            }
            None => cpc.artifacts().unique_name(container, &function_name),
        };

        if is_composable && self.procedure.columns.is_empty() && self.return_override.is_none() {
            debug!(procedure = %self.procedure.name, "composable function without result set not imported");
            return Ok(None);
        }
        let property_names = result_property_names(&self.procedure.columns);
        let Some((return_type, result_type)) = self.derive_return_type(cpc, &import_name, &property_names)? else {
            return Ok(None);
        };
        if is_composable && return_type == ImportReturnType::None {
            return Ok(None);
        }
        let mapped_type = match &return_type {
            ImportReturnType::ComplexType(complex) => Some(*complex),
            _ => None,
        };

        let function_import = cpc.invoke_single_command(
            CreateFunctionImportCommand::new(import_name, return_type)?.composable(is_composable),
        )?;
        let mapping = cpc.invoke_single_command(CreateFunctionImportMappingCommand::new(function_import, function))?;
        let type_mapping = match mapped_type {
            Some(complex) => {
                let column_names = property_names
                    .into_iter()
                    .zip(self.procedure.columns.iter().map(|c| c.name.clone()))
                    .collect();
                Some(cpc.invoke_single_command(
                    CreateFunctionImportTypeMappingCommand::new(mapping, complex)
                        .with_default_scalar_properties(column_names),
                )?)
            }
            None => None,
        };
        Ok(Some(MatchingFunctionImport {
            function_import,
            mapping,
            result_type,
            type_mapping,
        }))
    }
}
