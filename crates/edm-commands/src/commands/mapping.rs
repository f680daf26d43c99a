//! Mapping commands
//!
//! All of these are find-or-create: running one twice against the same
//! model returns the element created the first time.

use crate::command::Command;
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult};
use crate::model;
use crate::prereq::{CommandId, Deferred};
use crate::rules::{IntegrityRule, InferReferentialConstraints};
use crate::validation::CommandValidation;
use edm_artifact::{Artifact, BindingSlot, ElementData, ElementId, ElementKind, ModelSpace};
use std::collections::BTreeMap;

/// Child of `parent` of `kind` whose binding in `slot` targets `target`
fn find_bound_child(
    artifact: &Artifact,
    parent: ElementId,
    kind: ElementKind,
    slot: BindingSlot,
    target: ElementId,
) -> Option<ElementId> {
    artifact
        .children_of_kind(parent, kind)
        .into_iter()
        .find(|child| artifact.get(*child).and_then(|e| e.binding_target(slot)) == Some(target))
}

/// Find or create the mapping of a conceptual entity set
#[derive(Debug, Clone)]
pub struct CreateEntitySetMappingCommand {
    entity_set: Deferred<ElementId>,
}

impl CreateEntitySetMappingCommand {
    /// Mapping of `entity_set`
    #[must_use]
    pub fn new(entity_set: impl Into<Deferred<ElementId>>) -> Self {
        Self {
            entity_set: entity_set.into(),
        }
    }
}

impl Command for CreateEntitySetMappingCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateEntitySetMapping"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.entity_set.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.entity_set.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let entity_set = self.entity_set.require("entity set")?;
        CommandValidation::validate_in_space(
            cpc.artifact(),
            entity_set,
            ElementKind::EntitySet,
            ModelSpace::Conceptual,
            self.name(),
        )?;
        if let Some(existing) = model::entity_set_mapping_of(cpc.artifacts(), entity_set) {
            return Ok(existing);
        }
        let root = cpc.artifact().container(ModelSpace::Mapping);
        let mapping = cpc
            .artifacts_mut()
            .add_element(root, None, ElementData::EntitySetMapping)?;
        cpc.artifacts_mut()
            .bind_to(mapping, BindingSlot::EntitySet, entity_set)?;
        Ok(mapping)
    }
}

/// Find or create the mapping of a conceptual entity type
///
/// The mapping is placed under the entity-set mapping of the type's root
/// entity set, which is created if needed.
#[derive(Debug, Clone)]
pub struct CreateEntityTypeMappingCommand {
    entity_type: Deferred<ElementId>,
}

impl CreateEntityTypeMappingCommand {
    /// Mapping of `entity_type` under its set's mapping
    #[must_use]
    pub fn new(entity_type: impl Into<Deferred<ElementId>>) -> Self {
        Self {
            entity_type: entity_type.into(),
        }
    }
}

impl Command for CreateEntityTypeMappingCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateEntityTypeMapping"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.entity_type.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.entity_type.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let entity_type = self.entity_type.require("entity type")?;
        CommandValidation::validate_conceptual_entity_type(cpc.artifact(), entity_type, self.name())?;
        let entity_set = model::entity_set_of(cpc.artifacts(), entity_type).ok_or_else(|| {
            CommandError::missing_reference(
                self.name(),
                format!("entity set of '{}'", model::display_name(cpc.artifact(), entity_type)),
            )
        })?;
        let set_mapping = cpc.invoke_single_command(CreateEntitySetMappingCommand::new(entity_set))?;
        if let Some(existing) = find_bound_child(
            cpc.artifact(),
            set_mapping,
            ElementKind::EntityTypeMapping,
            BindingSlot::Type,
            entity_type,
        ) {
            return Ok(existing);
        }

        let in_hierarchy = model::hierarchy(cpc.artifacts(), entity_type).len() > 1;
        let mapping = cpc.artifacts_mut().add_element(
            set_mapping,
            None,
            ElementData::EntityTypeMapping {
                is_type_of: in_hierarchy,
            },
        )?;
        cpc.artifacts_mut()
            .bind_to(mapping, BindingSlot::Type, entity_type)?;
        Ok(mapping)
    }
}

/// Find or create the fragment mapping a type mapping onto a storage set
#[derive(Debug, Clone)]
pub struct CreateMappingFragmentCommand {
    type_mapping: Deferred<ElementId>,
    store_entity_set: Deferred<ElementId>,
}

impl CreateMappingFragmentCommand {
    /// Fragment of `type_mapping` onto a storage set
    #[must_use]
    pub fn new(
        type_mapping: impl Into<Deferred<ElementId>>,
        store_entity_set: impl Into<Deferred<ElementId>>,
    ) -> Self {
        Self {
            type_mapping: type_mapping.into(),
            store_entity_set: store_entity_set.into(),
        }
    }
}

impl Command for CreateMappingFragmentCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateMappingFragment"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [self.type_mapping.prereq_id(), self.store_entity_set.prereq_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.type_mapping.resolve()?;
        self.store_entity_set.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let type_mapping = self.type_mapping.require("entity type mapping")?;
        let store_set = self.store_entity_set.require("storage entity set")?;
        CommandValidation::validate_kind(cpc.artifact(), type_mapping, ElementKind::EntityTypeMapping, self.name())?;
        CommandValidation::validate_in_space(
            cpc.artifact(),
            store_set,
            ElementKind::EntitySet,
            ModelSpace::Storage,
            self.name(),
        )?;
        if let Some(existing) = find_bound_child(
            cpc.artifact(),
            type_mapping,
            ElementKind::MappingFragment,
            BindingSlot::StoreEntitySet,
            store_set,
        ) {
            return Ok(existing);
        }
        let fragment = cpc
            .artifacts_mut()
            .add_element(type_mapping, None, ElementData::MappingFragment)?;
        cpc.artifacts_mut()
            .bind_to(fragment, BindingSlot::StoreEntitySet, store_set)?;
        Ok(fragment)
    }
}

/// Find or create the scalar mapping of a conceptual property onto a column
///
/// Creates the type mapping and fragment on the way. If the property is
/// already mapped in that fragment, the existing mapping is re-pointed at
/// `column` instead of adding a second one.
#[derive(Debug, Clone)]
pub struct CreateFragmentScalarPropertyCommand {
    entity_type: Deferred<ElementId>,
    property: Deferred<ElementId>,
    column: Deferred<ElementId>,
}

impl CreateFragmentScalarPropertyCommand {
    /// Map a conceptual property to a storage column
    #[must_use]
    pub fn new(
        entity_type: impl Into<Deferred<ElementId>>,
        property: impl Into<Deferred<ElementId>>,
        column: impl Into<Deferred<ElementId>>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            property: property.into(),
            column: column.into(),
        }
    }
}

impl Command for CreateFragmentScalarPropertyCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateFragmentScalarProperty"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [
            self.entity_type.prereq_id(),
            self.property.prereq_id(),
            self.column.prereq_id(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.entity_type.resolve()?;
        self.property.resolve()?;
        self.column.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let entity_type = self.entity_type.require("entity type")?;
        let property = self.property.require("property")?;
        let column = self.column.require("column")?;

        let artifact = cpc.artifact();
        CommandValidation::validate_conceptual_entity_type(artifact, entity_type, self.name())?;
        CommandValidation::validate_in_space(artifact, property, ElementKind::Property, ModelSpace::Conceptual, self.name())?;
        CommandValidation::validate_in_space(artifact, column, ElementKind::Property, ModelSpace::Storage, self.name())?;
        let property_owner = artifact.element(property)?.parent();
        let in_chain = property_owner == Some(entity_type)
            || property_owner.is_some_and(|o| model::ancestors(artifact, entity_type).contains(&o));
        if !in_chain {
            return Err(CommandError::precondition(format!(
                "'{}' is not a property of '{}'",
                model::display_name(artifact, property),
                model::display_name(artifact, entity_type)
            )));
        }
        let table = artifact
            .element(column)?
            .parent()
            .ok_or_else(|| CommandError::missing_parent(self.name(), "column table"))?;
        let store_set = model::store_entity_set_of(cpc.artifacts(), table).ok_or_else(|| {
            CommandError::missing_reference(
                self.name(),
                format!("storage entity set of '{}'", model::display_name(cpc.artifact(), table)),
            )
        })?;

        let type_mapping = cpc.invoke_single_command(CreateEntityTypeMappingCommand::new(entity_type))?;
        let fragment = cpc.invoke_single_command(CreateMappingFragmentCommand::new(type_mapping, store_set))?;

        if let Some(existing) = find_bound_child(
            cpc.artifact(),
            fragment,
            ElementKind::ScalarProperty,
            BindingSlot::Property,
            property,
        ) {
            let current = cpc
                .artifact()
                .get(existing)
                .and_then(|e| e.binding_target(BindingSlot::Column));
            if current != Some(column) {
                cpc.artifacts_mut().bind_to(existing, BindingSlot::Column, column)?;
            }
            return Ok(existing);
        }

        let scalar = cpc
            .artifacts_mut()
            .add_element(fragment, None, ElementData::ScalarProperty)?;
        cpc.artifacts_mut()
            .bind_to(scalar, BindingSlot::Property, property)?;
        cpc.artifacts_mut().bind_to(scalar, BindingSlot::Column, column)?;
        Ok(scalar)
    }
}

/// Find or create the mapping of an association set onto a storage set
#[derive(Debug, Clone)]
pub struct CreateAssociationSetMappingCommand {
    association_set: Deferred<ElementId>,
    store_entity_set: Deferred<ElementId>,
}

impl CreateAssociationSetMappingCommand {
    /// Map `association_set` onto a storage set
    #[must_use]
    pub fn new(
        association_set: impl Into<Deferred<ElementId>>,
        store_entity_set: impl Into<Deferred<ElementId>>,
    ) -> Self {
        Self {
            association_set: association_set.into(),
            store_entity_set: store_entity_set.into(),
        }
    }
}

impl Command for CreateAssociationSetMappingCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateAssociationSetMapping"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [self.association_set.prereq_id(), self.store_entity_set.prereq_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.association_set.resolve()?;
        self.store_entity_set.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let association_set = self.association_set.require("association set")?;
        let store_set = self.store_entity_set.require("storage entity set")?;
        CommandValidation::validate_kind(cpc.artifact(), association_set, ElementKind::AssociationSet, self.name())?;
        CommandValidation::validate_in_space(
            cpc.artifact(),
            store_set,
            ElementKind::EntitySet,
            ModelSpace::Storage,
            self.name(),
        )?;

        let existing = cpc
            .artifacts()
            .anti_dependencies_of_kind(association_set, ElementKind::AssociationSetMapping)
            .into_iter()
            .next();
        if let Some(mapping) = existing {
            let current = cpc
                .artifact()
                .get(mapping)
                .and_then(|e| e.binding_target(BindingSlot::StoreEntitySet));
            if current != Some(store_set) {
                return Err(CommandError::precondition(format!(
                    "association set '{}' is already mapped to another table",
                    model::display_name(cpc.artifact(), association_set)
                )));
            }
            return Ok(mapping);
        }

        let root = cpc.artifact().container(ModelSpace::Mapping);
        let mapping = cpc
            .artifacts_mut()
            .add_element(root, None, ElementData::AssociationSetMapping)?;
        cpc.artifacts_mut()
            .bind_to(mapping, BindingSlot::AssociationSet, association_set)?;
        cpc.artifacts_mut()
            .bind_to(mapping, BindingSlot::StoreEntitySet, store_set)?;
        Ok(mapping)
    }
}

/// Find or create an end scalar mapping in an association-set mapping
///
/// Registers [`InferReferentialConstraints`] for the mapping.
#[derive(Debug, Clone)]
pub struct CreateEndScalarPropertyCommand {
    association_set_mapping: Deferred<ElementId>,
    set_end: ElementId,
    property: ElementId,
    column: ElementId,
}

impl CreateEndScalarPropertyCommand {
    /// Map key `property` of the type at `set_end` to `column`
    #[must_use]
    pub fn new(
        association_set_mapping: impl Into<Deferred<ElementId>>,
        set_end: ElementId,
        property: ElementId,
        column: ElementId,
    ) -> Self {
        Self {
            association_set_mapping: association_set_mapping.into(),
            set_end,
            property,
            column,
        }
    }
}

impl Command for CreateEndScalarPropertyCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateEndScalarProperty"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.association_set_mapping.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.association_set_mapping.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let mapping = self.association_set_mapping.require("association set mapping")?;
        let artifact = cpc.artifact();
        CommandValidation::validate_kind(artifact, mapping, ElementKind::AssociationSetMapping, self.name())?;
        CommandValidation::validate_kind(artifact, self.set_end, ElementKind::AssociationSetEnd, self.name())?;
        CommandValidation::validate_in_space(artifact, self.property, ElementKind::Property, ModelSpace::Conceptual, self.name())?;
        CommandValidation::validate_in_space(artifact, self.column, ElementKind::Property, ModelSpace::Storage, self.name())?;
        let mapped_set = artifact.get(mapping).and_then(|e| e.binding_target(BindingSlot::AssociationSet));
        if artifact.get(self.set_end).and_then(|e| e.parent()) != mapped_set {
            return Err(CommandError::precondition(
                "association set end does not belong to the mapped association set",
            ));
        }

        let end_property = match find_bound_child(
            artifact,
            mapping,
            ElementKind::EndProperty,
            BindingSlot::Role,
            self.set_end,
        ) {
            Some(existing) => existing,
            None => {
                let created = cpc
                    .artifacts_mut()
                    .add_element(mapping, None, ElementData::EndProperty)?;
                cpc.artifacts_mut()
                    .bind_to(created, BindingSlot::Role, self.set_end)?;
                created
            }
        };

        if let Some(existing) = find_bound_child(
            cpc.artifact(),
            end_property,
            ElementKind::ScalarProperty,
            BindingSlot::Property,
            self.property,
        ) {
            let current = cpc
                .artifact()
                .get(existing)
                .and_then(|e| e.binding_target(BindingSlot::Column));
            if current != Some(self.column) {
                cpc.artifacts_mut()
                    .bind_to(existing, BindingSlot::Column, self.column)?;
            }
            return Ok(existing);
        }
        let scalar = cpc
            .artifacts_mut()
            .add_element(end_property, None, ElementData::ScalarProperty)?;
        cpc.artifacts_mut()
            .bind_to(scalar, BindingSlot::Property, self.property)?;
        cpc.artifacts_mut()
            .bind_to(scalar, BindingSlot::Column, self.column)?;
        Ok(scalar)
    }

    fn post_invoke(&mut self, cpc: &mut CommandProcessorContext<'_>, _output: &ElementId) -> CommandResult<()> {
        if let Ok(mapping) = self.association_set_mapping.require("association set mapping") {
            InferReferentialConstraints::add_rule(cpc, mapping);
        }
        Ok(())
    }
}

/// Find or create the mapping of a function import onto a storage function
#[derive(Debug, Clone)]
pub struct CreateFunctionImportMappingCommand {
    function_import: Deferred<ElementId>,
    function: Deferred<ElementId>,
}

impl CreateFunctionImportMappingCommand {
    /// Map `function_import` onto a storage function
    #[must_use]
    pub fn new(
        function_import: impl Into<Deferred<ElementId>>,
        function: impl Into<Deferred<ElementId>>,
    ) -> Self {
        Self {
            function_import: function_import.into(),
            function: function.into(),
        }
    }
}

impl Command for CreateFunctionImportMappingCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateFunctionImportMapping"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [self.function_import.prereq_id(), self.function.prereq_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.function_import.resolve()?;
        self.function.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let function_import = self.function_import.require("function import")?;
        let function = self.function.require("function")?;
        CommandValidation::validate_kind(cpc.artifact(), function_import, ElementKind::FunctionImport, self.name())?;
        CommandValidation::validate_in_space(
            cpc.artifact(),
            function,
            ElementKind::Function,
            ModelSpace::Storage,
            self.name(),
        )?;

        let existing = cpc
            .artifacts()
            .anti_dependencies_of_kind(function_import, ElementKind::FunctionImportMapping)
            .into_iter()
            .next();
        if let Some(mapping) = existing {
            let current = cpc
                .artifact()
                .get(mapping)
                .and_then(|e| e.binding_target(BindingSlot::Function));
            if current != Some(function) {
                cpc.artifacts_mut()
                    .bind_to(mapping, BindingSlot::Function, function)?;
            }
            return Ok(mapping);
        }
        let root = cpc.artifact().container(ModelSpace::Mapping);
        let mapping = cpc
            .artifacts_mut()
            .add_element(root, None, ElementData::FunctionImportMapping)?;
        cpc.artifacts_mut()
            .bind_to(mapping, BindingSlot::FunctionImport, function_import)?;
        cpc.artifacts_mut()
            .bind_to(mapping, BindingSlot::Function, function)?;
        Ok(mapping)
    }
}

/// Find or create the result-type mapping of a function-import mapping
///
/// With [`with_default_scalar_properties`](Self::with_default_scalar_properties)
/// every property of the result type gets a result scalar mapping onto the
/// column it was read from (the property's own name when the column map
/// has no entry for it).
#[derive(Debug, Clone)]
pub struct CreateFunctionImportTypeMappingCommand {
    function_import_mapping: Deferred<ElementId>,
    result_type: Deferred<ElementId>,
    column_names: Option<BTreeMap<String, String>>,
}

impl CreateFunctionImportTypeMappingCommand {
    /// Map the results of `function_import_mapping` onto complex type `result_type`
    #[must_use]
    pub fn new(
        function_import_mapping: impl Into<Deferred<ElementId>>,
        result_type: impl Into<Deferred<ElementId>>,
    ) -> Self {
        Self {
            function_import_mapping: function_import_mapping.into(),
            result_type: result_type.into(),
            column_names: None,
        }
    }

    /// Also map every result-type property; `column_names` is property name to column name
    #[must_use]
    pub fn with_default_scalar_properties(mut self, column_names: BTreeMap<String, String>) -> Self {
        self.column_names = Some(column_names);
        self
    }
}

impl Command for CreateFunctionImportTypeMappingCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateFunctionImportTypeMapping"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [self.function_import_mapping.prereq_id(), self.result_type.prereq_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.function_import_mapping.resolve()?;
        self.result_type.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let mapping = self.function_import_mapping.require("function import mapping")?;
        let result_type = self.result_type.require("result type")?;
        CommandValidation::validate_kind(cpc.artifact(), mapping, ElementKind::FunctionImportMapping, self.name())?;
        CommandValidation::validate_in_space(
            cpc.artifact(),
            result_type,
            ElementKind::ComplexType,
            ModelSpace::Conceptual,
            self.name(),
        )?;

        let type_mapping = match find_bound_child(
            cpc.artifact(),
            mapping,
            ElementKind::FunctionImportTypeMapping,
            BindingSlot::Type,
            result_type,
        ) {
            Some(existing) => existing,
            None => {
                let created = cpc
                    .artifacts_mut()
                    .add_element(mapping, None, ElementData::FunctionImportTypeMapping)?;
                cpc.artifacts_mut()
                    .bind_to(created, BindingSlot::Type, result_type)?;
                created
            }
        };

        let Some(column_names) = &self.column_names else {
            return Ok(type_mapping);
        };
        for property in model::properties(cpc.artifact(), result_type) {
            let mapped = find_bound_child(
                cpc.artifact(),
                type_mapping,
                ElementKind::ResultScalarProperty,
                BindingSlot::Property,
                property,
            );
            if mapped.is_some() {
                continue;
            }
            let name = model::display_name(cpc.artifact(), property);
            let column = column_names.get(&name).cloned().unwrap_or(name);
            let scalar = cpc.artifacts_mut().add_element(
                type_mapping,
                None,
                ElementData::ResultScalarProperty { column },
            )?;
            cpc.artifacts_mut()
                .bind_to(scalar, BindingSlot::Property, property)?;
        }
        Ok(type_mapping)
    }
}
