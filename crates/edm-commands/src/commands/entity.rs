//! Entity types, complex types and entity sets

use crate::command::Command;
use crate::commands::property::{CreatePropertyCommand, PropertyType};
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult};
use crate::model;
use crate::prereq::{CommandHandle, CommandId, Deferred};
use crate::processor::CommandProcessor;
use crate::validation::CommandValidation;
use edm_artifact::{BindingSlot, ElementData, ElementId, ElementKind, ModelSpace, StoreGeneratedPattern};

/// Create an entity type in the conceptual or storage schema
#[derive(Debug, Clone)]
pub struct CreateEntityTypeCommand {
    name: String,
    space: ModelSpace,
    unique_name: bool,
    is_abstract: bool,
}

impl CreateEntityTypeCommand {
    /// Entity type `name` in `space`
    ///
    /// # Errors
    /// Returns a validation error for a bad name, precondition error for the
    /// mapping space
    pub fn new(name: impl Into<String>, space: ModelSpace) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        if space == ModelSpace::Mapping {
            return Err(CommandError::precondition(
                "entity types belong to the conceptual or storage model",
            ));
        }
        Ok(Self {
            name,
            space,
            unique_name: false,
            is_abstract: false,
        })
    }

    /// Pick `name`, `name1`, ... instead of failing on a clash
    #[must_use]
    pub fn with_unique_name(mut self) -> Self {
        self.unique_name = true;
        self
    }

    /// Mark abstract
    #[must_use]
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }
}

impl Command for CreateEntityTypeCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateEntityType"
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let schema = cpc.artifact().schema(self.space);
        let name = schema_type_name(cpc, schema, &self.name, self.unique_name)?;
        let id = cpc.artifacts_mut().add_element(
            schema,
            Some(&name),
            ElementData::EntityType {
                is_abstract: self.is_abstract,
            },
        )?;
        Ok(id)
    }

    fn post_invoke(&mut self, cpc: &mut CommandProcessorContext<'_>, output: &ElementId) -> CommandResult<()> {
        cpc.artifacts_mut().normalize_and_resolve(*output);
        Ok(())
    }
}

/// Create a conceptual complex type
#[derive(Debug, Clone)]
pub struct CreateComplexTypeCommand {
    name: String,
    unique_name: bool,
}

impl CreateComplexTypeCommand {
    /// Complex type `name`
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn new(name: impl Into<String>) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        Ok(Self {
            name,
            unique_name: false,
        })
    }

    /// Pick a free name instead of failing on a clash
    #[must_use]
    pub fn with_unique_name(mut self) -> Self {
        self.unique_name = true;
        self
    }
}

impl Command for CreateComplexTypeCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateComplexType"
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let schema = cpc.artifact().schema(ModelSpace::Conceptual);
        let name = schema_type_name(cpc, schema, &self.name, self.unique_name)?;
        Ok(cpc
            .artifacts_mut()
            .add_element(schema, Some(&name), ElementData::ComplexType)?)
    }
}

/// Requested name, or a free variant of it
fn schema_type_name(
    cpc: &CommandProcessorContext<'_>,
    schema: ElementId,
    name: &str,
    unique: bool,
) -> CommandResult<String> {
    if unique {
        return Ok(cpc.artifacts().unique_name(schema, name));
    }
    CommandValidation::validate_unique_child(cpc.artifact(), schema, name)?;
    Ok(name.to_string())
}

/// Create an entity set for an entity type
///
/// Without an explicit name the configured naming policy is applied to the
/// type name and made unique in the container.
#[derive(Debug, Clone)]
pub struct CreateEntitySetCommand {
    name: Option<String>,
    entity_type: Deferred<ElementId>,
    is_view: bool,
}

impl CreateEntitySetCommand {
    /// Entity set `name` of `entity_type`
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn new(name: impl Into<String>, entity_type: impl Into<Deferred<ElementId>>) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        Ok(Self {
            name: Some(name),
            entity_type: entity_type.into(),
            is_view: false,
        })
    }

    /// Entity set named by the naming policy
    #[must_use]
    pub fn with_default_name(entity_type: impl Into<Deferred<ElementId>>) -> Self {
        Self {
            name: None,
            entity_type: entity_type.into(),
            is_view: false,
        }
    }

    /// Mark as a database view (storage sets only)
    #[must_use]
    pub fn as_view(mut self) -> Self {
        self.is_view = true;
        self
    }
}

impl Command for CreateEntitySetCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateEntitySet"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.entity_type.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.entity_type.resolve()?;
        if let Some(id) = self.entity_type.get() {
            CommandValidation::validate_kind(cpc.artifact(), *id, ElementKind::EntityType, self.name())?;
        }
        Ok(())
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let entity_type = self.entity_type.require("entity type")?;
        let element = cpc.artifact().element(entity_type)?;
        let space = element.space();
        let type_name = element
            .name()
            .ok_or_else(|| CommandError::missing_reference(self.name(), "entity type name"))?
            .to_string();
        if model::base_type(cpc.artifact(), entity_type).is_some() {
            return Err(CommandError::precondition(format!(
                "entity sets are declared for root types; '{type_name}' derives from another type"
            )));
        }
        if self.is_view && space != ModelSpace::Storage {
            return Err(CommandError::precondition("only storage entity sets can be views"));
        }

        let container = cpc.artifact().container(space);
        let name = match &self.name {
            Some(name) => {
                CommandValidation::validate_unique_child(cpc.artifact(), container, name)?;
                name.clone()
            }
            None => {
                let base = cpc.config().entity_set_suffix.apply(&type_name);
                cpc.artifacts().unique_name(container, &base)
            }
        };

        let set = cpc.artifacts_mut().add_element(
            container,
            Some(&name),
            ElementData::EntitySet {
                is_view: self.is_view,
            },
        )?;
        cpc.artifacts_mut().bind_to(set, BindingSlot::Type, entity_type)?;
        Ok(set)
    }
}

/// Handles returned by [`create_entity_type_with_set_and_key`]
#[derive(Debug, Clone)]
pub struct EntityTypeWithSet {
    /// Created entity type
    pub entity_type: CommandHandle<ElementId>,
    /// Created key property
    pub key: CommandHandle<ElementId>,
    /// Created entity set
    pub entity_set: CommandHandle<ElementId>,
}

/// Enqueue a conceptual entity type with a single key property and its
/// entity set
///
/// Integer keys are store-generated (`Identity`). The set is named by the
/// configured naming policy.
///
/// # Errors
/// Returns a validation error if a name or the key type is invalid
pub fn create_entity_type_with_set_and_key(
    processor: &mut CommandProcessor,
    type_name: &str,
    key_name: &str,
    key_type: &str,
) -> CommandResult<EntityTypeWithSet> {
    CommandValidation::validate_primitive(key_type)?;
    let entity_type = processor.enqueue(CreateEntityTypeCommand::new(type_name, ModelSpace::Conceptual)?);

    let pattern = if matches!(key_type, "Int16" | "Int32" | "Int64") {
        StoreGeneratedPattern::Identity
    } else {
        StoreGeneratedPattern::None
    };
    let key = processor.enqueue(
        CreatePropertyCommand::new(key_name, &entity_type, PropertyType::primitive(key_type))?
            .key()
            .with_store_generated(pattern),
    );
    let entity_set = processor.enqueue(CreateEntitySetCommand::with_default_name(&entity_type));

    Ok(EntityTypeWithSet {
        entity_type,
        key,
        entity_set,
    })
}
