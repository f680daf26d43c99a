//! Scalar and complex properties

use crate::command::Command;
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult, ValidationFailure};
use crate::model;
use crate::prereq::{CommandId, Deferred};
use crate::rules::{IntegrityRule, PropagateViewKeysToStorageModel};
use crate::validation::CommandValidation;
use edm_artifact::{
    Artifact, BindingSlot, ElementData, ElementId, ElementKind, ModelSpace, PropertyFacets,
    StoreGeneratedPattern,
};
use std::collections::BTreeSet;

/// Type of a new property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    /// EDM primitive (conceptual) or store type name (storage)
    Primitive(String),

    /// Conceptual complex type
    Complex(ElementId),
}

impl PropertyType {
    /// Primitive type by name
    #[must_use]
    pub fn primitive(name: impl Into<String>) -> Self {
        Self::Primitive(name.into())
    }
}

/// Create a property on an entity type or complex type
#[derive(Debug, Clone)]
pub struct CreatePropertyCommand {
    name: String,
    owner: Deferred<ElementId>,
    property_type: PropertyType,
    nullable: Option<bool>,
    is_key: bool,
    store_generated: StoreGeneratedPattern,
    max_length: Option<u32>,
    store_name: Option<String>,
}

impl CreatePropertyCommand {
    /// Property `name` of `property_type` on `owner`
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<Deferred<ElementId>>,
        property_type: PropertyType,
    ) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        if let PropertyType::Primitive(type_name) = &property_type {
            if type_name.is_empty() {
                return Err(CommandError::precondition("property type name is empty"));
            }
        }
        Ok(Self {
            name,
            owner: owner.into(),
            property_type,
            nullable: None,
            is_key: false,
            store_generated: StoreGeneratedPattern::None,
            max_length: None,
            store_name: None,
        })
    }

    /// Make the property part of the entity key (implies non-nullable)
    #[must_use]
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    /// Override nullability
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Store-generated pattern
    #[must_use]
    pub fn with_store_generated(mut self, pattern: StoreGeneratedPattern) -> Self {
        self.store_generated = pattern;
        self
    }

    /// Maximum length facet
    #[must_use]
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Database column name, recorded when it differs from `name`
    #[must_use]
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        let store_name = store_name.into();
        self.store_name = (store_name != self.name).then_some(store_name);
        self
    }

    fn facets(&self) -> CommandResult<PropertyFacets> {
        let mut facets = match &self.property_type {
            PropertyType::Primitive(type_name) => PropertyFacets::primitive(type_name.clone()),
            PropertyType::Complex(_) => {
                if self.is_key {
                    return Err(ValidationFailure::InvalidFacet(
                        "complex properties cannot be keys".to_string(),
                    )
                    .into());
                }
                PropertyFacets::complex()
            }
        };
        if let Some(nullable) = self.nullable {
            facets.nullable = nullable;
        }
        if self.is_key {
            if self.nullable == Some(true) {
                return Err(ValidationFailure::InvalidFacet(format!(
                    "key property '{}' cannot be nullable",
                    self.name
                ))
                .into());
            }
            facets = facets.with_key();
        }
        facets.store_generated = self.store_generated;
        facets.max_length = self.max_length;
        facets.store_name.clone_from(&self.store_name);
        Ok(facets)
    }
}

impl Command for CreatePropertyCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateProperty"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.owner.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.owner.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let owner = self.owner.require("property owner")?;
        let owner_element = cpc
            .artifact()
            .get(owner)
            .ok_or_else(|| CommandError::missing_parent(self.name(), format!("owner {owner}")))?;
        let owner_kind = owner_element.kind();
        let space = owner_element.space();
        if !matches!(owner_kind, ElementKind::EntityType | ElementKind::ComplexType) {
            return Err(CommandError::precondition(format!(
                "properties belong to entity or complex types, not {owner_kind}"
            )));
        }

        match &self.property_type {
            PropertyType::Primitive(type_name) if space == ModelSpace::Conceptual => {
                CommandValidation::validate_primitive(type_name)?;
            }
            PropertyType::Primitive(_) => {}
            PropertyType::Complex(complex) => {
                CommandValidation::validate_in_space(
                    cpc.artifact(),
                    *complex,
                    ElementKind::ComplexType,
                    ModelSpace::Conceptual,
                    self.name(),
                )?;
                if owner_kind == ElementKind::ComplexType && contains_complex(cpc.artifact(), *complex, owner) {
                    return Err(ValidationFailure::CircularComplexType {
                        outer: model::display_name(cpc.artifact(), owner),
                        inner: model::display_name(cpc.artifact(), *complex),
                    }
                    .into());
                }
            }
        }

        if self.is_key {
            if owner_kind != ElementKind::EntityType {
                return Err(ValidationFailure::InvalidFacet(
                    "only entity types declare keys".to_string(),
                )
                .into());
            }
            if model::base_type(cpc.artifact(), owner).is_some() {
                return Err(ValidationFailure::InvalidFacet(format!(
                    "key '{}' must be declared on the root of the hierarchy",
                    self.name
                ))
                .into());
            }
        }
        CommandValidation::validate_member_name(cpc.artifacts(), owner, &self.name)?;

        let facets = self.facets()?;
        let property = cpc
            .artifacts_mut()
            .add_element(owner, Some(&self.name), ElementData::Property(facets))?;
        if let PropertyType::Complex(complex) = &self.property_type {
            cpc.artifacts_mut().bind_to(property, BindingSlot::Type, *complex)?;
        }
        Ok(property)
    }
}

/// Whether `outer` contains `needle` through complex-typed properties
fn contains_complex(artifact: &Artifact, outer: ElementId, needle: ElementId) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack = vec![outer];
    while let Some(current) = stack.pop() {
        if current == needle {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        stack.extend(
            model::properties(artifact, current)
                .into_iter()
                .filter_map(|p| artifact.get(p)?.binding_target(BindingSlot::Type)),
        );
    }
    false
}

/// Change facets of an existing property
///
/// Unset fields keep their current value. Setting the key flag forces the
/// property non-nullable.
#[derive(Debug, Clone, Default)]
pub struct SetPropertyFacetsCommand {
    property: Option<ElementId>,
    type_name: Option<String>,
    nullable: Option<bool>,
    is_key: Option<bool>,
    store_generated: Option<StoreGeneratedPattern>,
    max_length: Option<Option<u32>>,
}

impl SetPropertyFacetsCommand {
    /// Edit `property`
    #[must_use]
    pub fn new(property: ElementId) -> Self {
        Self {
            property: Some(property),
            ..Self::default()
        }
    }

    /// New primitive type
    #[must_use]
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// New nullability
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// New key flag
    #[must_use]
    pub fn key(mut self, is_key: bool) -> Self {
        self.is_key = Some(is_key);
        self
    }

    /// New store-generated pattern
    #[must_use]
    pub fn store_generated(mut self, pattern: StoreGeneratedPattern) -> Self {
        self.store_generated = Some(pattern);
        self
    }

    /// New maximum length (`None` clears it)
    #[must_use]
    pub fn max_length(mut self, max_length: Option<u32>) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

impl Command for SetPropertyFacetsCommand {
    /// Whether the key flag changed
    type Output = bool;

    fn name(&self) -> &'static str {
        "SetPropertyFacets"
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<bool> {
        let property = self
            .property
            .ok_or_else(|| CommandError::precondition("property was not supplied"))?;
        CommandValidation::validate_kind(cpc.artifact(), property, ElementKind::Property, self.name())?;
        let element = cpc.artifact().element(property)?;
        let space = element.space();
        let owner = element
            .parent()
            .ok_or_else(|| CommandError::missing_parent(self.name(), "property owner"))?;
        let Some(current) = element.facets().cloned() else {
            return Err(CommandError::precondition("property has no facets"));
        };

        let mut facets = current.clone();
        if let Some(type_name) = &self.type_name {
            if current.type_name.is_none() {
                return Err(ValidationFailure::InvalidFacet(
                    "complex properties have no primitive type".to_string(),
                )
                .into());
            }
            if space == ModelSpace::Conceptual {
                CommandValidation::validate_primitive(type_name)?;
            }
            facets.type_name = Some(type_name.clone());
        }
        if let Some(nullable) = self.nullable {
            facets.nullable = nullable;
        }
        if let Some(is_key) = self.is_key {
            if is_key && current.type_name.is_none() {
                return Err(ValidationFailure::InvalidFacet(
                    "complex properties cannot be keys".to_string(),
                )
                .into());
            }
            if is_key && model::base_type(cpc.artifact(), owner).is_some() {
                return Err(ValidationFailure::InvalidFacet(
                    "keys must be declared on the root of the hierarchy".to_string(),
                )
                .into());
            }
            facets.is_key = is_key;
        }
        if facets.is_key {
            if self.nullable == Some(true) {
                return Err(ValidationFailure::InvalidFacet(
                    "key properties cannot be nullable".to_string(),
                )
                .into());
            }
            facets.nullable = false;
        }
        if let Some(pattern) = self.store_generated {
            facets.store_generated = pattern;
        }
        if let Some(max_length) = self.max_length {
            facets.max_length = max_length;
        }

        let key_changed = facets.is_key != current.is_key;
        cpc.artifacts_mut().update_data(property, |data| {
            if let ElementData::Property(slot) = data {
                *slot = facets;
            }
        })?;
        if key_changed && space == ModelSpace::Conceptual {
            PropagateViewKeysToStorageModel::add_rule(cpc, owner);
        }
        Ok(key_changed)
    }
}
