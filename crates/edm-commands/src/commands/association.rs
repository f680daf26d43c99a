//! Associations, navigation properties and referential constraints

use crate::command::Command;
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult, ValidationFailure};
use crate::model;
use crate::prereq::{CommandId, Deferred};
use crate::validation::CommandValidation;
use edm_artifact::{
    BindingSlot, ConstraintRole, ElementData, ElementId, ElementKind, ModelSpace, Multiplicity,
    OnDeleteAction,
};
use std::collections::BTreeSet;

/// Elements created by [`CreateConceptualAssociationCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationOutput {
    /// The association
    pub association: ElementId,
    /// Its two ends, in argument order
    pub ends: [ElementId; 2],
    /// Set in the conceptual container
    pub association_set: ElementId,
    /// Set ends, one per end
    pub set_ends: [ElementId; 2],
    /// Navigation property owned by each end's type, if requested
    pub navigation_properties: [Option<ElementId>; 2],
}

/// Create a conceptual association between two entity types
///
/// Builds the association with both ends, the association set in the
/// conceptual container, and navigation properties for the ends that were
/// given one. End roles are named after the end types; a self-association
/// names its second role `{Type}1`.
#[derive(Debug, Clone)]
pub struct CreateConceptualAssociationCommand {
    name: String,
    types: [Deferred<ElementId>; 2],
    multiplicities: [Multiplicity; 2],
    navigation_names: [Option<String>; 2],
    unique_name: bool,
}

impl CreateConceptualAssociationCommand {
    /// Association `name` between `end1` and `end2`
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn new(
        name: impl Into<String>,
        end1: impl Into<Deferred<ElementId>>,
        multiplicity1: Multiplicity,
        end2: impl Into<Deferred<ElementId>>,
        multiplicity2: Multiplicity,
    ) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        Ok(Self {
            name,
            types: [end1.into(), end2.into()],
            multiplicities: [multiplicity1, multiplicity2],
            navigation_names: [None, None],
            unique_name: false,
        })
    }

    /// Navigation properties on the first and second end type
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn with_navigation_properties(
        mut self,
        on_end1: Option<&str>,
        on_end2: Option<&str>,
    ) -> CommandResult<Self> {
        for name in on_end1.iter().chain(on_end2.iter()) {
            CommandValidation::validate_name(name)?;
        }
        self.navigation_names = [on_end1.map(str::to_string), on_end2.map(str::to_string)];
        Ok(self)
    }

    /// Pick a free association name instead of failing on a clash
    #[must_use]
    pub fn with_unique_name(mut self) -> Self {
        self.unique_name = true;
        self
    }
}

impl Command for CreateConceptualAssociationCommand {
    type Output = AssociationOutput;

    fn name(&self) -> &'static str {
        "CreateConceptualAssociation"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.types.iter().filter_map(Deferred::prereq_id).collect()
    }

    fn process_prereqs(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        for end in &mut self.types {
            end.resolve()?;
            if let Some(id) = end.get() {
                CommandValidation::validate_conceptual_entity_type(cpc.artifact(), *id, "CreateConceptualAssociation")?;
            }
        }
        Ok(())
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<AssociationOutput> {
        let types = [
            self.types[0].require("first end type")?,
            self.types[1].require("second end type")?,
        ];
        let mut role_names = [String::new(), String::new()];
        let mut sets = [ElementId::new(0); 2];
        for (i, ty) in types.iter().enumerate() {
            CommandValidation::validate_conceptual_entity_type(cpc.artifact(), *ty, self.name())?;
            role_names[i] = model::display_name(cpc.artifact(), *ty);
            sets[i] = model::entity_set_of(cpc.artifacts(), *ty).ok_or_else(|| {
                CommandError::missing_reference(self.name(), format!("entity set of '{}'", role_names[i]))
            })?;
        }
        if role_names[0] == role_names[1] {
            role_names[1] = format!("{}1", role_names[1]);
        }

        let schema = cpc.artifact().schema(ModelSpace::Conceptual);
        let name = if self.unique_name {
            cpc.artifacts().unique_name(schema, &self.name)
        } else {
            CommandValidation::validate_unique_child(cpc.artifact(), schema, &self.name)?;
            self.name.clone()
        };

        let association = cpc
            .artifacts_mut()
            .add_element(schema, Some(&name), ElementData::Association)?;
        let mut ends = [ElementId::new(0); 2];
        for i in 0..2 {
            ends[i] = cpc.artifacts_mut().add_element(
                association,
                Some(&role_names[i]),
                ElementData::AssociationEnd {
                    multiplicity: self.multiplicities[i],
                    on_delete: OnDeleteAction::None,
                },
            )?;
            cpc.artifacts_mut().bind_to(ends[i], BindingSlot::Type, types[i])?;
        }

        let container = cpc.artifact().container(ModelSpace::Conceptual);
        let set_name = cpc.artifacts().unique_name(container, &name);
        let association_set = cpc
            .artifacts_mut()
            .add_element(container, Some(&set_name), ElementData::AssociationSet)?;
        cpc.artifacts_mut()
            .bind_to(association_set, BindingSlot::Association, association)?;
        let mut set_ends = [ElementId::new(0); 2];
        for i in 0..2 {
            set_ends[i] = cpc.artifacts_mut().add_element(
                association_set,
                Some(&role_names[i]),
                ElementData::AssociationSetEnd,
            )?;
            cpc.artifacts_mut().bind_to(set_ends[i], BindingSlot::Role, ends[i])?;
            cpc.artifacts_mut().bind_to(set_ends[i], BindingSlot::EntitySet, sets[i])?;
        }

        let mut navigation_properties = [None, None];
        for i in 0..2 {
            let Some(nav_name) = self.navigation_names[i].clone() else {
                continue;
            };
            let nav = cpc.invoke_single_command(
                CreateNavigationPropertyCommand::new(nav_name, types[i], association)?
                    .with_roles(ends[i], ends[1 - i]),
            )?;
            navigation_properties[i] = Some(nav);
        }

        Ok(AssociationOutput {
            association,
            ends,
            association_set,
            set_ends,
            navigation_properties,
        })
    }

    fn post_invoke(
        &mut self,
        cpc: &mut CommandProcessorContext<'_>,
        output: &AssociationOutput,
    ) -> CommandResult<()> {
        cpc.artifacts_mut().normalize_and_resolve(output.association);
        cpc.artifacts_mut().normalize_and_resolve(output.association_set);
        Ok(())
    }
}

/// Create a navigation property over an association
///
/// Without explicit roles the from-role is the end typed by the declaring
/// entity type; self-associations need explicit roles.
#[derive(Debug, Clone)]
pub struct CreateNavigationPropertyCommand {
    name: String,
    entity_type: Deferred<ElementId>,
    association: Deferred<ElementId>,
    roles: Option<(ElementId, ElementId)>,
}

impl CreateNavigationPropertyCommand {
    /// Navigation property `name` on `entity_type` over `association`
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<Deferred<ElementId>>,
        association: impl Into<Deferred<ElementId>>,
    ) -> CommandResult<Self> {
        let name = name.into();
        CommandValidation::validate_name(&name)?;
        Ok(Self {
            name,
            entity_type: entity_type.into(),
            association: association.into(),
            roles: None,
        })
    }

    /// Explicit from/to association ends
    #[must_use]
    pub fn with_roles(mut self, from: ElementId, to: ElementId) -> Self {
        self.roles = Some((from, to));
        self
    }
}

impl Command for CreateNavigationPropertyCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateNavigationProperty"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [self.entity_type.prereq_id(), self.association.prereq_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.entity_type.resolve()?;
        self.association.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let entity_type = self.entity_type.require("declaring entity type")?;
        let association = self.association.require("association")?;
        CommandValidation::validate_conceptual_entity_type(cpc.artifact(), entity_type, self.name())?;
        CommandValidation::validate_kind(cpc.artifact(), association, ElementKind::Association, self.name())?;

        let ends = model::association_ends(cpc.artifact(), association);
        let (from, to) = match self.roles {
            Some(roles) => roles,
            None => {
                let chain: BTreeSet<ElementId> = std::iter::once(entity_type)
                    .chain(model::ancestors(cpc.artifact(), entity_type))
                    .collect();
                let matching: Vec<ElementId> = ends
                    .iter()
                    .copied()
                    .filter(|end| {
                        model::end_type(cpc.artifact(), *end).is_some_and(|t| chain.contains(&t))
                    })
                    .collect();
                let [from] = matching[..] else {
                    return Err(CommandError::precondition(format!(
                        "cannot infer navigation roles for '{}'",
                        self.name
                    )));
                };
                let to = ends
                    .iter()
                    .copied()
                    .find(|end| *end != from)
                    .ok_or_else(|| CommandError::missing_reference(self.name(), "opposite association end"))?;
                (from, to)
            }
        };
        if !ends.contains(&from) || !ends.contains(&to) || from == to {
            return Err(CommandError::precondition(
                "navigation roles must be two distinct ends of the association",
            ));
        }

        CommandValidation::validate_member_name(cpc.artifacts(), entity_type, &self.name)?;
        let nav = cpc.artifacts_mut().add_element(
            entity_type,
            Some(&self.name),
            ElementData::NavigationProperty,
        )?;
        cpc.artifacts_mut()
            .bind_to(nav, BindingSlot::Relationship, association)?;
        cpc.artifacts_mut().bind_to(nav, BindingSlot::FromRole, from)?;
        cpc.artifacts_mut().bind_to(nav, BindingSlot::ToRole, to)?;
        Ok(nav)
    }
}

/// Create the referential constraint of an association
///
/// Principal properties must be exactly the principal type's keys; the
/// dependent properties are paired with them positionally.
#[derive(Debug, Clone)]
pub struct CreateReferentialConstraintCommand {
    principal_end: Deferred<ElementId>,
    dependent_end: Deferred<ElementId>,
    principal_properties: Vec<ElementId>,
    dependent_properties: Vec<ElementId>,
}

impl CreateReferentialConstraintCommand {
    /// Constraint from `principal_end` to `dependent_end`
    ///
    /// # Errors
    /// Returns a validation error if the property lists are empty or differ
    /// in length
    pub fn new(
        principal_end: impl Into<Deferred<ElementId>>,
        dependent_end: impl Into<Deferred<ElementId>>,
        principal_properties: Vec<ElementId>,
        dependent_properties: Vec<ElementId>,
    ) -> CommandResult<Self> {
        if principal_properties.is_empty() || principal_properties.len() != dependent_properties.len() {
            return Err(ValidationFailure::InvalidReferentialConstraint(format!(
                "{} principal and {} dependent properties",
                principal_properties.len(),
                dependent_properties.len()
            ))
            .into());
        }
        Ok(Self {
            principal_end: principal_end.into(),
            dependent_end: dependent_end.into(),
            principal_properties,
            dependent_properties,
        })
    }
}

impl Command for CreateReferentialConstraintCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "CreateReferentialConstraint"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [self.principal_end.prereq_id(), self.dependent_end.prereq_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.principal_end.resolve()?;
        self.dependent_end.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let principal_end = self.principal_end.require("principal end")?;
        let dependent_end = self.dependent_end.require("dependent end")?;
        let artifact = cpc.artifact();
        for end in [principal_end, dependent_end] {
            CommandValidation::validate_kind(artifact, end, ElementKind::AssociationEnd, self.name())?;
        }
        let association = artifact
            .element(principal_end)?
            .parent()
            .ok_or_else(|| CommandError::missing_parent(self.name(), "association"))?;
        let invalid = |message: String| -> CommandError {
            ValidationFailure::InvalidReferentialConstraint(message).into()
        };
        if artifact.element(dependent_end)?.parent() != Some(association) || principal_end == dependent_end {
            return Err(invalid("ends belong to different associations".to_string()));
        }
        if model::referential_constraint_of(artifact, association).is_some() {
            return Err(invalid(format!(
                "association '{}' already has a referential constraint",
                model::display_name(artifact, association)
            )));
        }

        let principal_type = model::end_type(artifact, principal_end)
            .ok_or_else(|| CommandError::missing_reference(self.name(), "principal end type"))?;
        let dependent_type = model::end_type(artifact, dependent_end)
            .ok_or_else(|| CommandError::missing_reference(self.name(), "dependent end type"))?;

        let keys: BTreeSet<ElementId> = model::key_properties(artifact, principal_type).into_iter().collect();
        let given: BTreeSet<ElementId> = self.principal_properties.iter().copied().collect();
        if keys != given || given.len() != self.principal_properties.len() {
            return Err(invalid(format!(
                "principal properties must be the keys of '{}'",
                model::display_name(artifact, principal_type)
            )));
        }
        let dependent_chain: BTreeSet<ElementId> = std::iter::once(dependent_type)
            .chain(model::ancestors(artifact, dependent_type))
            .collect();
        for property in &self.dependent_properties {
            let owner = artifact.get(*property).and_then(|p| p.parent());
            if !owner.is_some_and(|o| dependent_chain.contains(&o)) {
                return Err(invalid(format!(
                    "'{}' is not a property of '{}'",
                    model::display_name(artifact, *property),
                    model::display_name(artifact, dependent_type)
                )));
            }
        }

        let constraint = cpc
            .artifacts_mut()
            .add_element(association, None, ElementData::ReferentialConstraint)?;
        let sides = [
            (ConstraintRole::Principal, principal_end, self.principal_properties.clone()),
            (ConstraintRole::Dependent, dependent_end, self.dependent_properties.clone()),
        ];
        for (role, end, properties) in sides {
            let role_element = cpc.artifacts_mut().add_element(
                constraint,
                None,
                ElementData::ReferentialConstraintRole { role },
            )?;
            cpc.artifacts_mut().bind_to(role_element, BindingSlot::Role, end)?;
            for property in properties {
                let property_ref = cpc
                    .artifacts_mut()
                    .add_element(role_element, None, ElementData::PropertyRef)?;
                cpc.artifacts_mut()
                    .bind_to(property_ref, BindingSlot::Property, property)?;
            }
        }
        Ok(constraint)
    }

    fn post_invoke(&mut self, cpc: &mut CommandProcessorContext<'_>, output: &ElementId) -> CommandResult<()> {
        cpc.artifacts_mut().normalize_and_resolve(*output);
        Ok(())
    }
}
