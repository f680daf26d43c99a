use super::IntegrityRule;
use crate::commands::association::CreateReferentialConstraintCommand;
use crate::commands::delete::DeleteEFElementCommand;
use crate::context::CommandProcessorContext;
use crate::error::{CommandResult, UpdateWarning};
use crate::model;
use edm_artifact::{Artifact, BindingSlot, ElementId, ElementKind};
use std::collections::BTreeSet;
use tracing::debug;

/// Turn an association mapped onto the dependent's own table into a
/// foreign-key association
///
/// Registered against an association-set mapping. When the mapping's table
/// is the table of one end's type, that end is the dependent: a referential
/// constraint is built from the mapped columns and the association-set
/// mapping is queued for deletion.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferReferentialConstraints;

impl IntegrityRule for InferReferentialConstraints {
    fn name(&self) -> &'static str {
        "InferReferentialConstraints"
    }

    fn invoke(&self, cpc: &mut CommandProcessorContext<'_>, element: ElementId) -> CommandResult<()> {
        let Some(plan) = plan_constraint(cpc, element) else {
            return Ok(());
        };
        let command = CreateReferentialConstraintCommand::new(
            plan.principal_end,
            plan.dependent_end,
            plan.principal_properties,
            plan.dependent_properties,
        )
        .and_then(|command| cpc.invoke_single_command(command));
        match command {
            Ok(constraint) => {
                debug!(%constraint, mapping = %element, "referential constraint inferred");
                cpc.enqueue(DeleteEFElementCommand::new(element));
                Ok(())
            }
            Err(err) if err.is_recoverable() => {
                cpc.warn(UpdateWarning::new(
                    format!("could not infer a referential constraint: {err}"),
                    Some(element),
                ));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug)]
struct ConstraintPlan {
    principal_end: ElementId,
    dependent_end: ElementId,
    principal_properties: Vec<ElementId>,
    dependent_properties: Vec<ElementId>,
}

fn plan_constraint(cpc: &CommandProcessorContext<'_>, mapping: ElementId) -> Option<ConstraintPlan> {
    let artifacts = cpc.artifacts();
    let artifact = cpc.artifact();
    let element = artifact.get(mapping)?;
    if element.kind() != ElementKind::AssociationSetMapping {
        return None;
    }
    let association_set = element.binding_target(BindingSlot::AssociationSet)?;
    let store_set = element.binding_target(BindingSlot::StoreEntitySet)?;
    let association = artifact.get(association_set)?.binding_target(BindingSlot::Association)?;
    if model::referential_constraint_of(artifact, association).is_some() {
        return None;
    }

    let mapped_types: BTreeSet<ElementId> = model::types_mapped_to(artifacts, store_set).into_iter().collect();
    let ends = model::association_ends(artifact, association);
    let dependents: Vec<ElementId> = ends
        .iter()
        .copied()
        .filter(|end| {
            model::end_type(artifact, *end).is_some_and(|t| {
                std::iter::once(t)
                    .chain(model::ancestors(artifact, t))
                    .any(|ty| mapped_types.contains(&ty))
            })
        })
        .collect();
    let [dependent_end] = dependents[..] else {
        debug!(%mapping, "no unique dependent end for association set mapping");
        return None;
    };
    let principal_end = ends.iter().copied().find(|e| *e != dependent_end)?;
    let principal_set_end = model::set_end_for(artifact, association_set, principal_end)?;

    let end_property = artifact
        .children_of_kind(mapping, ElementKind::EndProperty)
        .into_iter()
        .find(|ep| artifact.get(*ep).and_then(|e| e.binding_target(BindingSlot::Role)) == Some(principal_set_end))?;

    let dependent_type = model::end_type(artifact, dependent_end)?;
    let mut principal_properties = Vec::new();
    let mut dependent_properties = Vec::new();
    for scalar in artifact.children_of_kind(end_property, ElementKind::ScalarProperty) {
        let scalar = artifact.get(scalar)?;
        let principal = scalar.binding_target(BindingSlot::Property)?;
        let column = scalar.binding_target(BindingSlot::Column)?;
        let dependent = property_mapped_to(artifacts, artifact, dependent_type, store_set, column)?;
        principal_properties.push(principal);
        dependent_properties.push(dependent);
    }
    if principal_properties.is_empty() {
        return None;
    }
    Some(ConstraintPlan {
        principal_end,
        dependent_end,
        principal_properties,
        dependent_properties,
    })
}

/// Conceptual property of `entity_type` (or an ancestor) mapped to `column`
fn property_mapped_to(
    artifacts: &edm_symbol::ArtifactSet,
    artifact: &Artifact,
    entity_type: ElementId,
    store_set: ElementId,
    column: ElementId,
) -> Option<ElementId> {
    std::iter::once(entity_type)
        .chain(model::ancestors(artifact, entity_type))
        .flat_map(|t| model::type_mappings_of(artifacts, t))
        .flat_map(|etm| model::fragments_of(artifact, etm))
        .filter(|f| artifact.get(*f).and_then(|e| e.binding_target(BindingSlot::StoreEntitySet)) == Some(store_set))
        .flat_map(|f| artifact.children_of_kind(f, ElementKind::ScalarProperty))
        .filter_map(|sp| artifact.get(sp))
        .find(|sp| sp.binding_target(BindingSlot::Column) == Some(column))
        .and_then(|sp| sp.binding_target(BindingSlot::Property))
}
