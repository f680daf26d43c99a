use super::IntegrityRule;
use crate::commands::delete::DeleteEFElementCommand;
use crate::commands::mapping::CreateEntitySetMappingCommand;
use crate::context::CommandProcessorContext;
use crate::error::CommandResult;
use crate::model;
use edm_artifact::{BindingSlot, ElementData, ElementId, ElementKind};
use std::collections::BTreeSet;
use tracing::debug;

/// Keep the type mappings of an inheritance hierarchy under the mapping of
/// its root entity set
///
/// Registered against any entity type of the hierarchy. Moves misplaced
/// entity-type mappings, sets `IsTypeOf` on every type mapping when the
/// hierarchy has more than one type, and deletes entity-set mappings left
/// without type mappings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnforceEntitySetMappingRules;

impl IntegrityRule for EnforceEntitySetMappingRules {
    fn name(&self) -> &'static str {
        "EnforceEntitySetMappingRules"
    }

    fn invoke(&self, cpc: &mut CommandProcessorContext<'_>, element: ElementId) -> CommandResult<()> {
        if cpc.artifact().get(element).map(|e| e.kind()) != Some(ElementKind::EntityType) {
            return Ok(());
        }
        let types = model::hierarchy(cpc.artifacts(), element);
        let Some(root_set) = model::entity_set_of(cpc.artifacts(), element) else {
            debug!(%element, "hierarchy has no entity set");
            return Ok(());
        };
        let in_hierarchy = types.len() > 1;

        let mut touched = BTreeSet::new();
        let mut target = model::entity_set_mapping_of(cpc.artifacts(), root_set);
        for ty in &types {
            for type_mapping in model::type_mappings_of(cpc.artifacts(), *ty) {
                let parent = cpc.artifact().get(type_mapping).and_then(|e| e.parent());
                let parent_set = parent
                    .and_then(|p| cpc.artifact().get(p))
                    .and_then(|p| p.binding_target(BindingSlot::EntitySet));
                if parent_set != Some(root_set) {
                    let destination = match target {
                        Some(existing) => existing,
                        None => {
                            let created =
                                cpc.invoke_single_command(CreateEntitySetMappingCommand::new(root_set))?;
                            target = Some(created);
                            created
                        }
                    };
                    cpc.artifacts_mut().move_element(type_mapping, destination)?;
                    touched.extend(parent);
                    debug!(%type_mapping, %destination, "type mapping moved to root set mapping");
                }
                cpc.artifacts_mut().update_data(type_mapping, |data| {
                    if let ElementData::EntityTypeMapping { is_type_of } = data {
                        *is_type_of = in_hierarchy;
                    }
                })?;
            }
        }
        touched.extend(target);

        for set_mapping in touched {
            let empty = cpc.artifact().contains(set_mapping)
                && cpc
                    .artifact()
                    .children_of_kind(set_mapping, ElementKind::EntityTypeMapping)
                    .is_empty();
            if empty {
                cpc.invoke_single_command(DeleteEFElementCommand::new(set_mapping))?;
            }
        }
        Ok(())
    }
}
