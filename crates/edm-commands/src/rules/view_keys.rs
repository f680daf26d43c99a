use super::IntegrityRule;
use crate::context::CommandProcessorContext;
use crate::error::CommandResult;
use crate::model;
use edm_artifact::{BindingSlot, ElementData, ElementId, ElementKind};
use std::collections::BTreeSet;
use tracing::debug;

/// Mirror conceptual keys onto the storage columns of views
///
/// Views carry no primary key in the database, so the storage model's key
/// flags follow whatever columns the conceptual key properties map to.
/// Registered against a conceptual entity type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagateViewKeysToStorageModel;

impl IntegrityRule for PropagateViewKeysToStorageModel {
    fn name(&self) -> &'static str {
        "PropagateViewKeysToStorageModel"
    }

    fn invoke(&self, cpc: &mut CommandProcessorContext<'_>, element: ElementId) -> CommandResult<()> {
        if cpc.artifact().get(element).map(|e| e.kind()) != Some(ElementKind::EntityType) {
            return Ok(());
        }
        let keys: BTreeSet<ElementId> = model::key_properties(cpc.artifact(), element)
            .into_iter()
            .collect();

        let mut updates = Vec::new();
        for type_mapping in model::type_mappings_of(cpc.artifacts(), element) {
            for fragment in model::fragments_of(cpc.artifact(), type_mapping) {
                let artifact = cpc.artifact();
                let Some(store_set) = artifact.get(fragment).and_then(|f| f.binding_target(BindingSlot::StoreEntitySet))
                else {
                    continue;
                };
                if !model::is_view(artifact, store_set) {
                    continue;
                }
                let Some(table) = model::set_element_type(artifact, store_set) else {
                    continue;
                };
                let key_columns: BTreeSet<ElementId> = artifact
                    .children_of_kind(fragment, ElementKind::ScalarProperty)
                    .into_iter()
                    .filter_map(|sp| artifact.get(sp))
                    .filter(|sp| sp.binding_target(BindingSlot::Property).is_some_and(|p| keys.contains(&p)))
                    .filter_map(|sp| sp.binding_target(BindingSlot::Column))
                    .collect();
                if key_columns.is_empty() {
                    continue;
                }
                for column in model::properties(artifact, table) {
                    let should_be_key = key_columns.contains(&column);
                    if artifact.get(column).is_some_and(|c| c.is_key() != should_be_key) {
                        updates.push((column, should_be_key));
                    }
                }
            }
        }

        for (column, is_key) in updates {
            debug!(%column, is_key, "view key flag updated");
            cpc.artifacts_mut().update_data(column, |data| {
                if let ElementData::Property(facets) = data {
                    facets.is_key = is_key;
                    if is_key {
                        facets.nullable = false;
                    }
                }
            })?;
        }
        Ok(())
    }
}
