//! Deletion with anti-dependency cascade

use crate::command::Command;
use crate::commands::inheritance::DeleteInheritanceCommand;
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult};
use crate::model;
use crate::prereq::{CommandId, Deferred};
use edm_artifact::{cascade_action, BindingSlot, CascadeAction, ElementData, ElementId, ElementKind, FunctionReturn};
use edm_symbol::BindingRef;
use std::collections::BTreeSet;
use tracing::debug;

/// Delete an element and everything that depends on it
///
/// Before the element's subtree is removed, every binding from outside the
/// subtree into it is handled by the cascade policy of its owner: the
/// owner (or one of its ancestors) is deleted, the binding is dropped, or a
/// derived type is re-parented onto the deleted base's own base. No
/// element is left with a binding into the removed subtree.
#[derive(Debug, Clone)]
pub struct DeleteEFElementCommand {
    element: Deferred<ElementId>,
}

impl DeleteEFElementCommand {
    /// Delete `element` and whatever depends on it
    #[must_use]
    pub fn new(element: impl Into<Deferred<ElementId>>) -> Self {
        Self {
            element: element.into(),
        }
    }
}

impl Command for DeleteEFElementCommand {
    /// Number of elements removed, cascades included
    type Output = usize;

    fn name(&self) -> &'static str {
        "DeleteEFElement"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.element.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.element.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<usize> {
        let element = self.element.require("element")?;
        if !cpc.artifact().contains(element) {
            return Err(CommandError::missing_reference(self.name(), format!("element {element}")));
        }
        if cpc.artifact().roots().contains(&element) {
            return Err(CommandError::precondition("model roots cannot be deleted"));
        }
        delete_with_cascade(cpc, element)
    }
}

fn delete_with_cascade(cpc: &mut CommandProcessorContext<'_>, id: ElementId) -> CommandResult<usize> {
    let mut removed = 0;
    loop {
        if !cpc.artifact().contains(id) {
            return Ok(removed);
        }
        let Some((owner, slot, target)) = next_outside_referrer(cpc, id) else {
            break;
        };
        let owner_kind = cpc.artifact().element(owner)?.kind();
        let action = cascade_action(owner_kind, slot);
        debug!(%owner, %slot, %target, ?action, "cascade");
        match action {
            CascadeAction::DeleteOwner => removed += delete_with_cascade(cpc, owner)?,
            CascadeAction::DeleteAncestor(kind) => {
                let victim = cpc.artifact().ancestor_of_kind(owner, kind).unwrap_or(owner);
                removed += delete_with_cascade(cpc, victim)?;
            }
            CascadeAction::ClearBinding => {
                cpc.artifacts_mut().clear_binding(owner, slot)?;
                if owner_kind == ElementKind::FunctionImport && slot == BindingSlot::Type {
                    cpc.artifacts_mut().update_data(owner, |data| {
                        if let ElementData::FunctionImport { return_type, .. } = data {
                            *return_type = FunctionReturn::None;
                        }
                    })?;
                }
            }
            CascadeAction::Reparent => match model::base_type(cpc.artifact(), target) {
                Some(grand_base) if grand_base != owner => {
                    cpc.artifacts_mut()
                        .bind_to(owner, BindingSlot::BaseType, grand_base)?;
                }
                _ => {
                    cpc.invoke_single_command(DeleteInheritanceCommand::new(owner))?;
                }
            },
        }
    }
    removed += cpc.artifacts_mut().remove_element(id)?.len();
    Ok(removed)
}

/// First binding from outside the subtree of `id` into it
fn next_outside_referrer(
    cpc: &CommandProcessorContext<'_>,
    id: ElementId,
) -> Option<(ElementId, BindingSlot, ElementId)> {
    let artifact = cpc.artifact();
    let members: BTreeSet<ElementId> = artifact.subtree(id).into_iter().collect();
    members.iter().find_map(|member| {
        cpc.artifacts()
            .anti_dependencies(*member)
            .into_iter()
            .find(|(owner, _): &BindingRef| !members.contains(owner))
            .map(|(owner, slot)| (owner, slot, *member))
    })
}
