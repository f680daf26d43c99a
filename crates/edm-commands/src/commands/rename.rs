//! Renaming

use crate::command::Command;
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult};
use crate::prereq::{CommandId, Deferred};
use crate::validation::CommandValidation;
use edm_artifact::{ElementId, ElementKind};

/// Rename an element
///
/// Every binding that resolved to the element or one of its members is
/// re-pointed at the new name and rebound in the same step. Renaming an
/// association end also renames the association-set ends playing its role.
#[derive(Debug, Clone)]
pub struct RenameCommand {
    element: Deferred<ElementId>,
    new_name: String,
}

impl RenameCommand {
    /// Rename `element` to `new_name`
    ///
    /// # Errors
    /// Returns a validation error for a bad name
    pub fn new(element: impl Into<Deferred<ElementId>>, new_name: impl Into<String>) -> CommandResult<Self> {
        let new_name = new_name.into();
        CommandValidation::validate_name(&new_name)?;
        Ok(Self {
            element: element.into(),
            new_name,
        })
    }
}

impl Command for RenameCommand {
    /// Previous name
    type Output = String;

    fn name(&self) -> &'static str {
        "Rename"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.element.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.element.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<String> {
        let id = self.element.require("element")?;
        let element = cpc
            .artifact()
            .get(id)
            .ok_or_else(|| CommandError::missing_reference(self.name(), format!("element {id}")))?;
        let kind = element.kind();
        let old_name = element
            .name()
            .ok_or_else(|| CommandError::precondition(format!("{kind} {id} has no name")))?
            .to_string();
        if old_name == self.new_name {
            return Ok(old_name);
        }
        let parent = element
            .parent()
            .ok_or_else(|| CommandError::missing_parent(self.name(), format!("parent of {id}")))?;

        match kind {
            ElementKind::Property | ElementKind::NavigationProperty => {
                CommandValidation::validate_member_name(cpc.artifacts(), parent, &self.new_name)?;
            }
            ElementKind::EntityContainer => {
                return Err(CommandError::precondition("entity containers are renamed by the host"));
            }
            _ => CommandValidation::validate_unique_child(cpc.artifact(), parent, &self.new_name)?,
        }
        cpc.artifacts_mut().rename(id, &self.new_name)?;
        if kind == ElementKind::AssociationEnd {
            // set ends are named after the role they play
            let set_ends = cpc
                .artifacts()
                .anti_dependencies_of_kind(id, ElementKind::AssociationSetEnd);
            for set_end in set_ends {
                cpc.artifacts_mut().rename(set_end, &self.new_name)?;
            }
        }
        Ok(old_name)
    }
}
