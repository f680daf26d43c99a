//! Creating and removing inheritance between entity types
//!
//! Both commands restructure entity sets, keys and mappings, so they walk
//! the anti-dependencies of every element whose identity changes.

use crate::command::Command;
use crate::commands::delete::DeleteEFElementCommand;
use crate::commands::entity::CreateEntitySetCommand;
use crate::commands::mapping::CreateEntitySetMappingCommand;
use crate::context::CommandProcessorContext;
use crate::error::{CommandError, CommandResult, ValidationFailure};
use crate::model;
use crate::prereq::{CommandId, Deferred};
use crate::rules::{EnforceEntitySetMappingRules, IntegrityRule};
use crate::validation::CommandValidation;
use edm_artifact::{BindingSlot, ElementData, ElementId, ElementKind};
use std::collections::{BTreeMap, BTreeSet};

/// Make `derived` inherit from `base`
///
/// The derived type's own entity set is deleted once its association-set
/// ends and type mappings have been moved to the base's set. Derived keys
/// that match a root key by name are merged into it; other derived keys
/// stop being keys.
#[derive(Debug, Clone)]
pub struct CreateInheritanceCommand {
    derived: Deferred<ElementId>,
    base: Deferred<ElementId>,
}

impl CreateInheritanceCommand {
    /// `derived` becomes a subtype of `base`
    #[must_use]
    pub fn new(derived: impl Into<Deferred<ElementId>>, base: impl Into<Deferred<ElementId>>) -> Self {
        Self {
            derived: derived.into(),
            base: base.into(),
        }
    }

    fn check(&self, cpc: &CommandProcessorContext<'_>, derived: ElementId, base: ElementId) -> CommandResult<()> {
        let artifact = cpc.artifact();
        CommandValidation::validate_conceptual_entity_type(artifact, derived, self.name())?;
        CommandValidation::validate_conceptual_entity_type(artifact, base, self.name())?;
        let derived_name = model::display_name(artifact, derived);
        let base_name = model::display_name(artifact, base);

        if let Some(existing) = model::base_type(artifact, derived) {
            return Err(ValidationFailure::AlreadyDerived {
                derived: derived_name,
                base: model::display_name(artifact, existing),
            }
            .into());
        }
        if derived == base || model::ancestors(artifact, base).contains(&derived) {
            return Err(ValidationFailure::CircularInheritance {
                derived: derived_name,
                base: base_name,
            }
            .into());
        }

        let root_key_names: BTreeSet<String> = model::key_properties(artifact, base)
            .into_iter()
            .map(|k| model::display_name(artifact, k))
            .collect();
        let base_members: BTreeSet<String> = std::iter::once(base)
            .chain(model::ancestors(artifact, base))
            .flat_map(|t| member_names(cpc, t))
            .collect();
        let derived_keys: BTreeSet<ElementId> = model::declared_keys(artifact, derived).into_iter().collect();
        for ty in std::iter::once(derived).chain(model::descendants(cpc.artifacts(), derived)) {
            for member in artifact.get(ty).map(|e| e.children().to_vec()).unwrap_or_default() {
                let Some(name) = artifact.get(member).and_then(|e| e.name()) else {
                    continue;
                };
                let merged_key = derived_keys.contains(&member) && root_key_names.contains(name);
                if base_members.contains(name) && !merged_key {
                    return Err(ValidationFailure::DuplicateName {
                        name: name.to_string(),
                        scope: base_name,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

fn member_names(cpc: &CommandProcessorContext<'_>, ty: ElementId) -> Vec<String> {
    let artifact = cpc.artifact();
    artifact
        .get(ty)
        .map(|e| e.children().to_vec())
        .unwrap_or_default()
        .into_iter()
        .filter(|m| {
            artifact.get(*m).is_some_and(|e| {
                matches!(e.kind(), ElementKind::Property | ElementKind::NavigationProperty)
            })
        })
        .map(|m| model::display_name(artifact, m))
        .collect()
}

impl Command for CreateInheritanceCommand {
    type Output = ();

    fn name(&self) -> &'static str {
        "CreateInheritance"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        [self.derived.prereq_id(), self.base.prereq_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.derived.resolve()?;
        self.base.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        let derived = self.derived.require("derived type")?;
        let base = self.base.require("base type")?;
        self.check(cpc, derived, base)?;

        let base_root = model::root_type(cpc.artifact(), base);
        let root_keys: BTreeMap<String, ElementId> = model::declared_keys(cpc.artifact(), base_root)
            .into_iter()
            .map(|k| (model::display_name(cpc.artifact(), k), k))
            .collect();

        for key in model::declared_keys(cpc.artifact(), derived) {
            let name = model::display_name(cpc.artifact(), key);
            match root_keys.get(&name) {
                Some(root_key) => {
                    for (owner, slot) in cpc.artifacts().anti_dependencies(key) {
                        cpc.artifacts_mut().bind_to(owner, slot, *root_key)?;
                    }
                    cpc.invoke_single_command(DeleteEFElementCommand::new(key))?;
                }
                None => {
                    cpc.artifacts_mut().update_data(key, |data| {
                        if let ElementData::Property(facets) = data {
                            facets.is_key = false;
                        }
                    })?;
                }
            }
        }

        let derived_set = model::own_entity_set(cpc.artifacts(), derived);
        let base_set = model::entity_set_of(cpc.artifacts(), base);
        match (derived_set, base_set) {
            (Some(derived_set), Some(base_set)) => {
                for (owner, slot) in cpc.artifacts().anti_dependencies(derived_set) {
                    let owner_kind = cpc.artifact().element(owner)?.kind();
                    let repoint = slot == BindingSlot::EntitySet
                        && matches!(owner_kind, ElementKind::AssociationSetEnd | ElementKind::FunctionImport);
                    if repoint {
                        cpc.artifacts_mut().bind_to(owner, slot, base_set)?;
                    }
                }
                if let Some(derived_mapping) = model::entity_set_mapping_of(cpc.artifacts(), derived_set) {
                    let base_mapping = cpc.invoke_single_command(CreateEntitySetMappingCommand::new(base_set))?;
                    for type_mapping in cpc
                        .artifact()
                        .children_of_kind(derived_mapping, ElementKind::EntityTypeMapping)
                    {
                        cpc.artifacts_mut().move_element(type_mapping, base_mapping)?;
                    }
                }
                cpc.invoke_single_command(DeleteEFElementCommand::new(derived_set))?;
            }
            (Some(derived_set), None) => {
                cpc.artifacts_mut()
                    .bind_to(derived_set, BindingSlot::Type, base_root)?;
            }
            (None, _) => {}
        }

        cpc.artifacts_mut()
            .bind_to(derived, BindingSlot::BaseType, base)?;
        Ok(())
    }

    fn post_invoke(&mut self, cpc: &mut CommandProcessorContext<'_>, _output: &()) -> CommandResult<()> {
        if let Some(derived) = self.derived.get() {
            EnforceEntitySetMappingRules::add_rule(cpc, *derived);
        }
        Ok(())
    }
}

/// Detach `derived` from its base type
///
/// The derived type becomes a root: it gets copies of the old root's keys
/// and its own entity set, and the type mappings and association-set ends
/// of its subtree move to that set. Returns the new entity set.
#[derive(Debug, Clone)]
pub struct DeleteInheritanceCommand {
    derived: Deferred<ElementId>,
}

impl DeleteInheritanceCommand {
    /// Remove the base type of `derived`
    #[must_use]
    pub fn new(derived: impl Into<Deferred<ElementId>>) -> Self {
        Self {
            derived: derived.into(),
        }
    }
}

impl Command for DeleteInheritanceCommand {
    type Output = ElementId;

    fn name(&self) -> &'static str {
        "DeleteInheritance"
    }

    fn prerequisites(&self) -> Vec<CommandId> {
        self.derived.prereq_id().into_iter().collect()
    }

    fn process_prereqs(&mut self, _cpc: &mut CommandProcessorContext<'_>) -> CommandResult<()> {
        self.derived.resolve()
    }

    fn invoke_internal(&mut self, cpc: &mut CommandProcessorContext<'_>) -> CommandResult<ElementId> {
        let derived = self.derived.require("derived type")?;
        CommandValidation::validate_conceptual_entity_type(cpc.artifact(), derived, self.name())?;
        if model::base_type(cpc.artifact(), derived).is_none() {
            return Err(CommandError::precondition(format!(
                "'{}' has no base type",
                model::display_name(cpc.artifact(), derived)
            )));
        }
        let old_root = model::root_type(cpc.artifact(), derived);
        let old_set = model::entity_set_of(cpc.artifacts(), derived);
        let subtree: BTreeSet<ElementId> = std::iter::once(derived)
            .chain(model::descendants(cpc.artifacts(), derived))
            .collect();

        cpc.artifacts_mut().clear_binding(derived, BindingSlot::BaseType)?;

        let mut key_map = BTreeMap::new();
        for key in model::declared_keys(cpc.artifact(), old_root) {
            let element = cpc.artifact().element(key)?;
            let name = model::display_name(cpc.artifact(), key);
            let data = element.data().clone();
            let copy = match cpc.artifact().find_child(derived, ElementKind::Property, &name) {
                Some(existing) => {
                    cpc.artifacts_mut().update_data(existing, |d| {
                        if let ElementData::Property(facets) = d {
                            facets.is_key = true;
                            facets.nullable = false;
                        }
                    })?;
                    existing
                }
                None => cpc.artifacts_mut().add_element(derived, Some(&name), data)?,
            };
            key_map.insert(key, copy);
        }

        let new_set = cpc.invoke_single_command(CreateEntitySetCommand::with_default_name(derived))?;

        for (old_key, new_key) in &key_map {
            for (owner, slot) in cpc.artifacts().anti_dependencies(*old_key) {
                let owner_kind = cpc.artifact().element(owner)?.kind();
                let follows = match owner_kind {
                    ElementKind::PropertyRef => cpc
                        .artifact()
                        .get(owner)
                        .and_then(|e| e.parent())
                        .and_then(|role| cpc.artifact().get(role)?.binding_target(BindingSlot::Role))
                        .and_then(|end| model::end_type(cpc.artifact(), end))
                        .is_some_and(|t| subtree.contains(&t)),
                    ElementKind::ScalarProperty => cpc
                        .artifact()
                        .ancestor_of_kind(owner, ElementKind::EntityTypeMapping)
                        .and_then(|etm| cpc.artifact().get(etm)?.binding_target(BindingSlot::Type))
                        .is_some_and(|t| subtree.contains(&t)),
                    _ => false,
                };
                if follows {
                    cpc.artifacts_mut().bind_to(owner, slot, *new_key)?;
                }
            }
        }

        if let Some(old_set) = old_set {
            for (owner, slot) in cpc.artifacts().anti_dependencies(old_set) {
                if slot != BindingSlot::EntitySet {
                    continue;
                }
                let end_in_subtree = cpc
                    .artifact()
                    .get(owner)
                    .filter(|e| e.kind() == ElementKind::AssociationSetEnd)
                    .and_then(|e| e.binding_target(BindingSlot::Role))
                    .and_then(|end| model::end_type(cpc.artifact(), end))
                    .is_some_and(|t| subtree.contains(&t));
                if end_in_subtree {
                    cpc.artifacts_mut().bind_to(owner, slot, new_set)?;
                }
            }
        }

        let type_mappings: Vec<ElementId> = subtree
            .iter()
            .flat_map(|t| model::type_mappings_of(cpc.artifacts(), *t))
            .collect();
        if !type_mappings.is_empty() {
            let new_mapping = cpc.invoke_single_command(CreateEntitySetMappingCommand::new(new_set))?;
            for type_mapping in type_mappings {
                cpc.artifacts_mut().move_element(type_mapping, new_mapping)?;
            }
        }

        EnforceEntitySetMappingRules::add_rule(cpc, old_root);
        EnforceEntitySetMappingRules::add_rule(cpc, derived);
        Ok(new_set)
    }
}
