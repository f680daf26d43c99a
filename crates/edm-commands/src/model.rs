//! Read-only queries over the model
//!
//! Shared by commands and rules. Reverse lookups go through the
//! [`ArtifactSet`] anti-dependency index rather than scanning the tree.

use edm_artifact::{Artifact, BindingSlot, Element, ElementData, ElementId, ElementKind};
use edm_symbol::ArtifactSet;
use std::collections::BTreeSet;

/// Display name of an element for messages
#[must_use]
pub fn display_name(artifact: &Artifact, id: ElementId) -> String {
    artifact
        .get(id)
        .and_then(Element::name)
        .map_or_else(|| id.to_string(), str::to_string)
}

/// Direct base type
#[must_use]
pub fn base_type(artifact: &Artifact, entity_type: ElementId) -> Option<ElementId> {
    artifact
        .get(entity_type)?
        .binding_target(BindingSlot::BaseType)
}

/// Base, base of base, ... (nearest first); stops on a loop
#[must_use]
pub fn ancestors(artifact: &Artifact, entity_type: ElementId) -> Vec<ElementId> {
    let mut out = Vec::new();
    let mut current = base_type(artifact, entity_type);
    while let Some(base) = current {
        if base == entity_type || out.contains(&base) {
            break;
        }
        out.push(base);
        current = base_type(artifact, base);
    }
    out
}

/// Root of an inheritance chain (the type itself if it has no base)
#[must_use]
pub fn root_type(artifact: &Artifact, entity_type: ElementId) -> ElementId {
    ancestors(artifact, entity_type)
        .last()
        .copied()
        .unwrap_or(entity_type)
}

/// Types deriving directly from `entity_type`
#[must_use]
pub fn derived_types(set: &ArtifactSet, entity_type: ElementId) -> Vec<ElementId> {
    set.anti_dependencies(entity_type)
        .into_iter()
        .filter(|(_, slot)| *slot == BindingSlot::BaseType)
        .map(|(owner, _)| owner)
        .collect()
}

/// All transitive subtypes of `entity_type`
#[must_use]
pub fn descendants(set: &ArtifactSet, entity_type: ElementId) -> Vec<ElementId> {
    let mut out = Vec::new();
    let mut stack = derived_types(set, entity_type);
    while let Some(t) = stack.pop() {
        if t == entity_type || out.contains(&t) {
            continue;
        }
        out.push(t);
        stack.extend(derived_types(set, t));
    }
    out
}

/// Root plus every type below it
#[must_use]
pub fn hierarchy(set: &ArtifactSet, entity_type: ElementId) -> Vec<ElementId> {
    let root = root_type(set.artifact(), entity_type);
    let mut out = vec![root];
    out.extend(descendants(set, root));
    out
}

/// Entity set holding instances of `entity_type` (the root type's set)
#[must_use]
pub fn entity_set_of(set: &ArtifactSet, entity_type: ElementId) -> Option<ElementId> {
    let root = root_type(set.artifact(), entity_type);
    set.anti_dependencies(root)
        .into_iter()
        .find(|(owner, slot)| {
            *slot == BindingSlot::Type
                && set
                    .artifact()
                    .get(*owner)
                    .is_some_and(|e| e.kind() == ElementKind::EntitySet)
        })
        .map(|(owner, _)| owner)
}

/// Entity set declared directly for `entity_type` (not via its root)
#[must_use]
pub fn own_entity_set(set: &ArtifactSet, entity_type: ElementId) -> Option<ElementId> {
    set.anti_dependencies_of_kind(entity_type, ElementKind::EntitySet)
        .into_iter()
        .next()
}

/// Scalar and complex properties declared on a type
#[must_use]
pub fn properties(artifact: &Artifact, owner: ElementId) -> Vec<ElementId> {
    artifact.children_of_kind(owner, ElementKind::Property)
}

/// Key properties declared on a type
#[must_use]
pub fn declared_keys(artifact: &Artifact, entity_type: ElementId) -> Vec<ElementId> {
    properties(artifact, entity_type)
        .into_iter()
        .filter(|p| artifact.get(*p).is_some_and(Element::is_key))
        .collect()
}

/// Key properties in effect for a type (declared on its root)
#[must_use]
pub fn key_properties(artifact: &Artifact, entity_type: ElementId) -> Vec<ElementId> {
    declared_keys(artifact, root_type(artifact, entity_type))
}

/// Property named `name` on the type or one of its ancestors
#[must_use]
pub fn find_property_in_chain(artifact: &Artifact, entity_type: ElementId, name: &str) -> Option<ElementId> {
    std::iter::once(entity_type)
        .chain(ancestors(artifact, entity_type))
        .find_map(|t| artifact.find_child(t, ElementKind::Property, name))
}

/// Member names (properties and navigation properties) visible in the
/// whole chain of `owner`: ancestors, the type itself and its subtypes
#[must_use]
pub fn member_names_in_chain(set: &ArtifactSet, owner: ElementId) -> BTreeSet<String> {
    let artifact = set.artifact();
    let mut types = vec![owner];
    if artifact.get(owner).is_some_and(|e| e.kind() == ElementKind::EntityType) {
        types.extend(ancestors(artifact, owner));
        types.extend(descendants(set, owner));
    }
    types
        .into_iter()
        .flat_map(|t| {
            artifact
                .get(t)
                .map(|e| e.children().to_vec())
                .unwrap_or_default()
        })
        .filter_map(|member| {
            let element = artifact.get(member)?;
            matches!(
                element.kind(),
                ElementKind::Property | ElementKind::NavigationProperty
            )
            .then(|| element.name().map(str::to_string))
            .flatten()
        })
        .collect()
}

/// Entity-set mapping of an entity set
#[must_use]
pub fn entity_set_mapping_of(set: &ArtifactSet, entity_set: ElementId) -> Option<ElementId> {
    set.anti_dependencies_of_kind(entity_set, ElementKind::EntitySetMapping)
        .into_iter()
        .next()
}

/// Entity-type mappings of an entity type
#[must_use]
pub fn type_mappings_of(set: &ArtifactSet, entity_type: ElementId) -> Vec<ElementId> {
    set.anti_dependencies_of_kind(entity_type, ElementKind::EntityTypeMapping)
}

/// Mapping fragments below an entity-type mapping
#[must_use]
pub fn fragments_of(artifact: &Artifact, type_mapping: ElementId) -> Vec<ElementId> {
    artifact.children_of_kind(type_mapping, ElementKind::MappingFragment)
}

/// Conceptual entity types mapped to a storage entity set
#[must_use]
pub fn types_mapped_to(set: &ArtifactSet, store_set: ElementId) -> Vec<ElementId> {
    let artifact = set.artifact();
    let mut out: Vec<ElementId> = set
        .anti_dependencies_of_kind(store_set, ElementKind::MappingFragment)
        .into_iter()
        .filter_map(|fragment| artifact.get(fragment)?.parent())
        .filter_map(|etm| artifact.get(etm)?.binding_target(BindingSlot::Type))
        .collect();
    out.dedup();
    out
}

/// Storage entity set of a storage entity type
#[must_use]
pub fn store_entity_set_of(set: &ArtifactSet, store_type: ElementId) -> Option<ElementId> {
    own_entity_set(set, store_type)
}

/// Storage entity type behind a storage entity set
#[must_use]
pub fn set_element_type(artifact: &Artifact, entity_set: ElementId) -> Option<ElementId> {
    artifact.get(entity_set)?.binding_target(BindingSlot::Type)
}

/// Whether a storage entity set is a view
#[must_use]
pub fn is_view(artifact: &Artifact, entity_set: ElementId) -> bool {
    matches!(
        artifact.get(entity_set).map(Element::data),
        Some(ElementData::EntitySet { is_view: true })
    )
}

/// Association set of an association
#[must_use]
pub fn association_set_of(set: &ArtifactSet, association: ElementId) -> Option<ElementId> {
    set.anti_dependencies_of_kind(association, ElementKind::AssociationSet)
        .into_iter()
        .next()
}

/// Ends of an association, in declaration order
#[must_use]
pub fn association_ends(artifact: &Artifact, association: ElementId) -> Vec<ElementId> {
    artifact.children_of_kind(association, ElementKind::AssociationEnd)
}

/// Entity type at an association end
#[must_use]
pub fn end_type(artifact: &Artifact, end: ElementId) -> Option<ElementId> {
    artifact.get(end)?.binding_target(BindingSlot::Type)
}

/// Association-set end standing for `end` in `association_set`
#[must_use]
pub fn set_end_for(artifact: &Artifact, association_set: ElementId, end: ElementId) -> Option<ElementId> {
    artifact
        .children_of_kind(association_set, ElementKind::AssociationSetEnd)
        .into_iter()
        .find(|se| artifact.get(*se).and_then(|e| e.binding_target(BindingSlot::Role)) == Some(end))
}

/// Referential constraint of an association
#[must_use]
pub fn referential_constraint_of(artifact: &Artifact, association: ElementId) -> Option<ElementId> {
    artifact
        .children_of_kind(association, ElementKind::ReferentialConstraint)
        .into_iter()
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use edm_artifact::{ModelSpace, PropertyFacets};

    #[test]
    fn hierarchy_queries_follow_base_type() {
        let mut set = ArtifactSet::new(Artifact::new("Model").unwrap());
        let schema = set.artifact().schema(ModelSpace::Conceptual);
        let add = |set: &mut ArtifactSet, name: &str| {
            set.add_element(schema, Some(name), ElementData::EntityType { is_abstract: false })
                .unwrap()
        };
        let animal = add(&mut set, "Animal");
        let dog = add(&mut set, "Dog");
        let puppy = add(&mut set, "Puppy");
        set.bind_to(dog, BindingSlot::BaseType, animal).unwrap();
        set.bind_to(puppy, BindingSlot::BaseType, dog).unwrap();
        set.add_element(animal, Some("Id"), ElementData::Property(PropertyFacets::primitive("Int32").with_key()))
            .unwrap();

        assert_eq!(ancestors(set.artifact(), puppy), vec![dog, animal]);
        assert_eq!(root_type(set.artifact(), puppy), animal);
        assert_eq!(descendants(&set, animal).len(), 2);
        assert_eq!(key_properties(set.artifact(), puppy).len(), 1);
        assert!(find_property_in_chain(set.artifact(), puppy, "Id").is_some());
        assert!(member_names_in_chain(&set, dog).contains("Id"));
    }
}
