use edm_artifact::{Artifact, BindingSlot, ElementData, ElementId, ModelSpace, PropertyFacets};
use edm_symbol::ArtifactSet;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Entity types `T0..Tn`, each with a key `Id`, one entity set per type and
/// one scalar mapping per key.
fn build(type_count: usize) -> (ArtifactSet, Vec<ElementId>) {
    let mut set = ArtifactSet::new(Artifact::new("Model").unwrap());
    let schema = set.artifact().schema(ModelSpace::Conceptual);
    let container = set.artifact().container(ModelSpace::Conceptual);
    let mapping = set.artifact().schema(ModelSpace::Mapping);

    let mut types = Vec::new();
    for i in 0..type_count {
        let ty = set
            .add_element(schema, Some(&format!("T{i}")), ElementData::EntityType { is_abstract: false })
            .unwrap();
        let key = set
            .add_element(ty, Some("Id"), ElementData::Property(PropertyFacets::primitive("Int32").with_key()))
            .unwrap();
        let es = set
            .add_element(container, Some(&format!("T{i}Set")), ElementData::EntitySet { is_view: false })
            .unwrap();
        set.bind_to(es, BindingSlot::Type, ty).unwrap();
        let sp = set.add_element(mapping, None, ElementData::ScalarProperty).unwrap();
        set.bind_to(sp, BindingSlot::Property, key).unwrap();
        types.push(ty);
    }
    (set, types)
}

proptest! {
    #[test]
    fn prop_renames_keep_every_binding_known(
        count in 1..6usize,
        renames in proptest::collection::vec((0..6usize, "[A-Z][a-z]{1,6}"), 0..12)
    ) {
        let (mut set, types) = build(count);
        let schema = set.artifact().schema(ModelSpace::Conceptual);
        for (pick, base) in renames {
            let ty = types[pick % types.len()];
            let name = set.unique_name(schema, &base);
            set.rename(ty, &name).unwrap();
            set.resolve_dirty();
        }
        prop_assert!(set.unresolved_bindings().is_empty());
    }

    #[test]
    fn prop_reverse_index_matches_scan(
        count in 1..6usize,
        removals in proptest::collection::vec(0..6usize, 0..4)
    ) {
        let (mut set, types) = build(count);
        for pick in removals {
            let ty = types[pick % types.len()];
            if set.artifact().contains(ty) {
                set.remove_element(ty).unwrap();
            }
        }
        set.resolve_dirty();

        for element in set.artifact().elements() {
            for (slot, binding) in element.bindings() {
                if let Some(target) = binding.target() {
                    prop_assert!(set.anti_dependencies(target).contains(&(element.id(), slot)));
                }
            }
        }
    }
}

#[test]
fn move_between_schemas_is_rejected_across_spaces() {
    let (mut set, types) = build(1);
    let storage = set.artifact().schema(ModelSpace::Storage);
    assert!(set.move_element(types[0], storage).is_err());
}

#[test]
fn anti_dependencies_of_kind_filters_owners() {
    let (set, types) = build(2);
    let owners = set.anti_dependencies_of_kind(types[1], edm_artifact::ElementKind::EntitySet);
    assert_eq!(owners.len(), 1);
    let set_name = set.artifact().element(owners[0]).unwrap().name();
    assert_eq!(set_name, Some("T1Set"));
}
