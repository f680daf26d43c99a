//! The model arena
//!
//! [`Artifact`] owns every element of the conceptual, storage and mapping
//! trees in a persistent map keyed by [`ElementId`]. Cloning an artifact is
//! cheap (structural sharing), which is what transaction snapshots rely on.

use crate::binding::ItemBinding;
use crate::element::{Element, ElementData};
use crate::id::ElementId;
use crate::kind::{BindingSlot, ElementKind, ModelSpace};
use crate::name::{NameError, QualifiedName, SymbolKey};
use im::OrdMap;
use serde_json::{json, Map, Value};

/// Errors from arena operations
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// No element with this id
    #[error("unknown element: {0}")]
    UnknownElement(ElementId),

    /// Element exists but has another kind
    #[error("element {id} is a {found}, expected {expected}")]
    WrongKind {
        id: ElementId,
        expected: ElementKind,
        found: ElementKind,
    },

    /// Roots cannot be removed or moved
    #[error("element {0} is a model root")]
    RootElement(ElementId),

    /// Moving an element below itself
    #[error("cannot move {id} below its own descendant {parent}")]
    CyclicMove { id: ElementId, parent: ElementId },

    /// Moving an element into another model space
    #[error("cannot move {id} from the {from} model into the {to} model")]
    CrossSpaceMove {
        id: ElementId,
        from: ModelSpace,
        to: ModelSpace,
    },

    /// Namespace or name failed to parse
    #[error(transparent)]
    InvalidName(#[from] NameError),

    /// JSON dump failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Root of the conceptual, storage and mapping trees
///
/// # Invariants
/// - every non-root element has exactly one parent and appears once in
///   that parent's `children`
/// - an element's space is its parent's space
/// - ids are handed out monotonically
#[derive(Debug, Clone)]
pub struct Artifact {
    elements: OrdMap<ElementId, Element>,
    next_id: u64,
    namespace: String,
    conceptual_schema: ElementId,
    conceptual_container: ElementId,
    storage_schema: ElementId,
    storage_container: ElementId,
    mapping_root: ElementId,
}

impl Artifact {
    /// Create an empty model
    ///
    /// Builds the conceptual schema `namespace` with container
    /// `{Namespace}Container`, the storage schema `{namespace}.Store` with
    /// container `{Namespace}StoreContainer`, and the container mapping
    /// between the two.
    ///
    /// # Errors
    /// Returns error if `namespace` is not a valid dotted name
    pub fn new(namespace: &str) -> Result<Self, ArtifactError> {
        let parsed: QualifiedName = namespace.parse()?;
        if parsed.is_empty() {
            return Err(NameError::EmptySegment.into());
        }
        let stem = parsed.segments().concat();
        let storage_namespace = format!("{namespace}.Store");

        let mut artifact = Self {
            elements: OrdMap::new(),
            next_id: 0,
            namespace: namespace.to_string(),
            conceptual_schema: ElementId::new(0),
            conceptual_container: ElementId::new(0),
            storage_schema: ElementId::new(0),
            storage_container: ElementId::new(0),
            mapping_root: ElementId::new(0),
        };

        artifact.conceptual_schema = artifact.insert_root(
            ModelSpace::Conceptual,
            ElementData::Schema {
                namespace: namespace.to_string(),
            },
        );
        artifact.conceptual_container = artifact.insert(
            artifact.conceptual_schema,
            Some(format!("{stem}Container")),
            ElementData::EntityContainer,
        )?;
        artifact.storage_schema = artifact.insert_root(
            ModelSpace::Storage,
            ElementData::Schema {
                namespace: storage_namespace,
            },
        );
        artifact.storage_container = artifact.insert(
            artifact.storage_schema,
            Some(format!("{stem}StoreContainer")),
            ElementData::EntityContainer,
        )?;
        artifact.mapping_root =
            artifact.insert_root(ModelSpace::Mapping, ElementData::EntityContainerMapping);

        let c_key = SymbolKey::new(
            ModelSpace::Conceptual,
            QualifiedName::single(format!("{stem}Container")),
        );
        let s_key = SymbolKey::new(
            ModelSpace::Storage,
            QualifiedName::single(format!("{stem}StoreContainer")),
        );
        let root = artifact.element_mut(artifact.mapping_root)?;
        root.set_binding(BindingSlot::ConceptualContainer, ItemBinding::new(c_key));
        root.set_binding(BindingSlot::StorageContainer, ItemBinding::new(s_key));

        Ok(artifact)
    }

    fn allocate(&mut self) -> ElementId {
        let id = ElementId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert_root(&mut self, space: ModelSpace, data: ElementData) -> ElementId {
        let id = self.allocate();
        self.elements
            .insert(id, Element::new(id, space, None, None, data));
        id
    }

    /// Conceptual namespace
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Namespace of a model space's schema
    #[must_use]
    pub fn namespace_of(&self, space: ModelSpace) -> Option<&str> {
        match self.get(self.schema(space)).map(Element::data) {
            Some(ElementData::Schema { namespace }) => Some(namespace),
            _ => None,
        }
    }

    /// Schema root of a space (the container mapping for [`ModelSpace::Mapping`])
    #[must_use]
    pub fn schema(&self, space: ModelSpace) -> ElementId {
        match space {
            ModelSpace::Conceptual => self.conceptual_schema,
            ModelSpace::Storage => self.storage_schema,
            ModelSpace::Mapping => self.mapping_root,
        }
    }

    /// Entity container of a space (the container mapping for [`ModelSpace::Mapping`])
    #[must_use]
    pub fn container(&self, space: ModelSpace) -> ElementId {
        match space {
            ModelSpace::Conceptual => self.conceptual_container,
            ModelSpace::Storage => self.storage_container,
            ModelSpace::Mapping => self.mapping_root,
        }
    }

    /// The three tree roots
    #[must_use]
    pub fn roots(&self) -> [ElementId; 3] {
        [self.conceptual_schema, self.storage_schema, self.mapping_root]
    }

    /// Number of live elements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the arena is empty (never true for a constructed artifact)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Check whether an element exists
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    /// Lookup element
    #[inline]
    #[must_use]
    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Lookup element, failing if absent
    ///
    /// # Errors
    /// Returns [`ArtifactError::UnknownElement`]
    pub fn element(&self, id: ElementId) -> Result<&Element, ArtifactError> {
        self.elements
            .get(&id)
            .ok_or(ArtifactError::UnknownElement(id))
    }

    /// Lookup element and check its kind
    ///
    /// # Errors
    /// Returns error if absent or of another kind
    pub fn element_of_kind(
        &self,
        id: ElementId,
        expected: ElementKind,
    ) -> Result<&Element, ArtifactError> {
        let element = self.element(id)?;
        if element.kind() == expected {
            Ok(element)
        } else {
            Err(ArtifactError::WrongKind {
                id,
                expected,
                found: element.kind(),
            })
        }
    }

    /// Mutable element access
    ///
    /// # Errors
    /// Returns [`ArtifactError::UnknownElement`]
    pub fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, ArtifactError> {
        self.elements
            .get_mut(&id)
            .ok_or(ArtifactError::UnknownElement(id))
    }

    /// Iterate all elements in id order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Ids of all elements of a kind, in id (creation) order
    #[must_use]
    pub fn of_kind(&self, space: ModelSpace, kind: ElementKind) -> Vec<ElementId> {
        self.elements
            .values()
            .filter(|e| e.space() == space && e.kind() == kind)
            .map(Element::id)
            .collect()
    }

    /// Create a child element
    ///
    /// # Errors
    /// Returns error if the parent does not exist
    pub fn insert(
        &mut self,
        parent: ElementId,
        name: Option<String>,
        data: ElementData,
    ) -> Result<ElementId, ArtifactError> {
        let space = self.element(parent)?.space();
        let id = self.allocate();
        self.elements
            .insert(id, Element::new(id, space, Some(parent), name, data));
        self.element_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Remove an element and its whole subtree
    ///
    /// Returns removed elements, descendants before ancestors.
    ///
    /// # Errors
    /// Returns error if the element is absent or a root
    pub fn remove_subtree(&mut self, id: ElementId) -> Result<Vec<Element>, ArtifactError> {
        let parent = self
            .element(id)?
            .parent()
            .ok_or(ArtifactError::RootElement(id))?;
        self.element_mut(parent)?.children.retain(|c| *c != id);

        let mut order = self.subtree(id);
        order.reverse();
        let mut removed = Vec::with_capacity(order.len());
        for member in order {
            if let Some(element) = self.elements.remove(&member) {
                removed.push(element);
            }
        }
        Ok(removed)
    }

    /// Re-parent an element, appending it to the new parent's children
    ///
    /// # Errors
    /// Returns error if either element is absent, the element is a root,
    /// the parent is in another space, or the new parent lies in the
    /// element's own subtree
    pub fn set_parent(&mut self, id: ElementId, new_parent: ElementId) -> Result<(), ArtifactError> {
        let old_parent = self
            .element(id)?
            .parent()
            .ok_or(ArtifactError::RootElement(id))?;
        let from = self.element(id)?.space();
        let to = self.element(new_parent)?.space();
        if from != to {
            return Err(ArtifactError::CrossSpaceMove { id, from, to });
        }
        if self.is_ancestor_or_self(id, new_parent) {
            return Err(ArtifactError::CyclicMove {
                id,
                parent: new_parent,
            });
        }
        self.element_mut(old_parent)?.children.retain(|c| *c != id);
        self.element_mut(new_parent)?.children.push(id);
        self.element_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.get(cur).and_then(Element::parent);
        }
        false
    }

    /// Pre-order ids of an element and all its descendants
    #[must_use]
    pub fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(element) = self.get(cur) {
                out.push(cur);
                stack.extend(element.children().iter().rev());
            }
        }
        out
    }

    /// Nearest strict ancestor of the given kind
    #[must_use]
    pub fn ancestor_of_kind(&self, id: ElementId, kind: ElementKind) -> Option<ElementId> {
        let mut current = self.get(id)?.parent();
        while let Some(cur) = current {
            let element = self.get(cur)?;
            if element.kind() == kind {
                return Some(cur);
            }
            current = element.parent();
        }
        None
    }

    /// Direct children of a kind, in document order
    #[must_use]
    pub fn children_of_kind(&self, parent: ElementId, kind: ElementKind) -> Vec<ElementId> {
        self.get(parent)
            .map(|p| {
                p.children()
                    .iter()
                    .copied()
                    .filter(|c| self.get(*c).is_some_and(|e| e.kind() == kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First direct child of a kind with the given name
    #[must_use]
    pub fn find_child(&self, parent: ElementId, kind: ElementKind, name: &str) -> Option<ElementId> {
        self.children_of_kind(parent, kind)
            .into_iter()
            .find(|c| self.get(*c).and_then(Element::name) == Some(name))
    }

    /// Qualified symbol of an element, if its kind has one
    ///
    /// Schema types are `Namespace.Name`, members are `Owner.Member`,
    /// containers are their bare name, and container members are
    /// `Container.Name`.
    #[must_use]
    pub fn symbol_of(&self, id: ElementId) -> Option<SymbolKey> {
        let element = self.get(id)?;
        let kind = element.kind();
        if !kind.has_symbol() {
            return None;
        }
        let name = element.name()?;
        let space = element.space();

        if kind.is_schema_type() {
            let parent = self.get(element.parent()?)?;
            let ElementData::Schema { namespace } = parent.data() else {
                return None;
            };
            let qualified = QualifiedName::root().extend_dotted(namespace).child(name);
            return Some(SymbolKey::new(space, qualified));
        }
        if kind == ElementKind::EntityContainer {
            return Some(SymbolKey::new(space, QualifiedName::single(name)));
        }
        self.symbol_of(element.parent()?)
            .map(|owner| owner.child(name))
    }

    /// Render the three trees as JSON for diagnostics and tests
    ///
    /// # Errors
    /// Returns error if a payload fails to serialize
    pub fn to_json_value(&self) -> Result<Value, ArtifactError> {
        Ok(json!({
            "namespace": self.namespace,
            "conceptual": self.element_json(self.conceptual_schema)?,
            "storage": self.element_json(self.storage_schema)?,
            "mapping": self.element_json(self.mapping_root)?,
        }))
    }

    fn element_json(&self, id: ElementId) -> Result<Value, ArtifactError> {
        let element = self.element(id)?;
        let mut bindings = Map::new();
        for (slot, binding) in element.bindings() {
            bindings.insert(
                slot.to_string(),
                json!({
                    "ref": binding.ref_name().to_string(),
                    "status": serde_json::to_value(binding.status())?,
                    "target": binding.target().map(ElementId::raw),
                }),
            );
        }
        let children = element
            .children()
            .iter()
            .map(|child| self.element_json(*child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "id": id.raw(),
            "kind": element.kind().to_string(),
            "name": element.name(),
            "data": serde_json::to_value(element.data())?,
            "bindings": bindings,
            "children": children,
        }))
    }
}
