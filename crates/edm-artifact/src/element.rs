//! Model elements and their kind-specific payloads

use crate::binding::ItemBinding;
use crate::id::ElementId;
use crate::kind::{BindingSlot, ElementKind, ModelSpace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Association end multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Exactly one (`1`)
    One,

    /// Zero or one (`0..1`)
    ZeroOrOne,

    /// Many (`*`)
    Many,
}

impl Display for Multiplicity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::One => "1",
            Self::ZeroOrOne => "0..1",
            Self::Many => "*",
        })
    }
}

/// `OnDelete` behaviour of an association end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OnDeleteAction {
    #[default]
    None,
    Cascade,
}

/// `StoreGeneratedPattern` facet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoreGeneratedPattern {
    #[default]
    None,
    Identity,
    Computed,
}

/// Which side of a referential constraint a role element describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintRole {
    Principal,
    Dependent,
}

/// Facets carried by scalar and complex properties
///
/// `type_name` holds the primitive type name. Complex-typed properties
/// leave it empty and carry a [`BindingSlot::Type`] binding instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFacets {
    /// Primitive type name, `None` for complex-typed properties
    pub type_name: Option<String>,
    /// Always false for keys
    pub nullable: bool,
    /// Part of the entity key
    pub is_key: bool,
    /// How the store fills the value on insert or update
    pub store_generated: StoreGeneratedPattern,
    /// Declared length, if any
    pub max_length: Option<u32>,
    /// Database column name when it differs from the element name
    #[serde(default)]
    pub store_name: Option<String>,
}

impl PropertyFacets {
    /// Nullable, non-key primitive property
    #[must_use]
    pub fn primitive(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            nullable: true,
            is_key: false,
            store_generated: StoreGeneratedPattern::None,
            max_length: None,
            store_name: None,
        }
    }

    /// Complex-typed property (never nullable, never a key)
    #[must_use]
    pub fn complex() -> Self {
        Self {
            type_name: None,
            nullable: false,
            is_key: false,
            store_generated: StoreGeneratedPattern::None,
            max_length: None,
            store_name: None,
        }
    }

    /// Mark as entity key; keys are never nullable
    #[must_use]
    pub fn with_key(mut self) -> Self {
        self.is_key = true;
        self.nullable = false;
        self
    }

    /// Set the store-generated pattern
    #[must_use]
    pub fn with_store_generated(mut self, pattern: StoreGeneratedPattern) -> Self {
        self.store_generated = pattern;
        self
    }
}

/// Return shape of a function import
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FunctionReturn {
    /// No result set
    #[default]
    None,

    /// Collection of a primitive type
    Primitive(String),

    /// Collection of the complex type bound in [`BindingSlot::Type`]
    ComplexType,

    /// Collection of the entity type bound in [`BindingSlot::Type`]
    EntityType,
}

/// Kind-specific payload
///
/// The variant determines the element's [`ElementKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementData {
    Schema { namespace: String },
    EntityContainer,
    EntityType { is_abstract: bool },
    ComplexType,
    Property(PropertyFacets),
    NavigationProperty,
    Association,
    AssociationEnd {
        multiplicity: Multiplicity,
        on_delete: OnDeleteAction,
    },
    ReferentialConstraint,
    ReferentialConstraintRole { role: ConstraintRole },
    PropertyRef,
    EntitySet { is_view: bool },
    AssociationSet,
    AssociationSetEnd,
    Function {
        store_schema: Option<String>,
        is_composable: bool,
    },
    FunctionImport {
        return_type: FunctionReturn,
        is_composable: bool,
    },
    EntityContainerMapping,
    EntitySetMapping,
    EntityTypeMapping { is_type_of: bool },
    MappingFragment,
    ScalarProperty,
    AssociationSetMapping,
    EndProperty,
    FunctionImportMapping,
    /// Result type of a function-import mapping; bound in [`BindingSlot::Type`]
    FunctionImportTypeMapping,
    /// Result column feeding the property bound in [`BindingSlot::Property`]
    ResultScalarProperty { column: String },
}

impl ElementData {
    /// Kind implied by this payload
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Schema { .. } => ElementKind::Schema,
            Self::EntityContainer => ElementKind::EntityContainer,
            Self::EntityType { .. } => ElementKind::EntityType,
            Self::ComplexType => ElementKind::ComplexType,
            Self::Property(_) => ElementKind::Property,
            Self::NavigationProperty => ElementKind::NavigationProperty,
            Self::Association => ElementKind::Association,
            Self::AssociationEnd { .. } => ElementKind::AssociationEnd,
            Self::ReferentialConstraint => ElementKind::ReferentialConstraint,
            Self::ReferentialConstraintRole { .. } => ElementKind::ReferentialConstraintRole,
            Self::PropertyRef => ElementKind::PropertyRef,
            Self::EntitySet { .. } => ElementKind::EntitySet,
            Self::AssociationSet => ElementKind::AssociationSet,
            Self::AssociationSetEnd => ElementKind::AssociationSetEnd,
            Self::Function { .. } => ElementKind::Function,
            Self::FunctionImport { .. } => ElementKind::FunctionImport,
            Self::EntityContainerMapping => ElementKind::EntityContainerMapping,
            Self::EntitySetMapping => ElementKind::EntitySetMapping,
            Self::EntityTypeMapping { .. } => ElementKind::EntityTypeMapping,
            Self::MappingFragment => ElementKind::MappingFragment,
            Self::ScalarProperty => ElementKind::ScalarProperty,
            Self::AssociationSetMapping => ElementKind::AssociationSetMapping,
            Self::EndProperty => ElementKind::EndProperty,
            Self::FunctionImportMapping => ElementKind::FunctionImportMapping,
            Self::FunctionImportTypeMapping => ElementKind::FunctionImportTypeMapping,
            Self::ResultScalarProperty { .. } => ElementKind::ResultScalarProperty,
        }
    }
}

/// One node of the model tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    id: ElementId,
    space: ModelSpace,
    name: Option<String>,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    data: ElementData,
    bindings: BTreeMap<BindingSlot, ItemBinding>,
}

impl Element {
    pub(crate) fn new(
        id: ElementId,
        space: ModelSpace,
        parent: Option<ElementId>,
        name: Option<String>,
        data: ElementData,
    ) -> Self {
        Self {
            id,
            space,
            name,
            parent,
            children: Vec::new(),
            data,
            bindings: BTreeMap::new(),
        }
    }

    /// Element id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Element kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }

    /// Owning model space
    #[inline]
    #[must_use]
    pub fn space(&self) -> ModelSpace {
        self.space
    }

    /// Local name
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning parent (`None` for roots)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Ordered children
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    /// Payload
    #[inline]
    #[must_use]
    pub fn data(&self) -> &ElementData {
        &self.data
    }

    /// Mutable payload
    ///
    /// Changing the variant would change the element's kind, so callers
    /// must only edit fields of the existing variant.
    #[inline]
    pub fn data_mut(&mut self) -> &mut ElementData {
        &mut self.data
    }

    /// Property facets, if this is a property
    #[must_use]
    pub fn facets(&self) -> Option<&PropertyFacets> {
        match &self.data {
            ElementData::Property(facets) => Some(facets),
            _ => None,
        }
    }

    /// Whether this is a key property
    #[must_use]
    pub fn is_key(&self) -> bool {
        self.facets().is_some_and(|f| f.is_key)
    }

    /// Binding held in `slot`
    #[inline]
    #[must_use]
    pub fn binding(&self, slot: BindingSlot) -> Option<&ItemBinding> {
        self.bindings.get(&slot)
    }

    /// Resolved target of the binding in `slot`
    #[must_use]
    pub fn binding_target(&self, slot: BindingSlot) -> Option<ElementId> {
        self.bindings.get(&slot).and_then(ItemBinding::target)
    }

    /// All bindings, ordered by slot
    pub fn bindings(&self) -> impl Iterator<Item = (BindingSlot, &ItemBinding)> {
        self.bindings.iter().map(|(slot, b)| (*slot, b))
    }

    /// Mutable binding in `slot`
    #[inline]
    pub fn binding_mut(&mut self, slot: BindingSlot) -> Option<&mut ItemBinding> {
        self.bindings.get_mut(&slot)
    }

    /// Replace the binding in `slot`, returning the previous one
    pub fn set_binding(&mut self, slot: BindingSlot, binding: ItemBinding) -> Option<ItemBinding> {
        self.bindings.insert(slot, binding)
    }

    /// Remove the binding in `slot`
    pub fn remove_binding(&mut self, slot: BindingSlot) -> Option<ItemBinding> {
        self.bindings.remove(&slot)
    }

    /// Change the local name (symbol bookkeeping is the caller's job)
    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_facets_are_not_nullable() {
        let facets = PropertyFacets::primitive("Int32").with_key();
        assert!(facets.is_key);
        assert!(!facets.nullable);
    }

    #[test]
    fn data_determines_kind() {
        let data = ElementData::AssociationEnd {
            multiplicity: Multiplicity::Many,
            on_delete: OnDeleteAction::None,
        };
        assert_eq!(data.kind(), ElementKind::AssociationEnd);
        assert_eq!(ElementData::ScalarProperty.kind(), ElementKind::ScalarProperty);
    }

    #[test]
    fn multiplicity_displays_edmx_form() {
        assert_eq!(Multiplicity::ZeroOrOne.to_string(), "0..1");
        assert_eq!(Multiplicity::Many.to_string(), "*");
    }
}
