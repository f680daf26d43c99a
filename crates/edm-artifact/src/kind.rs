//! Model spaces, element kinds and binding slots
//!
//! Also holds the cascade policy table consulted when the target of a
//! binding is deleted.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// The three models held by one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelSpace {
    /// C-Space: the entity-relationship model shown to the user
    Conceptual,

    /// S-Space: the database schema
    Storage,

    /// M-Space: correspondence between the two
    Mapping,
}

impl ModelSpace {
    /// Short prefix used in symbol-table keys
    #[inline]
    #[must_use]
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Conceptual => "c",
            Self::Storage => "s",
            Self::Mapping => "m",
        }
    }
}

impl Display for ModelSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Conceptual => "conceptual",
            Self::Storage => "storage",
            Self::Mapping => "mapping",
        };
        f.write_str(name)
    }
}

/// Element kind classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Schema,
    EntityContainer,
    EntityType,
    ComplexType,
    Property,
    NavigationProperty,
    Association,
    AssociationEnd,
    ReferentialConstraint,
    ReferentialConstraintRole,
    PropertyRef,
    EntitySet,
    AssociationSet,
    AssociationSetEnd,
    Function,
    FunctionImport,
    EntityContainerMapping,
    EntitySetMapping,
    EntityTypeMapping,
    MappingFragment,
    ScalarProperty,
    AssociationSetMapping,
    EndProperty,
    FunctionImportMapping,
    FunctionImportTypeMapping,
    ResultScalarProperty,
}

impl ElementKind {
    /// Whether elements of this kind are registered in the symbol table
    #[must_use]
    pub fn has_symbol(self) -> bool {
        matches!(
            self,
            Self::EntityContainer
                | Self::EntityType
                | Self::ComplexType
                | Self::Property
                | Self::NavigationProperty
                | Self::Association
                | Self::AssociationEnd
                | Self::EntitySet
                | Self::AssociationSet
                | Self::AssociationSetEnd
                | Self::Function
                | Self::FunctionImport
        )
    }

    /// Whether this kind is a top-level schema type (`Namespace.Name` symbol)
    #[inline]
    #[must_use]
    pub fn is_schema_type(self) -> bool {
        matches!(
            self,
            Self::EntityType | Self::ComplexType | Self::Association | Self::Function
        )
    }

    /// Whether this kind lives directly in an entity container
    #[inline]
    #[must_use]
    pub fn is_container_member(self) -> bool {
        matches!(
            self,
            Self::EntitySet | Self::AssociationSet | Self::FunctionImport
        )
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Named reference attribute on an element
///
/// An element has at most one binding per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BindingSlot {
    /// `EntityType.BaseType`
    BaseType,

    /// Type reference: end type, entity-set type, complex property type,
    /// entity-type mapping type, function-import return type, result type
    /// of a function-import type mapping
    Type,

    /// `NavigationProperty.Relationship`
    Relationship,

    /// `NavigationProperty.FromRole`
    FromRole,

    /// `NavigationProperty.ToRole`
    ToRole,

    /// Role reference of constraint roles, association-set ends and end properties
    Role,

    /// `AssociationSet.Association`
    Association,

    /// Entity-set reference of association-set ends, entity-set mappings and function imports
    EntitySet,

    /// Property reference of `PropertyRef`, `ScalarProperty` and `ResultScalarProperty`
    Property,

    /// `ScalarProperty.ColumnName`
    Column,

    /// Storage entity set of mapping fragments and association-set mappings
    StoreEntitySet,

    /// `AssociationSetMapping.Name`
    AssociationSet,

    /// `FunctionImportMapping.FunctionImportName`
    FunctionImport,

    /// `FunctionImportMapping.FunctionName`
    Function,

    /// `EntityContainerMapping.CdmEntityContainer`
    ConceptualContainer,

    /// `EntityContainerMapping.StorageEntityContainer`
    StorageContainer,
}

impl Display for BindingSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What happens to a binding owner when the bound target is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// Delete the owner element
    DeleteOwner,

    /// Delete the nearest ancestor of the given kind
    DeleteAncestor(ElementKind),

    /// Drop the binding, keep the owner
    ClearBinding,

    /// Re-parent the owner onto the target's own base (inheritance)
    Reparent,
}

/// Cascade policy for a binding held by `owner` in `slot`
#[must_use]
pub fn cascade_action(owner: ElementKind, slot: BindingSlot) -> CascadeAction {
    use ElementKind as K;
    match (owner, slot) {
        (K::EntityType, BindingSlot::BaseType) => CascadeAction::Reparent,
        (K::AssociationEnd, _) => CascadeAction::DeleteAncestor(K::Association),
        (K::PropertyRef | K::ReferentialConstraintRole, _) => {
            CascadeAction::DeleteAncestor(K::ReferentialConstraint)
        }
        (K::AssociationSetEnd, _) => CascadeAction::DeleteAncestor(K::AssociationSet),
        (K::FunctionImport | K::EntityContainerMapping, _) => CascadeAction::ClearBinding,
        _ => CascadeAction::DeleteOwner,
    }
}
