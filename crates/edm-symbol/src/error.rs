//! Symbol-layer errors

use edm_artifact::{ArtifactError, BindingSlot, ElementId, ElementKind, SymbolKey};

/// Errors from [`crate::ArtifactSet`] operations
#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    /// Arena operation failed
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Name is not a valid identifier
    #[error("'{name}' is not a valid identifier: {reason}")]
    InvalidIdentifier { name: String, reason: String },

    /// Symbol already declared
    #[error("symbol {0} is already declared")]
    DuplicateSymbol(SymbolKey),

    /// Element kind has no symbol to bind to
    #[error("element {0} has no symbol")]
    NoSymbol(ElementId),

    /// Owner has no binding in this slot
    #[error("element {owner} has no {slot} binding")]
    MissingBinding { owner: ElementId, slot: BindingSlot },

    /// A payload edit tried to change the element kind
    #[error("payload edit would change {id} from {from} to {to}")]
    KindChanged {
        id: ElementId,
        from: ElementKind,
        to: ElementKind,
    },
}
