//! Identifier validation

use crate::error::SymbolError;

/// Longest identifier accepted for a model element
pub const MAX_IDENTIFIER_LEN: usize = 480;

/// Validate a simple (undotted) model identifier
///
/// Identifiers start with a letter or underscore and continue with
/// letters, digits or underscores.
///
/// # Errors
/// Returns [`SymbolError::InvalidIdentifier`] describing the first problem found
pub fn validate_identifier(name: &str) -> Result<(), SymbolError> {
    let invalid = |reason: &str| SymbolError::InvalidIdentifier {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(invalid("name is empty"));
    };
    if !(first.is_alphabetic() || first == '_') {
        return Err(invalid("must start with a letter or underscore"));
    }
    if chars.any(|c| !(c.is_alphanumeric() || c == '_')) {
        return Err(invalid("may only contain letters, digits and underscores"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid("name is too long"));
    }
    Ok(())
}

/// Check if `name` is a valid identifier
#[inline]
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    validate_identifier(name).is_ok()
}
