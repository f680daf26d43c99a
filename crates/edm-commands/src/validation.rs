//! CommandValidation - precondition checks shared by commands
//!
//! Constructors call the syntax checks on explicit arguments; the model
//! checks run again in `process_prereqs` once deferred arguments are known.

use crate::error::{CommandError, CommandResult, ValidationFailure};
use crate::model;
use edm_artifact::{primitive, Artifact, ElementId, ElementKind, ModelSpace};
use edm_symbol::{validate_identifier, ArtifactSet, SymbolError};

/// Namespace for validation helpers
#[derive(Debug, Clone, Copy)]
pub struct CommandValidation;

impl CommandValidation {
    /// Name must be a valid identifier
    ///
    /// # Errors
    /// Returns [`ValidationFailure::InvalidName`]
    pub fn validate_name(name: &str) -> CommandResult<()> {
        validate_identifier(name).map_err(|err| match err {
            SymbolError::InvalidIdentifier { name, reason } => {
                ValidationFailure::InvalidName { name, reason }.into()
            }
            other => other.into(),
        })
    }

    /// Type name must be an EDM primitive
    ///
    /// # Errors
    /// Returns [`ValidationFailure::UnknownPrimitiveType`]
    pub fn validate_primitive(type_name: &str) -> CommandResult<()> {
        if primitive::is_primitive(type_name) {
            Ok(())
        } else {
            Err(ValidationFailure::UnknownPrimitiveType(type_name.to_string()).into())
        }
    }

    /// Element must exist and be of `kind`
    ///
    /// # Errors
    /// Returns a referenced-item error if missing, precondition error if
    /// the kind is wrong
    pub fn validate_kind(
        artifact: &Artifact,
        id: ElementId,
        kind: ElementKind,
        command: &'static str,
    ) -> CommandResult<()> {
        let element = artifact
            .get(id)
            .ok_or_else(|| CommandError::missing_reference(command, format!("{kind} {id}")))?;
        if element.kind() != kind {
            return Err(CommandError::precondition(format!(
                "{command}: {id} is a {}, expected {kind}",
                element.kind()
            )));
        }
        Ok(())
    }

    /// Element must exist, be of `kind` and live in `space`
    ///
    /// # Errors
    /// As [`Self::validate_kind`], plus a precondition error for the space
    pub fn validate_in_space(
        artifact: &Artifact,
        id: ElementId,
        kind: ElementKind,
        space: ModelSpace,
        command: &'static str,
    ) -> CommandResult<()> {
        Self::validate_kind(artifact, id, kind, command)?;
        let actual = artifact.get(id).map(|e| e.space());
        if actual != Some(space) {
            return Err(CommandError::precondition(format!(
                "{command}: {id} is not in the {space} model"
            )));
        }
        Ok(())
    }

    /// Conceptual entity type
    ///
    /// # Errors
    /// See [`Self::validate_in_space`]
    pub fn validate_conceptual_entity_type(
        artifact: &Artifact,
        id: ElementId,
        command: &'static str,
    ) -> CommandResult<()> {
        Self::validate_in_space(
            artifact,
            id,
            ElementKind::EntityType,
            ModelSpace::Conceptual,
            command,
        )
    }

    /// Storage entity type
    ///
    /// # Errors
    /// See [`Self::validate_in_space`]
    pub fn validate_storage_entity_type(
        artifact: &Artifact,
        id: ElementId,
        command: &'static str,
    ) -> CommandResult<()> {
        Self::validate_in_space(
            artifact,
            id,
            ElementKind::EntityType,
            ModelSpace::Storage,
            command,
        )
    }

    /// No child of `parent` already carries `name`
    ///
    /// # Errors
    /// Returns [`ValidationFailure::DuplicateName`]
    pub fn validate_unique_child(
        artifact: &Artifact,
        parent: ElementId,
        name: &str,
    ) -> CommandResult<()> {
        let taken = artifact.get(parent).is_some_and(|p| {
            p.children()
                .iter()
                .any(|c| artifact.get(*c).and_then(|e| e.name()) == Some(name))
        });
        if taken {
            return Err(ValidationFailure::DuplicateName {
                name: name.to_string(),
                scope: model::display_name(artifact, parent),
            }
            .into());
        }
        Ok(())
    }

    /// A new member of `owner` named `name` fits the inheritance chain
    ///
    /// Rejects names used anywhere in the chain and names equal to the
    /// owner's own name.
    ///
    /// # Errors
    /// Returns a validation failure describing the clash
    pub fn validate_member_name(set: &ArtifactSet, owner: ElementId, name: &str) -> CommandResult<()> {
        let artifact = set.artifact();
        if artifact.get(owner).and_then(|e| e.name()) == Some(name) {
            return Err(ValidationFailure::MemberNamedLikeType(name.to_string()).into());
        }
        if model::member_names_in_chain(set, owner).contains(name) {
            return Err(ValidationFailure::DuplicateName {
                name: name.to_string(),
                scope: model::display_name(artifact, owner),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edm_artifact::ElementData;

    #[test]
    fn invalid_names_are_recoverable_validation_errors() {
        let err = CommandValidation::validate_name("1Customer").unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            CommandError::Validation(ValidationFailure::InvalidName { .. })
        ));
    }

    #[test]
    fn primitive_check() {
        assert!(CommandValidation::validate_primitive("Int32").is_ok());
        assert!(CommandValidation::validate_primitive("int").is_err());
    }

    #[test]
    fn wrong_space_is_a_precondition_error() {
        let mut set = ArtifactSet::new(Artifact::new("Model").unwrap());
        let schema = set.artifact().schema(ModelSpace::Storage);
        let table = set
            .add_element(schema, Some("Customer"), ElementData::EntityType { is_abstract: false })
            .unwrap();
        let err =
            CommandValidation::validate_conceptual_entity_type(set.artifact(), table, "test")
                .unwrap_err();
        assert!(matches!(err, CommandError::Precondition(_)));
        assert!(CommandValidation::validate_storage_entity_type(set.artifact(), table, "test").is_ok());
    }

    #[test]
    fn member_named_like_type_is_rejected() {
        let mut set = ArtifactSet::new(Artifact::new("Model").unwrap());
        let schema = set.artifact().schema(ModelSpace::Conceptual);
        let customer = set
            .add_element(schema, Some("Customer"), ElementData::EntityType { is_abstract: false })
            .unwrap();
        assert!(matches!(
            CommandValidation::validate_member_name(&set, customer, "Customer"),
            Err(CommandError::Validation(ValidationFailure::MemberNamedLikeType(_)))
        ));
    }
}
