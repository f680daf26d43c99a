//! Concrete designer commands

pub mod association;
pub mod delete;
pub mod entity;
pub mod function_import;
pub mod inheritance;
pub mod mapping;
pub mod property;
pub mod rename;
pub mod update_from_db;

pub use association::{
    AssociationOutput, CreateConceptualAssociationCommand, CreateNavigationPropertyCommand,
    CreateReferentialConstraintCommand,
};
pub use delete::DeleteEFElementCommand;
pub use entity::{
    create_entity_type_with_set_and_key, CreateComplexTypeCommand, CreateEntitySetCommand,
    CreateEntityTypeCommand, EntityTypeWithSet,
};
pub use function_import::{
    CreateFunctionImportCommand, CreateMatchingFunctionImportCommand, CreateStorageFunctionCommand,
    ImportReturnType, MatchingFunctionImport,
};
pub use inheritance::{CreateInheritanceCommand, DeleteInheritanceCommand};
pub use mapping::{
    CreateAssociationSetMappingCommand, CreateEndScalarPropertyCommand,
    CreateEntitySetMappingCommand, CreateEntityTypeMappingCommand,
    CreateFragmentScalarPropertyCommand, CreateFunctionImportMappingCommand,
    CreateFunctionImportTypeMappingCommand, CreateMappingFragmentCommand,
};
pub use property::{CreatePropertyCommand, PropertyType, SetPropertyFacetsCommand};
pub use rename::RenameCommand;
pub use update_from_db::{
    DatabaseColumn, DatabaseForeignKey, DatabaseProcedure, DatabaseSnapshot, DatabaseTable,
    UpdateModelFromDatabaseCommand, UpdateSummary,
};
