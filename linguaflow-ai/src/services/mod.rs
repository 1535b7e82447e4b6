//! Extraction pipeline services
//!
//! One module per pipeline stage, composed by [`import_pipeline`].

pub mod archive_loader;
pub mod card_assembler;
pub mod field_roles;
pub mod import_pipeline;
pub mod media_resolver;
pub mod text_sanitizer;

#[cfg(test)]
pub(crate) mod test_support;

pub use archive_loader::{validate_upload, ArchiveLoader, EphemeralCollection, WorkDir};
pub use card_assembler::{resolve_deck, CardAssembler, DeckAssociation};
pub use field_roles::{resolve_field_roles, FieldRoleCache, FieldRoles};
pub use import_pipeline::{
    extract_cards, AnkiImporter, BackendStatus, ImportReport, NoteFailurePolicy,
};
pub use media_resolver::{extract_first_media, MediaKind};
pub use text_sanitizer::clean_field;
