//! Shared API types
//!
//! Request/response shapes exchanged between the import service and the
//! LinguaFlow front end.

pub mod types;

pub use types::{AnkiImportResponse, ErrorBody, ErrorResponse, ImportedCard};
