//! Collection backend capability interface
//!
//! The extraction pipeline never touches a concrete archive format. It talks to
//! a [`CollectionBackend`], which can open an empty collection on disk, and to
//! the resulting [`Collection`] handle, which can import a package and answer
//! note/card/deck/media queries.
//!
//! [`SqliteBackend`] is the shipped implementation: it unpacks `.apkg` zip
//! containers and stores the imported notes in a throwaway SQLite database.

pub mod media_map;
pub mod sqlite;

pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Note identifier (Anki epoch-millisecond id)
pub type NoteId = i64;
/// Card identifier
pub type CardId = i64;
/// Deck identifier
pub type DeckId = i64;
/// Note type (field schema) identifier
pub type SchemaId = i64;

/// One multi-field content unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    /// Raw field values, in schema order
    pub fields: Vec<String>,
    /// Tags in stored order
    pub tags: Vec<String>,
    pub schema_id: SchemaId,
}

/// Ordered field names of a note type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub id: SchemaId,
    pub name: String,
    pub field_names: Vec<String>,
}

/// Scheduling instance of a note, bound to one deck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
}

/// Counts reported after a package import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub notes: usize,
    pub cards: usize,
    pub decks: usize,
    pub media_files: usize,
}

/// Backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip container could not be read
    #[error("Archive error: {0}")]
    Archive(String),

    /// Embedded JSON (models, decks, media map) could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Package contains no collection database
    #[error("Package contains no collection (expected collection.anki21b, collection.anki21 or collection.anki2)")]
    MissingCollection,

    /// Package structure is recognised but not supported
    #[error("Unsupported package: {0}")]
    UnsupportedPackage(String),

    /// Search string not understood
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl From<zip::result::ZipError> for BackendError {
    fn from(error: zip::result::ZipError) -> Self {
        BackendError::Archive(error.to_string())
    }
}

/// Factory side of the backend: availability probe and collection creation
#[async_trait]
pub trait CollectionBackend: Send + Sync {
    /// Short backend name for diagnostics
    fn name(&self) -> &str;

    /// Check that the backend can operate at all
    ///
    /// Returns a version/description string on success. Called once at
    /// process start; a failure makes the backend unavailable for the
    /// lifetime of the process.
    async fn probe(&self) -> Result<String, BackendError>;

    /// Create an empty collection stored at `path`
    async fn open(&self, path: &Path) -> Result<Box<dyn Collection>, BackendError>;
}

/// An open collection handle
#[async_trait]
pub trait Collection: Send + Sync {
    /// Populate the collection from a package file
    async fn import_package(&mut self, archive_path: &Path) -> Result<ImportSummary, BackendError>;

    /// Note ids matching `query`, ascending; `""` matches every note
    async fn list_note_ids(&self, query: &str) -> Result<Vec<NoteId>, BackendError>;

    async fn get_note(&self, id: NoteId) -> Result<Option<Note>, BackendError>;

    async fn get_schema(&self, id: SchemaId) -> Result<Option<FieldSchema>, BackendError>;

    /// Card ids bound to a note, ascending
    async fn find_cards_for_note(&self, id: NoteId) -> Result<Vec<CardId>, BackendError>;

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, BackendError>;

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, BackendError>;

    /// Directory holding the collection's media files
    fn media_directory(&self) -> PathBuf;

    /// Release the handle; no query may follow
    async fn close(self: Box<Self>) -> Result<(), BackendError>;
}
