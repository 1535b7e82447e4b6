//! In-memory collection double for service tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::backend::{
    BackendError, Card, CardId, Collection, Deck, DeckId, FieldSchema, ImportSummary, Note, NoteId,
    SchemaId,
};

#[derive(Debug, Clone, Default)]
pub struct FakeCollection {
    notes: BTreeMap<NoteId, Note>,
    schemas: BTreeMap<SchemaId, FieldSchema>,
    cards: BTreeMap<CardId, Card>,
    decks: BTreeMap<DeckId, Deck>,
    listed_only: HashSet<NoteId>,
    failing: HashSet<NoteId>,
    media_dir: Option<PathBuf>,
}

impl FakeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, id: SchemaId, field_names: &[&str]) -> Self {
        self.schemas.insert(
            id,
            FieldSchema {
                id,
                name: format!("Type {}", id),
                field_names: field_names.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_note(mut self, id: NoteId, schema_id: SchemaId, fields: &[&str], tags: &[&str]) -> Self {
        self.notes.insert(
            id,
            Note {
                id,
                fields: fields.iter().map(|s| s.to_string()).collect(),
                tags: tags.iter().map(|s| s.to_string()).collect(),
                schema_id,
            },
        );
        self
    }

    /// Listed by `list_note_ids` but absent from `get_note`
    pub fn with_vanished_note(mut self, id: NoteId) -> Self {
        self.listed_only.insert(id);
        self
    }

    /// `get_note` fails for this id
    pub fn with_failing_note(mut self, id: NoteId) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn with_card(mut self, id: CardId, note_id: NoteId, deck_id: DeckId) -> Self {
        self.cards.insert(id, Card { id, note_id, deck_id });
        self
    }

    pub fn with_deck(mut self, id: DeckId, name: &str) -> Self {
        self.decks.insert(id, Deck { id, name: name.to_string() });
        self
    }

    pub fn with_media_dir(mut self, path: &Path) -> Self {
        self.media_dir = Some(path.to_path_buf());
        self
    }

    pub fn note(&self, id: NoteId) -> Note {
        self.notes[&id].clone()
    }
}

#[async_trait]
impl Collection for FakeCollection {
    async fn import_package(&mut self, _archive_path: &Path) -> Result<ImportSummary, BackendError> {
        Ok(ImportSummary {
            notes: self.notes.len(),
            cards: self.cards.len(),
            decks: self.decks.len(),
            media_files: 0,
        })
    }

    async fn list_note_ids(&self, query: &str) -> Result<Vec<NoteId>, BackendError> {
        if !query.is_empty() {
            return Err(BackendError::InvalidQuery(query.to_string()));
        }
        let mut ids: Vec<NoteId> = self
            .notes
            .keys()
            .chain(self.listed_only.iter())
            .chain(self.failing.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn get_note(&self, id: NoteId) -> Result<Option<Note>, BackendError> {
        if self.failing.contains(&id) {
            return Err(BackendError::Archive(format!("note {} is corrupt", id)));
        }
        Ok(self.notes.get(&id).cloned())
    }

    async fn get_schema(&self, id: SchemaId) -> Result<Option<FieldSchema>, BackendError> {
        Ok(self.schemas.get(&id).cloned())
    }

    async fn find_cards_for_note(&self, id: NoteId) -> Result<Vec<CardId>, BackendError> {
        Ok(self
            .cards
            .values()
            .filter(|card| card.note_id == id)
            .map(|card| card.id)
            .collect())
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, BackendError> {
        Ok(self.cards.get(&id).copied())
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, BackendError> {
        Ok(self.decks.get(&id).cloned())
    }

    fn media_directory(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("linguaflow-test-no-media"))
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
}
