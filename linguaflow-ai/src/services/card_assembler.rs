//! Output record assembly
//!
//! Combines sanitized front/back text, inlined media, tags and the deck
//! association of one note into an [`ImportedCard`].

use linguaflow_common::api::ImportedCard;
use std::path::PathBuf;
use tracing::warn;

use super::field_roles::FieldRoles;
use super::media_resolver::{extract_first_media, MediaKind};
use super::text_sanitizer::clean_field;
use crate::backend::{BackendError, Collection, Note, NoteId};

/// Deck id/name pair; both absent when the note has no card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckAssociation {
    pub deck_id: Option<String>,
    pub deck_name: Option<String>,
}

/// Deck of the note's lowest-id card
///
/// A note without cards has no deck. A card whose deck row is missing keeps
/// its deck id but has no name.
pub async fn resolve_deck(
    collection: &dyn Collection,
    note_id: NoteId,
) -> Result<DeckAssociation, BackendError> {
    let card_ids = collection.find_cards_for_note(note_id).await?;
    let Some(card_id) = card_ids.iter().copied().min() else {
        return Ok(DeckAssociation::default());
    };

    let Some(card) = collection.get_card(card_id).await? else {
        return Ok(DeckAssociation::default());
    };

    let deck = collection.get_deck(card.deck_id).await?;
    Ok(DeckAssociation {
        deck_id: Some(card.deck_id.to_string()),
        deck_name: deck.map(|deck| deck.name),
    })
}

/// Builds output records for notes of one collection
pub struct CardAssembler<'a> {
    collection: &'a dyn Collection,
    media_dir: PathBuf,
}

impl<'a> CardAssembler<'a> {
    pub fn new(collection: &'a dyn Collection) -> Self {
        Self {
            media_dir: collection.media_directory(),
            collection,
        }
    }

    /// One record for `note`; only backend queries can fail
    pub async fn assemble(&self, note: &Note, roles: FieldRoles) -> Result<ImportedCard, BackendError> {
        let front = clean_field(&note.fields, roles.front);
        let back = clean_field(&note.fields, roles.back);

        let (image, audio) = self.resolve_media(note).await;
        let deck = resolve_deck(self.collection, note.id).await?;

        Ok(ImportedCard {
            id: note.id,
            front,
            back,
            image,
            audio,
            tags: note.tags.clone(),
            deck_id: deck.deck_id,
            deck_name: deck.deck_name,
        })
    }

    /// Image and audio data URIs, read off the async runtime
    async fn resolve_media(&self, note: &Note) -> (Option<String>, Option<String>) {
        let fields = note.fields.clone();
        let media_dir = self.media_dir.clone();

        let resolved = tokio::task::spawn_blocking(move || {
            (
                extract_first_media(&fields, &media_dir, MediaKind::Image),
                extract_first_media(&fields, &media_dir, MediaKind::Audio),
            )
        })
        .await;

        resolved.unwrap_or_else(|e| {
            warn!(note_id = note.id, error = %e, "Media resolution task failed");
            (None, None)
        })
    }
}
