//! Shared API request/response types

use serde::{Deserialize, Serialize};

// ========================================
// Import Types
// ========================================

/// One flashcard extracted from an imported deck
///
/// Exactly one record is produced per note in the archive. `front` and `back`
/// are always present (possibly empty); the optional fields are omitted from
/// the JSON entirely when they could not be resolved.
///
/// # Examples
///
/// ```
/// use linguaflow_common::api::types::ImportedCard;
///
/// let card = ImportedCard {
///     id: 1342697561419,
///     front: "hello".to_string(),
///     back: "olá".to_string(),
///     image: None,
///     audio: None,
///     tags: vec!["greetings".to_string()],
///     deck_id: Some("1".to_string()),
///     deck_name: Some("Default".to_string()),
/// };
/// let json = serde_json::to_value(&card).unwrap();
/// assert_eq!(json["deckName"], "Default");
/// assert!(json.get("image").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedCard {
    /// Note identifier from the source collection
    pub id: i64,

    /// Plain-text prompt side
    pub front: String,

    /// Plain-text answer side
    pub back: String,

    /// First referenced image as a `data:` URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// First referenced audio clip as a `data:` URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Note tags in their original order
    pub tags: Vec<String>,

    /// Deck of the note's first card
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<String>,

    /// Display name of that deck
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_name: Option<String>,
}

/// POST /anki/import response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnkiImportResponse {
    pub cards: Vec<ImportedCard>,

    /// Notes left out because they failed to process (only when the service
    /// runs with `import.skip_failed_notes = true`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_notes: Vec<i64>,
}

// ========================================
// Error Types
// ========================================

/// Standard error envelope: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code (e.g. `BAD_REQUEST`)
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card() -> ImportedCard {
        ImportedCard {
            id: 42,
            front: "cat".to_string(),
            back: "gato".to_string(),
            image: None,
            audio: None,
            tags: vec!["animals".to_string(), "basic".to_string()],
            deck_id: None,
            deck_name: None,
        }
    }

    #[test]
    fn test_unresolved_fields_are_omitted() {
        let json = serde_json::to_value(sample_card()).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["id"], 42);
        assert_eq!(obj["front"], "cat");
        assert_eq!(obj["back"], "gato");
        for key in ["image", "audio", "deckId", "deckName"] {
            assert!(!obj.contains_key(key), "{} should be omitted, not null", key);
        }
    }

    #[test]
    fn test_resolved_fields_use_camel_case() {
        let mut card = sample_card();
        card.deck_id = Some("1".to_string());
        card.deck_name = Some("Portuguese::Verbs".to_string());
        card.image = Some("data:image/png;base64,AAAA".to_string());

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["deckId"], "1");
        assert_eq!(json["deckName"], "Portuguese::Verbs");
        assert_eq!(json["image"], "data:image/png;base64,AAAA");
        assert_eq!(json["tags"], serde_json::json!(["animals", "basic"]));
    }

    #[test]
    fn test_empty_front_and_back_are_kept() {
        let mut card = sample_card();
        card.front.clear();
        card.back.clear();

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["front"], "");
        assert_eq!(json["back"], "");
    }

    #[test]
    fn test_import_response_skipped_notes_omitted_when_empty() {
        let response = AnkiImportResponse {
            cards: vec![sample_card()],
            skipped_notes: Vec::new(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("skippedNotes").is_none());

        let response = AnkiImportResponse {
            cards: Vec::new(),
            skipped_notes: vec![7, 9],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["skippedNotes"], serde_json::json!([7, 9]));
    }

    #[test]
    fn test_error_response_shape() {
        let json = serde_json::to_value(ErrorResponse::new("BAD_REQUEST", "empty file")).unwrap();
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "empty file");
    }
}
