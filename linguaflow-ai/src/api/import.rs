//! Anki import endpoint
//!
//! POST /anki/import takes a multipart form whose `file` part carries the
//! `.apkg` archive and answers with one record per note.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use linguaflow_common::api::AnkiImportResponse;
use tracing::info;

use crate::error::{ApiError, ApiResult, ImportError};
use crate::AppState;

/// Multipart field holding the archive
const FILE_FIELD: &str = "file";

/// POST /anki/import
///
/// # Returns
/// - 200 OK with the extracted cards
/// - 400 Bad Request for a missing file part, wrong extension or empty upload
/// - 503 Service Unavailable when the collection backend failed to start
/// - 500 Internal Server Error when the archive cannot be imported
pub async fn import_deck(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<AnkiImportResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
    }

    let (filename, bytes) = upload
        .ok_or_else(|| ApiError::BadRequest(format!("Missing multipart field '{}'", FILE_FIELD)))?;

    info!(filename = %filename, size_bytes = bytes.len(), "Received archive upload");

    match state.importer.import(&filename, &bytes).await {
        Ok(report) => Ok(Json(report.into())),
        Err(e) => {
            if matches!(e, ImportError::ImportFailure(_)) {
                *state.last_error.write().await = Some(e.to_string());
            }
            Err(e.into())
        }
    }
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new().route("/anki/import", post(import_deck))
}
