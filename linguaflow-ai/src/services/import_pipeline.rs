//! Anki import pipeline
//!
//! archive bytes → [`ArchiveLoader`] → per note: field roles (cached per
//! schema) → text sanitizer → media resolver → deck lookup → record →
//! release of the ephemeral collection.
//!
//! Each call to [`AnkiImporter::import`] owns its own working directory and
//! collection, so concurrent imports share nothing but the backend factory.

use linguaflow_common::api::{AnkiImportResponse, ImportedCard};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::archive_loader::ArchiveLoader;
use super::card_assembler::CardAssembler;
use super::field_roles::{resolve_field_roles, FieldRoleCache, FieldRoles};
use crate::backend::{BackendError, Collection, CollectionBackend, Note, NoteId};
use crate::error::ImportError;

/// What to do when a single note cannot be processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoteFailurePolicy {
    /// Abort the whole import
    #[default]
    FailFast,
    /// Log the note, leave it out and report its id
    SkipNote,
}

impl NoteFailurePolicy {
    pub fn from_skip_flag(skip_failed_notes: bool) -> Self {
        if skip_failed_notes {
            NoteFailurePolicy::SkipNote
        } else {
            NoteFailurePolicy::FailFast
        }
    }
}

/// Outcome of the startup backend probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Ready { description: String },
    Unavailable { reason: String },
}

impl BackendStatus {
    pub async fn probe(backend: &dyn CollectionBackend) -> Self {
        match backend.probe().await {
            Ok(description) => BackendStatus::Ready { description },
            Err(e) => BackendStatus::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, BackendStatus::Ready { .. })
    }

    /// `ready (<engine>)` or `error: <reason>`
    pub fn describe(&self) -> String {
        match self {
            BackendStatus::Ready { description } => format!("ready ({})", description),
            BackendStatus::Unavailable { reason } => format!("error: {}", reason),
        }
    }
}

/// Records extracted from one archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub cards: Vec<ImportedCard>,
    pub skipped_notes: Vec<NoteId>,
}

impl From<ImportReport> for AnkiImportResponse {
    fn from(report: ImportReport) -> Self {
        AnkiImportResponse {
            cards: report.cards,
            skipped_notes: report.skipped_notes,
        }
    }
}

/// Long-lived importer shared by all requests
pub struct AnkiImporter {
    loader: ArchiveLoader,
    status: BackendStatus,
    policy: NoteFailurePolicy,
}

impl AnkiImporter {
    /// Probe the backend once and keep the result for the process lifetime
    pub async fn initialize(
        backend: Arc<dyn CollectionBackend>,
        work_root: PathBuf,
        policy: NoteFailurePolicy,
    ) -> Self {
        let status = BackendStatus::probe(backend.as_ref()).await;
        match &status {
            BackendStatus::Ready { description } => {
                info!(backend = backend.name(), version = %description, "Collection backend ready")
            }
            BackendStatus::Unavailable { reason } => {
                error!(backend = backend.name(), reason = %reason, "Collection backend unavailable")
            }
        }
        Self::with_status(backend, work_root, policy, status)
    }

    pub fn with_status(
        backend: Arc<dyn CollectionBackend>,
        work_root: PathBuf,
        policy: NoteFailurePolicy,
        status: BackendStatus,
    ) -> Self {
        Self {
            loader: ArchiveLoader::new(backend, work_root),
            status,
            policy,
        }
    }

    pub fn backend_status(&self) -> &BackendStatus {
        &self.status
    }

    pub fn policy(&self) -> NoteFailurePolicy {
        self.policy
    }

    pub fn work_root(&self) -> &std::path::Path {
        self.loader.work_root()
    }

    /// Decode an uploaded archive into card records
    ///
    /// The ephemeral collection is released before this returns, whatever
    /// the outcome.
    pub async fn import(&self, filename: &str, bytes: &[u8]) -> Result<ImportReport, ImportError> {
        if let BackendStatus::Unavailable { reason } = &self.status {
            return Err(ImportError::BackendUnavailable(reason.clone()));
        }

        let started = Instant::now();
        let ephemeral = self.loader.load(filename, bytes).await?;
        let import_id = ephemeral.import_id();
        let summary = ephemeral.summary();
        debug!(
            import_id = %import_id,
            notes = summary.notes,
            cards = summary.cards,
            decks = summary.decks,
            media_files = summary.media_files,
            "Archive loaded"
        );

        let result = extract_cards(ephemeral.collection(), self.policy, import_id).await;
        ephemeral.release().await;

        match &result {
            Ok(report) => info!(
                import_id = %import_id,
                filename = %filename,
                cards = report.cards.len(),
                skipped = report.skipped_notes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Import complete"
            ),
            Err(e) => error!(import_id = %import_id, filename = %filename, error = %e, "Import failed"),
        }

        result
    }
}

/// One record per note of `collection`, in ascending note id order
pub async fn extract_cards(
    collection: &dyn Collection,
    policy: NoteFailurePolicy,
    import_id: Uuid,
) -> Result<ImportReport, ImportError> {
    let note_ids = collection.list_note_ids("").await?;
    info!(import_id = %import_id, notes = note_ids.len(), "Collection populated");

    let assembler = CardAssembler::new(collection);
    let mut roles_cache = FieldRoleCache::new();
    let mut report = ImportReport::default();

    for note_id in note_ids {
        match process_note(collection, &assembler, &mut roles_cache, note_id).await {
            Ok(Some(card)) => report.cards.push(card),
            Ok(None) => {
                warn!(import_id = %import_id, note_id, "Listed note no longer exists, skipping");
                report.skipped_notes.push(note_id);
            }
            Err(e) => match policy {
                NoteFailurePolicy::FailFast => {
                    return Err(ImportError::ImportFailure(format!(
                        "Failed to process note {}: {}",
                        note_id, e
                    )));
                }
                NoteFailurePolicy::SkipNote => {
                    warn!(import_id = %import_id, note_id, error = %e, "Skipping note that failed to process");
                    report.skipped_notes.push(note_id);
                }
            },
        }
    }

    debug!(import_id = %import_id, schemas = roles_cache.len(), "Field roles resolved");
    Ok(report)
}

async fn process_note(
    collection: &dyn Collection,
    assembler: &CardAssembler<'_>,
    roles_cache: &mut FieldRoleCache,
    note_id: NoteId,
) -> Result<Option<ImportedCard>, BackendError> {
    let Some(note) = collection.get_note(note_id).await? else {
        return Ok(None);
    };

    let roles = roles_for(collection, roles_cache, &note).await?;
    assembler.assemble(&note, roles).await.map(Some)
}

async fn roles_for(
    collection: &dyn Collection,
    roles_cache: &mut FieldRoleCache,
    note: &Note,
) -> Result<FieldRoles, BackendError> {
    if let Some(roles) = roles_cache.get(note.schema_id) {
        return Ok(roles);
    }

    let field_names = collection
        .get_schema(note.schema_id)
        .await?
        .map(|schema| schema.field_names)
        .unwrap_or_default();
    let roles = resolve_field_roles(&field_names);
    roles_cache.insert(note.schema_id, roles);
    Ok(roles)
}
