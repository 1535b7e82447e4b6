//! SQLite collection backend
//!
//! Opens an empty collection database, unpacks `.apkg` packages into it and
//! answers the queries the extraction pipeline needs.
//!
//! Package layout handled here:
//! - `collection.anki21b`: zstd-compressed SQLite, modern schema
//!   (`notetypes`/`fields`/`decks` tables), zstd-compressed media files and a
//!   protobuf media manifest
//! - `collection.anki21` / `collection.anki2`: plain SQLite with note types
//!   and decks stored as JSON in the `col` table, JSON media manifest

use super::media_map::{parse_legacy_json, parse_media_entries, MediaMapEntry};
use super::{
    BackendError, Card, CardId, Collection, CollectionBackend, Deck, DeckId, FieldSchema,
    ImportSummary, Note, NoteId, SchemaId,
};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Anki's field separator inside `notes.flds`
const FIELD_SEPARATOR: char = '\x1f';

/// Tables of the ephemeral collection
const COLLECTION_SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS notetypes (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS fields (
        ntid INTEGER NOT NULL,
        ord INTEGER NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (ntid, ord)
    )",
    "CREATE TABLE IF NOT EXISTS decks (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notes (
        id INTEGER PRIMARY KEY,
        mid INTEGER NOT NULL,
        tags TEXT NOT NULL,
        flds TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cards (
        id INTEGER PRIMARY KEY,
        nid INTEGER NOT NULL,
        did INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_cards_nid ON cards (nid)",
];

/// Backend storing each collection in its own SQLite file
#[derive(Debug, Default, Clone)]
pub struct SqliteBackend;

impl SqliteBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CollectionBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn probe(&self) -> Result<String, BackendError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let (version,): (String,) = sqlx::query_as("SELECT sqlite_version()")
            .fetch_one(&pool)
            .await?;
        pool.close().await;

        Ok(format!("SQLite {}", version))
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn Collection>, BackendError> {
        let collection = SqliteCollection::create(path).await?;
        Ok(Box::new(collection))
    }
}

/// Which collection file a package carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageFormat {
    /// `collection.anki21b`
    Modern,
    /// `collection.anki21`
    Anki21,
    /// `collection.anki2`
    Legacy,
}

impl PackageFormat {
    /// Newest format first
    fn detect(names: &HashSet<String>) -> Option<Self> {
        [Self::Modern, Self::Anki21, Self::Legacy]
            .into_iter()
            .find(|format| names.contains(format.entry_name()))
    }

    fn entry_name(self) -> &'static str {
        match self {
            Self::Modern => "collection.anki21b",
            Self::Anki21 => "collection.anki21",
            Self::Legacy => "collection.anki2",
        }
    }

    fn zstd_compressed(self) -> bool {
        self == Self::Modern
    }
}

/// Result of unpacking the zip container
#[derive(Debug)]
struct UnpackedPackage {
    format: PackageFormat,
    media_files: usize,
}

/// Everything read out of a package's collection database
#[derive(Debug, Default)]
struct PackageContents {
    schemas: Vec<FieldSchema>,
    decks: Vec<Deck>,
    notes: Vec<(NoteId, SchemaId, String, String)>,
    cards: Vec<Card>,
}

/// One collection database plus its media directory
pub struct SqliteCollection {
    pool: SqlitePool,
    path: PathBuf,
    media_dir: PathBuf,
}

impl SqliteCollection {
    /// Create an empty collection at `path` with media in `<stem>.media`
    pub async fn create(path: &Path) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let media_dir = path.with_extension("media");
        std::fs::create_dir_all(&media_dir)?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in COLLECTION_SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        debug!(path = %path.display(), "Collection created");

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            media_dir,
        })
    }

    async fn store(&self, contents: &PackageContents) -> Result<(), BackendError> {
        let mut tx = self.pool.begin().await?;

        for schema in &contents.schemas {
            sqlx::query("INSERT OR REPLACE INTO notetypes (id, name) VALUES (?, ?)")
                .bind(schema.id)
                .bind(&schema.name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM fields WHERE ntid = ?")
                .bind(schema.id)
                .execute(&mut *tx)
                .await?;
            for (ord, name) in schema.field_names.iter().enumerate() {
                sqlx::query("INSERT INTO fields (ntid, ord, name) VALUES (?, ?, ?)")
                    .bind(schema.id)
                    .bind(ord as i64)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for deck in &contents.decks {
            sqlx::query("INSERT OR REPLACE INTO decks (id, name) VALUES (?, ?)")
                .bind(deck.id)
                .bind(&deck.name)
                .execute(&mut *tx)
                .await?;
        }

        for (id, mid, tags, flds) in &contents.notes {
            sqlx::query("INSERT OR REPLACE INTO notes (id, mid, tags, flds) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(mid)
                .bind(tags)
                .bind(flds)
                .execute(&mut *tx)
                .await?;
        }

        for card in &contents.cards {
            sqlx::query("INSERT OR REPLACE INTO cards (id, nid, did) VALUES (?, ?, ?)")
                .bind(card.id)
                .bind(card.note_id)
                .bind(card.deck_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Collection for SqliteCollection {
    async fn import_package(&mut self, archive_path: &Path) -> Result<ImportSummary, BackendError> {
        let staging_path = self.path.with_file_name("package.staging");

        let archive = archive_path.to_path_buf();
        let staging = staging_path.clone();
        let media_dir = self.media_dir.clone();
        let unpacked =
            tokio::task::spawn_blocking(move || unpack_package(&archive, &staging, &media_dir))
                .await
                .map_err(|e| BackendError::Archive(format!("Unpack task failed: {}", e)))??;

        debug!(
            format = ?unpacked.format,
            media_files = unpacked.media_files,
            "Package unpacked"
        );

        let contents = read_package_collection(&staging_path).await;
        if let Err(e) = tokio::fs::remove_file(&staging_path).await {
            warn!(path = %staging_path.display(), error = %e, "Failed to remove staging collection");
        }
        let contents = contents?;

        self.store(&contents).await?;

        let summary = ImportSummary {
            notes: contents.notes.len(),
            cards: contents.cards.len(),
            decks: contents.decks.len(),
            media_files: unpacked.media_files,
        };
        info!(
            notes = summary.notes,
            cards = summary.cards,
            decks = summary.decks,
            media_files = summary.media_files,
            "Package imported into collection"
        );

        Ok(summary)
    }

    async fn list_note_ids(&self, query: &str) -> Result<Vec<NoteId>, BackendError> {
        let rows: Vec<(i64,)> = match NoteQuery::parse(query)? {
            NoteQuery::All => {
                sqlx::query_as("SELECT id FROM notes ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
            NoteQuery::Deck(name) => {
                sqlx::query_as(
                    r#"
                    SELECT DISTINCT n.id FROM notes n
                    JOIN cards c ON c.nid = n.id
                    JOIN decks d ON d.id = c.did
                    WHERE d.name = ? COLLATE NOCASE OR d.name LIKE ? ESCAPE '\'
                    ORDER BY n.id
                    "#,
                )
                .bind(&name)
                .bind(format!("{}::%", escape_like(&name)))
                .fetch_all(&self.pool)
                .await?
            }
            NoteQuery::Tag(tag) => {
                sqlx::query_as(
                    r#"SELECT id FROM notes WHERE (' ' || tags || ' ') LIKE ? ESCAPE '\' ORDER BY id"#,
                )
                .bind(format!("% {} %", escape_like(&tag)))
                .fetch_all(&self.pool)
                .await?
            }
            NoteQuery::NoteId(id) => {
                sqlx::query_as("SELECT id FROM notes WHERE id = ?")
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_note(&self, id: NoteId) -> Result<Option<Note>, BackendError> {
        let row: Option<(i64, i64, String, String)> =
            sqlx::query_as("SELECT id, mid, tags, flds FROM notes WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, mid, tags, flds)| Note {
            id,
            fields: flds.split(FIELD_SEPARATOR).map(str::to_string).collect(),
            tags: tags.split_whitespace().map(str::to_string).collect(),
            schema_id: mid,
        }))
    }

    async fn get_schema(&self, id: SchemaId) -> Result<Option<FieldSchema>, BackendError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM notetypes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((name,)) = row else {
            return Ok(None);
        };

        let fields: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM fields WHERE ntid = ? ORDER BY ord")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(FieldSchema {
            id,
            name,
            field_names: fields.into_iter().map(|(name,)| name).collect(),
        }))
    }

    async fn find_cards_for_note(&self, id: NoteId) -> Result<Vec<CardId>, BackendError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM cards WHERE nid = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, BackendError> {
        let row: Option<(i64, i64, i64)> =
            sqlx::query_as("SELECT id, nid, did FROM cards WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, note_id, deck_id)| Card { id, note_id, deck_id }))
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, BackendError> {
        let row: Option<(i64, String)> = sqlx::query_as("SELECT id, name FROM decks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, name)| Deck { id, name }))
    }

    fn media_directory(&self) -> PathBuf {
        self.media_dir.clone()
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.pool.close().await;
        debug!(path = %self.path.display(), "Collection closed");
        Ok(())
    }
}

/// Supported search syntax
#[derive(Debug, Clone, PartialEq, Eq)]
enum NoteQuery {
    All,
    Deck(String),
    Tag(String),
    NoteId(NoteId),
}

impl NoteQuery {
    fn parse(query: &str) -> Result<Self, BackendError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Self::All);
        }

        let (key, value) = query
            .split_once(':')
            .ok_or_else(|| BackendError::InvalidQuery(query.to_string()))?;
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            return Err(BackendError::InvalidQuery(query.to_string()));
        }

        match key.to_ascii_lowercase().as_str() {
            "deck" => Ok(Self::Deck(value.to_string())),
            "tag" => Ok(Self::Tag(value.to_string())),
            "nid" => value
                .parse()
                .map(Self::NoteId)
                .map_err(|_| BackendError::InvalidQuery(query.to_string())),
            _ => Err(BackendError::InvalidQuery(query.to_string())),
        }
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reduce a manifest filename to a bare file name inside the media directory
fn safe_media_name(name: &str) -> Option<String> {
    let normalized = name.replace('\\', "/");
    let file_name = Path::new(&normalized).file_name()?.to_str()?;
    if file_name.is_empty() || file_name == "." || file_name == ".." {
        return None;
    }
    Some(file_name.to_string())
}

/// Unpack the zip container: collection → `staging_path`, media → `media_dir`
///
/// Runs on a blocking thread.
fn unpack_package(
    archive_path: &Path,
    staging_path: &Path,
    media_dir: &Path,
) -> Result<UnpackedPackage, BackendError> {
    let file = File::open(archive_path)?;
    let mut zip = ZipArchive::new(file)?;

    let names: HashSet<String> = zip.file_names().map(str::to_string).collect();
    let format = PackageFormat::detect(&names).ok_or(BackendError::MissingCollection)?;

    {
        let mut entry = zip.by_name(format.entry_name())?;
        let mut out = File::create(staging_path)?;
        if format.zstd_compressed() {
            zstd::stream::copy_decode(&mut entry, &mut out)?;
        } else {
            io::copy(&mut entry, &mut out)?;
        }
    }

    let manifest = match zip.by_name("media") {
        Ok(mut entry) => {
            let mut raw = Vec::new();
            entry.read_to_end(&mut raw)?;
            Some(raw)
        }
        Err(ZipError::FileNotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let entries = match manifest {
        Some(raw) => decode_manifest(format, &raw)?,
        None => Vec::new(),
    };

    let mut media_files = 0;
    for item in &entries {
        if extract_media_file(&mut zip, item, media_dir, format.zstd_compressed()) {
            media_files += 1;
        }
    }

    Ok(UnpackedPackage {
        format,
        media_files,
    })
}

fn decode_manifest(format: PackageFormat, raw: &[u8]) -> Result<Vec<MediaMapEntry>, BackendError> {
    if !format.zstd_compressed() {
        return parse_legacy_json(raw);
    }

    // Modern packages may still carry a JSON manifest when exported in
    // legacy-compatible mode.
    match zstd::stream::decode_all(raw) {
        Ok(decoded) => parse_media_entries(&decoded),
        Err(_) => parse_legacy_json(raw),
    }
}

/// Copy one media entry out of the zip; failures are logged and skipped
fn extract_media_file(
    zip: &mut ZipArchive<File>,
    item: &MediaMapEntry,
    media_dir: &Path,
    zstd_compressed: bool,
) -> bool {
    let Some(file_name) = safe_media_name(&item.filename) else {
        warn!(filename = %item.filename, "Skipping media entry with unusable filename");
        return false;
    };

    let mut entry = match zip.by_name(&item.zip_name) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(zip_name = %item.zip_name, filename = %file_name, error = %e, "Media entry missing from package");
            return false;
        }
    };

    let target = media_dir.join(&file_name);
    let result = File::create(&target).and_then(|mut out| {
        if zstd_compressed {
            zstd::stream::copy_decode(&mut entry, &mut out)
        } else {
            io::copy(&mut entry, &mut out).map(|_| ())
        }
    });

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(filename = %file_name, error = %e, "Failed to extract media file");
            let _ = std::fs::remove_file(&target);
            false
        }
    }
}

/// Read note types, decks, notes and cards from an unpacked collection file
async fn read_package_collection(path: &Path) -> Result<PackageContents, BackendError> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let contents = read_contents(&pool).await;
    pool.close().await;
    contents
}

async fn read_contents(pool: &SqlitePool) -> Result<PackageContents, BackendError> {
    let modern: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'fields'",
    )
    .fetch_optional(pool)
    .await?;

    let (schemas, decks) = if modern.is_some() {
        (read_modern_schemas(pool).await?, read_modern_decks(pool).await?)
    } else {
        read_legacy_col(pool).await?
    };

    let notes: Vec<(i64, i64, String, String)> =
        sqlx::query_as("SELECT id, mid, tags, flds FROM notes ORDER BY id")
            .fetch_all(pool)
            .await?;

    let cards: Vec<(i64, i64, i64)> = sqlx::query_as("SELECT id, nid, did FROM cards ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(PackageContents {
        schemas,
        decks,
        notes,
        cards: cards
            .into_iter()
            .map(|(id, note_id, deck_id)| Card { id, note_id, deck_id })
            .collect(),
    })
}

async fn read_modern_schemas(pool: &SqlitePool) -> Result<Vec<FieldSchema>, BackendError> {
    let notetypes: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM notetypes")
        .fetch_all(pool)
        .await?;
    let fields: Vec<(i64, String)> =
        sqlx::query_as("SELECT ntid, name FROM fields ORDER BY ntid, ord")
            .fetch_all(pool)
            .await?;

    let mut by_notetype: HashMap<i64, Vec<String>> = HashMap::new();
    for (ntid, name) in fields {
        by_notetype.entry(ntid).or_default().push(name);
    }

    Ok(notetypes
        .into_iter()
        .map(|(id, name)| FieldSchema {
            id,
            name,
            field_names: by_notetype.remove(&id).unwrap_or_default(),
        })
        .collect())
}

async fn read_modern_decks(pool: &SqlitePool) -> Result<Vec<Deck>, BackendError> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM decks")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name)| Deck {
            id,
            name: name.replace('\x1f', "::"),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct LegacyModel {
    #[serde(default)]
    name: String,
    #[serde(default)]
    flds: Vec<LegacyField>,
}

#[derive(Debug, Deserialize)]
struct LegacyField {
    name: String,
    #[serde(default)]
    ord: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LegacyDeck {
    #[serde(default)]
    name: String,
}

/// Note types and decks from the JSON columns of the legacy `col` table
async fn read_legacy_col(
    pool: &SqlitePool,
) -> Result<(Vec<FieldSchema>, Vec<Deck>), BackendError> {
    let (models, decks): (String, String) = sqlx::query_as("SELECT models, decks FROM col LIMIT 1")
        .fetch_one(pool)
        .await?;

    let models: BTreeMap<String, LegacyModel> = serde_json::from_str(&models)?;
    let decks: BTreeMap<String, LegacyDeck> = serde_json::from_str(&decks)?;

    let schemas = models
        .into_iter()
        .filter_map(|(key, mut model)| {
            let Ok(id) = key.parse::<i64>() else {
                warn!(key = %key, "Skipping note type with non-numeric id");
                return None;
            };
            model.flds.sort_by_key(|f| f.ord.unwrap_or(i64::MAX));
            Some(FieldSchema {
                id,
                name: model.name,
                field_names: model.flds.into_iter().map(|f| f.name).collect(),
            })
        })
        .collect();

    let decks = decks
        .into_iter()
        .filter_map(|(key, deck)| match key.parse::<i64>() {
            Ok(id) => Some(Deck { id, name: deck.name }),
            Err(_) => {
                warn!(key = %key, "Skipping deck with non-numeric id");
                None
            }
        })
        .collect();

    Ok((schemas, decks))
}
