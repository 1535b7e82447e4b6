//! Builds `.apkg` packages on the fly
//!
//! Legacy packages carry `collection.anki2` (note types and decks as JSON in
//! the `col` table) plus a JSON media manifest. Modern packages carry a
//! zstd-compressed `collection.anki21b` with `notetypes`/`fields`/`decks`
//! tables, a zstd-compressed protobuf media manifest and zstd-compressed media.

use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Legacy,
    Modern,
}

#[derive(Debug, Clone)]
struct NoteType {
    id: i64,
    name: String,
    fields: Vec<String>,
}

#[derive(Debug, Clone)]
struct NoteRow {
    id: i64,
    mid: i64,
    fields: Vec<String>,
    tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ApkgBuilder {
    kind: PackageKind,
    notetypes: Vec<NoteType>,
    decks: Vec<(i64, String)>,
    notes: Vec<NoteRow>,
    cards: Vec<(i64, i64, i64)>,
    media: Vec<(String, Vec<u8>)>,
    dangling_media: Vec<String>,
}

impl ApkgBuilder {
    pub fn legacy() -> Self {
        Self::new(PackageKind::Legacy)
    }

    pub fn modern() -> Self {
        Self::new(PackageKind::Modern)
    }

    fn new(kind: PackageKind) -> Self {
        Self {
            kind,
            notetypes: Vec::new(),
            decks: Vec::new(),
            notes: Vec::new(),
            cards: Vec::new(),
            media: Vec::new(),
            dangling_media: Vec::new(),
        }
    }

    pub fn notetype(mut self, id: i64, name: &str, fields: &[&str]) -> Self {
        self.notetypes.push(NoteType {
            id,
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    /// Deck name uses `::` for hierarchy; modern packages store it as `\x1f`
    pub fn deck(mut self, id: i64, name: &str) -> Self {
        self.decks.push((id, name.to_string()));
        self
    }

    pub fn note(mut self, id: i64, mid: i64, fields: &[&str], tags: &[&str]) -> Self {
        self.notes.push(NoteRow {
            id,
            mid,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn card(mut self, id: i64, nid: i64, did: i64) -> Self {
        self.cards.push((id, nid, did));
        self
    }

    pub fn media(mut self, filename: &str, bytes: &[u8]) -> Self {
        self.media.push((filename.to_string(), bytes.to_vec()));
        self
    }

    /// Manifest entry whose zip member is missing
    pub fn dangling_media(mut self, filename: &str) -> Self {
        self.dangling_media.push(filename.to_string());
        self
    }

    pub async fn build(&self) -> Vec<u8> {
        let collection = self.build_collection().await;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        match self.kind {
            PackageKind::Legacy => {
                zip.start_file("collection.anki2", options).unwrap();
                zip.write_all(&collection).unwrap();
            }
            PackageKind::Modern => {
                zip.start_file("collection.anki21b", options).unwrap();
                zip.write_all(&zstd::encode_all(&collection[..], 0).unwrap())
                    .unwrap();
            }
        }

        zip.start_file("media", options).unwrap();
        zip.write_all(&self.media_manifest()).unwrap();

        for (index, (_, bytes)) in self.media.iter().enumerate() {
            zip.start_file(index.to_string(), options).unwrap();
            match self.kind {
                PackageKind::Legacy => zip.write_all(bytes).unwrap(),
                PackageKind::Modern => zip
                    .write_all(&zstd::encode_all(&bytes[..], 0).unwrap())
                    .unwrap(),
            }
        }

        zip.finish().unwrap().into_inner()
    }

    fn manifest_names(&self) -> Vec<&str> {
        self.media
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(self.dangling_media.iter().map(String::as_str))
            .collect()
    }

    fn media_manifest(&self) -> Vec<u8> {
        let names = self.manifest_names();
        match self.kind {
            PackageKind::Legacy => {
                let map: Map<String, Value> = names
                    .iter()
                    .enumerate()
                    .map(|(index, name)| (index.to_string(), json!(name)))
                    .collect();
                serde_json::to_vec(&map).unwrap()
            }
            PackageKind::Modern => {
                let mut message = Vec::new();
                for name in names {
                    let mut entry = Vec::new();
                    put_key(1, 2, &mut entry);
                    put_varint(name.len() as u64, &mut entry);
                    entry.extend_from_slice(name.as_bytes());

                    put_key(1, 2, &mut message);
                    put_varint(entry.len() as u64, &mut message);
                    message.extend_from_slice(&entry);
                }
                zstd::encode_all(&message[..], 0).unwrap()
            }
        }
    }

    async fn build_collection(&self) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.db");
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, guid TEXT, mid INTEGER NOT NULL, mod INTEGER, usn INTEGER, tags TEXT NOT NULL, flds TEXT NOT NULL, sfld TEXT, csum INTEGER, flags INTEGER, data TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE cards (id INTEGER PRIMARY KEY, nid INTEGER NOT NULL, did INTEGER NOT NULL, ord INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        match self.kind {
            PackageKind::Legacy => self.write_legacy_col(&pool).await,
            PackageKind::Modern => self.write_modern_tables(&pool).await,
        }

        for note in &self.notes {
            let tags = if note.tags.is_empty() {
                String::new()
            } else {
                format!(" {} ", note.tags.join(" "))
            };
            sqlx::query("INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data) VALUES (?, ?, ?, 0, -1, ?, ?, '', 0, 0, '')")
                .bind(note.id)
                .bind(format!("guid{}", note.id))
                .bind(note.mid)
                .bind(tags)
                .bind(note.fields.join("\x1f"))
                .execute(&pool)
                .await
                .unwrap();
        }

        for (id, nid, did) in &self.cards {
            sqlx::query("INSERT INTO cards (id, nid, did, ord) VALUES (?, ?, ?, 0)")
                .bind(id)
                .bind(nid)
                .bind(did)
                .execute(&pool)
                .await
                .unwrap();
        }

        pool.close().await;
        std::fs::read(&path).unwrap()
    }

    async fn write_legacy_col(&self, pool: &sqlx::SqlitePool) {
        sqlx::query("CREATE TABLE col (id INTEGER PRIMARY KEY, crt INTEGER, mod INTEGER, ver INTEGER, models TEXT NOT NULL, decks TEXT NOT NULL)")
            .execute(pool)
            .await
            .unwrap();

        let models: Map<String, Value> = self
            .notetypes
            .iter()
            .map(|nt| {
                // Stored out of order on purpose; readers must sort by `ord`
                let mut flds: Vec<Value> = nt
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(ord, name)| json!({"name": name, "ord": ord}))
                    .collect();
                flds.reverse();
                (
                    nt.id.to_string(),
                    json!({"id": nt.id, "name": nt.name, "flds": flds}),
                )
            })
            .collect();

        let decks: Map<String, Value> = self
            .decks
            .iter()
            .map(|(id, name)| (id.to_string(), json!({"id": id, "name": name})))
            .collect();

        sqlx::query("INSERT INTO col (id, crt, mod, ver, models, decks) VALUES (1, 0, 0, 11, ?, ?)")
            .bind(Value::Object(models).to_string())
            .bind(Value::Object(decks).to_string())
            .execute(pool)
            .await
            .unwrap();
    }

    async fn write_modern_tables(&self, pool: &sqlx::SqlitePool) {
        for ddl in [
            "CREATE TABLE notetypes (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE fields (ntid INTEGER NOT NULL, ord INTEGER NOT NULL, name TEXT NOT NULL, PRIMARY KEY (ntid, ord))",
            "CREATE TABLE decks (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        ] {
            sqlx::query(ddl).execute(pool).await.unwrap();
        }

        for nt in &self.notetypes {
            sqlx::query("INSERT INTO notetypes (id, name) VALUES (?, ?)")
                .bind(nt.id)
                .bind(&nt.name)
                .execute(pool)
                .await
                .unwrap();
            for (ord, name) in nt.fields.iter().enumerate().rev() {
                sqlx::query("INSERT INTO fields (ntid, ord, name) VALUES (?, ?, ?)")
                    .bind(nt.id)
                    .bind(ord as i64)
                    .bind(name)
                    .execute(pool)
                    .await
                    .unwrap();
            }
        }

        for (id, name) in &self.decks {
            sqlx::query("INSERT INTO decks (id, name) VALUES (?, ?)")
                .bind(id)
                .bind(name.replace("::", "\x1f"))
                .execute(pool)
                .await
                .unwrap();
        }
    }
}

fn put_key(field: u64, wire: u64, out: &mut Vec<u8>) {
    put_varint((field << 3) | wire, out);
}

fn put_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Front/Back vocabulary deck used across tests
pub async fn vocabulary_package(kind: PackageKind) -> Vec<u8> {
    let builder = match kind {
        PackageKind::Legacy => ApkgBuilder::legacy(),
        PackageKind::Modern => ApkgBuilder::modern(),
    };

    builder
        .notetype(1700000000001, "Basic", &["Front", "Back"])
        .deck(1, "Default")
        .deck(1700000000100, "Spanish::Verbs")
        .note(
            1700000001000,
            1700000000001,
            &["<b>to eat</b>", "comer<img src=\"eat.png\">"],
            &["verbs", "a1"],
        )
        .note(
            1700000002000,
            1700000000001,
            &["to drink", "beber [sound:beber.mp3]"],
            &["verbs"],
        )
        .note(1700000003000, 1700000000001, &["orphan", "huérfano"], &[])
        .card(1700000001001, 1700000001000, 1700000000100)
        .card(1700000002001, 1700000002000, 1)
        .media("eat.png", b"\x89PNG fake image")
        .media("beber.mp3", b"ID3 fake audio")
        .build()
        .await
}
