//! Test Helper Utilities
//!
//! Shared utilities for testing linguaflow-ai

#![allow(dead_code)]

pub mod apkg_builder;

pub use apkg_builder::{vocabulary_package, ApkgBuilder, PackageKind};

use linguaflow_ai::backend::SqliteBackend;
use linguaflow_ai::services::{AnkiImporter, NoteFailurePolicy};
use std::path::Path;
use std::sync::Arc;

/// Importer over the SQLite backend rooted at `work_root`
pub async fn test_importer(work_root: &Path, policy: NoteFailurePolicy) -> AnkiImporter {
    AnkiImporter::initialize(
        Arc::new(SqliteBackend::new()),
        work_root.to_path_buf(),
        policy,
    )
    .await
}

/// Number of entries directly under `dir` (0 if it does not exist)
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
