//! Archive loader
//!
//! Every import gets its own working directory
//! (`<work_root>/anki-import-<uuid>`) holding the uploaded package and a
//! freshly opened collection. [`EphemeralCollection::release`] closes the
//! collection and deletes the directory; the [`WorkDir`] drop guard deletes it
//! on any path that skips the explicit release (early return, panic, dropped
//! future).

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{Collection, CollectionBackend, ImportSummary};
use crate::error::ImportError;

/// Required upload extension (compared case-insensitively)
pub const ARCHIVE_EXTENSION: &str = ".apkg";

/// Collection file name inside each working directory
pub const COLLECTION_FILE_NAME: &str = "collection.anki2";

/// Working directory name prefix
pub const WORK_DIR_PREFIX: &str = "anki-import-";

/// Reject uploads before any resource is allocated
pub fn validate_upload(filename: &str, bytes: &[u8]) -> Result<(), ImportError> {
    if !filename.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
        return Err(ImportError::Validation(format!(
            "File must have the {} extension",
            ARCHIVE_EXTENSION
        )));
    }

    if bytes.is_empty() {
        return Err(ImportError::Validation("File is empty".to_string()));
    }

    Ok(())
}

/// Final path component of an uploaded filename
fn archive_file_name(filename: &str) -> String {
    let normalized = filename.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("upload{}", ARCHIVE_EXTENSION))
}

/// Uniquely named directory removed on drop
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    removed: bool,
}

impl WorkDir {
    /// Create `<root>/anki-import-<id>`; fails if it already exists
    pub fn create(root: &Path, id: Uuid) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let path = root.join(format!("{}{}", WORK_DIR_PREFIX, id));
        std::fs::create_dir(&path)?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory tree now
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        std::fs::remove_dir_all(&self.path)
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove working directory");
            }
        }
    }
}

/// Collection populated from one archive, scoped to one pipeline invocation
pub struct EphemeralCollection {
    import_id: Uuid,
    collection: Box<dyn Collection>,
    work_dir: WorkDir,
    summary: ImportSummary,
}

impl EphemeralCollection {
    pub fn import_id(&self) -> Uuid {
        self.import_id
    }

    pub fn collection(&self) -> &dyn Collection {
        self.collection.as_ref()
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn summary(&self) -> ImportSummary {
        self.summary
    }

    /// Close the collection handle, then delete the working directory
    ///
    /// Never fails: teardown problems are logged.
    pub async fn release(self) {
        let Self {
            import_id,
            collection,
            work_dir,
            ..
        } = self;

        if let Err(e) = collection.close().await {
            warn!(import_id = %import_id, error = %e, "Failed to close collection");
        }
        release_work_dir(work_dir, import_id);
    }
}

fn release_work_dir(work_dir: WorkDir, import_id: Uuid) {
    let path = work_dir.path().to_path_buf();
    match work_dir.remove() {
        Ok(()) => debug!(import_id = %import_id, path = %path.display(), "Working directory removed"),
        Err(e) => warn!(
            import_id = %import_id,
            path = %path.display(),
            error = %e,
            "Failed to remove working directory"
        ),
    }
}

/// Opens uploaded archives into ephemeral collections
pub struct ArchiveLoader {
    backend: Arc<dyn CollectionBackend>,
    work_root: PathBuf,
}

impl ArchiveLoader {
    pub fn new(backend: Arc<dyn CollectionBackend>, work_root: PathBuf) -> Self {
        Self { backend, work_root }
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn backend(&self) -> &dyn CollectionBackend {
        self.backend.as_ref()
    }

    /// Validate, stage and import an uploaded archive
    ///
    /// On success the caller owns the returned collection and must call
    /// [`EphemeralCollection::release`]. On failure everything created here
    /// has already been released.
    pub async fn load(&self, filename: &str, bytes: &[u8]) -> Result<EphemeralCollection, ImportError> {
        validate_upload(filename, bytes)?;

        let import_id = Uuid::new_v4();
        let work_dir = WorkDir::create(&self.work_root, import_id).map_err(|e| {
            ImportError::ImportFailure(format!(
                "Failed to create working directory in {}: {}",
                self.work_root.display(),
                e
            ))
        })?;

        info!(
            import_id = %import_id,
            filename = %filename,
            size_bytes = bytes.len(),
            work_dir = %work_dir.path().display(),
            "Loading archive"
        );

        let archive_path = work_dir.path().join(archive_file_name(filename));
        tokio::fs::write(&archive_path, bytes).await?;

        let mut collection = self
            .backend
            .open(&work_dir.path().join(COLLECTION_FILE_NAME))
            .await?;

        match collection.import_package(&archive_path).await {
            Ok(summary) => Ok(EphemeralCollection {
                import_id,
                collection,
                work_dir,
                summary,
            }),
            Err(e) => {
                error!(import_id = %import_id, filename = %filename, error = %e, "Archive import failed");
                if let Err(close_err) = collection.close().await {
                    warn!(import_id = %import_id, error = %close_err, "Failed to close collection");
                }
                release_work_dir(work_dir, import_id);
                Err(e.into())
            }
        }
    }
}
