//! Local archive directory: one `.eml` artifact per archived message.
//!
//! Artifacts are named `<folder>-<uid>.eml`; the disambiguation policy adds a
//! `(n)` counter before the extension (`INBOX-10(1).eml`). Bodies are written
//! to a hidden `.part` file and renamed into place once flushed, so a name
//! that exists always holds a complete body.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::config::CollisionPolicy;
use crate::error::StoreError;

const ARTIFACT_EXTENSION: &str = "eml";
const PARTIAL_EXTENSION: &str = "part";

/// Where a message should go, decided before downloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No usable artifact exists; download to this path.
    Fresh(PathBuf),
    /// An artifact exists and must not be downloaded again.
    Existing(PathBuf),
    /// An artifact exists while a destructive action is pending.
    Conflict(PathBuf),
}

/// The archive output directory.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    /// Open (creating if absent) the archive directory and clear leftovers of
    /// interrupted downloads.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        let store = Self { dir };
        store.sweep_partials().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for `(folder, uid)` with an optional disambiguation counter.
    pub fn artifact_name(folder: &str, uid: u64, counter: Option<u32>) -> String {
        let folder: String = folder
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        match counter {
            None => format!("{folder}-{uid}.{ARTIFACT_EXTENSION}"),
            Some(n) => format!("{folder}-{uid}({n}).{ARTIFACT_EXTENSION}"),
        }
    }

    /// Decide where `(folder, uid)` goes under `policy`.
    pub async fn resolve(
        &self,
        folder: &str,
        uid: u64,
        policy: CollisionPolicy,
        destructive_pending: bool,
    ) -> Result<Resolution, StoreError> {
        let base = self.dir.join(Self::artifact_name(folder, uid, None));
        if !self.exists(&base).await? {
            return Ok(Resolution::Fresh(base));
        }

        match policy {
            CollisionPolicy::Skip => Ok(Resolution::Existing(base)),
            CollisionPolicy::Strict if destructive_pending => Ok(Resolution::Conflict(base)),
            CollisionPolicy::Strict => Ok(Resolution::Existing(base)),
            CollisionPolicy::Disambiguate => {
                let mut counter = 1_u32;
                loop {
                    let candidate = self
                        .dir
                        .join(Self::artifact_name(folder, uid, Some(counter)));
                    if !self.exists(&candidate).await? {
                        return Ok(Resolution::Fresh(candidate));
                    }
                    counter += 1;
                }
            }
        }
    }

    /// Start writing the artifact that will live at `path`.
    pub async fn begin(&self, path: PathBuf) -> Result<PendingArtifact, StoreError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self
            .dir
            .join(format!(".{file_name}.{}.{PARTIAL_EXTENSION}", Uuid::new_v4()));
        let file = File::create(&tmp_path)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        Ok(PendingArtifact {
            file,
            tmp_path,
            final_path: path,
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        fs::try_exists(path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn sweep_partials(&self) -> Result<(), StoreError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(&format!(".{PARTIAL_EXTENSION}")) {
                debug!(file = %name, "Removing interrupted download");
                fs::remove_file(entry.path())
                    .await
                    .map_err(|e| StoreError::io(entry.path(), e))?;
            }
        }
        Ok(())
    }
}

/// An artifact being written. Invisible under its final name until committed.
pub struct PendingArtifact {
    file: File,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl PendingArtifact {
    /// Sink for the message body.
    pub fn writer(&mut self) -> &mut File {
        &mut self.file
    }

    /// Flush to stable storage and move into place.
    pub async fn commit(mut self) -> Result<PathBuf, StoreError> {
        self.file
            .flush()
            .await
            .map_err(|e| StoreError::io(&self.tmp_path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| StoreError::io(&self.tmp_path, e))?;
        drop(self.file);
        fs::rename(&self.tmp_path, &self.final_path)
            .await
            .map_err(|e| StoreError::io(&self.final_path, e))?;
        Ok(self.final_path)
    }

    /// Discard the partial body.
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.tmp_path).await {
            debug!(path = %self.tmp_path.display(), "Could not remove partial download: {e}");
        }
    }
}
