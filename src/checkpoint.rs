//! Caller-side progress persistence.
//!
//! The reader never writes its own cursor: `run` returns the final
//! `last_timestamp` and callers persist it after their consumer has
//! durably applied the changes. [`ProgressStore`] is the seam for that
//! persistence; [`FileProgressStore`] is a JSON-file implementation with
//! atomic replace semantics.

use crate::change::StreamId;
use crate::error::{CdcError, Result};
use crate::timeuuid::Timeuuid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A persisted resume point for one shard reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Base table the log belongs to, as `keyspace.table`.
    pub table_name: String,
    /// Cursor to resume from.
    pub last_timestamp: Timeuuid,
    /// Unix seconds when the progress was saved.
    pub saved_at: i64,
}

impl Progress {
    /// Create a progress record stamped with the current time.
    pub fn new(table_name: impl Into<String>, last_timestamp: Timeuuid) -> Self {
        Self {
            table_name: table_name.into(),
            last_timestamp,
            saved_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Storage key identifying one shard reader's progress: the table plus its
/// stream set.
pub fn shard_key(table_name: &str, stream_ids: &[StreamId]) -> String {
    let mut key = table_name.replace(['/', '\\', '.'], "_");
    for id in stream_ids {
        key.push('-');
        key.push_str(&id.to_string());
    }
    key
}

/// Persists and restores shard reader progress.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the progress saved under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<Progress>>;

    /// Save `progress` under `key`, replacing any previous value.
    async fn save(&self, key: &str, progress: Progress) -> Result<()>;
}

/// File-backed [`ProgressStore`], one JSON file per key.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-save leaves the previous progress intact.
pub struct FileProgressStore {
    base_dir: PathBuf,
    fsync: bool,
}

impl FileProgressStore {
    /// Create a store rooted at `base_dir`, creating it if needed.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(base_dir, true).await
    }

    /// Create a store with explicit fsync behavior.
    pub async fn with_options(base_dir: impl AsRef<Path>, fsync: bool) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await.map_err(CdcError::Io)?;
        Ok(Self { base_dir, fsync })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }

    fn validate_key(key: &str) -> Result<()> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(CdcError::config(format!("invalid progress key: {key:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self, key: &str) -> Result<Option<Progress>> {
        Self::validate_key(key)?;
        let path = self.file_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CdcError::Io(e)),
        };
        let progress = serde_json::from_slice(&bytes)?;
        Ok(Some(progress))
    }

    async fn save(&self, key: &str, progress: Progress) -> Result<()> {
        Self::validate_key(key)?;
        let path = self.file_path(key);
        let temp = path.with_extension("tmp");

        let json = serde_json::to_vec_pretty(&progress)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .await
            .map_err(CdcError::Io)?;
        file.write_all(&json).await.map_err(CdcError::Io)?;
        if self.fsync {
            file.sync_all().await.map_err(CdcError::Io)?;
        }
        drop(file);

        fs::rename(&temp, &path).await.map_err(CdcError::Io)?;
        debug!(key, last_timestamp = %progress.last_timestamp, "saved progress");
        Ok(())
    }
}
