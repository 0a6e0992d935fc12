//! Backup manifest (`meta.json`).
//!
//! The manifest is the commit point of a backup: a snapshot directory is
//! valid only once the manifest names it. It is replaced atomically by
//! writing a temp file, syncing it, renaming it over the live file and
//! syncing the directory.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "meta.json";

/// Temporary manifest file name used during atomic replacement.
pub const MANIFEST_TEMP: &str = "meta.json.tmp";

/// Binary format of per-entity snapshot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerializationFormat {
    /// Protocol Buffers: repeated `{key, value}` items.
    #[default]
    ProtoBuf,
    /// CBOR array of `[key, value]` byte-string pairs.
    Cbor,
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtoBuf => f.write_str("ProtoBuf"),
            Self::Cbor => f.write_str("Cbor"),
        }
    }
}

/// Description of one complete backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupMetadata {
    /// Backup id; also the name of its snapshot directory.
    pub id: Uuid,
    /// Format of the snapshot files.
    pub serialization_format: SerializationFormat,
    /// When the backup completed.
    pub timestamp_utc: DateTime<Utc>,
    /// Names of the entities captured.
    pub stores: Vec<String>,
}

impl BackupMetadata {
    /// Creates metadata for a backup completed now.
    #[must_use]
    pub fn new(id: Uuid, serialization_format: SerializationFormat, stores: Vec<String>) -> Self {
        Self {
            id,
            serialization_format,
            timestamp_utc: Utc::now(),
            stores,
        }
    }

    /// Snapshot directory of this backup under `backup_path`.
    #[must_use]
    pub fn directory(&self, backup_path: &Path) -> PathBuf {
        backup_path.join(self.id.to_string())
    }
}

/// Contents of the manifest file.
///
/// Only the most recent backup is retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupMetadataList {
    /// Retained backups, newest last.
    pub backups: Vec<BackupMetadata>,
}

impl BackupMetadataList {
    /// A manifest naming exactly `metadata`.
    #[must_use]
    pub fn single(metadata: BackupMetadata) -> Self {
        Self {
            backups: vec![metadata],
        }
    }

    /// The backup a restore should load.
    #[must_use]
    pub fn latest(&self) -> Option<&BackupMetadata> {
        self.backups.last()
    }

    /// Returns true if `id` is referenced.
    #[must_use]
    pub fn references(&self, id: &str) -> bool {
        self.backups.iter().any(|b| b.id.to_string() == id)
    }

    /// Reads the manifest under `backup_path`.
    ///
    /// Returns `Ok(None)` if no manifest exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedMetadata`] if the file does not parse.
    pub async fn load(backup_path: &Path) -> CoreResult<Option<Self>> {
        let data = match fs::read(backup_path.join(MANIFEST_FILE)).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| CoreError::malformed_metadata(format!("{MANIFEST_FILE}: {e}")))
    }

    /// Atomically replaces the manifest under `backup_path`.
    ///
    /// If the replacement fails, the temp file is removed and the previous
    /// manifest is left as it was.
    pub async fn save(&self, backup_path: &Path) -> CoreResult<()> {
        let manifest_path = backup_path.join(MANIFEST_FILE);
        let temp_path = backup_path.join(MANIFEST_TEMP);

        let data = serde_json::to_vec_pretty(self)?;
        if let Err(e) = commit(&data, &temp_path, &manifest_path).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %temp_path.display(), error = %cleanup, "failed to delete manifest temp file");
                }
            }
            return Err(e.into());
        }
        sync_directory(backup_path).await
    }
}

async fn commit(data: &[u8], temp_path: &Path, manifest_path: &Path) -> io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, manifest_path).await
}

/// Makes entry changes in `dir` durable.
#[cfg(unix)]
pub(crate) async fn sync_directory(dir: &Path) -> CoreResult<()> {
    fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

/// NTFS journals metadata; directory handles cannot be synced.
#[cfg(not(unix))]
pub(crate) async fn sync_directory(_dir: &Path) -> CoreResult<()> {
    Ok(())
}
