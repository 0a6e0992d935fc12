//! Snapshot backup and restore of a byte store provider.
//!
//! ```text
//!   Empty --create--> Restoring --> Ready --close--> BackingUp --> Closed
//!                                    ^  |
//!                                    |  | snapshot_now
//!                                    +--+  (BackingUp)
//! ```

use super::format::DataBackupRestore;
use super::metadata::{sync_directory, BackupMetadata, BackupMetadataList, MANIFEST_FILE, MANIFEST_TEMP};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use edgestore_storage::{ByteStore, ByteStoreProvider, Entry, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of entries read per batch while taking a snapshot.
pub const DEFAULT_BACKUP_BATCH_SIZE: usize = 1000;

/// Lifecycle phase of a [`BackupRestoreManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    /// Not yet restored.
    Empty,
    /// Loading the last backup.
    Restoring,
    /// Serving traffic.
    Ready,
    /// Writing a snapshot.
    BackingUp,
    /// Closed; no further backups are taken.
    Closed,
}

/// Wraps a provider so that its partitions survive restarts as snapshots.
///
/// Every partition obtained through [`get_store`](ByteStoreProvider::get_store)
/// is tracked; [`snapshot_now`](Self::snapshot_now) and
/// [`close`](ByteStoreProvider::close) write the complete contents of every
/// tracked partition to a new directory and then atomically switch the
/// manifest to it. Membership changes wait while a snapshot is in progress.
pub struct BackupRestoreManager {
    inner: Arc<dyn ByteStoreProvider>,
    backup_path: PathBuf,
    codec: Arc<dyn DataBackupRestore>,
    batch_size: usize,
    tracked: tokio::sync::Mutex<BTreeSet<String>>,
    state: Mutex<BackupState>,
}

impl BackupRestoreManager {
    /// Creates the manager and restores the last backup into `inner`.
    ///
    /// A missing manifest is not an error. A restore that fails part way
    /// removes every partially restored partition, deletes all backup
    /// artifacts and continues with empty stores.
    ///
    /// # Errors
    ///
    /// Returns an error only if `backup_path` cannot be created.
    pub async fn create(
        inner: Arc<dyn ByteStoreProvider>,
        backup_path: impl Into<PathBuf>,
        codec: Arc<dyn DataBackupRestore>,
        batch_size: usize,
    ) -> CoreResult<Self> {
        let backup_path = backup_path.into();
        fs::create_dir_all(&backup_path).await?;

        let manager = Self {
            inner,
            backup_path,
            codec,
            batch_size: batch_size.max(1),
            tracked: tokio::sync::Mutex::new(BTreeSet::new()),
            state: Mutex::new(BackupState::Empty),
        };

        manager.set_state(BackupState::Restoring);
        let mut restored = Vec::new();
        if let Err(e) = manager.restore(&mut restored).await {
            warn!(
                path = %manager.backup_path.display(),
                error = %e,
                "restore failed, starting with empty stores"
            );
            manager.discard_restore(&restored).await;
        }
        manager.set_state(BackupState::Ready);

        Ok(manager)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> BackupState {
        *self.state.lock()
    }

    /// Directory holding the manifest and snapshot directories.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Names of the partitions the next snapshot will include.
    pub async fn tracked_stores(&self) -> Vec<String> {
        self.tracked.lock().await.iter().cloned().collect()
    }

    /// Writes a complete snapshot of every tracked partition.
    ///
    /// On failure the previous backup stays current and the partial
    /// snapshot directory is deleted.
    pub async fn snapshot_now(&self) -> CoreResult<BackupMetadata> {
        let tracked = self.tracked.lock().await;
        {
            let mut state = self.state.lock();
            if *state == BackupState::Closed {
                return Err(CoreError::invalid_operation("backup manager is closed"));
            }
            *state = BackupState::BackingUp;
        }

        let id = Uuid::new_v4();
        let result = self.write_backup(id, &tracked).await;
        self.set_state(BackupState::Ready);

        match result {
            Ok(metadata) => {
                info!(
                    id = %metadata.id,
                    stores = metadata.stores.len(),
                    "backup completed"
                );
                self.delete_stale(Some(id)).await;
                Ok(metadata)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "backup failed, keeping previous backup");
                if !self.manifest_references(id).await {
                    remove_dir_if_exists(&self.backup_path.join(id.to_string())).await;
                }
                Err(e)
            }
        }
    }

    async fn write_backup(&self, id: Uuid, stores: &BTreeSet<String>) -> CoreResult<BackupMetadata> {
        let dir = self.backup_path.join(id.to_string());
        fs::create_dir_all(&dir).await?;

        for name in stores {
            let entries = self
                .read_all(name)
                .await
                .map_err(|e| CoreError::backup_failed(name.as_str(), e))?;
            self.codec
                .backup(name, &entries, &dir)
                .await
                .map_err(|e| CoreError::backup_failed(name.as_str(), e))?;
            debug!(entity = %name, entries = entries.len(), "wrote snapshot");
        }
        sync_directory(&dir).await?;

        let metadata = BackupMetadata::new(id, self.codec.format(), stores.iter().cloned().collect());
        BackupMetadataList::single(metadata.clone())
            .save(&self.backup_path)
            .await?;
        Ok(metadata)
    }

    async fn read_all(&self, name: &str) -> CoreResult<Vec<Entry>> {
        let store = self.inner.get_store(name).await?;
        let mut entries: Vec<Entry> = Vec::new();
        let mut start: Option<Vec<u8>> = None;

        loop {
            let batch = store.iterate_batch(start.as_deref(), self.batch_size).await?;
            let done = batch.len() < self.batch_size;
            if let Some((last, _)) = batch.last() {
                // Smallest key strictly greater than `last`.
                let mut next = last.clone();
                next.push(0);
                start = Some(next);
            }
            entries.extend(batch);
            if done {
                return Ok(entries);
            }
        }
    }

    async fn restore(&self, restored: &mut Vec<String>) -> CoreResult<()> {
        let Some(list) = BackupMetadataList::load(&self.backup_path).await? else {
            debug!(path = %self.backup_path.display(), "no backup manifest, nothing to restore");
            return Ok(());
        };
        let Some(metadata) = list.latest() else {
            return Ok(());
        };

        if metadata.serialization_format != self.codec.format() {
            return Err(CoreError::malformed_metadata(format!(
                "backup {} is {} but the configured format is {}",
                metadata.id,
                metadata.serialization_format,
                self.codec.format()
            )));
        }

        let dir = metadata.directory(&self.backup_path);
        let mut tracked = self.tracked.lock().await;
        for name in &metadata.stores {
            let entries = self
                .codec
                .restore(name, &dir)
                .await
                .map_err(|e| CoreError::restore_failed(name.as_str(), e))?;

            let store = self.inner.get_store(name).await?;
            restored.push(name.clone());
            load_entries(store.as_ref(), &entries)
                .await
                .map_err(|e| CoreError::restore_failed(name.as_str(), e))?;
            tracked.insert(name.clone());
            debug!(entity = %name, entries = entries.len(), "restored snapshot");
        }

        info!(id = %metadata.id, stores = metadata.stores.len(), "restore completed");
        Ok(())
    }

    async fn discard_restore(&self, restored: &[String]) {
        let mut tracked = self.tracked.lock().await;
        for name in restored {
            if let Err(e) = self.inner.remove_store(name).await {
                warn!(entity = %name, error = %e, "failed to discard partially restored store");
            }
            tracked.remove(name);
        }
        drop(tracked);

        for file in [MANIFEST_FILE, MANIFEST_TEMP] {
            if let Err(e) = fs::remove_file(self.backup_path.join(file)).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(file, error = %e, "failed to delete backup manifest");
                }
            }
        }
        self.delete_stale(None).await;
    }

    /// Deletes every snapshot directory except `keep`.
    async fn delete_stale(&self, keep: Option<Uuid>) {
        let mut dir = match fs::read_dir(&self.backup_path).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "failed to list backup directory");
                return;
            }
        };

        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to list backup directory");
                    break;
                }
            };
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };
            if Some(id) != keep {
                debug!(%id, "deleting stale backup");
                remove_dir_if_exists(&entry.path()).await;
            }
        }
    }

    async fn manifest_references(&self, id: Uuid) -> bool {
        matches!(
            BackupMetadataList::load(&self.backup_path).await,
            Ok(Some(list)) if list.references(&id.to_string())
        )
    }

    fn set_state(&self, state: BackupState) {
        *self.state.lock() = state;
    }
}

async fn load_entries(store: &dyn ByteStore, entries: &[Entry]) -> CoreResult<()> {
    for (key, value) in entries {
        store.put(key, value).await?;
    }
    Ok(())
}

async fn remove_dir_if_exists(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to delete backup directory");
        }
    }
}

#[async_trait]
impl ByteStoreProvider for BackupRestoreManager {
    async fn get_store(&self, name: &str) -> StorageResult<Arc<dyn ByteStore>> {
        let mut tracked = self.tracked.lock().await;
        let store = self.inner.get_store(name).await?;
        tracked.insert(name.to_string());
        Ok(store)
    }

    async fn remove_store(&self, name: &str) -> StorageResult<()> {
        let mut tracked = self.tracked.lock().await;
        self.inner.remove_store(name).await?;
        tracked.remove(name);
        Ok(())
    }

    /// Takes a final backup, then closes the inner provider.
    ///
    /// A failed final backup is logged and does not fail the close.
    async fn close(&self) -> StorageResult<()> {
        if self.state() != BackupState::Closed {
            if let Err(e) = self.snapshot_now().await {
                warn!(error = %e, "final backup on close failed");
            }
            self.set_state(BackupState::Closed);
        }
        self.inner.close().await
    }
}

impl std::fmt::Debug for BackupRestoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupRestoreManager")
            .field("backup_path", &self.backup_path)
            .field("format", &self.codec.format())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
