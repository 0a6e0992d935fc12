//! Store provider configuration.

use crate::backup::{SerializationFormat, DEFAULT_BACKUP_BATCH_SIZE};
use crate::key_lock::DEFAULT_SHARD_COUNT;
use edgestore_storage::DEFAULT_CHECK_FREQUENCY;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-operation time budget.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for opening a [`StoreProvider`](crate::StoreProvider).
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of key-lock shards per entity store.
    pub shard_count: usize,

    /// Time budget of each byte store call (`None` = unbounded).
    pub operation_timeout: Option<Duration>,

    /// Storage cap in bytes; writes are refused once usage reaches it
    /// (`None` = no cap, no space checker).
    pub max_storage_bytes: Option<u64>,

    /// How often the space checker samples usage.
    pub space_check_frequency: Duration,

    /// Snapshot backup settings (`None` = no backup/restore).
    pub backup: Option<BackupConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
            max_storage_bytes: None,
            space_check_frequency: DEFAULT_CHECK_FREQUENCY,
            backup: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of key-lock shards.
    #[must_use]
    pub fn shard_count(mut self, count: usize) -> Self {
        self.shard_count = count;
        self
    }

    /// Sets the per-operation time budget.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Disables per-operation timeouts.
    #[must_use]
    pub fn no_operation_timeout(mut self) -> Self {
        self.operation_timeout = None;
        self
    }

    /// Sets the storage cap in bytes.
    #[must_use]
    pub fn max_storage_bytes(mut self, bytes: u64) -> Self {
        self.max_storage_bytes = Some(bytes);
        self
    }

    /// Sets how often storage usage is sampled.
    #[must_use]
    pub fn space_check_frequency(mut self, frequency: Duration) -> Self {
        self.space_check_frequency = frequency;
        self
    }

    /// Enables snapshot backup/restore.
    #[must_use]
    pub fn backup(mut self, backup: BackupConfig) -> Self {
        self.backup = Some(backup);
        self
    }
}

/// Snapshot backup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Directory holding `meta.json` and the snapshot directories.
    pub path: PathBuf,

    /// Snapshot file format.
    pub format: SerializationFormat,

    /// Entries read per batch while snapshotting.
    pub batch_size: usize,
}

impl BackupConfig {
    /// Backs up to `path` in the default format.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: SerializationFormat::default(),
            batch_size: DEFAULT_BACKUP_BATCH_SIZE,
        }
    }

    /// Sets the snapshot format.
    #[must_use]
    pub fn format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the snapshot read batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}
