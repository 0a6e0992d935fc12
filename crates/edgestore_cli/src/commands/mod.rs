//! CLI command implementations.

pub mod dump;
pub mod info;
pub mod verify;

use edgestore_core::backup::{BackupMetadata, BackupMetadataList};
use std::error::Error;
use std::path::Path;

/// Loads the backup the manifest under `path` names.
pub(crate) async fn current_backup(path: &Path) -> Result<BackupMetadata, Box<dyn Error>> {
    let list = BackupMetadataList::load(path)
        .await?
        .ok_or_else(|| format!("No backup manifest found at {}", path.display()))?;
    let metadata = list
        .latest()
        .cloned()
        .ok_or_else(|| format!("Backup manifest at {} lists no backups", path.display()))?;
    Ok(metadata)
}
