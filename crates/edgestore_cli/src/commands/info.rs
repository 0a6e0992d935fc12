//! Info command implementation.

use super::current_backup;
use edgestore_core::backup::snapshot_path;
use serde::Serialize;
use std::error::Error;
use std::path::Path;

/// Manifest summary.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Backup directory.
    pub path: String,
    /// Current backup id.
    pub id: String,
    /// Snapshot file format.
    pub serialization_format: String,
    /// Completion time (RFC 3339).
    pub timestamp_utc: String,
    /// Snapshots of the current backup.
    pub stores: Vec<StoreInfo>,
}

/// One entity snapshot.
#[derive(Debug, Serialize)]
pub struct StoreInfo {
    /// Entity name.
    pub name: String,
    /// Snapshot file path.
    pub file: String,
    /// Snapshot file size, if the file exists.
    pub size_bytes: Option<u64>,
}

/// Collects the manifest summary of the backup under `path`.
pub async fn inspect(path: &Path) -> Result<InfoResult, Box<dyn Error>> {
    let metadata = current_backup(path).await?;
    let dir = metadata.directory(path);

    let mut stores = Vec::with_capacity(metadata.stores.len());
    for name in &metadata.stores {
        let file = snapshot_path(&dir, name);
        let size_bytes = tokio::fs::metadata(&file).await.ok().map(|m| m.len());
        stores.push(StoreInfo {
            name: name.clone(),
            file: file.display().to_string(),
            size_bytes,
        });
    }

    Ok(InfoResult {
        path: path.display().to_string(),
        id: metadata.id.to_string(),
        serialization_format: metadata.serialization_format.to_string(),
        timestamp_utc: metadata.timestamp_utc.to_rfc3339(),
        stores,
    })
}

/// Runs the info command.
pub async fn run(path: &Path, format: &str) -> Result<(), Box<dyn Error>> {
    let result = inspect(path).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InfoResult) {
    println!("Backup: {}", result.path);
    println!("  Id:        {}", result.id);
    println!("  Format:    {}", result.serialization_format);
    println!("  Completed: {}", result.timestamp_utc);
    println!("  Stores:    {}", result.stores.len());
    for store in &result.stores {
        match store.size_bytes {
            Some(size) => println!("    {:<32} {size:>10} bytes", store.name),
            None => println!("    {:<32} {:>10}", store.name, "MISSING"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::write_backup;
    use edgestore_core::backup::SerializationFormat;
    use tempfile::tempdir;

    #[tokio::test]
    async fn inspect_lists_stores_and_sizes() {
        let dir = tempdir().unwrap();
        let metadata = write_backup(
            dir.path(),
            SerializationFormat::Cbor,
            &[("queue/a", &[(b"k".as_slice(), b"v".as_slice())]), ("twins", &[])],
        )
        .await;

        let info = inspect(dir.path()).await.unwrap();
        assert_eq!(info.id, metadata.id.to_string());
        assert_eq!(info.serialization_format, "Cbor");
        assert_eq!(info.stores.len(), 2);
        assert_eq!(info.stores[0].name, "queue/a");
        assert!(info.stores[0].file.ends_with("queue%2Fa.bin"));
        assert!(info.stores[0].size_bytes.unwrap() > 0);
    }

    #[tokio::test]
    async fn inspect_without_manifest_fails() {
        let dir = tempdir().unwrap();
        assert!(inspect(dir.path()).await.is_err());
    }
}
