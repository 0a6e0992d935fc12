//! Verify command implementation.

use super::current_backup;
use edgestore_core::backup::{codec_for, decode_entity_name, MANIFEST_TEMP, SNAPSHOT_EXTENSION};
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tracing::debug;

/// Verification result.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Backup id checked.
    pub id: String,
    /// Per-entity outcome.
    pub stores: Vec<StoreCheck>,
    /// Snapshot directories the manifest does not reference.
    pub orphans: Vec<String>,
    /// Entities with a snapshot file in the backup that the manifest omits.
    pub unlisted: Vec<String>,
    /// Whether an interrupted manifest write left its temp file behind.
    pub leftover_temp: bool,
}

impl VerifyResult {
    /// Returns true if every snapshot decoded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.stores.iter().all(|s| s.error.is_none())
    }
}

/// Outcome of decoding one snapshot.
#[derive(Debug, Serialize)]
pub struct StoreCheck {
    /// Entity name.
    pub name: String,
    /// Number of entries decoded.
    pub entries: Option<usize>,
    /// Decode failure.
    pub error: Option<String>,
}

/// Decodes every snapshot of the backup under `path`.
pub async fn check(path: &Path) -> Result<VerifyResult, Box<dyn Error>> {
    let metadata = current_backup(path).await?;
    let dir = metadata.directory(path);
    let codec = codec_for(metadata.serialization_format);

    let mut stores = Vec::with_capacity(metadata.stores.len());
    for name in &metadata.stores {
        let check = match codec.restore(name, &dir).await {
            Ok(entries) => {
                debug!(entity = %name, entries = entries.len(), "snapshot decoded");
                StoreCheck {
                    name: name.clone(),
                    entries: Some(entries.len()),
                    error: None,
                }
            }
            Err(e) => StoreCheck {
                name: name.clone(),
                entries: None,
                error: Some(e.to_string()),
            },
        };
        stores.push(check);
    }

    let current = metadata.id.to_string();
    let mut orphans = Vec::new();
    let mut listing = tokio::fs::read_dir(path).await?;
    while let Some(entry) = listing.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != current {
                orphans.push(name);
            }
        }
    }
    orphans.sort();

    let mut unlisted = Vec::new();
    let mut snapshots = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = snapshots.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(encoded) = file_name.strip_suffix(&format!(".{SNAPSHOT_EXTENSION}")) else {
            continue;
        };
        let name = decode_entity_name(encoded).unwrap_or(file_name.clone());
        if !metadata.stores.contains(&name) {
            unlisted.push(name);
        }
    }
    unlisted.sort();

    Ok(VerifyResult {
        id: current,
        stores,
        orphans,
        unlisted,
        leftover_temp: path.join(MANIFEST_TEMP).exists(),
    })
}

/// Runs the verify command.
pub async fn run(path: &Path, format: &str) -> Result<(), Box<dyn Error>> {
    let result = check(path).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err("Verification failed".into())
    }
}

fn print_text_output(result: &VerifyResult) {
    println!("Verifying backup {}", result.id);
    for store in &result.stores {
        match (&store.entries, &store.error) {
            (Some(count), _) => println!("  [OK]   {} ({count} entries)", store.name),
            (None, Some(error)) => println!("  [FAIL] {}: {error}", store.name),
            (None, None) => println!("  [FAIL] {}", store.name),
        }
    }
    for orphan in &result.orphans {
        println!("  [WARN] unreferenced directory {orphan}");
    }
    for name in &result.unlisted {
        println!("  [WARN] snapshot of {name} is not in the manifest");
    }
    if result.leftover_temp {
        println!("  [WARN] leftover {MANIFEST_TEMP}");
    }
    println!(
        "{}",
        if result.is_ok() {
            "Backup is valid"
        } else {
            "Backup is CORRUPTED"
        }
    );
}
