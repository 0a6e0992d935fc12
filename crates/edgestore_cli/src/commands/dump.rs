//! Dump command implementation.

use super::current_backup;
use edgestore_core::backup::codec_for;
use serde::Serialize;
use std::error::Error;
use std::path::Path;

/// One snapshot entry in printable form.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct DumpEntry {
    /// Hex-encoded key.
    pub key: String,
    /// Value decoded as UTF-8, with invalid sequences replaced.
    pub value: String,
}

/// Reads up to `limit` entries of `entity` from the backup under `path`.
pub async fn entries(
    path: &Path,
    entity: &str,
    limit: Option<usize>,
) -> Result<Vec<DumpEntry>, Box<dyn Error>> {
    let metadata = current_backup(path).await?;
    if !metadata.stores.iter().any(|s| s == entity) {
        return Err(format!("Entity {entity:?} is not in backup {}", metadata.id).into());
    }

    let raw = codec_for(metadata.serialization_format)
        .restore(entity, &metadata.directory(path))
        .await?;
    Ok(raw
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(key, value)| DumpEntry {
            key: hex::encode(key),
            value: String::from_utf8_lossy(&value).into_owned(),
        })
        .collect())
}

/// Runs the dump command.
pub async fn run(
    path: &Path,
    entity: &str,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn Error>> {
    let entries = entries(path, entity, limit).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            for entry in &entries {
                println!("{}  {}", entry.key, entry.value);
            }
            println!("({} entries)", entries.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::write_backup;
    use edgestore_core::backup::SerializationFormat;
    use tempfile::tempdir;

    #[tokio::test]
    async fn dump_prints_hex_keys_and_text_values() {
        let dir = tempdir().unwrap();
        let offsets: &[(&[u8], &[u8])] = &[
            (&[0, 0, 0, 0, 0, 0, 0, 1], b"\"a\""),
            (&[0, 0, 0, 0, 0, 0, 0, 2], &[0xff]),
        ];
        write_backup(dir.path(), SerializationFormat::Cbor, &[("queue", offsets)]).await;

        let all = entries(dir.path(), "queue", None).await.unwrap();
        assert_eq!(
            all[0],
            DumpEntry {
                key: "0000000000000001".into(),
                value: "\"a\"".into()
            }
        );
        assert_eq!(all[1].value, "\u{fffd}");

        assert_eq!(entries(dir.path(), "queue", Some(1)).await.unwrap().len(), 1);
        assert!(entries(dir.path(), "missing", None).await.is_err());
    }
}
