//! Per-entity snapshot files.
//!
//! Each tracked entity is written to `<backup dir>/<id>/<name>.bin`, where
//! `<name>` is the percent-encoded entity name. The file holds the complete,
//! key-ordered contents of the entity in the configured
//! [`SerializationFormat`].

use super::metadata::SerializationFormat;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use ciborium::value::Value;
use edgestore_storage::Entry;
use prost::Message;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Snapshot file extension.
pub const SNAPSHOT_EXTENSION: &str = "bin";

/// Writes and reads entity snapshots in one serialization format.
#[async_trait]
pub trait DataBackupRestore: Send + Sync {
    /// Format written by this codec, recorded in the manifest.
    fn format(&self) -> SerializationFormat;

    /// Writes `entries` as the snapshot of `entity` into `dir`.
    async fn backup(&self, entity: &str, entries: &[Entry], dir: &Path) -> CoreResult<()>;

    /// Reads the snapshot of `entity` from `dir`.
    async fn restore(&self, entity: &str, dir: &Path) -> CoreResult<Vec<Entry>>;
}

/// Returns the codec for `format`.
#[must_use]
pub fn codec_for(format: SerializationFormat) -> Arc<dyn DataBackupRestore> {
    match format {
        SerializationFormat::ProtoBuf => Arc::new(ProtoBufBackupRestore),
        SerializationFormat::Cbor => Arc::new(CborBackupRestore),
    }
}

/// Path of the snapshot file of `entity` inside `dir`.
#[must_use]
pub fn snapshot_path(dir: &Path, entity: &str) -> PathBuf {
    dir.join(format!("{}.{SNAPSHOT_EXTENSION}", encode_entity_name(entity)))
}

/// Percent-encodes every byte outside `[A-Za-z0-9-_.~]`.
#[must_use]
pub fn encode_entity_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Inverse of [`encode_entity_name`].
pub fn decode_entity_name(encoded: &str) -> CoreResult<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded
                .get(i + 1..i + 3)
                .ok_or_else(|| CoreError::codec(format!("truncated escape in {encoded:?}")))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| CoreError::codec(format!("bad escape %{hex} in {encoded:?}")))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| CoreError::codec(format!("entity name is not UTF-8: {e}")))
}

async fn write_snapshot(path: &Path, data: &[u8]) -> CoreResult<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

#[derive(Clone, PartialEq, ::prost::Message)]
struct SnapshotItem {
    #[prost(bytes = "vec", tag = "1")]
    key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    value: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
struct Snapshot {
    #[prost(message, repeated, tag = "1")]
    items: Vec<SnapshotItem>,
}

/// Protocol Buffers snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtoBufBackupRestore;

impl ProtoBufBackupRestore {
    /// Encodes entries into a snapshot message.
    #[must_use]
    pub fn encode(entries: &[Entry]) -> Vec<u8> {
        Snapshot {
            items: entries
                .iter()
                .map(|(key, value)| SnapshotItem {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
        .encode_to_vec()
    }

    /// Decodes a snapshot message.
    pub fn decode(data: &[u8]) -> CoreResult<Vec<Entry>> {
        let snapshot = Snapshot::decode(data)
            .map_err(|e| CoreError::codec(format!("invalid protobuf snapshot: {e}")))?;
        Ok(snapshot
            .items
            .into_iter()
            .map(|item| (item.key, item.value))
            .collect())
    }
}

#[async_trait]
impl DataBackupRestore for ProtoBufBackupRestore {
    fn format(&self) -> SerializationFormat {
        SerializationFormat::ProtoBuf
    }

    async fn backup(&self, entity: &str, entries: &[Entry], dir: &Path) -> CoreResult<()> {
        write_snapshot(&snapshot_path(dir, entity), &Self::encode(entries)).await
    }

    async fn restore(&self, entity: &str, dir: &Path) -> CoreResult<Vec<Entry>> {
        let data = fs::read(snapshot_path(dir, entity)).await?;
        Self::decode(&data)
    }
}

/// CBOR snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct CborBackupRestore;

impl CborBackupRestore {
    /// Encodes entries as an array of `[key, value]` byte-string pairs.
    pub fn encode(entries: &[Entry]) -> CoreResult<Vec<u8>> {
        let value = Value::Array(
            entries
                .iter()
                .map(|(key, value)| {
                    Value::Array(vec![Value::Bytes(key.clone()), Value::Bytes(value.clone())])
                })
                .collect(),
        );
        let mut out = Vec::new();
        ciborium::ser::into_writer(&value, &mut out)
            .map_err(|e| CoreError::codec(format!("CBOR encode failed: {e}")))?;
        Ok(out)
    }

    /// Decodes a CBOR snapshot.
    pub fn decode(data: &[u8]) -> CoreResult<Vec<Entry>> {
        let value: Value = ciborium::de::from_reader(data)
            .map_err(|e| CoreError::codec(format!("invalid CBOR snapshot: {e}")))?;
        let Value::Array(items) = value else {
            return Err(CoreError::codec("CBOR snapshot is not an array"));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Array(pair) => match <[Value; 2]>::try_from(pair) {
                    Ok([Value::Bytes(key), Value::Bytes(value)]) => Ok((key, value)),
                    _ => Err(CoreError::codec("CBOR entry is not a pair of byte strings")),
                },
                _ => Err(CoreError::codec("CBOR entry is not an array")),
            })
            .collect()
    }
}

#[async_trait]
impl DataBackupRestore for CborBackupRestore {
    fn format(&self) -> SerializationFormat {
        SerializationFormat::Cbor
    }

    async fn backup(&self, entity: &str, entries: &[Entry], dir: &Path) -> CoreResult<()> {
        write_snapshot(&snapshot_path(dir, entity), &Self::encode(entries)?).await
    }

    async fn restore(&self, entity: &str, dir: &Path) -> CoreResult<Vec<Entry>> {
        let data = fs::read(snapshot_path(dir, entity)).await?;
        Self::decode(&data)
    }
}
