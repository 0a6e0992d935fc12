//! Snapshot backup and restore.
//!
//! ## On-disk layout
//!
//! ```text
//! <backup path>/
//!   meta.json                      manifest naming the current backup
//!   <uuid>/                        one directory per backup
//!     <percent-encoded name>.bin   complete contents of one entity
//! ```
//!
//! A backup becomes current only when the manifest is atomically replaced
//! to name it; directories the manifest does not name are garbage and are
//! deleted after every successful backup.

mod format;
mod manager;
mod metadata;

pub use format::{
    codec_for, decode_entity_name, encode_entity_name, snapshot_path, CborBackupRestore,
    DataBackupRestore, ProtoBufBackupRestore, SNAPSHOT_EXTENSION,
};
pub use manager::{BackupRestoreManager, BackupState, DEFAULT_BACKUP_BATCH_SIZE};
pub use metadata::{
    BackupMetadata, BackupMetadataList, SerializationFormat, MANIFEST_FILE, MANIFEST_TEMP,
};
