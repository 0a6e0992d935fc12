//! # EdgeStore Core
//!
//! Typed storage layers for an edge messaging gateway.
//!
//! This crate provides:
//! - [`EntityStore`] - named key/value entities with per-key serialized
//!   read-modify-write operations
//! - [`SequentialStore`] - offset-addressed append logs backing durable queues
//! - [`EncryptedStore`] / [`UpdatableEncryptedStore`] - value encryption that
//!   tolerates legacy plaintext values
//! - [`backup`] - snapshot backup and restore of in-memory partitions
//! - [`StoreProvider`] - assembles the byte store stack from a [`Config`]
//!
//! ## Example
//!
//! ```rust
//! use edgestore_core::{Config, StoreProvider};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> edgestore_core::CoreResult<()> {
//! let provider = StoreProvider::open(Config::new()).await?;
//! let queue = provider.get_sequential_store::<String>("messages").await?;
//!
//! let offset = queue.append(&"hello".to_string()).await?;
//! let batch = queue.get_batch(offset, 10).await?;
//! assert_eq!(batch, vec![(offset, "hello".to_string())]);
//!
//! queue.remove_first(|_, _| true).await?;
//! assert!(queue.is_empty());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
pub mod config;
pub mod crypto;
mod encrypted;
mod entity_store;
mod error;
mod key_lock;
mod key_value;
mod mapper;
mod provider;
mod sequential;

pub use config::{BackupConfig, Config, DEFAULT_OPERATION_TIMEOUT};
pub use encrypted::{EncryptedData, EncryptedStore, UpdatableEncryptedStore};
pub use entity_store::EntityStore;
pub use error::{CoreError, CoreResult};
pub use key_lock::{KeyLockProvider, DEFAULT_SHARD_COUNT};
pub use key_value::{KeyValueStore, KeyValueStoreMapper, RawStore};
pub use mapper::{JsonMapper, KeyMapper, StoreKey, TypeMapper, Utf8Mapper};
pub use provider::StoreProvider;
pub use sequential::SequentialStore;
