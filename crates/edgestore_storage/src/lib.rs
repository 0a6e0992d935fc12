//! # EdgeStore Storage
//!
//! Byte-level store abstraction for EdgeStore.
//!
//! This crate provides the lowest layer of the storage stack. Byte stores
//! are **opaque ordered key/value partitions** - they do not interpret the
//! data they hold.
//!
//! ## Design Principles
//!
//! - One [`ByteStore`] per named partition, handed out by a [`ByteStoreProvider`]
//! - Every operation is async and must be `Send + Sync` for concurrent access
//! - Cross-cutting concerns are decorators implementing the same traits,
//!   each applying exactly one concern
//!
//! ## Available Stores and Decorators
//!
//! - [`InMemoryByteStore`] / [`InMemoryByteStoreProvider`] - reference engine
//! - [`TimedByteStore`] / [`TimedByteStoreProvider`] - per-call timeouts
//! - [`SpaceCheckedByteStore`] / [`SpaceCheckedByteStoreProvider`] - refuse
//!   writes while the [`StorageSpaceChecker`] reports the storage full
//!
//! ## Example
//!
//! ```rust
//! use edgestore_storage::{ByteStore, ByteStoreProvider, InMemoryByteStoreProvider, TimedByteStoreProvider};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let provider = TimedByteStoreProvider::new(
//!     Arc::new(InMemoryByteStoreProvider::new()),
//!     Duration::from_secs(30),
//! );
//! let store = provider.get_store("messages").await.unwrap();
//! store.put(b"key", b"value").await.unwrap();
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod provider;
mod space;
mod store;
mod timed;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryByteStore;
pub use provider::{ByteStoreProvider, InMemoryByteStoreProvider};
pub use space::{
    SpaceCheckedByteStore, SpaceCheckedByteStoreProvider, StorageSpaceChecker, StorageStatus,
    UsageComputer, CRITICAL_USAGE_PERCENT, DEFAULT_CHECK_FREQUENCY, FULL_USAGE_PERCENT,
};
pub use store::{ByteKey, ByteStore, Entry};
pub use timed::{with_timeout, TimedByteStore, TimedByteStoreProvider};
