//! Providers of named byte store partitions.

use crate::error::{StorageError, StorageResult};
use crate::memory::InMemoryByteStore;
use crate::space::UsageComputer;
use crate::store::ByteStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Hands out named [`ByteStore`] partitions.
///
/// `get_store` is create-or-get: asking twice for the same name returns the
/// same underlying partition. Decorators (timeouts, space checks, backup
/// tracking) implement this trait too and forward to an inner provider.
#[async_trait]
pub trait ByteStoreProvider: Send + Sync {
    /// Returns the partition named `name`, creating it if needed.
    async fn get_store(&self, name: &str) -> StorageResult<Arc<dyn ByteStore>>;

    /// Drops the partition named `name` and all of its data.
    async fn remove_store(&self, name: &str) -> StorageResult<()>;

    /// Releases provider resources. Further calls fail with [`StorageError::Closed`].
    async fn close(&self) -> StorageResult<()>;
}

/// A provider of [`InMemoryByteStore`] partitions.
#[derive(Debug, Default)]
pub struct InMemoryByteStoreProvider {
    stores: RwLock<HashMap<String, Arc<InMemoryByteStore>>>,
    closed: AtomicBool,
}

impl InMemoryByteStoreProvider {
    /// Creates a provider with no partitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the concrete partition named `name`, if it exists.
    #[must_use]
    pub fn partition(&self, name: &str) -> Option<Arc<InMemoryByteStore>> {
        self.stores.read().get(name).cloned()
    }

    /// Returns the names of all partitions.
    #[must_use]
    pub fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Total approximate size of every partition, in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.stores
            .read()
            .values()
            .map(|s| s.approximate_size())
            .sum()
    }

    /// Returns a usage computer reporting [`total_size`](Self::total_size).
    ///
    /// The computer holds a weak reference and reports an error once the
    /// provider is dropped.
    #[must_use]
    pub fn usage_computer(self: &Arc<Self>) -> UsageComputer {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            weak.upgrade()
                .map(|provider| provider.total_size())
                .ok_or_else(|| StorageError::UsageUnavailable("provider dropped".to_string()))
        })
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ByteStoreProvider for InMemoryByteStoreProvider {
    async fn get_store(&self, name: &str) -> StorageResult<Arc<dyn ByteStore>> {
        self.ensure_open()?;
        if let Some(store) = self.stores.read().get(name) {
            return Ok(Arc::clone(store) as Arc<dyn ByteStore>);
        }

        let mut stores = self.stores.write();
        let store: Arc<dyn ByteStore> = stores
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(partition = name, "creating in-memory partition");
                Arc::new(InMemoryByteStore::new(name))
            })
            .clone();
        Ok(store)
    }

    async fn remove_store(&self, name: &str) -> StorageResult<()> {
        self.ensure_open()?;
        if let Some(store) = self.stores.write().remove(name) {
            debug!(partition = name, "removed in-memory partition");
            store.clear();
        }
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
