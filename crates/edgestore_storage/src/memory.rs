//! In-memory byte store.

use crate::error::StorageResult;
use crate::store::{ByteKey, ByteStore, Entry};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<ByteKey, Vec<u8>>,
    /// Sum of key and value lengths of all entries.
    size: u64,
}

/// An in-memory byte store.
///
/// This store keeps one partition in a sorted map and is suitable for:
/// - Unit and integration tests
/// - Gateways running without persistent storage, where contents are
///   carried across restarts by the backup/restore protocol
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks. Every call
/// holds the internal lock only for the duration of the map operation.
///
/// # Example
///
/// ```rust
/// use edgestore_storage::{ByteStore, InMemoryByteStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = InMemoryByteStore::new("messages");
/// store.put(b"k", b"v").await.unwrap();
/// assert_eq!(store.get(b"k").await.unwrap(), Some(b"v".to_vec()));
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryByteStore {
    name: String,
    inner: RwLock<Inner>,
}

impl InMemoryByteStore {
    /// Creates a new empty store for the named partition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries(name: impl Into<String>, entries: Vec<Entry>) -> Self {
        let mut inner = Inner::default();
        for (key, value) in entries {
            inner.size += (key.len() + value.len()) as u64;
            if let Some(old) = inner.entries.insert(ByteKey::new(key), value) {
                inner.size -= old.len() as u64;
            }
        }
        Self {
            name: name.into(),
            inner: RwLock::new(inner),
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Returns a copy of all entries in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.clone()))
            .collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.size = 0;
    }
}

#[async_trait]
impl ByteStore for InMemoryByteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let old = inner.entries.insert(ByteKey::from(key), value.to_vec());
        match old {
            Some(old) => {
                inner.size = inner.size - old.len() as u64 + value.len() as u64;
            }
            None => {
                inner.size += (key.len() + value.len()) as u64;
            }
        }
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.read().entries.get(key).cloned())
    }

    async fn remove(&self, key: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.write();
        if let Some(old) = inner.entries.remove(key) {
            inner.size -= (key.len() + old.len()) as u64;
        }
        Ok(())
    }

    async fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.inner.read().entries.contains_key(key))
    }

    async fn first_entry(&self) -> StorageResult<Option<Entry>> {
        Ok(self
            .inner
            .read()
            .entries
            .first_key_value()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.clone())))
    }

    async fn last_entry(&self) -> StorageResult<Option<Entry>> {
        Ok(self
            .inner
            .read()
            .entries
            .last_key_value()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.clone())))
    }

    async fn iterate_batch(
        &self,
        start: Option<&[u8]>,
        batch_size: usize,
    ) -> StorageResult<Vec<Entry>> {
        let inner = self.inner.read();
        let lower = match start {
            Some(start) => Bound::Included(start),
            None => Bound::Unbounded,
        };
        Ok(inner
            .entries
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take(batch_size)
            .map(|(k, v)| (k.as_bytes().to_vec(), v.clone()))
            .collect())
    }

    fn approximate_size(&self) -> u64 {
        self.inner.read().size
    }
}
