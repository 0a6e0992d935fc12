//! Entity store with per-key serialized mutation.

use crate::error::{CoreError, CoreResult};
use crate::key_lock::KeyLockProvider;
use crate::key_value::KeyValueStore;
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::trace;

/// A named partition of typed entries with linearized per-key operations.
///
/// Every call touching a single key takes the shard lock chosen by
/// [`KeyLockProvider`], so read-modify-write operations (`update`,
/// `put_or_update`, `find_or_put`, `remove_if`) never interleave with other
/// operations on the same key. Iteration and first/last lookups are not
/// locked.
///
/// # Example
///
/// ```rust
/// use edgestore_core::{EntityStore, KeyValueStore, StoreProvider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> edgestore_core::CoreResult<()> {
/// let provider = StoreProvider::in_memory();
/// let twins = provider.get_entity_store::<String, u32>("twins").await?;
///
/// twins.put(&"device-1".to_string(), &1).await?;
/// let version = twins.update(&"device-1".to_string(), |v| v + 1).await?;
/// assert_eq!(version, 2);
/// # Ok(())
/// # }
/// ```
pub struct EntityStore<K, V> {
    entity_name: String,
    store: Arc<dyn KeyValueStore<K, V>>,
    locks: KeyLockProvider,
}

impl<K, V> EntityStore<K, V>
where
    K: Hash + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an entity store over `store` with `shard_count` key locks.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore<K, V>>, shard_count: usize) -> Self {
        Self {
            entity_name: store.entity_name().to_string(),
            store,
            locks: KeyLockProvider::new(shard_count),
        }
    }

    /// Removes `key` only if `predicate` holds on its current value.
    ///
    /// Returns true if the entry was removed.
    pub async fn remove_if<F>(&self, key: &K, predicate: F) -> CoreResult<bool>
    where
        F: FnOnce(&V) -> bool + Send,
    {
        let _guard = self.locks.lock(key).await;
        match self.store.get(key).await? {
            Some(value) if predicate(&value) => {
                self.store.remove(key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Replaces the value of `key` with `update(current)` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValueNotFound`] if `key` is absent; use
    /// [`put_or_update`](Self::put_or_update) when absence is expected.
    pub async fn update<F>(&self, key: &K, update: F) -> CoreResult<V>
    where
        F: FnOnce(V) -> V + Send,
    {
        let _guard = self.locks.lock(key).await;
        let current = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| CoreError::value_not_found(&self.entity_name, key))?;
        let updated = update(current);
        self.store.put(key, &updated).await?;
        Ok(updated)
    }

    /// Inserts `put_value` if `key` is absent, otherwise applies `update`
    /// to the existing value. Returns the stored value.
    pub async fn put_or_update<F>(&self, key: &K, put_value: V, update: F) -> CoreResult<V>
    where
        F: FnOnce(V) -> V + Send,
    {
        let _guard = self.locks.lock(key).await;
        let value = match self.store.get(key).await? {
            Some(existing) => update(existing),
            None => put_value,
        };
        self.store.put(key, &value).await?;
        Ok(value)
    }

    /// Returns the existing value of `key`, or stores and returns `put_value`.
    pub async fn find_or_put(&self, key: &K, put_value: V) -> CoreResult<V> {
        let _guard = self.locks.lock(key).await;
        if let Some(existing) = self.store.get(key).await? {
            return Ok(existing);
        }
        self.store.put(key, &put_value).await?;
        trace!(entity = %self.entity_name, ?key, "inserted value in find_or_put");
        Ok(put_value)
    }

    /// Number of lock shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.locks.shard_count()
    }
}

#[async_trait]
impl<K, V> KeyValueStore<K, V> for EntityStore<K, V>
where
    K: Hash + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    async fn put(&self, key: &K, value: &V) -> CoreResult<()> {
        let _guard = self.locks.lock(key).await;
        self.store.put(key, value).await
    }

    async fn get(&self, key: &K) -> CoreResult<Option<V>> {
        let _guard = self.locks.lock(key).await;
        self.store.get(key).await
    }

    async fn remove(&self, key: &K) -> CoreResult<()> {
        let _guard = self.locks.lock(key).await;
        self.store.remove(key).await
    }

    async fn contains(&self, key: &K) -> CoreResult<bool> {
        let _guard = self.locks.lock(key).await;
        self.store.contains(key).await
    }

    async fn first_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.store.first_entry().await
    }

    async fn last_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.store.last_entry().await
    }

    async fn iterate_batch(
        &self,
        start: Option<&K>,
        batch_size: usize,
    ) -> CoreResult<Vec<(K, V)>> {
        self.store.iterate_batch(start, batch_size).await
    }
}
