//! Typed key/value store capability and its byte-level adapters.

use crate::error::CoreResult;
use crate::mapper::TypeMapper;
use async_trait::async_trait;
use edgestore_storage::ByteStore;
use std::sync::Arc;

/// A typed ordered key/value store.
///
/// Implemented by the byte adapter ([`RawStore`]), by [`KeyValueStoreMapper`],
/// by entity stores and by the encrypted stores, so that layers can be
/// composed freely.
#[async_trait]
pub trait KeyValueStore<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Name of the entity this store holds.
    fn entity_name(&self) -> &str;

    /// Inserts or replaces the value stored under `key`.
    async fn put(&self, key: &K, value: &V) -> CoreResult<()>;

    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &K) -> CoreResult<Option<V>>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &K) -> CoreResult<()>;

    /// Returns true if `key` is present.
    async fn contains(&self, key: &K) -> CoreResult<bool>;

    /// Returns the entry with the smallest key.
    async fn first_entry(&self) -> CoreResult<Option<(K, V)>>;

    /// Returns the entry with the largest key.
    async fn last_entry(&self) -> CoreResult<Option<(K, V)>>;

    /// Returns up to `batch_size` entries starting at `start` (inclusive).
    async fn iterate_batch(&self, start: Option<&K>, batch_size: usize)
        -> CoreResult<Vec<(K, V)>>;
}

/// Exposes a [`ByteStore`] as a `KeyValueStore<Vec<u8>, Vec<u8>>`.
pub struct RawStore {
    store: Arc<dyn ByteStore>,
}

impl RawStore {
    /// Wraps a byte store.
    #[must_use]
    pub fn new(store: Arc<dyn ByteStore>) -> Self {
        Self { store }
    }

    /// Returns the wrapped byte store.
    #[must_use]
    pub fn byte_store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }
}

#[async_trait]
impl KeyValueStore<Vec<u8>, Vec<u8>> for RawStore {
    fn entity_name(&self) -> &str {
        self.store.name()
    }

    async fn put(&self, key: &Vec<u8>, value: &Vec<u8>) -> CoreResult<()> {
        Ok(self.store.put(key, value).await?)
    }

    async fn get(&self, key: &Vec<u8>) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.store.get(key).await?)
    }

    async fn remove(&self, key: &Vec<u8>) -> CoreResult<()> {
        Ok(self.store.remove(key).await?)
    }

    async fn contains(&self, key: &Vec<u8>) -> CoreResult<bool> {
        Ok(self.store.contains(key).await?)
    }

    async fn first_entry(&self) -> CoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.store.first_entry().await?)
    }

    async fn last_entry(&self) -> CoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.store.last_entry().await?)
    }

    async fn iterate_batch(
        &self,
        start: Option<&Vec<u8>>,
        batch_size: usize,
    ) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .store
            .iterate_batch(start.map(Vec::as_slice), batch_size)
            .await?)
    }
}

/// Presents a `KeyValueStore<SK, SV>` as a `KeyValueStore<K, V>` through a
/// key mapper and a value mapper.
pub struct KeyValueStoreMapper<K, V, SK, SV> {
    inner: Arc<dyn KeyValueStore<SK, SV>>,
    key_mapper: Arc<dyn TypeMapper<K, SK>>,
    value_mapper: Arc<dyn TypeMapper<V, SV>>,
}

impl<K, V, SK, SV> KeyValueStoreMapper<K, V, SK, SV>
where
    SK: Send + Sync + 'static,
    SV: Send + Sync + 'static,
{
    /// Creates a mapped view over `inner`.
    #[must_use]
    pub fn new(
        inner: Arc<dyn KeyValueStore<SK, SV>>,
        key_mapper: Arc<dyn TypeMapper<K, SK>>,
        value_mapper: Arc<dyn TypeMapper<V, SV>>,
    ) -> Self {
        Self {
            inner,
            key_mapper,
            value_mapper,
        }
    }

    fn map_entry(&self, (key, value): (SK, SV)) -> CoreResult<(K, V)> {
        Ok((
            self.key_mapper.from_stored(key)?,
            self.value_mapper.from_stored(value)?,
        ))
    }
}

#[async_trait]
impl<K, V, SK, SV> KeyValueStore<K, V> for KeyValueStoreMapper<K, V, SK, SV>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    SK: Send + Sync + 'static,
    SV: Send + Sync + 'static,
{
    fn entity_name(&self) -> &str {
        self.inner.entity_name()
    }

    async fn put(&self, key: &K, value: &V) -> CoreResult<()> {
        let key = self.key_mapper.to_stored(key)?;
        let value = self.value_mapper.to_stored(value)?;
        self.inner.put(&key, &value).await
    }

    async fn get(&self, key: &K) -> CoreResult<Option<V>> {
        let key = self.key_mapper.to_stored(key)?;
        match self.inner.get(&key).await? {
            Some(value) => Ok(Some(self.value_mapper.from_stored(value)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &K) -> CoreResult<()> {
        let key = self.key_mapper.to_stored(key)?;
        self.inner.remove(&key).await
    }

    async fn contains(&self, key: &K) -> CoreResult<bool> {
        let key = self.key_mapper.to_stored(key)?;
        self.inner.contains(&key).await
    }

    async fn first_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.inner
            .first_entry()
            .await?
            .map(|entry| self.map_entry(entry))
            .transpose()
    }

    async fn last_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.inner
            .last_entry()
            .await?
            .map(|entry| self.map_entry(entry))
            .transpose()
    }

    async fn iterate_batch(
        &self,
        start: Option<&K>,
        batch_size: usize,
    ) -> CoreResult<Vec<(K, V)>> {
        let start = start.map(|k| self.key_mapper.to_stored(k)).transpose()?;
        self.inner
            .iterate_batch(start.as_ref(), batch_size)
            .await?
            .into_iter()
            .map(|entry| self.map_entry(entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{JsonMapper, KeyMapper};
    use edgestore_storage::{ByteStore, InMemoryByteStore};

    fn typed_store() -> (Arc<InMemoryByteStore>, KeyValueStoreMapper<i64, String, Vec<u8>, Vec<u8>>) {
        let bytes = Arc::new(InMemoryByteStore::new("offsets"));
        let raw: Arc<dyn KeyValueStore<Vec<u8>, Vec<u8>>> = Arc::new(RawStore::new(bytes.clone()));
        let mapped = KeyValueStoreMapper::new(
            raw,
            Arc::new(KeyMapper::<i64>::new()),
            Arc::new(JsonMapper::<String>::new()),
        );
        (bytes, mapped)
    }

    #[tokio::test]
    async fn mapped_put_writes_encoded_bytes() {
        let (bytes, store) = typed_store();
        store.put(&7, &"seven".to_string()).await.unwrap();

        let raw = bytes.get(&7i64.to_be_bytes()).await.unwrap().unwrap();
        assert_eq!(raw, br#""seven""#.to_vec());
        assert_eq!(store.get(&7).await.unwrap(), Some("seven".to_string()));
        assert_eq!(store.entity_name(), "offsets");
    }

    #[tokio::test]
    async fn mapped_iteration_decodes_entries_in_order() {
        let (_, store) = typed_store();
        for i in [3i64, 1, 2, 300] {
            store.put(&i, &format!("v{i}")).await.unwrap();
        }

        let batch = store.iterate_batch(Some(&2), 10).await.unwrap();
        let keys: Vec<i64> = batch.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![2, 3, 300]);

        assert_eq!(store.first_entry().await.unwrap().unwrap().0, 1);
        assert_eq!(store.last_entry().await.unwrap().unwrap().1, "v300");
    }

    #[tokio::test]
    async fn mapped_get_of_corrupt_value_fails() {
        let (bytes, store) = typed_store();
        bytes.put(&1i64.to_be_bytes(), b"not json").await.unwrap();
        assert!(store.get(&1).await.is_err());
    }
}
