//! Uniform timeout enforcement for byte stores.

use crate::error::{StorageError, StorageResult};
use crate::provider::ByteStoreProvider;
use crate::store::{ByteStore, Entry};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Runs `fut` with a deadline, mapping expiry to [`StorageError::Timeout`].
///
/// Once the deadline passes the future is dropped; there is no other
/// cancellation path in the store stack.
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, ?after, "store operation timed out");
            Err(StorageError::Timeout { operation, after })
        }
    }
}

/// A [`ByteStore`] decorator that bounds every call by a fixed timeout.
pub struct TimedByteStore {
    inner: Arc<dyn ByteStore>,
    timeout: Duration,
}

impl TimedByteStore {
    /// Wraps `inner` so that each call fails after `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn ByteStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Returns the configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ByteStore for TimedByteStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        with_timeout("put", self.timeout, self.inner.put(key, value)).await
    }

    async fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        with_timeout("get", self.timeout, self.inner.get(key)).await
    }

    async fn remove(&self, key: &[u8]) -> StorageResult<()> {
        with_timeout("remove", self.timeout, self.inner.remove(key)).await
    }

    async fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        with_timeout("contains", self.timeout, self.inner.contains(key)).await
    }

    async fn first_entry(&self) -> StorageResult<Option<Entry>> {
        with_timeout("first_entry", self.timeout, self.inner.first_entry()).await
    }

    async fn last_entry(&self) -> StorageResult<Option<Entry>> {
        with_timeout("last_entry", self.timeout, self.inner.last_entry()).await
    }

    async fn iterate_batch(
        &self,
        start: Option<&[u8]>,
        batch_size: usize,
    ) -> StorageResult<Vec<Entry>> {
        with_timeout(
            "iterate_batch",
            self.timeout,
            self.inner.iterate_batch(start, batch_size),
        )
        .await
    }

    fn approximate_size(&self) -> u64 {
        self.inner.approximate_size()
    }
}

/// A provider decorator that wraps every partition in a [`TimedByteStore`].
pub struct TimedByteStoreProvider {
    inner: Arc<dyn ByteStoreProvider>,
    timeout: Duration,
}

impl TimedByteStoreProvider {
    /// Wraps `inner`; stores it hands out are bounded by `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn ByteStoreProvider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ByteStoreProvider for TimedByteStoreProvider {
    async fn get_store(&self, name: &str) -> StorageResult<Arc<dyn ByteStore>> {
        let store = self.inner.get_store(name).await?;
        Ok(Arc::new(TimedByteStore::new(store, self.timeout)))
    }

    async fn remove_store(&self, name: &str) -> StorageResult<()> {
        self.inner.remove_store(name).await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryByteStore;

    /// A store whose reads never complete.
    struct StalledStore;

    #[async_trait]
    impl ByteStore for StalledStore {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn put(&self, _key: &[u8], _value: &[u8]) -> StorageResult<()> {
            Ok(())
        }
        async fn get(&self, _key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
            std::future::pending().await
        }
        async fn remove(&self, _key: &[u8]) -> StorageResult<()> {
            Ok(())
        }
        async fn contains(&self, _key: &[u8]) -> StorageResult<bool> {
            std::future::pending().await
        }
        async fn first_entry(&self) -> StorageResult<Option<Entry>> {
            Ok(None)
        }
        async fn last_entry(&self) -> StorageResult<Option<Entry>> {
            Ok(None)
        }
        async fn iterate_batch(
            &self,
            _start: Option<&[u8]>,
            _batch_size: usize,
        ) -> StorageResult<Vec<Entry>> {
            Ok(Vec::new())
        }
        fn approximate_size(&self) -> u64 {
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out() {
        let store = TimedByteStore::new(Arc::new(StalledStore), Duration::from_millis(50));
        let err = store.get(b"k").await.unwrap_err();
        match err {
            StorageError::Timeout { operation, after } => {
                assert_eq!(operation, "get");
                assert_eq!(after, Duration::from_millis(50));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.contains(b"k").await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let inner = Arc::new(InMemoryByteStore::new("p"));
        let store = TimedByteStore::new(inner, Duration::from_secs(5));
        store.put(b"k", b"v").await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.name(), "p");
        assert_eq!(store.approximate_size(), 2);
    }
}
