//! Offset-addressed append log used to implement durable queues.
//!
//! Entries live in an [`EntityStore`] keyed by their `i64` offset, encoded
//! 8-byte big-endian so physical key order equals offset order.
//!
//! ```text
//!   head                        tail
//!    |                           |
//!   [5] [6] [ ] [8] [9] ... [41] [42]   <- append writes tail + 1
//!            ^
//!            interior gap left by remove_offset(8 - 1)
//! ```
//!
//! `head` and `tail` are inclusive; the store is empty iff `head > tail`.
//! Offsets are never reused within a process: removing the tail entry
//! leaves `tail` where it is.

use crate::entity_store::EntityStore;
use crate::error::{CoreError, CoreResult};
use crate::key_value::KeyValueStore;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// A durable FIFO log of items addressed by monotonically increasing offsets.
///
/// Append and head removal use independent locks and run concurrently.
pub struct SequentialStore<T> {
    entity_store: EntityStore<i64, T>,
    head_offset: AtomicI64,
    tail_offset: AtomicI64,
    head_lock: Mutex<()>,
    tail_lock: Mutex<()>,
}

impl<T> SequentialStore<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a sequential store over `entity_store`.
    ///
    /// Head and tail are reconstructed from the first and last physical
    /// entries. An empty store starts with `head = default_head_offset` and
    /// `tail = default_head_offset - 1`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-operation error for a negative default head
    /// offset, whose big-endian encoding would not sort numerically.
    pub async fn create(
        entity_store: EntityStore<i64, T>,
        default_head_offset: i64,
    ) -> CoreResult<Self> {
        if default_head_offset < 0 {
            return Err(CoreError::invalid_operation(format!(
                "default head offset must be non-negative, got {default_head_offset}"
            )));
        }

        let first = entity_store.first_entry().await?;
        let last = entity_store.last_entry().await?;
        let (head, tail) = match (first, last) {
            (Some((head, _)), Some((tail, _))) => (head, tail),
            _ => (default_head_offset, default_head_offset - 1),
        };

        debug!(
            entity = entity_store.entity_name(),
            head, tail, "opened sequential store"
        );

        Ok(Self {
            entity_store,
            head_offset: AtomicI64::new(head),
            tail_offset: AtomicI64::new(tail),
            head_lock: Mutex::new(()),
            tail_lock: Mutex::new(()),
        })
    }

    /// Name of the backing entity.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.entity_store.entity_name()
    }

    /// Offset of the oldest retained entry (inclusive).
    #[must_use]
    pub fn head_offset(&self) -> i64 {
        self.head_offset.load(Ordering::SeqCst)
    }

    /// Offset of the newest entry (inclusive).
    #[must_use]
    pub fn tail_offset(&self) -> i64 {
        self.tail_offset.load(Ordering::SeqCst)
    }

    /// Returns true if no entry lies between head and tail.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head_offset() > self.tail_offset()
    }

    /// Appends `item` and returns its offset.
    pub async fn append(&self, item: &T) -> CoreResult<i64> {
        let _guard = self.tail_lock.lock().await;
        let offset = self.tail_offset() + 1;
        self.entity_store.put(&offset, item).await?;
        self.tail_offset.store(offset, Ordering::SeqCst);
        trace!(entity = self.entity_name(), offset, "appended");
        Ok(offset)
    }

    /// Removes the oldest entry if `predicate(offset, item)` holds.
    ///
    /// Returns false without changing state when the store is empty, the
    /// predicate rejects the entry, or a concurrent
    /// [`remove_offset`](Self::remove_offset) took the entry first.
    ///
    /// The oldest entry is the first one physically present, so gaps left
    /// by interior removals are skipped: if `head` points at a gap, the head
    /// moves past the gap to one beyond the removed offset, which can be
    /// more than one step.
    pub async fn remove_first<F>(&self, predicate: F) -> CoreResult<bool>
    where
        F: FnOnce(i64, &T) -> bool + Send,
    {
        if self.is_empty() {
            return Ok(false);
        }

        let _guard = self.head_lock.lock().await;
        if self.is_empty() {
            return Ok(false);
        }

        let Some((offset, _)) = self.entity_store.first_entry().await? else {
            return Ok(false);
        };
        if offset > self.tail_offset() {
            return Ok(false);
        }

        // A concurrent interior removal may have taken the entry since the lookup.
        if !self.remove_entry(predicate, offset).await? {
            return Ok(false);
        }
        self.head_offset.store(offset + 1, Ordering::SeqCst);
        trace!(entity = self.entity_name(), offset, "removed head");
        Ok(true)
    }

    /// Removes the entry at `offset` if it exists and `predicate(offset, item)`
    /// holds.
    ///
    /// Removing the head advances the head. Removing the tail is serialized
    /// with appends. Removing any other offset deletes the entry in place
    /// and leaves a permanent gap that [`get_batch`](Self::get_batch) skips.
    pub async fn remove_offset<F>(&self, predicate: F, offset: i64) -> CoreResult<bool>
    where
        F: FnOnce(i64, &T) -> bool + Send,
    {
        if self.is_empty() || offset < self.head_offset() || offset > self.tail_offset() {
            return Ok(false);
        }

        if offset == self.head_offset() {
            let _guard = self.head_lock.lock().await;
            if offset != self.head_offset() {
                return Ok(false);
            }
            let removed = self.remove_entry(predicate, offset).await?;
            if removed {
                self.head_offset.store(offset + 1, Ordering::SeqCst);
            }
            return Ok(removed);
        }

        if offset == self.tail_offset() {
            let _guard = self.tail_lock.lock().await;
            return self.remove_entry(predicate, offset).await;
        }

        let removed = self.remove_entry(predicate, offset).await?;
        if removed {
            debug!(entity = self.entity_name(), offset, "removed interior offset");
        }
        Ok(removed)
    }

    /// Returns up to `batch_size` entries with offset `>= start_offset`, in
    /// ascending offset order.
    ///
    /// The start is clamped up to the head. Gaps are skipped.
    ///
    /// # Errors
    ///
    /// Returns an invalid-operation error if `batch_size` is zero.
    pub async fn get_batch(&self, start_offset: i64, batch_size: usize) -> CoreResult<Vec<(i64, T)>> {
        if batch_size == 0 {
            return Err(CoreError::invalid_operation("batch size must be positive"));
        }

        let head = self.head_offset();
        let tail = self.tail_offset();
        if head > tail {
            return Ok(Vec::new());
        }

        let start = start_offset.max(head);
        if start > tail {
            return Ok(Vec::new());
        }

        let batch = self
            .entity_store
            .iterate_batch(Some(&start), batch_size)
            .await?;
        Ok(batch
            .into_iter()
            .take_while(|(offset, _)| *offset <= tail)
            .collect())
    }

    async fn remove_entry<F>(&self, predicate: F, offset: i64) -> CoreResult<bool>
    where
        F: FnOnce(i64, &T) -> bool + Send,
    {
        self.entity_store
            .remove_if(&offset, |item| predicate(offset, item))
            .await
    }
}

impl<T> std::fmt::Debug for SequentialStore<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialStore")
            .field("entity", &self.entity_store.entity_name())
            .field("head_offset", &self.head_offset.load(Ordering::SeqCst))
            .field("tail_offset", &self.tail_offset.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_value::{KeyValueStoreMapper, RawStore};
    use crate::mapper::{JsonMapper, KeyMapper};
    use edgestore_storage::{ByteStore, InMemoryByteStore};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn mapped(bytes: Arc<InMemoryByteStore>) -> Arc<dyn KeyValueStore<i64, String>> {
        let raw: Arc<dyn KeyValueStore<Vec<u8>, Vec<u8>>> = Arc::new(RawStore::new(bytes));
        Arc::new(KeyValueStoreMapper::new(
            raw,
            Arc::new(KeyMapper::<i64>::new()),
            Arc::new(JsonMapper::<String>::new()),
        ))
    }

    fn entity_store(bytes: Arc<InMemoryByteStore>) -> EntityStore<i64, String> {
        EntityStore::new(mapped(bytes), 12)
    }

    /// Deletes the first entry right after handing it out, the way a
    /// concurrent `remove_offset` can between the read and the removal.
    struct VanishingFirst {
        inner: Arc<dyn KeyValueStore<i64, String>>,
        armed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl KeyValueStore<i64, String> for VanishingFirst {
        fn entity_name(&self) -> &str {
            self.inner.entity_name()
        }

        async fn put(&self, key: &i64, value: &String) -> CoreResult<()> {
            self.inner.put(key, value).await
        }

        async fn get(&self, key: &i64) -> CoreResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn remove(&self, key: &i64) -> CoreResult<()> {
            self.inner.remove(key).await
        }

        async fn contains(&self, key: &i64) -> CoreResult<bool> {
            self.inner.contains(key).await
        }

        async fn first_entry(&self) -> CoreResult<Option<(i64, String)>> {
            let first = self.inner.first_entry().await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                if let Some((offset, _)) = &first {
                    self.inner.remove(offset).await?;
                }
            }
            Ok(first)
        }

        async fn last_entry(&self) -> CoreResult<Option<(i64, String)>> {
            self.inner.last_entry().await
        }

        async fn iterate_batch(
            &self,
            start: Option<&i64>,
            batch_size: usize,
        ) -> CoreResult<Vec<(i64, String)>> {
            self.inner.iterate_batch(start, batch_size).await
        }
    }

    async fn store_with_head(head: i64) -> SequentialStore<String> {
        let bytes = Arc::new(InMemoryByteStore::new("queue"));
        SequentialStore::create(entity_store(bytes), head).await.unwrap()
    }

    fn s(v: &str) -> String {
        v.to_string()
    }

    #[tokio::test]
    async fn append_get_remove_scenario() {
        let store = store_with_head(0).await;
        assert!(store.is_empty());

        assert_eq!(store.append(&s("a")).await.unwrap(), 0);
        assert_eq!(store.append(&s("b")).await.unwrap(), 1);
        assert_eq!(store.append(&s("c")).await.unwrap(), 2);

        let batch = store.get_batch(0, 10).await.unwrap();
        assert_eq!(batch, vec![(0, s("a")), (1, s("b")), (2, s("c"))]);

        assert!(store.remove_first(|_, _| true).await.unwrap());
        assert_eq!(store.head_offset(), 1);

        let batch = store.get_batch(0, 10).await.unwrap();
        assert_eq!(batch, vec![(1, s("b")), (2, s("c"))]);
    }

    #[tokio::test]
    async fn appends_start_at_default_head() {
        let store = store_with_head(100).await;
        assert_eq!(store.head_offset(), 100);
        assert_eq!(store.tail_offset(), 99);
        assert_eq!(store.append(&s("x")).await.unwrap(), 100);
        assert_eq!(store.append(&s("y")).await.unwrap(), 101);
    }

    #[tokio::test]
    async fn negative_default_head_is_rejected() {
        let bytes = Arc::new(InMemoryByteStore::new("queue"));
        let result = SequentialStore::create(entity_store(bytes), -1).await;
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[tokio::test]
    async fn remove_first_on_empty_returns_false() {
        let store = store_with_head(0).await;
        assert!(!store.remove_first(|_, _| true).await.unwrap());
        assert_eq!(store.head_offset(), 0);
    }

    #[tokio::test]
    async fn remove_first_rejected_by_predicate_keeps_head() {
        let store = store_with_head(0).await;
        store.append(&s("keep")).await.unwrap();

        assert!(!store.remove_first(|_, item| item == "other").await.unwrap());
        assert_eq!(store.head_offset(), 0);
        assert_eq!(store.get_batch(0, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_last_entry_makes_store_empty() {
        let store = store_with_head(0).await;
        store.append(&s("only")).await.unwrap();
        assert!(store.remove_first(|offset, _| offset == 0).await.unwrap());
        assert!(store.is_empty());
        assert!(store.get_batch(0, 10).await.unwrap().is_empty());

        // Offsets are not reused.
        assert_eq!(store.append(&s("next")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn interior_removal_leaves_gap_that_reads_skip() {
        let store = store_with_head(0).await;
        for v in ["a", "b", "c", "d"] {
            store.append(&s(v)).await.unwrap();
        }

        assert!(store.remove_offset(|_, _| true, 2).await.unwrap());
        assert_eq!(store.head_offset(), 0);
        assert_eq!(store.tail_offset(), 3);

        let batch = store.get_batch(0, 10).await.unwrap();
        let offsets: Vec<i64> = batch.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 1, 3]);

        let batch = store.get_batch(2, 1).await.unwrap();
        assert_eq!(batch, vec![(3, s("d"))]);
    }

    #[tokio::test]
    async fn remove_first_skips_gap_at_head() {
        let store = store_with_head(0).await;
        for v in ["a", "b", "c"] {
            store.append(&s(v)).await.unwrap();
        }
        assert!(store.remove_offset(|_, _| true, 1).await.unwrap());
        assert!(store.remove_first(|_, _| true).await.unwrap());
        assert_eq!(store.head_offset(), 1);

        // Head now points at the gap; the next removal finds offset 2.
        assert!(store.remove_first(|offset, _| offset == 2).await.unwrap());
        assert_eq!(store.head_offset(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remove_first_yields_entry_taken_by_concurrent_remover() {
        let bytes = Arc::new(InMemoryByteStore::new("queue"));
        let racing = Arc::new(VanishingFirst {
            inner: mapped(bytes),
            armed: AtomicBool::new(false),
        });
        let inner: Arc<dyn KeyValueStore<i64, String>> = racing.clone();
        let store = SequentialStore::create(EntityStore::new(inner, 12), 0)
            .await
            .unwrap();
        store.append(&s("a")).await.unwrap();
        store.append(&s("b")).await.unwrap();

        // Offset 0 disappears between the lookup and the removal, so this
        // call must not also report it removed.
        racing.armed.store(true, Ordering::SeqCst);
        assert!(!store.remove_first(|_, _| true).await.unwrap());
        assert_eq!(store.head_offset(), 0);

        assert!(store.remove_first(|offset, _| offset == 1).await.unwrap());
        assert_eq!(store.head_offset(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remove_offset_at_head_and_tail() {
        let store = store_with_head(0).await;
        for v in ["a", "b", "c"] {
            store.append(&s(v)).await.unwrap();
        }

        assert!(store.remove_offset(|_, item| item == "a", 0).await.unwrap());
        assert_eq!(store.head_offset(), 1);

        assert!(store.remove_offset(|_, _| true, 2).await.unwrap());
        assert_eq!(store.tail_offset(), 2);
        assert_eq!(store.get_batch(0, 10).await.unwrap(), vec![(1, s("b"))]);

        assert_eq!(store.append(&s("d")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn remove_offset_out_of_range_or_rejected() {
        let store = store_with_head(5).await;
        store.append(&s("a")).await.unwrap();
        store.append(&s("b")).await.unwrap();

        assert!(!store.remove_offset(|_, _| true, 4).await.unwrap());
        assert!(!store.remove_offset(|_, _| true, 7).await.unwrap());
        assert!(!store.remove_offset(|_, _| false, 6).await.unwrap());
        assert_eq!(store.get_batch(0, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_batch_clamps_and_limits() {
        let store = store_with_head(0).await;
        for i in 0..10 {
            store.append(&format!("v{i}")).await.unwrap();
        }
        store.remove_first(|_, _| true).await.unwrap();
        store.remove_first(|_, _| true).await.unwrap();

        let batch = store.get_batch(-50, 3).await.unwrap();
        let offsets: Vec<i64> = batch.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![2, 3, 4]);

        assert!(store.get_batch(10, 3).await.unwrap().is_empty());
        assert!(store.get_batch(0, 0).await.is_err());
    }

    #[tokio::test]
    async fn reopening_reconstructs_head_and_tail() {
        let bytes = Arc::new(InMemoryByteStore::new("queue"));
        {
            let store = SequentialStore::create(entity_store(Arc::clone(&bytes)), 0)
                .await
                .unwrap();
            for v in ["a", "b", "c", "d"] {
                store.append(&s(v)).await.unwrap();
            }
            store.remove_first(|_, _| true).await.unwrap();
        }
        assert_eq!(bytes.len(), 3);

        let reopened = SequentialStore::<String>::create(entity_store(bytes), 0)
            .await
            .unwrap();
        assert_eq!(reopened.head_offset(), 1);
        assert_eq!(reopened.tail_offset(), 3);
        assert_eq!(reopened.append(&s("e")).await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_append_and_drain() {
        let store = Arc::new(store_with_head(0).await);
        let producer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..200 {
                    store.append(&format!("m{i}")).await.unwrap();
                }
            })
        };

        let mut drained = Vec::new();
        while drained.len() < 200 {
            let batch = store.get_batch(0, 16).await.unwrap();
            for (offset, _) in batch {
                assert!(store
                    .remove_first(|head, _| head == offset)
                    .await
                    .unwrap());
                drained.push(offset);
            }
            tokio::task::yield_now().await;
        }
        producer.await.unwrap();

        let expected: Vec<i64> = (0..200).collect();
        assert_eq!(drained, expected);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn debug_shows_entity_and_offsets() {
        let store = store_with_head(3).await;
        store.append(&s("a")).await.unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("\"queue\""));
        assert!(debug.contains("head_offset: 3"));
        assert!(debug.contains("tail_offset: 3"));
    }

    #[tokio::test]
    async fn keys_are_big_endian_offsets() {
        let bytes = Arc::new(InMemoryByteStore::new("queue"));
        let store = SequentialStore::create(entity_store(Arc::clone(&bytes)), 0)
            .await
            .unwrap();
        store.append(&s("a")).await.unwrap();
        let (key, _) = bytes.first_entry().await.unwrap().unwrap();
        assert_eq!(key, 0i64.to_be_bytes().to_vec());
    }
}
