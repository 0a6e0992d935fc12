//! Storage space admission control.
//!
//! A [`StorageSpaceChecker`] samples storage usage on a background tokio
//! task and classifies it against a configured cap. Writers consult the
//! cached classification through [`StorageSpaceChecker::is_full`], which
//! never blocks and never triggers a synchronous sample.
//!
//! ```text
//! usage * 100 / max   < 90   -> Available
//!                     < 100  -> Critical
//!                     >= 100 -> Full
//! ```

use crate::error::{StorageError, StorageResult};
use crate::provider::ByteStoreProvider;
use crate::store::{ByteStore, Entry};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Usage percentage at or above which the status is [`StorageStatus::Critical`].
pub const CRITICAL_USAGE_PERCENT: u128 = 90;

/// Usage percentage at or above which the status is [`StorageStatus::Full`].
pub const FULL_USAGE_PERCENT: u128 = 100;

/// Default interval between usage samples.
pub const DEFAULT_CHECK_FREQUENCY: Duration = Duration::from_secs(120);

/// Computes the current storage usage in bytes.
pub type UsageComputer = Arc<dyn Fn() -> StorageResult<u64> + Send + Sync>;

/// Classification of storage usage against the configured cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageStatus {
    /// No sample has been taken, or no cap is configured.
    Unknown = 0,
    /// Usage is below the critical threshold.
    Available = 1,
    /// Usage is at or above 90% of the cap.
    Critical = 2,
    /// Usage is at or above the cap.
    Full = 3,
}

impl StorageStatus {
    /// Classifies `usage_bytes` against `max_size_bytes`.
    ///
    /// A zero cap means no limit is configured and yields `Unknown`.
    #[must_use]
    pub fn classify(usage_bytes: u64, max_size_bytes: u64) -> Self {
        if max_size_bytes == 0 {
            return Self::Unknown;
        }
        let percent = u128::from(usage_bytes) * 100 / u128::from(max_size_bytes);
        if percent < CRITICAL_USAGE_PERCENT {
            Self::Available
        } else if percent < FULL_USAGE_PERCENT {
            Self::Critical
        } else {
            Self::Full
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Available,
            2 => Self::Critical,
            3 => Self::Full,
            _ => Self::Unknown,
        }
    }
}

struct Shared {
    max_size_bytes: AtomicU64,
    usage_bytes: AtomicU64,
    status: AtomicU8,
    computer: RwLock<Option<UsageComputer>>,
}

impl Shared {
    fn status(&self) -> StorageStatus {
        StorageStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Takes one sample. Errors from the computer keep the previous status.
    fn sample(&self) -> StorageStatus {
        let Some(computer) = self.computer.read().clone() else {
            return self.status();
        };

        let usage = match computer() {
            Ok(usage) => usage,
            Err(e) => {
                warn!(error = %e, "storage usage computation failed; keeping previous status");
                return self.status();
            }
        };

        let max = self.max_size_bytes.load(Ordering::Acquire);
        let status = StorageStatus::classify(usage, max);
        self.usage_bytes.store(usage, Ordering::Release);
        let previous = StorageStatus::from_u8(self.status.swap(status as u8, Ordering::AcqRel));

        if previous != status {
            match status {
                StorageStatus::Critical | StorageStatus::Full => {
                    warn!(usage, max, ?status, "storage usage crossed threshold");
                }
                _ => info!(usage, max, ?status, "storage usage status changed"),
            }
        } else {
            debug!(usage, max, ?status, "storage usage sampled");
        }
        status
    }
}

/// Background sampler that gates writers when storage is full.
///
/// # Example
///
/// ```rust
/// use edgestore_storage::{StorageSpaceChecker, StorageStatus};
///
/// let checker = StorageSpaceChecker::new(1000);
/// checker.set_storage_usage_computer(|| Ok(950));
/// assert_eq!(checker.check_now(), StorageStatus::Critical);
/// assert!(!checker.is_full());
/// ```
pub struct StorageSpaceChecker {
    shared: Arc<Shared>,
    frequency: Mutex<Duration>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StorageSpaceChecker {
    /// Creates a checker with the given cap. No background task runs until
    /// [`start`](Self::start) is called.
    #[must_use]
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_size_bytes: AtomicU64::new(max_size_bytes),
                usage_bytes: AtomicU64::new(0),
                status: AtomicU8::new(StorageStatus::Unknown as u8),
                computer: RwLock::new(None),
            }),
            frequency: Mutex::new(DEFAULT_CHECK_FREQUENCY),
            task: Mutex::new(None),
        }
    }

    /// Sets the cap in bytes. Takes effect on the next sample.
    pub fn set_max_size_bytes(&self, max_size_bytes: u64) {
        self.shared
            .max_size_bytes
            .store(max_size_bytes, Ordering::Release);
    }

    /// Returns the configured cap in bytes.
    #[must_use]
    pub fn max_size_bytes(&self) -> u64 {
        self.shared.max_size_bytes.load(Ordering::Acquire)
    }

    /// Installs the function used to compute usage.
    pub fn set_storage_usage_computer<F>(&self, computer: F)
    where
        F: Fn() -> StorageResult<u64> + Send + Sync + 'static,
    {
        *self.shared.computer.write() = Some(Arc::new(computer));
    }

    /// Installs an already shared usage computer.
    pub fn set_shared_usage_computer(&self, computer: UsageComputer) {
        *self.shared.computer.write() = Some(computer);
    }

    /// Changes the sampling interval.
    ///
    /// If the periodic task is running it is cancelled and restarted with
    /// the new interval while the task lock is held.
    pub fn set_check_frequency(&self, frequency: Duration) {
        let mut task = self.task.lock();
        *self.frequency.lock() = frequency;
        if let Some(handle) = task.take() {
            handle.abort();
            *task = Some(self.spawn(frequency));
            debug!(?frequency, "restarted storage space checker");
        }
    }

    /// Returns the sampling interval.
    #[must_use]
    pub fn check_frequency(&self) -> Duration {
        *self.frequency.lock()
    }

    /// Starts the periodic task on the current tokio runtime.
    ///
    /// The first sample is taken immediately. Starting a running checker
    /// restarts it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoRuntime`] when called outside a runtime.
    pub fn start(&self) -> StorageResult<()> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| StorageError::NoRuntime(e.to_string()))?;

        let mut task = self.task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }
        let frequency = *self.frequency.lock();
        *task = Some(self.spawn(frequency));
        info!(?frequency, max = self.max_size_bytes(), "started storage space checker");
        Ok(())
    }

    /// Stops the periodic task. The last status is kept.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Returns true if the periodic task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Takes a sample right away and returns the resulting status.
    pub fn check_now(&self) -> StorageStatus {
        self.shared.sample()
    }

    /// Last computed status.
    #[must_use]
    pub fn status(&self) -> StorageStatus {
        self.shared.status()
    }

    /// Usage in bytes at the last successful sample.
    #[must_use]
    pub fn usage_bytes(&self) -> u64 {
        self.shared.usage_bytes.load(Ordering::Acquire)
    }

    /// Returns true if the last sample classified storage as full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.status() == StorageStatus::Full
    }

    fn spawn(&self, frequency: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frequency);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                shared.sample();
            }
        })
    }
}

impl Drop for StorageSpaceChecker {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for StorageSpaceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSpaceChecker")
            .field("max_size_bytes", &self.max_size_bytes())
            .field("usage_bytes", &self.usage_bytes())
            .field("status", &self.status())
            .finish()
    }
}

/// A [`ByteStore`] decorator that refuses writes while storage is full.
///
/// Reads and removals always pass through so that consumers can drain
/// queues and free space.
pub struct SpaceCheckedByteStore {
    inner: Arc<dyn ByteStore>,
    checker: Arc<StorageSpaceChecker>,
}

impl SpaceCheckedByteStore {
    /// Wraps `inner`, gating `put` on `checker`.
    #[must_use]
    pub fn new(inner: Arc<dyn ByteStore>, checker: Arc<StorageSpaceChecker>) -> Self {
        Self { inner, checker }
    }
}

#[async_trait]
impl ByteStore for SpaceCheckedByteStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        if self.checker.is_full() {
            return Err(StorageError::StorageFull {
                entity: self.inner.name().to_string(),
            });
        }
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &[u8]) -> StorageResult<()> {
        self.inner.remove(key).await
    }

    async fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        self.inner.contains(key).await
    }

    async fn first_entry(&self) -> StorageResult<Option<Entry>> {
        self.inner.first_entry().await
    }

    async fn last_entry(&self) -> StorageResult<Option<Entry>> {
        self.inner.last_entry().await
    }

    async fn iterate_batch(
        &self,
        start: Option<&[u8]>,
        batch_size: usize,
    ) -> StorageResult<Vec<Entry>> {
        self.inner.iterate_batch(start, batch_size).await
    }

    fn approximate_size(&self) -> u64 {
        self.inner.approximate_size()
    }
}

/// A provider decorator that wraps every partition in a [`SpaceCheckedByteStore`].
pub struct SpaceCheckedByteStoreProvider {
    inner: Arc<dyn ByteStoreProvider>,
    checker: Arc<StorageSpaceChecker>,
}

impl SpaceCheckedByteStoreProvider {
    /// Wraps `inner`; every partition it hands out consults `checker`.
    #[must_use]
    pub fn new(inner: Arc<dyn ByteStoreProvider>, checker: Arc<StorageSpaceChecker>) -> Self {
        Self { inner, checker }
    }

    /// Returns the shared checker.
    #[must_use]
    pub fn checker(&self) -> &Arc<StorageSpaceChecker> {
        &self.checker
    }
}

#[async_trait]
impl ByteStoreProvider for SpaceCheckedByteStoreProvider {
    async fn get_store(&self, name: &str) -> StorageResult<Arc<dyn ByteStore>> {
        let store = self.inner.get_store(name).await?;
        Ok(Arc::new(SpaceCheckedByteStore::new(
            store,
            Arc::clone(&self.checker),
        )))
    }

    async fn remove_store(&self, name: &str) -> StorageResult<()> {
        self.inner.remove_store(name).await
    }

    async fn close(&self) -> StorageResult<()> {
        self.checker.stop();
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryByteStore;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn classify_thresholds() {
        assert_eq!(StorageStatus::classify(0, 1000), StorageStatus::Available);
        assert_eq!(StorageStatus::classify(899, 1000), StorageStatus::Available);
        assert_eq!(StorageStatus::classify(900, 1000), StorageStatus::Critical);
        assert_eq!(StorageStatus::classify(950, 1000), StorageStatus::Critical);
        assert_eq!(StorageStatus::classify(999, 1000), StorageStatus::Critical);
        assert_eq!(StorageStatus::classify(1000, 1000), StorageStatus::Full);
        assert_eq!(StorageStatus::classify(5000, 1000), StorageStatus::Full);
        assert_eq!(StorageStatus::classify(5000, 0), StorageStatus::Unknown);
    }

    #[test]
    fn classify_does_not_overflow() {
        assert_eq!(
            StorageStatus::classify(u64::MAX, u64::MAX),
            StorageStatus::Full
        );
    }

    #[test]
    fn status_unknown_until_sampled() {
        let checker = StorageSpaceChecker::new(100);
        assert_eq!(checker.status(), StorageStatus::Unknown);
        assert!(!checker.is_full());

        // No computer installed: sampling keeps Unknown.
        assert_eq!(checker.check_now(), StorageStatus::Unknown);
    }

    #[test]
    fn usage_equal_to_cap_is_full() {
        let checker = StorageSpaceChecker::new(100);
        checker.set_storage_usage_computer(|| Ok(100));
        assert_eq!(checker.check_now(), StorageStatus::Full);
        assert!(checker.is_full());
        assert_eq!(checker.usage_bytes(), 100);
    }

    #[test]
    fn computer_error_keeps_previous_status() {
        let checker = StorageSpaceChecker::new(100);
        let fail = Arc::new(AtomicBool::new(false));
        let fail_flag = Arc::clone(&fail);
        checker.set_storage_usage_computer(move || {
            if fail_flag.load(Ordering::SeqCst) {
                Err(StorageError::UsageUnavailable("boom".into()))
            } else {
                Ok(95)
            }
        });

        assert_eq!(checker.check_now(), StorageStatus::Critical);
        fail.store(true, Ordering::SeqCst);
        assert_eq!(checker.check_now(), StorageStatus::Critical);
        assert_eq!(checker.usage_bytes(), 95);
    }

    #[test]
    fn changing_cap_reclassifies_on_next_sample() {
        let checker = StorageSpaceChecker::new(100);
        checker.set_storage_usage_computer(|| Ok(100));
        assert!(checker.check_now() == StorageStatus::Full);

        checker.set_max_size_bytes(1000);
        assert_eq!(checker.check_now(), StorageStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_samples() {
        let checker = StorageSpaceChecker::new(100);
        let usage = Arc::new(AtomicU64::new(10));
        let reported = Arc::clone(&usage);
        checker.set_storage_usage_computer(move || Ok(reported.load(Ordering::SeqCst)));
        checker.set_check_frequency(Duration::from_secs(1));
        checker.start().unwrap();
        assert!(checker.is_running());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(checker.status(), StorageStatus::Available);

        usage.store(100, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(checker.is_full());

        checker.stop();
        assert!(!checker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn set_check_frequency_restarts_running_task() {
        let checker = StorageSpaceChecker::new(100);
        let usage = Arc::new(AtomicU64::new(10));
        let reported = Arc::clone(&usage);
        checker.set_storage_usage_computer(move || Ok(reported.load(Ordering::SeqCst)));
        checker.set_check_frequency(Duration::from_secs(3600));
        checker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(checker.status(), StorageStatus::Available);

        usage.store(95, Ordering::SeqCst);
        checker.set_check_frequency(Duration::from_secs(1));
        assert_eq!(checker.check_frequency(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(checker.status(), StorageStatus::Critical);
    }

    #[test]
    fn start_outside_runtime_fails() {
        let checker = StorageSpaceChecker::new(100);
        assert!(matches!(checker.start(), Err(StorageError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn full_store_refuses_put_but_serves_reads() {
        let inner = Arc::new(InMemoryByteStore::new("queue"));
        inner.put(b"old", b"v").await.unwrap();

        let checker = Arc::new(StorageSpaceChecker::new(10));
        checker.set_storage_usage_computer(|| Ok(10));
        checker.check_now();

        let store = SpaceCheckedByteStore::new(inner, Arc::clone(&checker));
        let err = store.put(b"new", b"v").await.unwrap_err();
        assert!(err.is_storage_full());
        assert!(matches!(err, StorageError::StorageFull { ref entity } if entity == "queue"));

        assert_eq!(store.get(b"old").await.unwrap(), Some(b"v".to_vec()));
        store.remove(b"old").await.unwrap();
        assert!(!store.contains(b"old").await.unwrap());
    }
}
