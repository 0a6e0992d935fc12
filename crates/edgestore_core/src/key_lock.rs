//! Sharded per-key async locks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

/// Default number of lock shards.
pub const DEFAULT_SHARD_COUNT: usize = 12;

/// A fixed table of async locks indexed by `hash(key) mod shard_count`.
///
/// Two keys in different shards never contend. Keys that land in the same
/// shard serialize, which bounds the lock table size at the cost of some
/// unnecessary contention.
#[derive(Debug)]
pub struct KeyLockProvider {
    shards: Vec<Mutex<()>>,
}

impl KeyLockProvider {
    /// Creates a provider with `shard_count` locks (at least one).
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Index of the shard guarding `key`.
    #[must_use]
    pub fn shard_index<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Waits for the lock guarding `key`.
    pub async fn lock<K: Hash + ?Sized>(&self, key: &K) -> MutexGuard<'_, ()> {
        self.shards[self.shard_index(key)].lock().await
    }
}

impl Default for KeyLockProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}
