//! Byte store trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use std::borrow::Borrow;
use std::fmt;

/// A raw key/value pair as held by a [`ByteStore`].
pub type Entry = (Vec<u8>, Vec<u8>);

/// An owned byte key ordered lexicographically.
///
/// Ordering, equality and hashing are those of the underlying byte slice,
/// so a `BTreeMap<ByteKey, _>` can be queried with a plain `&[u8]`.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteKey(Vec<u8>);

impl ByteKey {
    /// Creates a key from owned bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Borrow<[u8]> for ByteKey {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for ByteKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ByteKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for ByteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteKey(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A low-level ordered key/value store holding one named partition.
///
/// Byte stores are **opaque**: they do not interpret keys or values. Typed
/// layers (entity stores, sequential stores) own all encoding decisions.
///
/// # Invariants
///
/// - Iteration is in ascending byte-lexicographic key order
/// - `put` on an existing key replaces its value
/// - `get` of an absent key is `Ok(None)`, never an error
/// - Implementations must be `Send + Sync`; every method takes `&self`
///
/// # Cancellation
///
/// Dropping a returned future abandons the call. Deadlines are applied
/// uniformly by [`crate::TimedByteStore`] rather than by each implementor.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Name of the partition this store holds.
    fn name(&self) -> &str;

    /// Inserts or replaces the value stored under `key`.
    async fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &[u8]) -> StorageResult<()>;

    /// Returns true if `key` is present.
    async fn contains(&self, key: &[u8]) -> StorageResult<bool>;

    /// Returns the entry with the smallest key.
    async fn first_entry(&self) -> StorageResult<Option<Entry>>;

    /// Returns the entry with the largest key.
    async fn last_entry(&self) -> StorageResult<Option<Entry>>;

    /// Returns up to `batch_size` entries in ascending key order.
    ///
    /// Iteration begins at `start` (inclusive) when given, otherwise at the
    /// first entry.
    async fn iterate_batch(
        &self,
        start: Option<&[u8]>,
        batch_size: usize,
    ) -> StorageResult<Vec<Entry>>;

    /// Approximate number of bytes held by this store.
    fn approximate_size(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn byte_key_orders_lexicographically() {
        let mut keys = vec![
            ByteKey::from(vec![0x02]),
            ByteKey::from(vec![0x01, 0xff]),
            ByteKey::from(vec![0x01]),
        ];
        keys.sort();
        assert_eq!(keys[0].as_bytes(), &[0x01]);
        assert_eq!(keys[1].as_bytes(), &[0x01, 0xff]);
        assert_eq!(keys[2].as_bytes(), &[0x02]);
    }

    #[test]
    fn byte_key_map_lookup_by_slice() {
        let mut map = BTreeMap::new();
        map.insert(ByteKey::from(b"abc".as_slice()), 1);
        assert_eq!(map.get(b"abc".as_slice()), Some(&1));
        assert_eq!(map.get(b"abd".as_slice()), None);
    }

    #[test]
    fn byte_key_debug_is_hex() {
        let key = ByteKey::from(vec![0x00, 0xab]);
        assert_eq!(format!("{key:?}"), "ByteKey(00ab)");
    }
}
