//! Translation between typed keys/values and stored representations.
//!
//! A [`TypeMapper`] converts in both directions between an application type
//! and the type the layer below stores. Keys go through [`StoreKey`], whose
//! encodings preserve ordering where the type has a natural order (offsets
//! are 8-byte big-endian so byte order equals numeric order for `n >= 0`).

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// Converts values of type `T` to and from a stored type `U`.
pub trait TypeMapper<T, U>: Send + Sync {
    /// Converts an application value into its stored form.
    fn to_stored(&self, value: &T) -> CoreResult<U>;

    /// Converts a stored value back into the application type.
    fn from_stored(&self, stored: U) -> CoreResult<T>;
}

/// A key type that can address entries of an entity store.
pub trait StoreKey: Clone + Debug + Hash + Send + Sync + 'static {
    /// Encodes the key into store bytes.
    fn to_key_bytes(&self) -> Vec<u8>;

    /// Decodes a key from store bytes.
    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self>;
}

impl StoreKey for String {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CoreError::codec(format!("key is not UTF-8: {e}")))
    }
}

impl StoreKey for Vec<u8> {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl StoreKey for i64 {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| {
            CoreError::codec(format!("offset key must be 8 bytes, got {}", bytes.len()))
        })?;
        Ok(i64::from_be_bytes(array))
    }
}

impl StoreKey for u64 {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CoreError::codec(format!("key must be 8 bytes, got {}", bytes.len())))?;
        Ok(u64::from_be_bytes(array))
    }
}

/// Maps keys through their [`StoreKey`] encoding.
#[derive(Debug)]
pub struct KeyMapper<K>(PhantomData<fn() -> K>);

impl<K> KeyMapper<K> {
    /// Creates the mapper.
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K> Default for KeyMapper<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StoreKey> TypeMapper<K, Vec<u8>> for KeyMapper<K> {
    fn to_stored(&self, value: &K) -> CoreResult<Vec<u8>> {
        Ok(value.to_key_bytes())
    }

    fn from_stored(&self, stored: Vec<u8>) -> CoreResult<K> {
        K::from_key_bytes(&stored)
    }
}

/// Maps serde values to and from JSON bytes.
#[derive(Debug)]
pub struct JsonMapper<V>(PhantomData<fn() -> V>);

impl<V> JsonMapper<V> {
    /// Creates the mapper.
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for JsonMapper<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TypeMapper<V, Vec<u8>> for JsonMapper<V>
where
    V: Serialize + DeserializeOwned,
{
    fn to_stored(&self, value: &V) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn from_stored(&self, stored: Vec<u8>) -> CoreResult<V> {
        Ok(serde_json::from_slice(&stored)?)
    }
}

/// Maps strings to their raw UTF-8 bytes.
///
/// Used under the encrypted stores so that values written by a plain
/// JSON-valued entity store read back as their JSON text.
#[derive(Debug, Default)]
pub struct Utf8Mapper;

impl TypeMapper<String, Vec<u8>> for Utf8Mapper {
    fn to_stored(&self, value: &String) -> CoreResult<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn from_stored(&self, stored: Vec<u8>) -> CoreResult<String> {
        String::from_utf8(stored).map_err(|e| CoreError::codec(format!("value is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Twin {
        version: u32,
        reported: String,
    }

    #[test]
    fn offset_keys_are_big_endian() {
        assert_eq!(1i64.to_key_bytes(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(256i64.to_key_bytes(), vec![0, 0, 0, 0, 0, 0, 1, 0]);
        assert_eq!(i64::from_key_bytes(&256i64.to_key_bytes()).unwrap(), 256);
    }

    #[test]
    fn offset_key_wrong_length_fails() {
        assert!(i64::from_key_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn string_key_rejects_invalid_utf8() {
        assert!(String::from_key_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn json_mapper_round_trips_struct() {
        let mapper = JsonMapper::<Twin>::new();
        let twin = Twin {
            version: 3,
            reported: "on".into(),
        };
        let bytes = mapper.to_stored(&twin).unwrap();
        assert_eq!(mapper.from_stored(bytes).unwrap(), twin);
    }

    #[test]
    fn json_bytes_read_as_utf8_text() {
        let bytes = JsonMapper::<Twin>::new()
            .to_stored(&Twin {
                version: 1,
                reported: "x".into(),
            })
            .unwrap();
        let text = Utf8Mapper.from_stored(bytes).unwrap();
        assert_eq!(text, r#"{"version":1,"reported":"x"}"#);
    }

    proptest! {
        #[test]
        fn offset_byte_order_matches_numeric_order(a in 0i64..i64::MAX, b in 0i64..i64::MAX) {
            prop_assert_eq!(a.cmp(&b), a.to_key_bytes().cmp(&b.to_key_bytes()));
        }
    }
}
