//! Value-encrypting decorators over string-valued entity stores.

use crate::crypto::ValueEncryptor;
use crate::error::{CoreError, CoreResult};
use crate::key_value::KeyValueStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Encrypts values on write and decrypts them on read.
///
/// Values are serialized to JSON, encrypted, and stored as strings in the
/// inner store. A stored string that fails to decrypt is treated as a
/// legacy plaintext JSON value written before encryption was enabled.
pub struct EncryptedStore<K, V> {
    inner: Arc<dyn KeyValueStore<K, String>>,
    encryptor: Arc<dyn ValueEncryptor>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> EncryptedStore<K, V>
where
    K: Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Wraps `inner`, encrypting values with `encryptor`.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore<K, String>>, encryptor: Arc<dyn ValueEncryptor>) -> Self {
        Self {
            inner,
            encryptor,
            _value: PhantomData,
        }
    }

    fn seal(&self, value: &V) -> CoreResult<String> {
        let json = serde_json::to_string(value)?;
        self.encryptor.encrypt(&json)
    }

    fn open(&self, stored: String) -> CoreResult<V> {
        match self.encryptor.decrypt(&stored) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) => {
                debug!(entity = self.inner.entity_name(), error = %e, "reading value as legacy plaintext");
                Ok(serde_json::from_str(&stored)?)
            }
        }
    }
}

#[async_trait]
impl<K, V> KeyValueStore<K, V> for EncryptedStore<K, V>
where
    K: Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn entity_name(&self) -> &str {
        self.inner.entity_name()
    }

    async fn put(&self, key: &K, value: &V) -> CoreResult<()> {
        let sealed = self.seal(value)?;
        self.inner.put(key, &sealed).await
    }

    async fn get(&self, key: &K) -> CoreResult<Option<V>> {
        self.inner
            .get(key)
            .await?
            .map(|stored| self.open(stored))
            .transpose()
    }

    async fn remove(&self, key: &K) -> CoreResult<()> {
        self.inner.remove(key).await
    }

    async fn contains(&self, key: &K) -> CoreResult<bool> {
        self.inner.contains(key).await
    }

    async fn first_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.inner
            .first_entry()
            .await?
            .map(|(k, stored)| Ok((k, self.open(stored)?)))
            .transpose()
    }

    async fn last_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.inner
            .last_entry()
            .await?
            .map(|(k, stored)| Ok((k, self.open(stored)?)))
            .transpose()
    }

    async fn iterate_batch(&self, start: Option<&K>, batch_size: usize) -> CoreResult<Vec<(K, V)>> {
        self.inner
            .iterate_batch(start, batch_size)
            .await?
            .into_iter()
            .map(|(k, stored)| Ok((k, self.open(stored)?)))
            .collect()
    }
}

/// Stored wrapper telling encrypted payloads apart from plaintext ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Whether `payload` is ciphertext.
    pub encrypted: bool,
    /// The serialized value, encrypted or not.
    pub payload: String,
}

/// Encrypted store that tolerates a mixed corpus during migration.
///
/// Each value is written inside an [`EncryptedData`] envelope. With an
/// encryptor configured, new writes are encrypted; without one they are
/// written as plaintext envelopes. Reads decrypt only envelopes flagged as
/// encrypted, and a stored string that is not an envelope at all is read
/// as a legacy plaintext JSON value.
pub struct UpdatableEncryptedStore<K, V> {
    inner: Arc<dyn KeyValueStore<K, String>>,
    encryptor: Option<Arc<dyn ValueEncryptor>>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> UpdatableEncryptedStore<K, V>
where
    K: Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Wraps `inner`. Pass `None` to write plaintext envelopes.
    #[must_use]
    pub fn new(
        inner: Arc<dyn KeyValueStore<K, String>>,
        encryptor: Option<Arc<dyn ValueEncryptor>>,
    ) -> Self {
        Self {
            inner,
            encryptor,
            _value: PhantomData,
        }
    }

    /// Returns true if new writes are encrypted.
    #[must_use]
    pub fn encrypts_writes(&self) -> bool {
        self.encryptor.is_some()
    }

    fn seal(&self, value: &V) -> CoreResult<String> {
        let json = serde_json::to_string(value)?;
        let envelope = match &self.encryptor {
            Some(encryptor) => EncryptedData {
                encrypted: true,
                payload: encryptor.encrypt(&json)?,
            },
            None => EncryptedData {
                encrypted: false,
                payload: json,
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    fn open(&self, stored: String) -> CoreResult<V> {
        let envelope = match serde_json::from_str::<EncryptedData>(&stored) {
            Ok(envelope) => envelope,
            Err(_) => return Ok(serde_json::from_str(&stored)?),
        };

        if !envelope.encrypted {
            return Ok(serde_json::from_str(&envelope.payload)?);
        }

        let encryptor = self.encryptor.as_ref().ok_or_else(|| {
            CoreError::decryption_failed(format!(
                "entity {} holds encrypted values but no encryptor is configured",
                self.inner.entity_name()
            ))
        })?;
        let json = encryptor.decrypt(&envelope.payload)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl<K, V> KeyValueStore<K, V> for UpdatableEncryptedStore<K, V>
where
    K: Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn entity_name(&self) -> &str {
        self.inner.entity_name()
    }

    async fn put(&self, key: &K, value: &V) -> CoreResult<()> {
        let sealed = self.seal(value)?;
        self.inner.put(key, &sealed).await
    }

    async fn get(&self, key: &K) -> CoreResult<Option<V>> {
        self.inner
            .get(key)
            .await?
            .map(|stored| self.open(stored))
            .transpose()
    }

    async fn remove(&self, key: &K) -> CoreResult<()> {
        self.inner.remove(key).await
    }

    async fn contains(&self, key: &K) -> CoreResult<bool> {
        self.inner.contains(key).await
    }

    async fn first_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.inner
            .first_entry()
            .await?
            .map(|(k, stored)| Ok((k, self.open(stored)?)))
            .transpose()
    }

    async fn last_entry(&self) -> CoreResult<Option<(K, V)>> {
        self.inner
            .last_entry()
            .await?
            .map(|(k, stored)| Ok((k, self.open(stored)?)))
            .transpose()
    }

    async fn iterate_batch(&self, start: Option<&K>, batch_size: usize) -> CoreResult<Vec<(K, V)>> {
        self.inner
            .iterate_batch(start, batch_size)
            .await?
            .into_iter()
            .map(|(k, stored)| Ok((k, self.open(stored)?)))
            .collect()
    }
}
