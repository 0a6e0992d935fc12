//! Typed store provider assembling the storage stack.
//!
//! ```text
//!   StoreProvider (typed stores, cache by entity name)
//!        |
//!   TimedByteStoreProvider          operation_timeout
//!        |
//!   SpaceCheckedByteStoreProvider   max_storage_bytes
//!        |
//!   BackupRestoreManager            backup
//!        |
//!   InMemoryByteStoreProvider
//! ```
//!
//! Layers whose setting is absent from the [`Config`] are left out.

use crate::backup::{codec_for, BackupMetadata, BackupRestoreManager};
use crate::config::Config;
use crate::crypto::ValueEncryptor;
use crate::encrypted::{EncryptedStore, UpdatableEncryptedStore};
use crate::entity_store::EntityStore;
use crate::error::{CoreError, CoreResult};
use crate::key_lock::DEFAULT_SHARD_COUNT;
use crate::key_value::{KeyValueStore, KeyValueStoreMapper, RawStore};
use crate::mapper::{JsonMapper, KeyMapper, StoreKey, TypeMapper, Utf8Mapper};
use crate::sequential::SequentialStore;
use edgestore_storage::{
    ByteStoreProvider, InMemoryByteStoreProvider, SpaceCheckedByteStoreProvider,
    StorageSpaceChecker, TimedByteStoreProvider,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

type AnyStore = Arc<dyn Any + Send + Sync>;

/// Hands out typed stores over named byte partitions.
///
/// Each entity name maps to one store instance for the life of the
/// provider; asking for the same name with a different store type fails.
pub struct StoreProvider {
    byte_provider: Arc<dyn ByteStoreProvider>,
    backup: Option<Arc<BackupRestoreManager>>,
    checker: Option<Arc<StorageSpaceChecker>>,
    shard_count: usize,
    stores: Mutex<HashMap<String, AnyStore>>,
}

impl StoreProvider {
    /// A provider over fresh in-memory partitions, without timeouts, space
    /// checks or backups.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_byte_provider(Arc::new(InMemoryByteStoreProvider::new()), DEFAULT_SHARD_COUNT)
    }

    /// A provider over an existing byte store provider.
    #[must_use]
    pub fn from_byte_provider(byte_provider: Arc<dyn ByteStoreProvider>, shard_count: usize) -> Self {
        Self {
            byte_provider,
            backup: None,
            checker: None,
            shard_count,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Opens in-memory storage configured by `config`.
    ///
    /// With backups configured, the last backup is restored before this
    /// returns. With a storage cap configured, the space checker is started
    /// on the current runtime.
    ///
    /// # Errors
    ///
    /// Fails if the backup directory cannot be created or if a storage cap
    /// is configured outside a tokio runtime.
    pub async fn open(config: Config) -> CoreResult<Self> {
        let memory = Arc::new(InMemoryByteStoreProvider::new());
        let mut provider: Arc<dyn ByteStoreProvider> = Arc::clone(&memory) as Arc<dyn ByteStoreProvider>;

        let backup = match &config.backup {
            Some(backup) => {
                let manager = Arc::new(
                    BackupRestoreManager::create(
                        provider,
                        backup.path.clone(),
                        codec_for(backup.format),
                        backup.batch_size,
                    )
                    .await?,
                );
                provider = Arc::clone(&manager) as Arc<dyn ByteStoreProvider>;
                Some(manager)
            }
            None => None,
        };

        let checker = match config.max_storage_bytes {
            Some(max_size_bytes) => {
                let checker = Arc::new(StorageSpaceChecker::new(max_size_bytes));
                checker.set_shared_usage_computer(memory.usage_computer());
                checker.set_check_frequency(config.space_check_frequency);
                checker.start()?;
                provider = Arc::new(SpaceCheckedByteStoreProvider::new(provider, Arc::clone(&checker)));
                Some(checker)
            }
            None => None,
        };

        if let Some(timeout) = config.operation_timeout {
            provider = Arc::new(TimedByteStoreProvider::new(provider, timeout));
        }

        info!(
            shard_count = config.shard_count,
            backup = backup.is_some(),
            max_storage_bytes = ?config.max_storage_bytes,
            timeout = ?config.operation_timeout,
            "opened store provider"
        );

        Ok(Self {
            byte_provider: provider,
            backup,
            checker,
            shard_count: config.shard_count,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// The entity store named `name`, with JSON-encoded values.
    pub async fn get_entity_store<K, V>(&self, name: &str) -> CoreResult<Arc<EntityStore<K, V>>>
    where
        K: StoreKey,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.cached(name, || self.entity_store(name, Arc::new(JsonMapper::<V>::new())))
            .await
    }

    /// The sequential store named `name`, starting at offset 0 when empty.
    pub async fn get_sequential_store<T>(&self, name: &str) -> CoreResult<Arc<SequentialStore<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.get_sequential_store_with_head(name, 0).await
    }

    /// The sequential store named `name`, starting at `default_head_offset`
    /// when empty.
    pub async fn get_sequential_store_with_head<T>(
        &self,
        name: &str,
        default_head_offset: i64,
    ) -> CoreResult<Arc<SequentialStore<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.cached(name, || async move {
            let entity_store = self
                .entity_store::<i64, T>(name, Arc::new(JsonMapper::<T>::new()))
                .await?;
            SequentialStore::create(entity_store, default_head_offset).await
        })
        .await
    }

    /// An entity store named `name` whose values are encrypted with
    /// `encryptor`.
    pub async fn get_encrypted_store<K, V>(
        &self,
        name: &str,
        encryptor: Arc<dyn ValueEncryptor>,
    ) -> CoreResult<Arc<EncryptedStore<K, V>>>
    where
        K: StoreKey,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.cached(name, || async move {
            let inner = self.string_store::<K>(name).await?;
            Ok(EncryptedStore::new(inner, encryptor))
        })
        .await
    }

    /// An entity store named `name` storing values in an envelope that
    /// records whether each value is encrypted.
    pub async fn get_updatable_encrypted_store<K, V>(
        &self,
        name: &str,
        encryptor: Option<Arc<dyn ValueEncryptor>>,
    ) -> CoreResult<Arc<UpdatableEncryptedStore<K, V>>>
    where
        K: StoreKey,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.cached(name, || async move {
            let inner = self.string_store::<K>(name).await?;
            Ok(UpdatableEncryptedStore::new(inner, encryptor))
        })
        .await
    }

    /// Drops the entity store named `name` and its data.
    ///
    /// Handles obtained before the removal stay usable but point at the
    /// detached partition: their writes are invisible to stores opened
    /// afterwards under the same name and are not backed up.
    pub async fn remove_entity_store(&self, name: &str) -> CoreResult<()> {
        self.remove(name).await
    }

    /// Drops the sequential store named `name` and its data.
    ///
    /// As with [`remove_entity_store`](Self::remove_entity_store), a
    /// previously obtained handle keeps appending to the detached
    /// partition; callers should drop it.
    pub async fn remove_sequential_store(&self, name: &str) -> CoreResult<()> {
        self.remove(name).await
    }

    /// Takes a backup now.
    ///
    /// # Errors
    ///
    /// Returns an invalid-operation error if backups are not configured, or
    /// the backup failure. A failed backup leaves the previous one current.
    pub async fn snapshot_now(&self) -> CoreResult<BackupMetadata> {
        match &self.backup {
            Some(manager) => manager.snapshot_now().await,
            None => Err(CoreError::invalid_operation("backup is not configured")),
        }
    }

    /// The backup manager, if backups are configured.
    #[must_use]
    pub fn backup_manager(&self) -> Option<&Arc<BackupRestoreManager>> {
        self.backup.as_ref()
    }

    /// The storage space checker, if a storage cap is configured.
    #[must_use]
    pub fn space_checker(&self) -> Option<&Arc<StorageSpaceChecker>> {
        self.checker.as_ref()
    }

    /// The outermost byte store provider.
    #[must_use]
    pub fn byte_provider(&self) -> &Arc<dyn ByteStoreProvider> {
        &self.byte_provider
    }

    /// Closes the stack: stops the space checker, takes a final backup and
    /// closes the partitions.
    pub async fn close(&self) -> CoreResult<()> {
        self.stores.lock().await.clear();
        self.byte_provider.close().await?;
        info!("closed store provider");
        Ok(())
    }

    async fn remove(&self, name: &str) -> CoreResult<()> {
        let mut stores = self.stores.lock().await;
        stores.remove(name);
        self.byte_provider.remove_store(name).await?;
        debug!(entity = name, "removed store");
        Ok(())
    }

    async fn cached<S, F, Fut>(&self, name: &str, build: F) -> CoreResult<Arc<S>>
    where
        S: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<S>>,
    {
        let mut stores = self.stores.lock().await;
        if let Some(existing) = stores.get(name) {
            return Arc::clone(existing).downcast::<S>().map_err(|_| {
                CoreError::invalid_operation(format!(
                    "entity {name} is already open as a different store type"
                ))
            });
        }

        let store = Arc::new(build().await?);
        stores.insert(name.to_string(), Arc::clone(&store) as AnyStore);
        debug!(entity = name, "opened store");
        Ok(store)
    }

    async fn entity_store<K, V>(
        &self,
        name: &str,
        value_mapper: Arc<dyn TypeMapper<V, Vec<u8>>>,
    ) -> CoreResult<EntityStore<K, V>>
    where
        K: StoreKey,
        V: Send + Sync + 'static,
    {
        let bytes = self.byte_provider.get_store(name).await?;
        let raw: Arc<dyn KeyValueStore<Vec<u8>, Vec<u8>>> = Arc::new(RawStore::new(bytes));
        let mapped = KeyValueStoreMapper::new(raw, Arc::new(KeyMapper::<K>::new()), value_mapper);
        Ok(EntityStore::new(Arc::new(mapped), self.shard_count))
    }

    async fn string_store<K: StoreKey>(&self, name: &str) -> CoreResult<Arc<dyn KeyValueStore<K, String>>> {
        let store = self.entity_store::<K, String>(name, Arc::new(Utf8Mapper)).await?;
        Ok(Arc::new(store))
    }
}

impl std::fmt::Debug for StoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreProvider")
            .field("shard_count", &self.shard_count)
            .field("backup", &self.backup)
            .field("checker", &self.checker)
            .finish_non_exhaustive()
    }
}
