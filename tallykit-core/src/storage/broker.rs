//! Serialized access to the storage partitions.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{
    error::{StorageError, StorageResult},
    traits::{AtomicBlobStore, KeyValueStore, SharedStorageProvider},
};

/// Which kind of partition a [`StoragePartition`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionKind {
    /// Visible to this app instance only.
    Private,
    /// Owned by this app instance, readable by other apps embedding the SDK.
    Shared,
    /// Shared partition owned by another app instance.
    Other,
}

/// A key/value partition tagged with its kind.
#[derive(Clone)]
pub struct StoragePartition {
    kind: PartitionKind,
    store: Arc<dyn KeyValueStore>,
}

impl StoragePartition {
    /// Wraps `store` as a partition of `kind`.
    #[must_use]
    pub fn new(kind: PartitionKind, store: Arc<dyn KeyValueStore>) -> Self {
        Self { kind, store }
    }

    /// Kind of the partition.
    #[must_use]
    pub const fn kind(&self) -> PartitionKind {
        self.kind
    }

    /// Name reported by the underlying store.
    #[must_use]
    pub fn name(&self) -> String {
        self.store.name()
    }
}

impl fmt::Debug for StoragePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoragePartition")
            .field("kind", &self.kind)
            .field("name", &self.name())
            .finish()
    }
}

/// Reads and writes storage partitions one operation at a time.
///
/// The broker's lock only orders operations issued by this process. Other processes write
/// the shared partitions concurrently; identity resolution tolerates that through its
/// tie-break.
pub struct StorageBroker {
    provider: Arc<dyn SharedStorageProvider>,
    private: StoragePartition,
    shared: StoragePartition,
    lock: Mutex<()>,
}

impl StorageBroker {
    /// Creates a broker over the partitions of `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn SharedStorageProvider>) -> Self {
        let private = StoragePartition::new(PartitionKind::Private, provider.private_store());
        let shared = StoragePartition::new(PartitionKind::Shared, provider.shared_store());
        Self {
            provider,
            private,
            shared,
            lock: Mutex::new(()),
        }
    }

    /// The private partition.
    #[must_use]
    pub const fn private(&self) -> &StoragePartition {
        &self.private
    }

    /// The own shared partition.
    #[must_use]
    pub const fn shared(&self) -> &StoragePartition {
        &self.shared
    }

    /// Reads `key` from `partition`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be read.
    pub fn read(&self, partition: &StoragePartition, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let _guard = self.lock_broker()?;
        partition.store.get(key.to_string())
    }

    /// Writes `value` under `key` in `partition`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be written.
    pub fn write(&self, partition: &StoragePartition, key: &str, value: &[u8]) -> StorageResult<()> {
        let _guard = self.lock_broker()?;
        partition.store.set(key.to_string(), value.to_vec())
    }

    /// Removes `key` from `partition`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be written.
    pub fn remove(&self, partition: &StoragePartition, key: &str) -> StorageResult<()> {
        let _guard = self.lock_broker()?;
        partition.store.remove(key.to_string())
    }

    /// Shared partitions of other app instances.
    ///
    /// Best effort: a failing discovery is logged and yields no partitions, and partitions
    /// that carry the name of one of our own partitions are left out.
    #[must_use]
    pub fn list_other_stores(&self) -> Vec<StoragePartition> {
        let discovered = match self.lock_broker() {
            Ok(_guard) => self.provider.discover_other_stores(),
            Err(err) => Err(err),
        };
        let stores = match discovered {
            Ok(stores) => stores,
            Err(err) => {
                log::warn!("shared partition discovery failed: {err}");
                return Vec::new();
            }
        };

        let own = [self.private.name(), self.shared.name()];
        stores
            .into_iter()
            .filter(|store| !own.contains(&store.name()))
            .map(|store| StoragePartition::new(PartitionKind::Other, store))
            .collect()
    }

    /// Blob store for the persisted event queue.
    #[must_use]
    pub fn queue_blob_store(&self) -> Arc<dyn AtomicBlobStore> {
        self.provider.queue_blob_store()
    }

    fn lock_broker(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| StorageError::Lock("storage broker mutex poisoned".to_string()))
    }
}
