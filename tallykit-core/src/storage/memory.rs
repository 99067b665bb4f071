//! In-memory storage for tests and ephemeral hosts.
//!
//! [`MemorySharedMedium`] plays the role of the device: every [`MemoryStorageProvider`]
//! created on the same medium sees the shared partitions of the others, while private
//! partitions and queue blobs stay per provider. Nothing is persisted across processes.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
};

use super::{
    error::StorageResult,
    traits::{AtomicBlobStore, KeyValueStore, SharedStorageProvider},
};

/// In-memory key/value partition.
#[derive(Debug)]
pub struct MemoryKeyValueStore {
    name: String,
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty partition called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the partition holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn get(&self, key: String) -> StorageResult<Option<Vec<u8>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: String, value: Vec<u8>) -> StorageResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
        Ok(())
    }

    fn remove(&self, key: String) -> StorageResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates an empty blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AtomicBlobStore for MemoryBlobStore {
    fn read(&self, path: String) -> StorageResult<Option<Vec<u8>>> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(&path).cloned())
    }

    fn write_atomic(&self, path: String, bytes: Vec<u8>) -> StorageResult<()> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, bytes);
        Ok(())
    }

    fn delete(&self, path: String) -> StorageResult<()> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path);
        Ok(())
    }
}

/// The simulated device-wide medium holding every app's shared partition.
#[derive(Debug, Default)]
pub struct MemorySharedMedium {
    stores: RwLock<BTreeMap<String, Arc<MemoryKeyValueStore>>>,
}

impl MemorySharedMedium {
    /// Creates an empty medium.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Shared partition owned by `app`, created on first use.
    #[must_use]
    pub fn store(&self, app: &str) -> Arc<MemoryKeyValueStore> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            stores
                .entry(app.to_string())
                .or_insert_with(|| Arc::new(MemoryKeyValueStore::new(shared_name(app)))),
        )
    }

    /// Deletes the shared partition owned by `app`, as the OS does when some platforms
    /// uninstall an app.
    pub fn remove_store(&self, app: &str) {
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(app);
    }

    fn stores_except(&self, app: &str) -> Vec<Arc<dyn KeyValueStore>> {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(owner, _)| owner.as_str() != app)
            .map(|(_, store)| Arc::clone(store) as Arc<dyn KeyValueStore>)
            .collect()
    }
}

/// [`SharedStorageProvider`] for one app instance living on a [`MemorySharedMedium`].
pub struct MemoryStorageProvider {
    app: String,
    medium: Arc<MemorySharedMedium>,
    private: Arc<MemoryKeyValueStore>,
    blobs: Arc<MemoryBlobStore>,
}

impl MemoryStorageProvider {
    /// Creates the storage of app `app` on `medium` and registers its shared partition.
    #[must_use]
    pub fn new(app: impl Into<String>, medium: &Arc<MemorySharedMedium>) -> Self {
        let app = app.into();
        let _ = medium.store(&app);
        Self {
            private: Arc::new(MemoryKeyValueStore::new(format!("private:{app}"))),
            blobs: Arc::new(MemoryBlobStore::new()),
            medium: Arc::clone(medium),
            app,
        }
    }

    /// The same app after a delete and reinstall: private partition and queue blob are
    /// empty, shared partitions on the medium are untouched.
    #[must_use]
    pub fn reinstalled(&self) -> Self {
        Self::new(self.app.clone(), &self.medium)
    }

    /// The same app in a new process: every partition and the queue blob are kept.
    #[must_use]
    pub fn relaunched(&self) -> Self {
        Self {
            app: self.app.clone(),
            medium: Arc::clone(&self.medium),
            private: Arc::clone(&self.private),
            blobs: Arc::clone(&self.blobs),
        }
    }

    /// The private partition, for inspection.
    #[must_use]
    pub fn private_partition(&self) -> Arc<MemoryKeyValueStore> {
        Arc::clone(&self.private)
    }

    /// The queue blob store, for inspection.
    #[must_use]
    pub fn blob_store(&self) -> Arc<MemoryBlobStore> {
        Arc::clone(&self.blobs)
    }
}

impl SharedStorageProvider for MemoryStorageProvider {
    fn private_store(&self) -> Arc<dyn KeyValueStore> {
        self.private.clone()
    }

    fn shared_store(&self) -> Arc<dyn KeyValueStore> {
        self.medium.store(&self.app)
    }

    fn discover_other_stores(&self) -> StorageResult<Vec<Arc<dyn KeyValueStore>>> {
        Ok(self.medium.stores_except(&self.app))
    }

    fn queue_blob_store(&self) -> Arc<dyn AtomicBlobStore> {
        self.blobs.clone()
    }
}

fn shared_name(app: &str) -> String {
    format!("shared:{app}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_providers_share_medium() {
        let medium = MemorySharedMedium::new();
        let a = MemoryStorageProvider::new("a", &medium);
        let b = MemoryStorageProvider::new("b", &medium);

        a.shared_store()
            .set("k".to_string(), b"from-a".to_vec())
            .expect("set");

        let others = b.discover_other_stores().expect("discover");
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].name(), "shared:a");
        assert_eq!(
            others[0].get("k".to_string()).expect("get"),
            Some(b"from-a".to_vec())
        );
    }

    #[test]
    fn test_reinstall_clears_private_only() {
        let medium = MemorySharedMedium::new();
        let first = MemoryStorageProvider::new("a", &medium);
        first
            .private_store()
            .set("k".to_string(), b"p".to_vec())
            .expect("set");
        first
            .shared_store()
            .set("k".to_string(), b"s".to_vec())
            .expect("set");
        first
            .queue_blob_store()
            .write_atomic("q".to_string(), b"blob".to_vec())
            .expect("write");

        let relaunched = first.relaunched();
        assert!(!relaunched.private_partition().is_empty());
        assert_eq!(
            relaunched.queue_blob_store().read("q".to_string()).expect("read"),
            Some(b"blob".to_vec())
        );

        let second = first.reinstalled();
        assert!(second.private_partition().is_empty());
        assert_eq!(
            second.queue_blob_store().read("q".to_string()).expect("read"),
            None
        );
        assert_eq!(
            second.shared_store().get("k".to_string()).expect("get"),
            Some(b"s".to_vec())
        );
    }

    #[test]
    fn test_remove_store() {
        let medium = MemorySharedMedium::new();
        let a = MemoryStorageProvider::new("a", &medium);
        let b = MemoryStorageProvider::new("b", &medium);
        medium.remove_store("a");
        assert!(b.discover_other_stores().expect("discover").is_empty());
        // Recreated empty on next use.
        assert_eq!(a.shared_store().get("k".to_string()).expect("get"), None);
    }
}
