//! Platform interfaces for storage.

use std::sync::Arc;

use super::error::StorageResult;

/// Atomic blob store for small binary files (e.g., `event_queue.bin`).
#[uniffi::export(with_foreign)]
pub trait AtomicBlobStore: Send + Sync {
    /// Reads the blob at `path`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, path: String) -> StorageResult<Option<Vec<u8>>>;

    /// Writes bytes atomically to `path`. Readers see either the old or the new contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, path: String, bytes: Vec<u8>) -> StorageResult<()>;

    /// Deletes the blob at `path`. Deleting a missing blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, path: String) -> StorageResult<()>;
}

/// A named key/value partition holding opaque bytes.
///
/// On iOS this is a pasteboard, on Android a content provider or shared preferences file,
/// on desktop a directory.
#[uniffi::export(with_foreign)]
pub trait KeyValueStore: Send + Sync {
    /// Stable name of the partition, used in logs and to tell partitions apart.
    fn name(&self) -> String;

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be read.
    fn get(&self, key: String) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be written.
    fn set(&self, key: String, value: Vec<u8>) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be written.
    fn remove(&self, key: String) -> StorageResult<()>;
}

/// Provider responsible for the platform's storage partitions.
#[uniffi::export(with_foreign)]
pub trait SharedStorageProvider: Send + Sync {
    /// Partition only this app instance can see. Deleted with the app.
    fn private_store(&self) -> Arc<dyn KeyValueStore>;

    /// Partition owned by this app instance that other apps embedding the SDK can read.
    fn shared_store(&self) -> Arc<dyn KeyValueStore>;

    /// Shared partitions owned by other app instances on the device.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery itself fails. Individual unreadable partitions should
    /// be left out instead.
    fn discover_other_stores(&self) -> StorageResult<Vec<Arc<dyn KeyValueStore>>>;

    /// Blob store holding the persisted event queue.
    fn queue_blob_store(&self) -> Arc<dyn AtomicBlobStore>;
}
