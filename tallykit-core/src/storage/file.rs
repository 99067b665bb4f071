//! On-disk storage rooted at [`StoragePaths`].
//!
//! Every value is its own file and every write goes through a temporary file that is
//! synced and renamed over the target, so a crash never leaves a torn value behind.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{
    error::{StorageError, StorageResult},
    paths::StoragePaths,
    traits::{AtomicBlobStore, KeyValueStore, SharedStorageProvider},
};

/// A directory used as a key/value partition. Keys are hex-encoded into file names.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    name: String,
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Creates a partition called `name` stored in `dir`.
    #[must_use]
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", hex::encode(key)))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn get(&self, key: String) -> StorageResult<Option<Vec<u8>>> {
        read_optional(&self.path_for(&key)).map_err(|err| kv_error(&self.name, &err))
    }

    fn set(&self, key: String, value: Vec<u8>) -> StorageResult<()> {
        let file_name = format!("{}.bin", hex::encode(&key));
        write_atomic(&self.dir, &file_name, &value).map_err(|err| kv_error(&self.name, &err))
    }

    fn remove(&self, key: String) -> StorageResult<()> {
        remove_optional(&self.path_for(&key)).map_err(|err| kv_error(&self.name, &err))
    }
}

/// A directory used as an [`AtomicBlobStore`].
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Creates a blob store writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl AtomicBlobStore for FileBlobStore {
    fn read(&self, path: String) -> StorageResult<Option<Vec<u8>>> {
        read_optional(&self.dir.join(&path))
            .map_err(|err| StorageError::BlobStore(format!("read {path}: {err}")))
    }

    fn write_atomic(&self, path: String, bytes: Vec<u8>) -> StorageResult<()> {
        write_atomic(&self.dir, &path, &bytes)
            .map_err(|err| StorageError::BlobStore(format!("write {path}: {err}")))
    }

    fn delete(&self, path: String) -> StorageResult<()> {
        remove_optional(&self.dir.join(&path))
            .map_err(|err| StorageError::BlobStore(format!("delete {path}: {err}")))
    }
}

/// [`SharedStorageProvider`] over a directory tree shared by every app using the same root.
#[derive(Debug, Clone)]
pub struct FileStorageProvider {
    paths: StoragePaths,
    bundle_id: String,
}

impl FileStorageProvider {
    /// Creates the storage of `bundle_id` under `paths`.
    #[must_use]
    pub fn new(paths: StoragePaths, bundle_id: impl Into<String>) -> Self {
        Self {
            paths,
            bundle_id: bundle_id.into(),
        }
    }

    /// The paths this provider writes under.
    #[must_use]
    pub const fn paths(&self) -> &StoragePaths {
        &self.paths
    }
}

impl SharedStorageProvider for FileStorageProvider {
    fn private_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(FileKeyValueStore::new(
            format!("private:{}", self.bundle_id),
            self.paths.private_dir(&self.bundle_id),
        ))
    }

    fn shared_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(FileKeyValueStore::new(
            format!("shared:{}", self.bundle_id),
            self.paths.shared_dir(&self.bundle_id),
        ))
    }

    fn discover_other_stores(&self) -> StorageResult<Vec<Arc<dyn KeyValueStore>>> {
        let shared_root = self.paths.shared_root();
        let own = self.paths.shared_dir(&self.bundle_id);
        let entries = match fs::read_dir(&shared_root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StorageError::KeyValueStore(format!(
                    "list {}: {err}",
                    shared_root.display()
                )))
            }
        };

        let mut stores: Vec<Arc<dyn KeyValueStore>> = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!("skipping unreadable shared partition entry: {err}");
                    continue;
                }
            };
            let path = entry.path();
            if path == own || !path.is_dir() {
                continue;
            }
            let name = format!("shared:{}", entry.file_name().to_string_lossy());
            stores.push(Arc::new(FileKeyValueStore::new(name, path)));
        }
        stores.sort_by_key(|store| store.name());
        Ok(stores)
    }

    fn queue_blob_store(&self) -> Arc<dyn AtomicBlobStore> {
        Arc::new(FileBlobStore::new(self.paths.blobs_dir(&self.bundle_id)))
    }
}

/// Creates the on-disk storage of `bundle_id` under `root` for foreign hosts.
#[uniffi::export]
#[must_use]
pub fn file_storage_provider(root: String, bundle_id: String) -> Arc<dyn SharedStorageProvider> {
    Arc::new(FileStorageProvider::new(
        StoragePaths::from_root(root),
        bundle_id,
    ))
}

fn kv_error(name: &str, err: &io::Error) -> StorageError {
    StorageError::KeyValueStore(format!("{name}: {err}"))
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn remove_optional(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let target = dir.join(file_name);
    let tmp = dir.join(format!(".{file_name}.{:016x}.tmp", rand::random::<u64>()));

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&tmp, &target)) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}
