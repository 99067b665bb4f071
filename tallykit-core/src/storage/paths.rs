//! Storage path helpers.

use std::path::{Path, PathBuf};

const TALLYKIT_DIRNAME: &str = "tallykit";
const PRIVATE_DIRNAME: &str = "private";
const SHARED_DIRNAME: &str = "shared";
const BLOBS_DIRNAME: &str = "blobs";

/// Paths for on-disk storage under `<root>/tallykit`.
///
/// ```text
/// <root>/tallykit/private/<bundle>/        private partition
/// <root>/tallykit/private/<bundle>/blobs/  queue blob
/// <root>/tallykit/shared/<bundle>/         own shared partition
/// <root>/tallykit/shared/*/                other apps' shared partitions
/// ```
#[derive(Debug, Clone, uniffi::Object)]
pub struct StoragePaths {
    root: PathBuf,
    tallykit_dir: PathBuf,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let tallykit_dir = root.join(TALLYKIT_DIRNAME);
        Self { root, tallykit_dir }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `tallykit` directory under the root.
    #[must_use]
    pub fn tallykit_dir(&self) -> &Path {
        &self.tallykit_dir
    }

    /// Returns the private partition directory of `bundle_id`.
    #[must_use]
    pub fn private_dir(&self, bundle_id: &str) -> PathBuf {
        self.tallykit_dir
            .join(PRIVATE_DIRNAME)
            .join(sanitize(bundle_id))
    }

    /// Returns the blob directory of `bundle_id`.
    #[must_use]
    pub fn blobs_dir(&self, bundle_id: &str) -> PathBuf {
        self.private_dir(bundle_id).join(BLOBS_DIRNAME)
    }

    /// Returns the directory holding every app's shared partition.
    #[must_use]
    pub fn shared_root(&self) -> PathBuf {
        self.tallykit_dir.join(SHARED_DIRNAME)
    }

    /// Returns the shared partition directory owned by `bundle_id`.
    #[must_use]
    pub fn shared_dir(&self, bundle_id: &str) -> PathBuf {
        self.shared_root().join(sanitize(bundle_id))
    }
}

#[uniffi::export]
impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[uniffi::constructor]
    #[must_use]
    pub fn from_root(root: String) -> Self {
        Self::new(PathBuf::from(root))
    }

    /// Returns the storage root directory as a string.
    #[must_use]
    pub fn root_path_string(&self) -> String {
        self.root.to_string_lossy().to_string()
    }

    /// Returns the `tallykit` directory as a string.
    #[must_use]
    pub fn tallykit_dir_path_string(&self) -> String {
        self.tallykit_dir.to_string_lossy().to_string()
    }

    /// Returns the private partition directory of `bundle_id` as a string.
    #[must_use]
    pub fn private_dir_path_string(&self, bundle_id: String) -> String {
        self.private_dir(&bundle_id).to_string_lossy().to_string()
    }

    /// Returns the shared partition directory of `bundle_id` as a string.
    #[must_use]
    pub fn shared_dir_path_string(&self, bundle_id: String) -> String {
        self.shared_dir(&bundle_id).to_string_lossy().to_string()
    }
}

/// Bundle ids become directory names; anything outside `[A-Za-z0-9._-]` is replaced.
fn sanitize(bundle_id: &str) -> String {
    let name: String = bundle_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match name.as_str() {
        "" | "." | ".." => format!("_{name}"),
        _ => name,
    }
}
