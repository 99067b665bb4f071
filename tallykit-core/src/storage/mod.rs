//! Storage partitions used for identity and queue persistence.
//!
//! The platform supplies a [`SharedStorageProvider`]: a private partition, a shared
//! partition other apps can read, discovery of the other apps' shared partitions, and a blob
//! store for the event queue. [`StorageBroker`] serializes access to them.

mod broker;
pub(crate) mod envelope;
mod error;
pub mod file;
pub mod memory;
mod paths;
mod traits;

pub use broker::{PartitionKind, StorageBroker, StoragePartition};
pub use error::{StorageError, StorageResult};
pub use paths::StoragePaths;
pub use traits::{AtomicBlobStore, KeyValueStore, SharedStorageProvider};

/// Private partition key of the identity record.
pub const IDENTITY_RECORD_KEY: &str = "tk.identity";
/// Private partition key of the "user registered" flag.
pub const USER_REGISTERED_KEY: &str = "tk.user_registered";
/// Private partition key of the last reported user id.
pub const USER_ID_KEY: &str = "tk.user_id";
/// Blob name of the persisted event queue.
pub const QUEUE_BLOB_NAME: &str = "event_queue.bin";

/// Shared partition key of the identity entry for `organization_id`.
#[must_use]
pub fn shared_identity_key(organization_id: &str) -> String {
    format!("tk.uid.{organization_id}")
}
