//! Stable anonymous device identity.
//!
//! The identifier lives in the private partition and is mirrored, encrypted, into the app's
//! shared partition. Other apps embedding the SDK read those mirrors, which lets a
//! reinstalled app recover its identifier and lets cloned storage be noticed.

mod entry;
mod record;
mod resolver;

pub use entry::SharedIdentityEntry;
pub use record::{IdentityRecord, SigningKey};
pub use resolver::{ConflictKind, IdentityConflict, IdentityResolver, LaunchType, Resolution};
