//! Error types for storage components.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage partitions, the queue blob and persisted envelopes.
///
/// These never reach the host through a logging call: the pipeline logs them and carries on
/// with its in-memory state.
#[derive(Debug, Error, uniffi::Error)]
pub enum StorageError {
    /// Errors coming from the blob store.
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// Errors coming from a key/value partition.
    #[error("key/value store error: {0}")]
    KeyValueStore(String),

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cryptographic failures (AEAD, HKDF, base64).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A persisted envelope was written by an incompatible SDK version.
    #[error("unsupported envelope version: {0}")]
    UnsupportedEnvelopeVersion(u32),

    /// A lock guarding storage state was poisoned.
    #[error("storage lock error: {0}")]
    Lock(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for StorageError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}
