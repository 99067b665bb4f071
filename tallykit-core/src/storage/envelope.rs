//! Versioned CBOR persistence helpers.

use serde::{de::DeserializeOwned, Serialize};

use super::error::{StorageError, StorageResult};

/// A value persisted as CBOR with an explicit format version.
///
/// Decoding rejects any version other than [`Envelope::VERSION`], so a downgraded SDK never
/// misreads state written by a newer one.
pub(crate) trait Envelope: Serialize + DeserializeOwned {
    /// Current format version.
    const VERSION: u32;

    /// Version stored in this value.
    fn version(&self) -> u32;

    fn to_cbor(&self) -> StorageResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(bytes)
    }

    fn from_cbor(bytes: &[u8]) -> StorageResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        if envelope.version() != Self::VERSION {
            return Err(StorageError::UnsupportedEnvelopeVersion(envelope.version()));
        }
        Ok(envelope)
    }
}
