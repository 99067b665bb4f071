use serde::{Deserialize, Serialize};

use crate::{
    crypto::{derive_key, CryptoProvider},
    storage::{envelope::Envelope, StorageResult},
};

// Every app embedding the SDK derives the same key, so entries are readable across apps
// and opaque to anything else on the device.
const ENTRY_KEY_MATERIAL: &[u8] = b"tallykit shared identity entry";
const ENTRY_KEY_SALT: &[u8] = b"tallykit-v1";
const ENTRY_KEY_INFO: &[u8] = b"shared-identity";

/// An identifier mirrored into a shared partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedIdentityEntry {
    version: u32,
    /// Organization the identifier belongs to.
    pub organization_id: String,
    /// The mirrored device identifier.
    pub identifier: String,
    /// When the entry was written, ms since the Unix epoch.
    pub written_at: u64,
}

impl Envelope for SharedIdentityEntry {
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

impl SharedIdentityEntry {
    /// Creates an entry at the current format version.
    #[must_use]
    pub fn new(
        organization_id: impl Into<String>,
        identifier: impl Into<String>,
        written_at: u64,
    ) -> Self {
        Self {
            version: Self::VERSION,
            organization_id: organization_id.into(),
            identifier: identifier.into(),
            written_at,
        }
    }

    /// Encodes and encrypts the entry for a shared partition.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, key derivation or encryption fails.
    pub fn seal(&self, crypto: &dyn CryptoProvider) -> StorageResult<Vec<u8>> {
        let key = derive_key(ENTRY_KEY_MATERIAL, ENTRY_KEY_SALT, ENTRY_KEY_INFO)?;
        crypto.encrypt(key.to_vec(), self.to_cbor()?)
    }

    /// Decrypts and decodes an entry read from a shared partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes were not produced by [`SharedIdentityEntry::seal`] or
    /// were written by an incompatible SDK version.
    pub fn open(bytes: &[u8], crypto: &dyn CryptoProvider) -> StorageResult<Self> {
        let key = derive_key(ENTRY_KEY_MATERIAL, ENTRY_KEY_SALT, ENTRY_KEY_INFO)?;
        let plaintext = crypto.decrypt(key.to_vec(), bytes.to_vec())?;
        Self::from_cbor(&plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::DefaultCrypto, storage::StorageError};

    #[test]
    fn test_seal_open() {
        let crypto = DefaultCrypto::new();
        let entry = SharedIdentityEntry::new("ORG1", "device", 1_000);
        let sealed = entry.seal(&crypto).expect("seal");

        assert!(!sealed.windows(6).any(|window| window == b"device"));
        assert_eq!(SharedIdentityEntry::open(&sealed, &crypto).expect("open"), entry);
    }

    #[test]
    fn test_open_rejects_foreign_bytes() {
        let crypto = DefaultCrypto::new();
        assert!(matches!(
            SharedIdentityEntry::open(b"not an entry at all, just bytes", &crypto),
            Err(StorageError::Crypto(_))
        ));
    }
}
