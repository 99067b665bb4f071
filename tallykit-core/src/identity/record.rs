use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    crypto::CryptoProvider,
    storage::{envelope::Envelope, StorageResult},
};

/// The device's identifier as persisted in the private partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    organization_id: String,
    identifier: String,
    previous_identifier: Option<String>,
}

impl IdentityRecord {
    /// Creates a record with no previous identifier.
    #[must_use]
    pub fn new(organization_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            identifier: identifier.into(),
            previous_identifier: None,
        }
    }

    /// Organization the identifier belongs to.
    #[must_use]
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// The stable device identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The identifier last displaced from the own shared partition, if any.
    #[must_use]
    pub fn previous_identifier(&self) -> Option<&str> {
        self.previous_identifier.as_deref()
    }

    /// Derives the key used to sign events: `sha1_hex(organization_id ++ identifier ++ secret)`.
    ///
    /// The key is never transmitted or persisted.
    #[must_use]
    pub fn signing_key(&self, secret: &str, crypto: &dyn CryptoProvider) -> SigningKey {
        let material = Zeroizing::new(
            format!("{}{}{secret}", self.organization_id, self.identifier).into_bytes(),
        );
        SigningKey(Zeroizing::new(crypto.sha1_hex(material.to_vec())))
    }

    pub(crate) fn set_previous_identifier(&mut self, previous: String) {
        self.previous_identifier = Some(previous);
    }

    pub(crate) fn set_organization_id(&mut self, organization_id: &str) {
        organization_id.clone_into(&mut self.organization_id);
    }

    pub(crate) fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        StoredIdentity {
            version: StoredIdentity::VERSION,
            organization_id: self.organization_id.clone(),
            identifier: self.identifier.clone(),
            previous_identifier: self.previous_identifier.clone(),
        }
        .to_cbor()
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        let stored = StoredIdentity::from_cbor(bytes)?;
        Ok(Self {
            organization_id: stored.organization_id,
            identifier: stored.identifier,
            previous_identifier: stored.previous_identifier,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    version: u32,
    organization_id: String,
    identifier: String,
    previous_identifier: Option<String>,
}

impl Envelope for StoredIdentity {
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Hex key events are signed with. Zeroized on drop and redacted from `Debug`.
#[derive(Clone)]
pub struct SigningKey(Zeroizing<String>);

impl SigningKey {
    /// The key as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCrypto;

    #[test]
    fn test_signing_key_derivation() {
        let crypto = DefaultCrypto::new();
        let record = IdentityRecord::new("ORG1", "device");
        let key = record.signing_key("secret", &crypto);
        assert_eq!(
            key.as_str(),
            crypto.sha1_hex(b"ORG1devicesecret".to_vec())
        );
        assert_eq!(format!("{key:?}"), "SigningKey(<redacted>)");
    }

    #[test]
    fn test_persisted_form() {
        let mut record = IdentityRecord::new("ORG1", "device");
        record.set_previous_identifier("older".to_string());
        let restored = IdentityRecord::from_bytes(&record.to_bytes().expect("encode"))
            .expect("decode");
        assert_eq!(restored, record);
        assert_eq!(restored.previous_identifier(), Some("older"));
    }
}
