//! Cryptographic capability consumed by the pipeline.
//!
//! Event checksums, signing keys, shared identity entries and device identifiers are all
//! built from the handful of primitives in [`CryptoProvider`]. Hosts normally use
//! [`DefaultCrypto`]; a platform may supply its own implementation through `UniFFI`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use md5::{Digest, Md5};
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::storage::{StorageError, StorageResult};

const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Hash, symmetric cipher and base64 primitives.
#[uniffi::export(with_foreign)]
pub trait CryptoProvider: Send + Sync {
    /// Lowercase hex SHA-1 digest of `data`.
    fn sha1_hex(&self, data: Vec<u8>) -> String;

    /// Lowercase hex MD5 digest of `data`.
    fn md5_hex(&self, data: Vec<u8>) -> String;

    /// Encrypts `plaintext` under a 32-byte `key`. The output carries its own nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the key has the wrong length or encryption fails.
    fn encrypt(&self, key: Vec<u8>, plaintext: Vec<u8>) -> StorageResult<Vec<u8>>;

    /// Decrypts a value produced by [`CryptoProvider::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns an error if the key is wrong, the input is truncated or authentication fails.
    fn decrypt(&self, key: Vec<u8>, ciphertext: Vec<u8>) -> StorageResult<Vec<u8>>;

    /// URL-safe base64 without padding.
    fn base64_encode(&self, data: Vec<u8>) -> String;

    /// Decodes URL-safe base64 without padding.
    ///
    /// # Errors
    ///
    /// Returns an error if `encoded` is not valid base64url.
    fn base64_decode(&self, encoded: String) -> StorageResult<Vec<u8>>;
}

/// [`CryptoProvider`] backed by `sha1`, `md-5`, `XChaCha20-Poly1305` and `base64`.
#[derive(Debug, Default, Clone, Copy, uniffi::Object)]
pub struct DefaultCrypto;

#[uniffi::export]
impl DefaultCrypto {
    /// Creates the default provider.
    #[uniffi::constructor]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CryptoProvider for DefaultCrypto {
    fn sha1_hex(&self, data: Vec<u8>) -> String {
        hex::encode(Sha1::digest(&data))
    }

    fn md5_hex(&self, data: Vec<u8>) -> String {
        hex::encode(Md5::digest(&data))
    }

    fn encrypt(&self, key: Vec<u8>, plaintext: Vec<u8>) -> StorageResult<Vec<u8>> {
        let cipher = cipher(&key)?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|err| StorageError::Crypto(err.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, key: Vec<u8>, ciphertext: Vec<u8>) -> StorageResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(StorageError::Crypto("ciphertext too short".to_string()));
        }
        let cipher = cipher(&key)?;
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(XNonce::from_slice(nonce), body)
            .map_err(|err| StorageError::Crypto(err.to_string()))
    }

    fn base64_encode(&self, data: Vec<u8>) -> String {
        URL_SAFE_NO_PAD.encode(data)
    }

    fn base64_decode(&self, encoded: String) -> StorageResult<Vec<u8>> {
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|err| StorageError::Crypto(err.to_string()))
    }
}

fn cipher(key: &[u8]) -> StorageResult<XChaCha20Poly1305> {
    XChaCha20Poly1305::new_from_slice(key).map_err(|_| {
        StorageError::Crypto(format!("expected a {KEY_LEN}-byte key, got {}", key.len()))
    })
}

/// Derives a 32-byte key from `ikm` with HKDF-SHA256.
///
/// # Errors
///
/// Returns an error if HKDF expansion fails.
pub fn derive_key(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
) -> StorageResult<Zeroizing<[u8; KEY_LEN]>> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hkdf.expand(info, okm.as_mut())
        .map_err(|err| StorageError::Crypto(err.to_string()))?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let crypto = DefaultCrypto::new();
        assert_eq!(
            crypto.md5_hex(b"abc".to_vec()),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            crypto.sha1_hex(b"abc".to_vec()),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_encrypt_decrypt() {
        let crypto = DefaultCrypto::new();
        let key = vec![7u8; KEY_LEN];
        let sealed = crypto
            .encrypt(key.clone(), b"identifier".to_vec())
            .expect("encrypt");
        assert_ne!(&sealed[NONCE_LEN..], b"identifier");

        let opened = crypto.decrypt(key, sealed).expect("decrypt");
        assert_eq!(opened, b"identifier");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let crypto = DefaultCrypto::new();
        let sealed = crypto
            .encrypt(vec![1u8; KEY_LEN], b"secret".to_vec())
            .expect("encrypt");
        assert!(crypto.decrypt(vec![2u8; KEY_LEN], sealed).is_err());
    }

    #[test]
    fn test_rejects_short_key_and_truncated_input() {
        let crypto = DefaultCrypto::new();
        assert!(crypto.encrypt(vec![0u8; 16], b"x".to_vec()).is_err());
        assert!(crypto.decrypt(vec![0u8; KEY_LEN], vec![0u8; 4]).is_err());
    }

    #[test]
    fn test_base64_is_url_safe_without_padding() {
        let crypto = DefaultCrypto::new();
        let encoded = crypto.base64_encode(vec![0xfb, 0xff]);
        assert_eq!(encoded, "-_8");
        assert_eq!(crypto.base64_decode(encoded).expect("decode"), vec![0xfb, 0xff]);
        assert!(crypto.base64_decode("***".to_string()).is_err());
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let a = derive_key(b"ikm", b"salt", b"info").expect("derive");
        let b = derive_key(b"ikm", b"salt", b"info").expect("derive");
        let c = derive_key(b"ikm", b"salt", b"other").expect("derive");
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }
}
