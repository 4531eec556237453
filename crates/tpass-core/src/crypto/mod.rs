//! AES-256-GCM sealing shared by the vault container and entry envelopes.
//!
//! Both layers use the browser extension's ciphertext layout:
//!
//! ```text
//! [ iv (12 bytes) | tag (16 bytes) | ciphertext ]
//! ```

pub mod keys;

use aes_gcm::{
    Aes256Gcm, Key, Nonce, Tag,
    aead::{AeadInPlace, KeyInit},
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

pub use keys::{EntryKey, MasterKey};

/// Size of the AES-GCM initialization vector.
pub const IV_LEN: usize = 12;
/// Size of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;
/// Size of every symmetric key handled by this crate.
pub const KEY_LEN: usize = 32;

/// Errors that can occur during cryptographic operations.
///
/// # Security Classification
///
/// Authentication failures are **[INTEGRITY VIOLATION]** candidates: a wrong key
/// and a tampered ciphertext are cryptographically indistinguishable, so callers
/// must never swallow them.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// GCM tag verification failed.
    ///
    /// **[INTEGRITY VIOLATION]** Wrong key, or the ciphertext was modified.
    #[error("[INTEGRITY VIOLATION] authentication failed - wrong key or tampered ciphertext")]
    AuthenticationFailed,

    /// Encryption failed unexpectedly.
    ///
    /// **[PROGRAMMING ERROR]** Only reachable with absurdly large buffers.
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Sealed data too short to contain an IV and a tag.
    #[error("Sealed data too short: expected at least {expected} bytes, got {actual}")]
    TruncatedCiphertext { expected: usize, actual: usize },

    /// Key material of the wrong size.
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

/// Draw a fresh random IV from the host CSPRNG.
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key` with an explicit IV.
///
/// Returns `iv || tag || ciphertext`. Identical inputs give identical output,
/// which the vault codec relies on for round-trip tests.
pub fn seal_with_iv(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut buffer = Zeroizing::new(plaintext.to_vec());
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer.as_mut_slice())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + buffer.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&buffer);
    Ok(out)
}

/// Encrypt `plaintext` under `key` with a random IV.
pub fn seal(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    seal_with_iv(key, &random_iv(), aad, plaintext)
}

/// Decrypt `iv || tag || ciphertext` produced by [`seal`].
pub fn open(
    key: &[u8; KEY_LEN],
    aad: &[u8],
    sealed: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::TruncatedCiphertext {
            expected: IV_LEN + TAG_LEN,
            actual: sealed.len(),
        });
    }
    let (iv, rest) = sealed.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            aad,
            buffer.as_mut_slice(),
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [7u8; KEY_LEN];

    #[test]
    fn test_seal_layout() {
        let iv = [1u8; IV_LEN];
        let sealed = seal_with_iv(&KEY, &iv, b"", b"hello").unwrap();
        assert_eq!(sealed.len(), IV_LEN + TAG_LEN + 5);
        assert_eq!(&sealed[..IV_LEN], &iv);
    }

    #[test]
    fn test_seal_is_deterministic_for_fixed_iv() {
        let iv = [9u8; IV_LEN];
        let a = seal_with_iv(&KEY, &iv, b"aad", b"payload").unwrap();
        let b = seal_with_iv(&KEY, &iv, b"aad", b"payload").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_open_roundtrip() {
        let sealed = seal(&KEY, b"aad", b"secret value").unwrap();
        let opened = open(&KEY, b"aad", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"secret value");
    }

    #[test]
    fn test_open_wrong_key() {
        let sealed = seal(&KEY, b"", b"secret").unwrap();
        let result = open(&[8u8; KEY_LEN], b"", &sealed);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_open_wrong_aad() {
        let sealed = seal(&KEY, b"one", b"secret").unwrap();
        assert!(matches!(
            open(&KEY, b"two", &sealed),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_open_tampered_ciphertext() {
        let mut sealed = seal(&KEY, b"", b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            open(&KEY, b"", &sealed),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_open_truncated() {
        let result = open(&KEY, b"", &[0u8; 20]);
        assert!(matches!(
            result,
            Err(CryptoError::TruncatedCiphertext {
                expected: 28,
                actual: 20
            })
        ));
    }
}
