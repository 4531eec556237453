#![forbid(unsafe_code)]

//! Per-entry seal/unseal transitions.
//!
//! An entry is either **sealed** (both secret fields are ciphertext, the
//! device-wrapped nonce is present) or **open** (both fields plaintext, no
//! nonce). Only sealed entries are ever written to disk.
//!
//! Transitions never mutate their input. They run on a working copy whose
//! `success` marker is cleared until both fields and the nonce agree, and the
//! copy is returned only if every device and cipher call succeeded.

use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError, EntryKey};
use crate::device::{DeviceError, DeviceKeyProvider};
use crate::vault::model::{Entry, FieldKind, SecretField};

/// Which secret field an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Password,
    SafeNote,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Password => f.write_str("password"),
            Field::SafeNote => f.write_str("secret"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// **[PROGRAMMING ERROR]** Seal of a sealed entry, unseal of an open one, or
    /// an entry whose fields disagree.
    #[error("Invalid entry state: expected {expected}, found {}", state_name(.found))]
    InvalidState {
        expected: FieldKind,
        found: Option<FieldKind>,
    },

    #[error("Device request failed: {0}")]
    Device(#[from] DeviceError),

    /// **[INTEGRITY VIOLATION]** The field did not authenticate under the
    /// entry key.
    #[error("[INTEGRITY VIOLATION] Failed to decrypt {field}: {source}")]
    Decrypt {
        field: Field,
        #[source]
        source: CryptoError,
    },

    #[error("Failed to encrypt {field}: {source}")]
    Encrypt {
        field: Field,
        #[source]
        source: CryptoError,
    },

    /// The field authenticated but does not hold a JSON string.
    #[error("Decrypted {field} is malformed: {reason}")]
    MalformedField { field: Field, reason: String },
}

fn state_name(found: &Option<FieldKind>) -> String {
    found.map_or_else(|| "inconsistent".to_owned(), |k| k.to_string())
}

fn expect_state(entry: &Entry, expected: FieldKind) -> Result<(), EnvelopeError> {
    let found = entry.state();
    if found == Some(expected) {
        Ok(())
    } else {
        Err(EnvelopeError::InvalidState { expected, found })
    }
}

fn open_field(key: &EntryKey, field: Field, value: &SecretField) -> Result<SecretField, EnvelopeError> {
    let SecretField::Sealed(ciphertext) = value else {
        return Err(EnvelopeError::InvalidState {
            expected: FieldKind::Sealed,
            found: Some(FieldKind::Plain),
        });
    };
    let plaintext = key
        .with_key(|k| crypto::open(k, b"", ciphertext))
        .map_err(|source| EnvelopeError::Decrypt { field, source })?;
    let text: String =
        serde_json::from_slice(&plaintext).map_err(|e| EnvelopeError::MalformedField {
            field,
            reason: e.to_string(),
        })?;
    Ok(SecretField::Plain(text))
}

fn seal_field(key: &EntryKey, field: Field, value: &SecretField) -> Result<SecretField, EnvelopeError> {
    let SecretField::Plain(text) = value else {
        return Err(EnvelopeError::InvalidState {
            expected: FieldKind::Plain,
            found: Some(FieldKind::Sealed),
        });
    };
    let encoded = Zeroizing::new(serde_json::to_vec(text).map_err(|e| {
        EnvelopeError::MalformedField {
            field,
            reason: e.to_string(),
        }
    })?);
    let ciphertext = key
        .with_key(|k| crypto::seal(k, b"", &encoded))
        .map_err(|source| EnvelopeError::Encrypt { field, source })?;
    Ok(SecretField::Sealed(ciphertext))
}

/// Decrypt both secret fields of a sealed entry.
///
/// Returns an open copy; `entry` itself is left sealed.
#[instrument(level = "debug", skip_all)]
pub fn unseal<D>(entry: &Entry, device: &D) -> Result<Entry, EnvelopeError>
where
    D: DeviceKeyProvider + ?Sized,
{
    expect_state(entry, FieldKind::Sealed)?;
    let mut working = entry.clone();
    working.success = false;
    working.export = true;

    let nonce = working.nonce.take().unwrap_or_default();
    let key = device.unwrap_nonce(&nonce)?;
    working.password = open_field(&key, Field::Password, &entry.password)?;
    working.safe_note = open_field(&key, Field::SafeNote, &entry.safe_note)?;

    working.success = true;
    debug!("Entry unsealed");
    Ok(working)
}

/// Encrypt both secret fields of an open entry under a freshly wrapped nonce.
///
/// The nonce rotates on every seal, so resealing an unchanged entry still
/// produces new ciphertext.
#[instrument(level = "debug", skip_all)]
pub fn seal<D>(entry: &Entry, device: &D) -> Result<Entry, EnvelopeError>
where
    D: DeviceKeyProvider + ?Sized,
{
    expect_state(entry, FieldKind::Plain)?;
    let mut working = entry.clone();
    working.success = false;
    working.export = false;

    let nonce = device.wrap_new_nonce()?;
    let key = device.unwrap_nonce(&nonce)?;
    working.password = seal_field(&key, Field::Password, &entry.password)?;
    working.safe_note = seal_field(&key, Field::SafeNote, &entry.safe_note)?;
    working.nonce = Some(nonce);

    working.success = true;
    debug!("Entry sealed");
    Ok(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftDevice;

    fn open_entry() -> Entry {
        Entry::open("github.com", "GitHub", "octocat", "hunter2", "recovery: abc")
    }

    #[test]
    fn test_seal_then_unseal() {
        let device = SoftDevice::generate();
        let entry = open_entry();

        let sealed = seal(&entry, &device).unwrap();
        assert!(sealed.is_sealed());
        assert!(sealed.nonce.is_some());
        assert!(!sealed.export);

        let opened = unseal(&sealed, &device).unwrap();
        assert_eq!(opened.password.as_plain(), Some("hunter2"));
        assert_eq!(opened.safe_note.as_plain(), Some("recovery: abc"));
        assert_eq!(opened.nonce, None);
        assert_eq!(opened, entry);
    }

    #[test]
    fn test_field_plaintext_is_json_string() {
        let device = SoftDevice::generate();
        let sealed = seal(&open_entry(), &device).unwrap();
        let key = device.unwrap_nonce(sealed.nonce.as_ref().unwrap()).unwrap();
        let SecretField::Sealed(ct) = &sealed.password else {
            panic!("expected ciphertext");
        };
        let plain = key.with_key(|k| crypto::open(k, b"", ct)).unwrap();
        assert_eq!(plain.as_slice(), b"\"hunter2\"");
    }

    #[test]
    fn test_nonce_rotates_on_every_seal() {
        let device = SoftDevice::generate();
        let first = seal(&open_entry(), &device).unwrap();
        let reopened = unseal(&first, &device).unwrap();
        let second = seal(&reopened, &device).unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.password, second.password);
    }

    #[test]
    fn test_double_seal_and_double_unseal() {
        let device = SoftDevice::generate();
        let sealed = seal(&open_entry(), &device).unwrap();
        assert!(matches!(
            seal(&sealed, &device),
            Err(EnvelopeError::InvalidState {
                expected: FieldKind::Plain,
                found: Some(FieldKind::Sealed)
            })
        ));
        assert!(matches!(
            unseal(&open_entry(), &device),
            Err(EnvelopeError::InvalidState {
                expected: FieldKind::Sealed,
                found: Some(FieldKind::Plain)
            })
        ));
    }

    #[test]
    fn test_unseal_with_foreign_device() {
        let sealed = seal(&open_entry(), &SoftDevice::generate()).unwrap();
        assert!(matches!(
            unseal(&sealed, &SoftDevice::generate()),
            Err(EnvelopeError::Device(DeviceError::InvalidNonce { .. }))
        ));
    }

    #[test]
    fn test_tampered_field_is_decrypt_error() {
        let device = SoftDevice::generate();
        let mut sealed = seal(&open_entry(), &device).unwrap();
        if let SecretField::Sealed(ct) = &mut sealed.safe_note {
            let last = ct.len() - 1;
            ct[last] ^= 1;
        }
        assert!(matches!(
            unseal(&sealed, &device),
            Err(EnvelopeError::Decrypt {
                field: Field::SafeNote,
                ..
            })
        ));
    }
}
