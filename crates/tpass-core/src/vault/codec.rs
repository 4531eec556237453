#![forbid(unsafe_code)]

//! Vault container format.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "TPSV"
//! 4       2     container version (u16, little endian)
//! 6       12    AES-GCM IV
//! 18      16    AES-GCM tag
//! 34      n     ciphertext of the JSON vault document
//! ```
//!
//! The 6-byte header is bound to the ciphertext as associated data, so a
//! version downgrade fails authentication rather than being silently accepted.

use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError, IV_LEN, MasterKey, TAG_LEN};
use crate::vault::model::{InvariantViolation, Vault};

pub const MAGIC: &[u8; 4] = b"TPSV";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 6;
/// Smallest possible container: header, IV and tag with an empty ciphertext.
pub const MIN_CONTAINER_LEN: usize = HEADER_LEN + IV_LEN + TAG_LEN;

/// Errors from encoding or decoding a vault container.
///
/// # Security Classification
///
/// - [`CodecError::Key`] is the only variant produced by a failed
///   authentication: wrong master key, or a tampered file.
/// - Every other variant means the file is not a vault this version can read,
///   or the authenticated plaintext is not a valid vault document.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Not a vault file: bad magic bytes")]
    BadMagic,

    #[error("Vault file truncated: {actual} bytes, need at least {}", MIN_CONTAINER_LEN)]
    Truncated { actual: usize },

    #[error("Unsupported vault format version {found} (this build reads version {})", FORMAT_VERSION)]
    UnsupportedVersion { found: u16 },

    /// **[INTEGRITY VIOLATION]** Authentication under the master key failed.
    #[error("[INTEGRITY VIOLATION] Vault decryption failed - wrong device or tampered file")]
    Key(#[source] CryptoError),

    #[error("Vault encryption failed")]
    Encrypt(#[source] CryptoError),

    #[error("Vault document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Vault document violates an invariant: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl CodecError {
    /// True when the container parsed but did not authenticate.
    pub fn is_key_error(&self) -> bool {
        matches!(self, CodecError::Key(_))
    }
}

fn header() -> [u8; HEADER_LEN] {
    let mut h = [0u8; HEADER_LEN];
    h[..4].copy_from_slice(MAGIC);
    h[4..].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    h
}

/// Encrypt `vault` into a container.
///
/// Deterministic for identical `(vault, key, iv)`. Refuses to write a vault
/// holding open entries or dangling tag references.
#[instrument(level = "debug", skip_all, fields(entries = vault.entries.len()))]
pub fn encrypt(vault: &Vault, key: &MasterKey, iv: &[u8; IV_LEN]) -> Result<Vec<u8>, CodecError> {
    vault.check_persistable()?;
    let plaintext = Zeroizing::new(serde_json::to_vec(vault)?);
    let header = header();

    let sealed = key
        .with_key(|k| crypto::seal_with_iv(k, iv, &header, &plaintext))
        .map_err(CodecError::Encrypt)?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&sealed);
    debug!(bytes = out.len(), "Encrypted vault");
    Ok(out)
}

/// Parse and decrypt a container.
#[instrument(level = "debug", skip_all, fields(bytes = data.len()))]
pub fn decrypt(data: &[u8], key: &MasterKey) -> Result<Vault, CodecError> {
    if data.len() < MIN_CONTAINER_LEN {
        if data.len() >= MAGIC.len() && &data[..MAGIC.len()] != MAGIC {
            return Err(CodecError::BadMagic);
        }
        return Err(CodecError::Truncated { actual: data.len() });
    }
    if &data[..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion { found: version });
    }

    let (header, sealed) = data.split_at(HEADER_LEN);
    let plaintext = key
        .with_key(|k| crypto::open(k, header, sealed))
        .map_err(CodecError::Key)?;

    let vault: Vault = serde_json::from_slice(&plaintext)?;
    vault.check_persistable()?;
    debug!(
        tags = vault.tags.len(),
        entries = vault.entries.len(),
        "Decrypted vault"
    );
    Ok(vault)
}
