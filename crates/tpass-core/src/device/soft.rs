//! Software stand-in for the hardware device, backed by a 32-byte seed file.
//!
//! Key derivation mirrors what the hardware does with its internal secret:
//!
//! - master key = HMAC-SHA256(seed, `"tpass master key"`)
//! - wrap key = HMAC-SHA256(seed, `"tpass nonce wrap"`)
//! - wrapped nonce = AES-256-GCM(wrap key, random 32-byte entry key)
//!
//! Losing the seed file loses the vault, exactly as losing the device would.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use rand::RngCore;
use ring::hmac;
use secrecy::{ExposeSecret, SecretBox};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{DeviceError, DeviceKeyProvider, DeviceOperation};
use crate::crypto::{self, EntryKey, KEY_LEN, MasterKey};

/// Size of the seed file in bytes.
pub const SEED_LEN: usize = 32;

const MASTER_KEY_LABEL: &[u8] = b"tpass master key";
const WRAP_KEY_LABEL: &[u8] = b"tpass nonce wrap";
const NONCE_AAD: &[u8] = b"tpass-nonce-v1";

/// Seed-backed [`DeviceKeyProvider`].
pub struct SoftDevice {
    seed: SecretBox<[u8; SEED_LEN]>,
}

impl SoftDevice {
    pub fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self {
            seed: SecretBox::new(Box::new(seed)),
        }
    }

    /// Create a device with a fresh random seed, not persisted anywhere.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rand::rng().fill_bytes(seed.as_mut_slice());
        Self::from_seed(*seed)
    }

    /// Load the seed from `path`.
    pub fn load(path: &Path) -> Result<Self, DeviceError> {
        let bytes = Zeroizing::new(fs::read(path).map_err(|source| DeviceError::SeedFile {
            path: path.to_path_buf(),
            source,
        })?);
        let seed: [u8; SEED_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| DeviceError::InvalidSeed {
                    path: path.to_path_buf(),
                    expected: SEED_LEN,
                    actual: bytes.len(),
                })?;
        debug!(path = %path.display(), "Loaded device seed");
        Ok(Self::from_seed(seed))
    }

    /// Generate a seed and write it to `path` (mode 0600 on Unix).
    ///
    /// Fails if the file already exists.
    pub fn create(path: &Path) -> Result<Self, DeviceError> {
        let device = Self::generate();
        let seed_err = |source| DeviceError::SeedFile {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(seed_err)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(seed_err)?;
        file.write_all(device.seed.expose_secret())
            .map_err(seed_err)?;
        file.sync_all().map_err(seed_err)?;

        info!(path = %path.display(), "Created device seed");
        Ok(device)
    }

    /// Load the seed at `path`, creating it first if absent.
    pub fn load_or_create(path: &Path) -> Result<Self, DeviceError> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::create(path)
        }
    }

    fn derive(&self, label: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, self.seed.expose_secret());
        let tag = hmac::sign(&key, label);
        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        out.copy_from_slice(tag.as_ref());
        out
    }
}

impl fmt::Debug for SoftDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftDevice")
            .field("seed", &"[REDACTED]")
            .finish()
    }
}

impl DeviceKeyProvider for SoftDevice {
    fn derive_master_key(&self) -> Result<MasterKey, DeviceError> {
        Ok(MasterKey::new(*self.derive(MASTER_KEY_LABEL)))
    }

    fn wrap_new_nonce(&self) -> Result<Vec<u8>, DeviceError> {
        let mut entry_key = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(entry_key.as_mut_slice());
        let wrap_key = self.derive(WRAP_KEY_LABEL);
        crypto::seal(&wrap_key, NONCE_AAD, entry_key.as_slice()).map_err(|e| {
            DeviceError::Unavailable {
                operation: DeviceOperation::WrapNonce,
                reason: e.to_string(),
            }
        })
    }

    fn unwrap_nonce(&self, wrapped: &[u8]) -> Result<EntryKey, DeviceError> {
        let wrap_key = self.derive(WRAP_KEY_LABEL);
        let plain = crypto::open(&wrap_key, NONCE_AAD, wrapped).map_err(|e| {
            DeviceError::InvalidNonce {
                reason: e.to_string(),
            }
        })?;
        let key: [u8; KEY_LEN] =
            plain
                .as_slice()
                .try_into()
                .map_err(|_| DeviceError::InvalidNonce {
                    reason: format!("unwrapped key has {} bytes", plain.len()),
                })?;
        Ok(EntryKey::new(key))
    }

    fn draw_entropy(&self, n: usize) -> Result<Vec<u8>, DeviceError> {
        let mut out = vec![0u8; n];
        rand::rng().fill_bytes(&mut out);
        Ok(out)
    }
}
