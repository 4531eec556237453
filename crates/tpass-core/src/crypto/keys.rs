#![forbid(unsafe_code)]

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};

use super::KEY_LEN;

/// Vault master key, derived from the device for a single encrypt or decrypt.
///
/// # Security
///
/// The key lives in a [`SecretBox`] and is zeroized when dropped. Access is
/// scoped through [`MasterKey::with_key`]; the raw bytes never leave the
/// callback. A `MasterKey` is never cached across operations: the session asks
/// the device for a new one each time.
pub struct MasterKey {
    key: SecretBox<[u8; KEY_LEN]>,
}

impl MasterKey {
    /// Wrap raw key material. The caller should zeroize its own copy.
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: SecretBox::new(Box::new(key)),
        }
    }

    /// Execute a function with access to the raw 256-bit key.
    pub fn with_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; KEY_LEN]) -> R,
    {
        f(self.key.expose_secret())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Per-entry key material obtained by unwrapping an entry's nonce.
pub struct EntryKey {
    key: SecretBox<[u8; KEY_LEN]>,
}

impl EntryKey {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: SecretBox::new(Box::new(key)),
        }
    }

    /// Execute a function with access to the raw 256-bit key.
    pub fn with_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; KEY_LEN]) -> R,
    {
        f(self.key.expose_secret())
    }
}

impl fmt::Debug for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntryKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_master_key() {
        let key = MasterKey::new([0xAB; KEY_LEN]);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
        assert!(!debug.to_lowercase().contains("ab, "));
    }

    #[test]
    fn test_debug_redacts_entry_key() {
        let key = EntryKey::new([0x42; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "EntryKey([REDACTED])");
    }

    #[test]
    fn test_scoped_access() {
        let key = MasterKey::new([3u8; KEY_LEN]);
        let sum: u32 = key.with_key(|k| k.iter().map(|b| u32::from(*b)).sum());
        assert_eq!(sum, 3 * 32);
    }
}
