//! Plaintext metadata cache.
//!
//! Decrypting the vault needs a device round trip, so read-only commands are
//! served from a JSON snapshot of the decrypted vault. Entries in the snapshot
//! are still sealed; only their metadata is readable.
//!
//! A snapshot belongs to exactly one vault file. Its file name carries a
//! SHA-256 digest of the canonical vault path, and the path itself is stored
//! inside:
//!
//! ```json
//! { "vaultPath": "/home/user/.config/tpass/store.pswd", "vault": { ... } }
//! ```
//!
//! On Unix the snapshot must be a regular file owned by the current user with
//! no group or other permission bits. Beyond that it must name the vault being
//! opened and be at least as new as the vault file. Content is never compared
//! with the vault; any other snapshot is a miss and the vault gets decrypted.
//!
//! The snapshot lives in `/dev/shm` so it never reaches persistent storage.
//! Hosts without `/dev/shm` fall back to the temp directory with a warning.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use ring::digest;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::vault::lock::ModTime;
use crate::vault::model::Vault;

/// Preferred cache directory (memory-backed on Linux).
pub const SHM_DIR: &str = "/dev/shm";

/// Bytes of the path digest used in snapshot file names.
const NAME_DIGEST_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Metadata cache I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize metadata cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a cache read did not produce a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Stale,
    /// The snapshot could not be parsed, or holds an invalid vault.
    Corrupt,
    /// The snapshot was written for another vault file.
    OtherVault,
    /// Not a regular file owned by us with owner-only permissions.
    Untrusted,
}

/// Result of [`MetadataCache::read`].
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Vault),
    Miss(MissReason),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    vault_path: &'a str,
    vault: &'a Vault,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    vault_path: String,
    vault: Vault,
}

/// Absolute, symlink-free form of `vault_path`. The file itself need not
/// exist yet; its directory is resolved instead.
pub fn canonical_vault_path(vault_path: &Path) -> PathBuf {
    if let Ok(path) = fs::canonicalize(vault_path) {
        return path;
    }
    let parent = vault_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match (fs::canonicalize(parent), vault_path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => std::path::absolute(vault_path).unwrap_or_else(|_| vault_path.to_path_buf()),
    }
}

fn owner_key(vault_path: &Path) -> String {
    canonical_vault_path(vault_path).to_string_lossy().into_owned()
}

#[cfg(unix)]
fn is_trusted(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.is_file() && meta.uid() == nix::unistd::geteuid().as_raw() && meta.mode() & 0o077 == 0
}

#[cfg(not(unix))]
fn is_trusted(meta: &fs::Metadata) -> bool {
    meta.is_file()
}

/// Handle on one cache file.
#[derive(Debug, Clone)]
pub struct MetadataCache {
    path: PathBuf,
}

impl MetadataCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot of `vault_path` in `/dev/shm`, or in the temp directory if
    /// `/dev/shm` is missing.
    pub fn default_location(vault_path: &Path) -> Self {
        Self::new(Self::location_in(Path::new(SHM_DIR), vault_path))
    }

    /// Snapshot path for `vault_path` under `preferred_dir`, falling back to
    /// the system temp directory when `preferred_dir` does not exist.
    ///
    /// The name is `<vault file name>-<digest>.json`, so stores sharing a
    /// file name in different directories never share a snapshot.
    pub fn location_in(preferred_dir: &Path, vault_path: &Path) -> PathBuf {
        let canonical = canonical_vault_path(vault_path);
        let hash = digest::digest(&digest::SHA256, canonical.as_os_str().as_encoded_bytes());
        let stem = canonical
            .file_name()
            .map_or(Cow::Borrowed("vault"), |n| n.to_string_lossy());
        let name = format!("{stem}-{}.json", hex::encode(&hash.as_ref()[..NAME_DIGEST_LEN]));

        if preferred_dir.is_dir() {
            preferred_dir.join(name)
        } else {
            let fallback = std::env::temp_dir().join(name);
            warn!(
                preferred = %preferred_dir.display(),
                fallback = %fallback.display(),
                "Memory-backed directory not found, plaintext metadata goes to the less secure temp directory"
            );
            fallback
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Return the cached vault if the snapshot was written for `vault_path`,
    /// is trustworthy, and is at least as new as the vault file.
    pub fn read(&self, vault_path: &Path) -> Result<CacheLookup, CacheError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(cache = %self.path.display(), "Metadata cache miss: absent");
                return Ok(CacheLookup::Miss(MissReason::Absent));
            }
            Err(e) => return Err(self.io_err(e)),
        };
        let meta = file.metadata().map_err(|e| self.io_err(e))?;
        if !is_trusted(&meta) {
            warn!(cache = %self.path.display(), "Ignoring metadata cache with foreign owner or loose permissions");
            return Ok(CacheLookup::Miss(MissReason::Untrusted));
        }

        let cache_time = ModTime::from_system_time(meta.modified().map_err(|e| self.io_err(e))?);
        let vault_time = ModTime::of(vault_path).map_err(|source| CacheError::Io {
            path: vault_path.to_path_buf(),
            source,
        })?;
        if vault_time.is_some_and(|v| cache_time < v) {
            debug!(cache = %self.path.display(), "Metadata cache miss: stale");
            return Ok(CacheLookup::Miss(MissReason::Stale));
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| self.io_err(e))?;
        let snapshot = match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) if snapshot.vault.check_persistable().is_ok() => snapshot,
            _ => {
                warn!(cache = %self.path.display(), "Ignoring unreadable metadata cache");
                return Ok(CacheLookup::Miss(MissReason::Corrupt));
            }
        };
        if snapshot.vault_path != owner_key(vault_path) {
            warn!(
                cache = %self.path.display(),
                owner = %snapshot.vault_path,
                "Metadata cache belongs to another vault"
            );
            return Ok(CacheLookup::Miss(MissReason::OtherVault));
        }

        debug!(cache = %self.path.display(), "Metadata cache hit");
        Ok(CacheLookup::Hit(snapshot.vault))
    }

    /// Replace the cache with a snapshot of `vault`, the decrypted contents of
    /// `vault_path` (atomic rename, owner-only permissions).
    pub fn write(&self, vault_path: &Path, vault: &Vault) -> Result<(), CacheError> {
        let owner = owner_key(vault_path);
        let json = serde_json::to_vec(&SnapshotRef {
            vault_path: &owner,
            vault,
        })?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_err(e))?;
        }
        tmp.write_all(&json).map_err(|e| self.io_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;

        debug!(cache = %self.path.display(), "Wrote metadata cache");
        Ok(())
    }

    /// Delete the cache. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool, CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(cache = %self.path.display(), "Removed metadata cache");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_err(e)),
        }
    }
}
