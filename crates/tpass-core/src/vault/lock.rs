#![forbid(unsafe_code)]

//! Advisory single-writer lock for a vault file.
//!
//! The lock is a JSON record at `<vault file>.lock`:
//!
//! ```json
//! { "ownerId": "4b1c…", "observedModTime": { "secs": 1718000000, "nanos": 0 }, "pid": 4242 }
//! ```
//!
//! It is created with `O_EXCL` semantics, so exactly one process wins. Nothing
//! ever waits on a held lock: a second acquirer fails immediately. Before every
//! save the holder re-reads the record and the vault's modification time; if
//! either moved, somebody else touched the vault and the save is refused.
//!
//! A holder that crashes leaves its record behind. Removing it is a human
//! decision ([`LockArbiter::break_lock`]).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Modification time with nanosecond precision, as stored in a lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModTime {
    pub secs: u64,
    pub nanos: u32,
}

impl ModTime {
    pub fn from_system_time(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            secs: since.as_secs(),
            nanos: since.subsec_nanos(),
        }
    }

    /// Modification time of `path`, or `None` if it does not exist.
    pub fn of(path: &Path) -> io::Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(Self::from_system_time(meta.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// On-disk lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub owner_id: Uuid,
    /// Vault mtime when the lock was taken or last refreshed; `None` while the
    /// vault file does not exist yet.
    pub observed_mod_time: Option<ModTime>,
    /// Holder's process id, for diagnostics only.
    #[serde(default)]
    pub pid: Option<u32>,
}

/// Proof of lock ownership held by the session.
#[derive(Debug)]
pub struct LockToken {
    owner_id: Uuid,
    observed_mod_time: Option<ModTime>,
}

impl LockToken {
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn observed_mod_time(&self) -> Option<ModTime> {
        self.observed_mod_time
    }
}

/// Why a held lock no longer vouches for the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The lock record disappeared.
    RecordMissing,
    /// The lock record now belongs to someone else.
    OwnerChanged,
    /// The vault file changed since the lock was taken.
    VaultModified,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::RecordMissing => f.write_str("the lock record was removed"),
            StaleReason::OwnerChanged => f.write_str("the lock is now held by another instance"),
            StaleReason::VaultModified => f.write_str("the vault file was modified by another writer"),
        }
    }
}

/// Errors from the lock protocol.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another instance holds the lock.
    #[error("Vault is locked by another instance ({})", holder_description(.holder))]
    AlreadyLocked {
        lock_path: PathBuf,
        holder: Option<LockRecord>,
    },

    /// **[CONCURRENCY VIOLATION]** The save would overwrite someone else's
    /// changes.
    #[error("Refusing to save: {reason}")]
    Stale { reason: StaleReason },

    #[error("Lock record at '{path}' is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Lock file I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn holder_description(holder: &Option<LockRecord>) -> String {
    match holder {
        Some(LockRecord { pid: Some(pid), .. }) => format!("pid {pid}"),
        Some(record) => format!("owner {}", record.owner_id),
        None => "unknown owner".to_owned(),
    }
}

/// Path of the lock record guarding `vault_path`.
pub fn lock_path_for(vault_path: &Path) -> PathBuf {
    let mut name = vault_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    vault_path.with_file_name(name)
}

/// Lock protocol for one vault file.
#[derive(Debug, Clone)]
pub struct LockArbiter {
    vault_path: PathBuf,
    lock_path: PathBuf,
}

impl LockArbiter {
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        let vault_path = vault_path.into();
        let lock_path = lock_path_for(&vault_path);
        Self {
            vault_path,
            lock_path,
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn io_err(&self, source: io::Error) -> LockError {
        LockError::Io {
            path: self.lock_path.clone(),
            source,
        }
    }

    fn vault_mod_time(&self) -> Result<Option<ModTime>, LockError> {
        ModTime::of(&self.vault_path).map_err(|source| LockError::Io {
            path: self.vault_path.clone(),
            source,
        })
    }

    /// Take the lock, failing at once if it is held.
    pub fn acquire(&self) -> Result<LockToken, LockError> {
        let observed_mod_time = self.vault_mod_time()?;
        let token = LockToken {
            owner_id: Uuid::new_v4(),
            observed_mod_time,
        };

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = self.inspect().ok().flatten();
                warn!(lock = %self.lock_path.display(), "Vault already locked");
                return Err(LockError::AlreadyLocked {
                    lock_path: self.lock_path.clone(),
                    holder,
                });
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let record = LockRecord {
            owner_id: token.owner_id,
            observed_mod_time,
            pid: Some(std::process::id()),
        };
        let write = serde_json::to_vec(&record)
            .map_err(io::Error::other)
            .and_then(|bytes| file.write_all(&bytes))
            .and_then(|()| file.sync_all());
        if let Err(e) = write {
            // Don't leave a half-written record behind
            let _ = fs::remove_file(&self.lock_path);
            return Err(self.io_err(e));
        }

        info!(lock = %self.lock_path.display(), owner = %token.owner_id, "Acquired vault lock");
        Ok(token)
    }

    /// Read the current lock record, if any.
    pub fn inspect(&self) -> Result<Option<LockRecord>, LockError> {
        let bytes = match fs::read(&self.lock_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| LockError::Corrupt {
                path: self.lock_path.clone(),
                source,
            })
    }

    /// Confirm that `token` still owns the lock and the vault is unchanged.
    pub fn validate_before_save(&self, token: &LockToken) -> Result<(), LockError> {
        let record = match self.inspect() {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(LockError::Stale {
                    reason: StaleReason::RecordMissing,
                });
            }
            Err(LockError::Corrupt { .. }) => {
                return Err(LockError::Stale {
                    reason: StaleReason::OwnerChanged,
                });
            }
            Err(e) => return Err(e),
        };
        if record.owner_id != token.owner_id {
            warn!(lock = %self.lock_path.display(), "Lock owner changed underneath us");
            return Err(LockError::Stale {
                reason: StaleReason::OwnerChanged,
            });
        }
        if self.vault_mod_time()? != token.observed_mod_time {
            warn!(vault = %self.vault_path.display(), "Vault modified since lock was taken");
            return Err(LockError::Stale {
                reason: StaleReason::VaultModified,
            });
        }
        Ok(())
    }

    /// Record the vault's current mtime after a successful save, so later
    /// saves in the same session validate against it.
    pub fn refresh(&self, token: &mut LockToken) -> Result<(), LockError> {
        let observed_mod_time = self.vault_mod_time()?;
        let record = LockRecord {
            owner_id: token.owner_id,
            observed_mod_time,
            pid: Some(std::process::id()),
        };

        let dir = self
            .lock_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;
        serde_json::to_writer(&mut tmp, &record).map_err(|e| self.io_err(io::Error::other(e)))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.lock_path).map_err(|e| self.io_err(e.error))?;

        token.observed_mod_time = observed_mod_time;
        debug!(lock = %self.lock_path.display(), "Refreshed vault lock");
        Ok(())
    }

    /// Delete the lock record. Releasing twice is not an error.
    pub fn release(&self, token: &LockToken) -> Result<(), LockError> {
        match fs::remove_file(&self.lock_path) {
            Ok(()) => {
                info!(lock = %self.lock_path.display(), owner = %token.owner_id, "Released vault lock");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Remove an orphaned lock record left by a crashed instance.
    ///
    /// Returns the record that was removed, or `None` if the vault was not
    /// locked. An unreadable record is removed as well.
    pub fn break_lock(&self) -> Result<Option<LockRecord>, LockError> {
        let record = match self.inspect() {
            Ok(record) => record,
            Err(LockError::Corrupt { .. }) => None,
            Err(e) => return Err(e),
        };
        match fs::remove_file(&self.lock_path) {
            Ok(()) => {
                warn!(lock = %self.lock_path.display(), "Broke vault lock");
                Ok(record)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/store/abc.pswd")),
            PathBuf::from("/store/abc.pswd.lock")
        );
    }

    #[test]
    fn test_acquire_without_vault_file() {
        let dir = TempDir::new().unwrap();
        let arbiter = LockArbiter::new(dir.path().join("db.pswd"));
        let token = arbiter.acquire().unwrap();
        assert_eq!(token.observed_mod_time(), None);

        let record = arbiter.inspect().unwrap().unwrap();
        assert_eq!(record.owner_id, token.owner_id());
        assert_eq!(record.observed_mod_time, None);
        assert_eq!(record.pid, Some(std::process::id()));

        arbiter.validate_before_save(&token).unwrap();
    }

    #[test]
    fn test_record_json_shape() {
        let dir = TempDir::new().unwrap();
        let vault = dir.path().join("db.pswd");
        fs::write(&vault, b"x").unwrap();
        let arbiter = LockArbiter::new(&vault);
        let _token = arbiter.acquire().unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(arbiter.lock_path()).unwrap()).unwrap();
        assert!(json["ownerId"].is_string());
        assert!(json["observedModTime"]["secs"].is_u64());
    }

    #[test]
    fn test_second_acquire_fails_immediately() {
        let dir = TempDir::new().unwrap();
        let arbiter = LockArbiter::new(dir.path().join("db.pswd"));
        let _token = arbiter.acquire().unwrap();
        match arbiter.acquire() {
            Err(LockError::AlreadyLocked { holder, .. }) => {
                assert_eq!(holder.unwrap().pid, Some(std::process::id()));
            }
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let arbiter = LockArbiter::new(dir.path().join("db.pswd"));
        let token = arbiter.acquire().unwrap();
        arbiter.release(&token).unwrap();
        arbiter.release(&token).unwrap();
        assert!(!arbiter.lock_path().exists());
        arbiter.acquire().unwrap();
    }

    #[test]
    fn test_foreign_record_is_stale() {
        let dir = TempDir::new().unwrap();
        let arbiter = LockArbiter::new(dir.path().join("db.pswd"));
        let token = arbiter.acquire().unwrap();

        arbiter.break_lock().unwrap();
        let _other = arbiter.acquire().unwrap();
        assert!(matches!(
            arbiter.validate_before_save(&token),
            Err(LockError::Stale {
                reason: StaleReason::OwnerChanged
            })
        ));
    }

    #[test]
    fn test_missing_record_is_stale() {
        let dir = TempDir::new().unwrap();
        let arbiter = LockArbiter::new(dir.path().join("db.pswd"));
        let token = arbiter.acquire().unwrap();
        fs::remove_file(arbiter.lock_path()).unwrap();
        assert!(matches!(
            arbiter.validate_before_save(&token),
            Err(LockError::Stale {
                reason: StaleReason::RecordMissing
            })
        ));
    }

    #[test]
    fn test_break_lock_on_unlocked_vault() {
        let dir = TempDir::new().unwrap();
        let arbiter = LockArbiter::new(dir.path().join("db.pswd"));
        assert_eq!(arbiter.break_lock().unwrap(), None);
    }
}
