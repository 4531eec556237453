//! Shared fixtures for tpass-core integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tpass_core::crypto::{EntryKey, MasterKey};
use tpass_core::device::{DeviceError, DeviceKeyProvider, DeviceOperation, SoftDevice};
use tpass_core::vault::{EntryDraft, SessionOptions, TagId, VaultSession};
use zeroize::Zeroizing;

pub const TEST_SEED: [u8; 32] = [0x42; 32];

/// How a scripted device fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Decline,
    Unplug,
}

/// Software device whose requests can be scripted to fail.
///
/// `fail_on(op, after, failure)` lets `after` calls of `op` succeed and fails
/// every call after that.
#[derive(Debug)]
pub struct ScriptedDevice {
    inner: SoftDevice,
    script: Cell<Option<(DeviceOperation, usize, Failure)>>,
    calls: Cell<usize>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::with_seed(TEST_SEED)
    }

    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            inner: SoftDevice::from_seed(seed),
            script: Cell::new(None),
            calls: Cell::new(0),
        }
    }

    pub fn fail_on(&self, operation: DeviceOperation, after: usize, failure: Failure) {
        self.script.set(Some((operation, after, failure)));
    }

    pub fn heal(&self) {
        self.script.set(None);
    }

    /// Total number of device requests served or refused.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn check(&self, operation: DeviceOperation) -> Result<(), DeviceError> {
        self.calls.set(self.calls.get() + 1);
        let Some((target, after, failure)) = self.script.get() else {
            return Ok(());
        };
        if target != operation {
            return Ok(());
        }
        if after > 0 {
            self.script.set(Some((target, after - 1, failure)));
            return Ok(());
        }
        Err(match failure {
            Failure::Decline => DeviceError::UserDeclined { operation },
            Failure::Unplug => DeviceError::Unavailable {
                operation,
                reason: "device disconnected".to_owned(),
            },
        })
    }
}

impl DeviceKeyProvider for ScriptedDevice {
    fn derive_master_key(&self) -> Result<MasterKey, DeviceError> {
        self.check(DeviceOperation::DeriveMasterKey)?;
        self.inner.derive_master_key()
    }

    fn wrap_new_nonce(&self) -> Result<Vec<u8>, DeviceError> {
        self.check(DeviceOperation::WrapNonce)?;
        self.inner.wrap_new_nonce()
    }

    fn unwrap_nonce(&self, wrapped: &[u8]) -> Result<EntryKey, DeviceError> {
        self.check(DeviceOperation::UnwrapNonce)?;
        self.inner.unwrap_nonce(wrapped)
    }

    fn draw_entropy(&self, len: usize) -> Result<Vec<u8>, DeviceError> {
        self.check(DeviceOperation::DrawEntropy)?;
        self.inner.draw_entropy(len)
    }
}

/// Temporary store directory with a vault path inside it.
pub struct TestStore {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("store.pswd");
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create<D: DeviceKeyProvider>(&self, device: D) -> VaultSession<D> {
        VaultSession::create(&self.path, device, SessionOptions::default())
            .expect("Failed to create vault")
    }

    pub fn open<D: DeviceKeyProvider>(&self, device: D) -> VaultSession<D> {
        VaultSession::open(&self.path, device, SessionOptions::default())
            .expect("Failed to open vault")
    }
}

pub fn draft(note: &str, username: &str, password: &str) -> EntryDraft {
    EntryDraft {
        note: note.to_owned(),
        title: note.to_owned(),
        username: username.to_owned(),
        password: Zeroizing::new(password.to_owned()),
        secret: Zeroizing::new(String::new()),
        tags: BTreeSet::new(),
    }
}

pub fn tagged(mut draft: EntryDraft, tags: &[TagId]) -> EntryDraft {
    draft.tags = tags.iter().copied().collect();
    draft
}
