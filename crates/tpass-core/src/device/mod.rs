//! Capability interface to the external key-holding device.
//!
//! The core never talks USB/HID itself. Everything it needs from the hardware
//! is captured by [`DeviceKeyProvider`]: master-key derivation, per-entry nonce
//! wrapping, and an entropy draw. Every call may block for as long as a human
//! takes to confirm on the device, and every call may fail.

pub mod soft;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::{EntryKey, MasterKey};

pub use soft::SoftDevice;

/// The four device requests, used in errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOperation {
    DeriveMasterKey,
    WrapNonce,
    UnwrapNonce,
    DrawEntropy,
}

impl fmt::Display for DeviceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceOperation::DeriveMasterKey => "derive master key",
            DeviceOperation::WrapNonce => "wrap entry nonce",
            DeviceOperation::UnwrapNonce => "unwrap entry nonce",
            DeviceOperation::DrawEntropy => "draw entropy",
        };
        f.write_str(name)
    }
}

/// Errors reported by a [`DeviceKeyProvider`].
///
/// # Security Classification
///
/// Device errors are never retried by the core. A declined or interrupted
/// request aborts the whole command and the in-memory vault is discarded.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device could not be reached (unplugged, busy, transport failure).
    #[error("Device unavailable during '{operation}': {reason}")]
    Unavailable {
        operation: DeviceOperation,
        reason: String,
    },

    /// The user rejected the request on the device.
    #[error("Request '{operation}' was declined on the device")]
    UserDeclined { operation: DeviceOperation },

    /// The wrapped nonce could not be unwrapped by this device.
    ///
    /// **[INTEGRITY VIOLATION]** The nonce was produced by another device or
    /// has been modified.
    #[error("[INTEGRITY VIOLATION] Entry nonce rejected by the device: {reason}")]
    InvalidNonce { reason: String },

    /// The device seed file could not be read or written.
    #[error("Device seed file '{path}': {source}")]
    SeedFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device seed file has the wrong size.
    #[error("Device seed file '{path}' is malformed: expected {expected} bytes, got {actual}")]
    InvalidSeed {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// Narrow capability interface of the hardware device.
///
/// Implementations take `&self`; any state they need (a transport handle, a
/// failure script in tests) uses interior mutability. Calls are issued one at a
/// time from a single thread.
pub trait DeviceKeyProvider {
    /// Derive the vault master key. Called once per encrypt or decrypt.
    fn derive_master_key(&self) -> Result<MasterKey, DeviceError>;

    /// Produce a fresh device-wrapped entry nonce.
    fn wrap_new_nonce(&self) -> Result<Vec<u8>, DeviceError>;

    /// Recover the entry key behind a wrapped nonce.
    fn unwrap_nonce(&self, wrapped: &[u8]) -> Result<EntryKey, DeviceError>;

    /// Draw `n` bytes from the device's own random source.
    fn draw_entropy(&self, n: usize) -> Result<Vec<u8>, DeviceError>;
}

impl<D: DeviceKeyProvider + ?Sized> DeviceKeyProvider for &D {
    fn derive_master_key(&self) -> Result<MasterKey, DeviceError> {
        (**self).derive_master_key()
    }

    fn wrap_new_nonce(&self) -> Result<Vec<u8>, DeviceError> {
        (**self).wrap_new_nonce()
    }

    fn unwrap_nonce(&self, wrapped: &[u8]) -> Result<EntryKey, DeviceError> {
        (**self).unwrap_nonce(wrapped)
    }

    fn draw_entropy(&self, n: usize) -> Result<Vec<u8>, DeviceError> {
        (**self).draw_entropy(n)
    }
}

impl<D: DeviceKeyProvider + ?Sized> DeviceKeyProvider for Box<D> {
    fn derive_master_key(&self) -> Result<MasterKey, DeviceError> {
        (**self).derive_master_key()
    }

    fn wrap_new_nonce(&self) -> Result<Vec<u8>, DeviceError> {
        (**self).wrap_new_nonce()
    }

    fn unwrap_nonce(&self, wrapped: &[u8]) -> Result<EntryKey, DeviceError> {
        (**self).unwrap_nonce(wrapped)
    }

    fn draw_entropy(&self, n: usize) -> Result<Vec<u8>, DeviceError> {
        (**self).draw_entropy(n)
    }
}
