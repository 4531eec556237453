//! Storage vault and envelope-encryption engine for a hardware-rooted password store.
//!
//! The master key and every per-entry key are derived on demand from a
//! [`device::DeviceKeyProvider`]; nothing long-lived is kept on the host.

pub mod crypto;
pub mod device;
pub mod error;
pub mod generator;
pub mod vault;

pub use device::{DeviceError, DeviceKeyProvider};
pub use vault::session::{SessionOptions, VaultSession};
pub use error::{ErrorClass, SessionError};
