//! Exit codes for the CLI.
//!
//! Scripts can tell a declined device prompt from a wrong device, a locked
//! store from a missing entry, without parsing messages.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments, invalid names)
pub const USAGE_ERROR: u8 = 2;

/// Decryption or authentication failed (wrong device, tampered store)
pub const AUTH_FAILED: u8 = 3;

/// Store, import document or metadata is malformed
pub const STORE_INVALID: u8 = 4;

/// Permission denied on the filesystem
pub const PERMISSION_DENIED: u8 = 5;

/// Another instance holds the store lock, or the store changed underneath us
pub const LOCKED: u8 = 6;

/// Store, entry or tag not found
pub const NOT_FOUND: u8 = 7;

/// Operation declined on the device or by the user
pub const CANCELLED: u8 = 8;

/// Device unreachable or its seed unusable
pub const DEVICE_ERROR: u8 = 9;
