//! Error types for the tpass-core crate
//!
//! Every layer has its own error enum; [`SessionError`] wraps them all and
//! classifies failures with [`ErrorClass`].

pub use crate::crypto::CryptoError;
pub use crate::device::DeviceError;
pub use crate::generator::{GeneratorError, WordlistError};
pub use crate::vault::cache::CacheError;
pub use crate::vault::codec::CodecError;
pub use crate::vault::envelope::EnvelopeError;
pub use crate::vault::interchange::InterchangeError;
pub use crate::vault::lock::LockError;
pub use crate::vault::lookup::LookupError;
pub use crate::vault::model::InvariantViolation;
pub use crate::vault::session::{ErrorClass, SessionError};
