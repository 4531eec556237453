//! Secret generation: passwords, diceware passphrases and PINs.
//!
//! All three draw from a ChaCha20 stream. The seed comes from the host CSPRNG,
//! or, when a device is supplied, from both sources mixed with HKDF-SHA256:
//!
//! ```text
//! prk  = HMAC-SHA256(salt = host[32], ikm = device[32])
//! seed = HMAC-SHA256(prk, "tpass entropy mix v1" || 0x01)
//! ```
//!
//! A device that returns predictable bytes therefore cannot weaken the output
//! below the host CSPRNG, and vice versa.

pub mod wordlist;

use std::fmt;
use std::str::FromStr;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use ring::hkdf;
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::device::{DeviceError, DeviceKeyProvider};

pub use wordlist::{KEY_DIGITS, Wordlist, WordlistError};

/// Bytes drawn from each entropy source.
pub const ENTROPY_LEN: usize = 32;

const MIX_LABEL: &[u8] = b"tpass entropy mix v1";

/// Printable ASCII without the space character (`!` through `~`).
const PASSWORD_ALPHABET: &[u8; 94] = b"!\"#$%&'()*+,-./0123456789:;<=>?@\
ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";

/// Kind of secret to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    Passphrase,
    Pin,
}

impl SecretKind {
    /// Shortest length (characters, words or digits) that is not flagged as weak.
    pub fn min_recommended(&self) -> usize {
        match self {
            SecretKind::Password => 6,
            SecretKind::Passphrase => 3,
            SecretKind::Pin => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::Password => "password",
            SecretKind::Passphrase => "wordlist",
            SecretKind::Pin => "pin",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown secret type '{0}' (expected password, wordlist or pin)")]
pub struct ParseSecretKindError(String);

impl FromStr for SecretKind {
    type Err = ParseSecretKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "password" => Ok(SecretKind::Password),
            "wordlist" | "passphrase" => Ok(SecretKind::Passphrase),
            "pin" => Ok(SecretKind::Pin),
            _ => Err(ParseSecretKindError(s.to_owned())),
        }
    }
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Length of a {kind} must be at least 1")]
    ZeroLength { kind: SecretKind },

    #[error("Device entropy request failed: {0}")]
    Device(#[from] DeviceError),

    #[error("Device returned {actual} bytes of entropy, expected {expected}")]
    ShortEntropy { expected: usize, actual: usize },

    #[error("Entropy mixing failed")]
    Mix,

    #[error(transparent)]
    Wordlist(#[from] WordlistError),
}

/// Combine host and device entropy into a 32-byte seed.
pub fn mix_entropy(
    host: &[u8; ENTROPY_LEN],
    device: &[u8; ENTROPY_LEN],
) -> Result<Zeroizing<[u8; 32]>, GeneratorError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, host).extract(device);
    let okm = prk
        .expand(&[MIX_LABEL], hkdf::HKDF_SHA256)
        .map_err(|_| GeneratorError::Mix)?;
    let mut seed = Zeroizing::new([0u8; 32]);
    okm.fill(seed.as_mut_slice())
        .map_err(|_| GeneratorError::Mix)?;
    Ok(seed)
}

fn seeded_rng(device: Option<&dyn DeviceKeyProvider>) -> Result<ChaCha20Rng, GeneratorError> {
    let mut host = Zeroizing::new([0u8; ENTROPY_LEN]);
    rand::rng().fill_bytes(host.as_mut_slice());

    let Some(device) = device else {
        return Ok(ChaCha20Rng::from_seed(*host));
    };

    let drawn = Zeroizing::new(device.draw_entropy(ENTROPY_LEN)?);
    let device_bytes: [u8; ENTROPY_LEN] =
        drawn
            .as_slice()
            .try_into()
            .map_err(|_| GeneratorError::ShortEntropy {
                expected: ENTROPY_LEN,
                actual: drawn.len(),
            })?;
    let device_bytes = Zeroizing::new(device_bytes);
    let seed = mix_entropy(&host, &device_bytes)?;
    debug!("Seeded generator from host and device entropy");
    Ok(ChaCha20Rng::from_seed(*seed))
}

/// Random password over the 94 printable non-space ASCII characters.
#[instrument(level = "debug", skip(device), fields(mixed = device.is_some()))]
pub fn generate_password(
    length: usize,
    device: Option<&dyn DeviceKeyProvider>,
) -> Result<Zeroizing<String>, GeneratorError> {
    if length == 0 {
        return Err(GeneratorError::ZeroLength {
            kind: SecretKind::Password,
        });
    }
    let mut rng = seeded_rng(device)?;
    let mut out = Zeroizing::new(String::with_capacity(length));
    for _ in 0..length {
        let index = rng.random_range(0..PASSWORD_ALPHABET.len());
        out.push(char::from(PASSWORD_ALPHABET[index]));
    }
    Ok(out)
}

/// Diceware passphrase of `word_count` words joined by `separator`.
#[instrument(level = "debug", skip(wordlist, device), fields(mixed = device.is_some()))]
pub fn generate_passphrase(
    word_count: usize,
    wordlist: &Wordlist,
    separator: &str,
    device: Option<&dyn DeviceKeyProvider>,
) -> Result<Zeroizing<String>, GeneratorError> {
    if word_count == 0 {
        return Err(GeneratorError::ZeroLength {
            kind: SecretKind::Passphrase,
        });
    }
    let mut rng = seeded_rng(device)?;
    let mut out = Zeroizing::new(String::new());
    let mut key = String::with_capacity(KEY_DIGITS);
    for i in 0..word_count {
        key.clear();
        for _ in 0..KEY_DIGITS {
            let face: u8 = rng.random_range(1..=6);
            key.push(char::from(b'0' + face));
        }
        if i > 0 {
            out.push_str(separator);
        }
        out.push_str(wordlist.word_for(&key)?);
    }
    Ok(out)
}

/// Numeric PIN of `length` digits.
#[instrument(level = "debug", skip(device), fields(mixed = device.is_some()))]
pub fn generate_pin(
    length: usize,
    device: Option<&dyn DeviceKeyProvider>,
) -> Result<Zeroizing<String>, GeneratorError> {
    if length == 0 {
        return Err(GeneratorError::ZeroLength {
            kind: SecretKind::Pin,
        });
    }
    let mut rng = seeded_rng(device)?;
    let mut out = Zeroizing::new(String::with_capacity(length));
    for _ in 0..length {
        let digit: u8 = rng.random_range(0..10);
        out.push(char::from(b'0' + digit));
    }
    Ok(out)
}
