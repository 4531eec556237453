#![forbid(unsafe_code)]

//! In-memory vault document.
//!
//! The JSON shape matches the document written by the Trezor Password Manager
//! browser extension, so a decrypted vault can be exchanged with it:
//!
//! ```json
//! {
//!   "version": "0.0.1",
//!   "extVersion": "0.6.0",
//!   "config": { "orderType": "date" },
//!   "tags": { "0": { "title": "All", "icon": "home" } },
//!   "entries": {
//!     "0": {
//!       "title": "", "username": "", "note": "github.com", "tags": [1],
//!       "nonce": "ab12...",
//!       "password": { "type": "Buffer", "data": [1, 2, 3] },
//!       "safe_note": { "type": "Buffer", "data": [4, 5, 6] },
//!       "success": true, "export": false
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

/// Document version written into every new vault.
pub const DOCUMENT_VERSION: &str = "0.0.1";
/// Extension version kept for compatibility with the browser extension.
pub const EXT_VERSION: &str = "0.6.0";
/// Id of the reserved "All" tag.
pub const ROOT_TAG: TagId = TagId(0);

// ==================== Identifiers ====================

/// Decimal tag identifier. Serialized as a string map key and as a number
/// inside `Entry::tags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u32);

/// Decimal entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u32);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TagId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(TagId)
    }
}

impl FromStr for EntryId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(EntryId)
    }
}

/// Next free key in an id-ordered map: `max + 1`, or `0` when empty.
/// `None` once `max` is `u32::MAX`.
fn next_key<K: Copy, V>(map: &BTreeMap<K, V>, raw: impl Fn(K) -> u32) -> Option<u32> {
    match map.keys().next_back() {
        Some(k) => raw(*k).checked_add(1),
        None => Some(0),
    }
}

// ==================== Tags ====================

/// Fixed icon set understood by the browser extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Icon {
    Home,
    PersonStalker,
    SocialBitcoin,
    Person,
    Star,
    Flag,
    Heart,
    Settings,
    Email,
    Cloud,
    AlertCircled,
    AndroidCart,
    Image,
    Card,
    Earth,
    Wifi,
}

impl Icon {
    pub const ALL: [Icon; 16] = [
        Icon::Home,
        Icon::PersonStalker,
        Icon::SocialBitcoin,
        Icon::Person,
        Icon::Star,
        Icon::Flag,
        Icon::Heart,
        Icon::Settings,
        Icon::Email,
        Icon::Cloud,
        Icon::AlertCircled,
        Icon::AndroidCart,
        Icon::Image,
        Icon::Card,
        Icon::Earth,
        Icon::Wifi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Icon::Home => "home",
            Icon::PersonStalker => "person-stalker",
            Icon::SocialBitcoin => "social-bitcoin",
            Icon::Person => "person",
            Icon::Star => "star",
            Icon::Flag => "flag",
            Icon::Heart => "heart",
            Icon::Settings => "settings",
            Icon::Email => "email",
            Icon::Cloud => "cloud",
            Icon::AlertCircled => "alert-circled",
            Icon::AndroidCart => "android-cart",
            Icon::Image => "image",
            Icon::Card => "card",
            Icon::Earth => "earth",
            Icon::Wifi => "wifi",
        }
    }
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown icon name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown icon: {0}")]
pub struct ParseIconError(String);

impl FromStr for Icon {
    type Err = ParseIconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Icon::ALL
            .into_iter()
            .find(|icon| icon.as_str() == s)
            .ok_or_else(|| ParseIconError(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub title: String,
    pub icon: Icon,
}

impl Tag {
    pub fn new(title: impl Into<String>, icon: Icon) -> Self {
        Self {
            title: title.into(),
            icon,
        }
    }

    /// The reserved "All" tag.
    pub fn root() -> Self {
        Self::new("All", Icon::Home)
    }
}

// ==================== Secret fields ====================

/// A sensitive entry field: plaintext while the entry is open, AES-GCM
/// ciphertext while sealed.
///
/// Plain content is zeroized on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SecretField {
    #[serde(rename = "String")]
    Plain(String),
    #[serde(rename = "Buffer")]
    Sealed(Vec<u8>),
}

/// Which side of the seal a field (or entry) is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Plain,
    Sealed,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Plain => f.write_str("open"),
            FieldKind::Sealed => f.write_str("sealed"),
        }
    }
}

impl SecretField {
    pub fn plain(value: impl Into<String>) -> Self {
        SecretField::Plain(value.into())
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            SecretField::Plain(_) => FieldKind::Plain,
            SecretField::Sealed(_) => FieldKind::Sealed,
        }
    }

    /// Plaintext, if the field is open.
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            SecretField::Plain(s) => Some(s),
            SecretField::Sealed(_) => None,
        }
    }
}

impl Default for SecretField {
    fn default() -> Self {
        SecretField::Plain(String::new())
    }
}

impl Drop for SecretField {
    fn drop(&mut self) {
        if let SecretField::Plain(s) = self {
            s.zeroize();
        }
    }
}

impl fmt::Debug for SecretField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretField::Plain(_) => f.write_str("Plain([REDACTED])"),
            SecretField::Sealed(bytes) => write!(f, "Sealed({} bytes)", bytes.len()),
        }
    }
}

// ==================== Entries ====================

/// A stored credential.
///
/// While sealed, `password` and `safe_note` hold ciphertext and `nonce` holds
/// the device-wrapped entry key. While open, both fields are plaintext and
/// `nonce` is absent. Open entries exist only in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub username: String,
    /// Primary lookup key (item/url).
    pub note: String,
    #[serde(default)]
    pub tags: BTreeSet<TagId>,
    #[serde(default, with = "nonce_hex")]
    pub nonce: Option<Vec<u8>>,
    pub password: SecretField,
    pub safe_note: SecretField,
    /// Cleared while a seal/unseal transition is in flight.
    #[serde(default = "default_true")]
    pub success: bool,
    /// Set while the entry is open. Kept for the extension's document shape.
    #[serde(default)]
    pub export: bool,
}

fn default_true() -> bool {
    true
}

impl Entry {
    /// Build an open entry from plaintext values.
    pub fn open(
        note: impl Into<String>,
        title: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            username: username.into(),
            note: note.into(),
            tags: BTreeSet::new(),
            nonce: None,
            password: SecretField::plain(password),
            safe_note: SecretField::plain(secret),
            success: true,
            export: true,
        }
    }

    /// Current state, or `None` if the fields, nonce and markers disagree.
    pub fn state(&self) -> Option<FieldKind> {
        if !self.success {
            return None;
        }
        match (self.password.kind(), self.safe_note.kind(), &self.nonce) {
            (FieldKind::Sealed, FieldKind::Sealed, Some(_)) if !self.export => {
                Some(FieldKind::Sealed)
            }
            (FieldKind::Plain, FieldKind::Plain, None) if self.export => Some(FieldKind::Plain),
            _ => None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.state() == Some(FieldKind::Sealed)
    }

    /// Case-insensitive substring match over the non-secret fields.
    pub fn matches_metadata(&self, needle_lower: &str) -> bool {
        self.note.to_lowercase().contains(needle_lower)
            || self.title.to_lowercase().contains(needle_lower)
            || self.username.to_lowercase().contains(needle_lower)
    }
}

/// Nonces are hex strings; the extension writes `""` for "no nonce".
mod nonce_hex {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(nonce: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match nonce {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.is_empty() {
            return Ok(None);
        }
        hex::decode(&raw).map(Some).map_err(D::Error::custom)
    }
}

// ==================== Vault ====================

/// Display preferences stored alongside the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(rename = "orderType", default = "default_order_type")]
    pub order_type: String,
    /// Preferences this crate does not interpret, preserved on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_order_type() -> String {
    "date".to_owned()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            order_type: default_order_type(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Root aggregate: tags and entries plus format metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub version: String,
    #[serde(rename = "extVersion", default)]
    pub ext_version: String,
    #[serde(default)]
    pub config: DisplayConfig,
    pub tags: BTreeMap<TagId, Tag>,
    pub entries: BTreeMap<EntryId, Entry>,
}

/// Structural problems found in a vault document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("the reserved tag 0 is missing")]
    MissingRootTag,

    #[error("entry #{entry} references unknown tag {tag}")]
    DanglingTag { entry: EntryId, tag: TagId },

    #[error("entry #{entry} is in an inconsistent state")]
    InconsistentEntry { entry: EntryId },

    #[error("entry #{entry} is not sealed")]
    UnsealedEntry { entry: EntryId },
}

impl Vault {
    /// A fresh vault holding only the reserved tag.
    pub fn new() -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(ROOT_TAG, Tag::root());
        Self {
            version: DOCUMENT_VERSION.to_owned(),
            ext_version: EXT_VERSION.to_owned(),
            config: DisplayConfig::default(),
            tags,
            entries: BTreeMap::new(),
        }
    }

    pub fn next_entry_id(&self) -> Option<EntryId> {
        next_key(&self.entries, |k| k.0).map(EntryId)
    }

    pub fn next_tag_id(&self) -> Option<TagId> {
        next_key(&self.tags, |k| k.0).map(TagId)
    }

    /// Entries listed under `tag`. The root tag also lists untagged entries.
    pub fn entries_by_tag(&self, tag: TagId) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries
            .iter()
            .filter(move |(_, e)| e.tags.contains(&tag) || (tag == ROOT_TAG && e.tags.is_empty()))
            .map(|(id, e)| (*id, e))
    }

    /// Case-insensitive title lookup.
    pub fn tag_by_title(&self, title: &str) -> Option<(TagId, &Tag)> {
        let wanted = title.to_lowercase();
        self.tags
            .iter()
            .find(|(_, t)| t.title.to_lowercase() == wanted)
            .map(|(id, t)| (*id, t))
    }

    /// Check the invariants every persisted vault must satisfy: the root tag
    /// exists, no entry references a missing tag, and every entry is sealed.
    pub fn check_persistable(&self) -> Result<(), InvariantViolation> {
        if !self.tags.contains_key(&ROOT_TAG) {
            return Err(InvariantViolation::MissingRootTag);
        }
        for (id, entry) in &self.entries {
            if let Some(tag) = entry.tags.iter().find(|t| !self.tags.contains_key(t)) {
                return Err(InvariantViolation::DanglingTag {
                    entry: *id,
                    tag: *tag,
                });
            }
            match entry.state() {
                Some(FieldKind::Sealed) => {}
                Some(FieldKind::Plain) => return Err(InvariantViolation::UnsealedEntry { entry: *id }),
                None => return Err(InvariantViolation::InconsistentEntry { entry: *id }),
            }
        }
        Ok(())
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}
