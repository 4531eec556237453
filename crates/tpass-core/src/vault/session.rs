//! Vault session: the lifecycle of one locked, decrypted vault.
//!
//! ```text
//! open:  acquire lock -> cache hit? -> done
//!                     -> miss: device master key -> decrypt -> write cache
//! save:  validate lock -> device master key -> encrypt (fresh IV)
//!        -> atomic replace -> refresh lock -> write cache
//! ```
//!
//! The session holds the lock from `open`/`create` until `release` or drop.
//! Any failing mutation or save releases it immediately; the in-memory vault
//! is never written after a failure and further mutations are refused.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::crypto;
use crate::device::{DeviceError, DeviceKeyProvider};
use crate::vault::cache::{CacheError, CacheLookup, MetadataCache};
use crate::vault::codec::{self, CodecError};
use crate::vault::envelope::{self, EnvelopeError};
use crate::vault::interchange::{self, ExportDocument, ExportRecord, InterchangeError};
use crate::vault::lock::{LockArbiter, LockError, LockToken};
use crate::vault::lookup::{LookupError, LookupKey};
use crate::vault::model::{
    Entry, EntryId, Icon, InvariantViolation, ROOT_TAG, SecretField, Tag, TagId, Vault,
};

/// Coarse classification of session failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The device was unreachable or the user declined.
    Device,
    /// Authentication or decryption failed. Possibly tampering.
    Crypto,
    /// Another instance holds the lock, or the vault changed underneath us.
    LockConflict,
    /// Malformed vault, cache or interchange document.
    Format,
    /// Programming error, e.g. sealing a sealed entry or using a released session.
    InvalidState,
    /// Bad user input: unknown names, duplicate titles, missing fields.
    Input,
    /// Filesystem failure outside the lock protocol.
    Io,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Password store is not initialized: '{path}' does not exist")]
    NotInitialized { path: PathBuf },

    #[error("Password store already exists at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{}: {source}", entry_label(.entry))]
    Envelope {
        entry: Option<EntryId>,
        #[source]
        source: EnvelopeError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Interchange(#[from] InterchangeError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Vault file I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{name}' is not in the password store")]
    EntryNotFound { name: String },

    #[error("'{name}' is not a tag in the password store")]
    TagNotFound { name: String },

    #[error("The reserved tag 'All' cannot be changed or removed")]
    ProtectedTag,

    #[error("A tag titled '{title}' already exists")]
    DuplicateTag { title: String },

    #[error("Tag title must not be empty")]
    EmptyTagTitle,

    #[error("The item/url field is mandatory")]
    MissingNote,

    #[error("Tag {tag} does not exist")]
    UnknownTag { tag: TagId },

    #[error("Session already released; reopen the vault")]
    Released,

    #[error("No free {kind} id left in the password store")]
    IdsExhausted { kind: &'static str },

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

fn entry_label(entry: &Option<EntryId>) -> String {
    match entry {
        Some(id) => format!("Entry #{id}"),
        None => "New entry".to_owned(),
    }
}

fn device_class(err: &DeviceError) -> ErrorClass {
    match err {
        DeviceError::InvalidNonce { .. } => ErrorClass::Crypto,
        DeviceError::Unavailable { .. }
        | DeviceError::UserDeclined { .. }
        | DeviceError::SeedFile { .. }
        | DeviceError::InvalidSeed { .. } => ErrorClass::Device,
    }
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Device(e) => device_class(e),
            SessionError::Codec(CodecError::Key(_) | CodecError::Encrypt(_)) => ErrorClass::Crypto,
            SessionError::Codec(_) | SessionError::Interchange(_) => ErrorClass::Format,
            SessionError::Envelope { source, .. } => match source {
                EnvelopeError::InvalidState { .. } => ErrorClass::InvalidState,
                EnvelopeError::Device(e) => device_class(e),
                EnvelopeError::Decrypt { .. } | EnvelopeError::Encrypt { .. } => ErrorClass::Crypto,
                EnvelopeError::MalformedField { .. } => ErrorClass::Format,
            },
            SessionError::Lock(LockError::Io { .. }) => ErrorClass::Io,
            SessionError::Lock(_) => ErrorClass::LockConflict,
            SessionError::Cache(_) | SessionError::Io { .. } => ErrorClass::Io,
            SessionError::Released
            | SessionError::IdsExhausted { .. }
            | SessionError::Invariant(_) => ErrorClass::InvalidState,
            SessionError::NotInitialized { .. }
            | SessionError::AlreadyInitialized { .. }
            | SessionError::Lookup(_)
            | SessionError::EntryNotFound { .. }
            | SessionError::TagNotFound { .. }
            | SessionError::ProtectedTag
            | SessionError::DuplicateTag { .. }
            | SessionError::EmptyTagTitle
            | SessionError::MissingNote
            | SessionError::UnknownTag { .. } => ErrorClass::Input,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Plaintext metadata cache; `None` disables caching.
    pub cache: Option<MetadataCache>,
}

/// Plaintext values for a new entry.
#[derive(Clone, Default)]
pub struct EntryDraft {
    pub note: String,
    pub title: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub secret: Zeroizing<String>,
    pub tags: BTreeSet<TagId>,
}

/// Changes to an existing entry. `None` keeps the current value.
#[derive(Clone, Default)]
pub struct EntryEdit {
    pub note: Option<String>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub secret: Option<Zeroizing<String>>,
    pub tags: Option<BTreeSet<TagId>>,
}

/// Metadata-only search result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindResult {
    pub entries: Vec<EntryId>,
    pub tags: Vec<TagId>,
}

/// Field in which a grep query matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedField {
    Note,
    Title,
    Username,
    Password,
    Secret,
}

impl std::fmt::Display for MatchedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchedField::Note => "note",
            MatchedField::Title => "title",
            MatchedField::Username => "username",
            MatchedField::Password => "password",
            MatchedField::Secret => "secret",
        };
        f.write_str(name)
    }
}

/// One grep hit. `value` may be a secret.
pub struct GrepMatch {
    pub entry: EntryId,
    pub note: String,
    pub username: String,
    pub field: MatchedField,
    pub value: Zeroizing<String>,
}

/// A locked, decrypted vault bound to one device.
pub struct VaultSession<D: DeviceKeyProvider> {
    device: D,
    vault_path: PathBuf,
    arbiter: LockArbiter,
    token: Option<LockToken>,
    cache: Option<MetadataCache>,
    vault: Vault,
}

impl<D: DeviceKeyProvider> std::fmt::Debug for VaultSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("vault_path", &self.vault_path)
            .field("held", &self.token.is_some())
            .field("entries", &self.vault.entries.len())
            .finish_non_exhaustive()
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> Result<(), SessionError> {
    let io_err = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

impl<D: DeviceKeyProvider> VaultSession<D> {
    /// Initialize a new vault at `vault_path` and keep it locked.
    #[instrument(level = "info", skip_all, fields(path = %vault_path.as_ref().display()))]
    pub fn create(
        vault_path: impl AsRef<Path>,
        device: D,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let vault_path = vault_path.as_ref().to_path_buf();
        if vault_path.exists() {
            return Err(SessionError::AlreadyInitialized { path: vault_path });
        }
        if let Some(parent) = vault_path.parent() {
            fs::create_dir_all(parent).map_err(|source| SessionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let arbiter = LockArbiter::new(&vault_path);
        let token = arbiter.acquire()?;
        let mut session = Self {
            device,
            vault_path,
            arbiter,
            token: Some(token),
            cache: options.cache,
            vault: Vault::new(),
        };
        session.save()?;
        info!("Initialized password store");
        Ok(session)
    }

    /// Lock and decrypt an existing vault.
    #[instrument(level = "info", skip_all, fields(path = %vault_path.as_ref().display()))]
    pub fn open(
        vault_path: impl AsRef<Path>,
        device: D,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let vault_path = vault_path.as_ref().to_path_buf();
        if !vault_path.is_file() {
            return Err(SessionError::NotInitialized { path: vault_path });
        }

        let arbiter = LockArbiter::new(&vault_path);
        let token = arbiter.acquire()?;
        let mut session = Self {
            device,
            vault_path,
            arbiter,
            token: Some(token),
            cache: options.cache,
            vault: Vault::new(),
        };
        // Dropping the session on error releases the lock
        session.load()?;
        Ok(session)
    }

    fn load(&mut self) -> Result<(), SessionError> {
        if let Some(cache) = &self.cache {
            match cache.read(&self.vault_path) {
                Ok(CacheLookup::Hit(vault)) => {
                    self.vault = vault;
                    return Ok(());
                }
                Ok(CacheLookup::Miss(reason)) => debug!(?reason, "Decrypting vault"),
                Err(e) => warn!(error = %e, "Metadata cache unreadable, decrypting vault"),
            }
        }

        let data = fs::read(&self.vault_path).map_err(|source| SessionError::Io {
            path: self.vault_path.clone(),
            source,
        })?;
        let key = self.device.derive_master_key()?;
        self.vault = codec::decrypt(&data, &key)?;
        self.write_cache();
        Ok(())
    }

    fn write_cache(&self) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.write(&self.vault_path, &self.vault)
        {
            warn!(error = %e, "Failed to write metadata cache");
        }
    }

    fn release_lock(&mut self) {
        if let Some(token) = self.token.take()
            && let Err(e) = self.arbiter.release(&token)
        {
            warn!(error = %e, "Failed to release vault lock");
        }
    }

    /// Run a mutation while the lock is held; release the lock if it fails.
    fn guarded<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if self.token.is_none() {
            return Err(SessionError::Released);
        }
        let result = op(self);
        if let Err(e) = &result {
            warn!(error = %e, "Operation failed, discarding unsaved changes");
            self.release_lock();
        }
        result
    }

    fn envelope_err(entry: Option<EntryId>) -> impl FnOnce(EnvelopeError) -> SessionError {
        move |source| SessionError::Envelope { entry, source }
    }

    // ==================== Accessors ====================

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Whether the session still holds the vault lock.
    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    // ==================== Persistence ====================

    /// Encrypt and write the vault. The lock stays held.
    #[instrument(level = "debug", skip(self), fields(path = %self.vault_path.display()))]
    pub fn save(&mut self) -> Result<(), SessionError> {
        self.guarded(|s| {
            let token = s.token.as_mut().ok_or(SessionError::Released)?;
            s.arbiter.validate_before_save(token)?;
            s.vault.check_persistable()?;

            let key = s.device.derive_master_key()?;
            let data = codec::encrypt(&s.vault, &key, &crypto::random_iv())?;
            drop(key);

            write_atomically(&s.vault_path, &data)?;
            s.arbiter.refresh(token)?;
            info!(entries = s.vault.entries.len(), "Saved vault");
            s.write_cache();
            Ok(())
        })
    }

    /// End the session and release the lock.
    pub fn release(mut self) -> Result<(), SessionError> {
        if let Some(token) = self.token.take() {
            self.arbiter.release(&token)?;
        }
        Ok(())
    }

    // ==================== Entries ====================

    fn validate_open_entry(&self, entry: &Entry) -> Result<(), SessionError> {
        if entry.note.trim().is_empty() {
            return Err(SessionError::MissingNote);
        }
        if let Some(tag) = entry.tags.iter().find(|t| !self.vault.tags.contains_key(t)) {
            return Err(SessionError::UnknownTag { tag: *tag });
        }
        Ok(())
    }

    /// Seal and insert a new entry. Returns its id.
    pub fn insert_entry(&mut self, draft: EntryDraft) -> Result<EntryId, SessionError> {
        self.guarded(|s| {
            let mut entry = Entry::open(
                draft.note,
                draft.title,
                draft.username,
                draft.password.as_str(),
                draft.secret.as_str(),
            );
            entry.tags = draft.tags;
            s.validate_open_entry(&entry)?;

            let id = s
                .vault
                .next_entry_id()
                .ok_or(SessionError::IdsExhausted { kind: "entry" })?;
            let sealed = envelope::seal(&entry, &s.device).map_err(Self::envelope_err(None))?;
            s.vault.entries.insert(id, sealed);
            info!(entry = %id, "Inserted entry");
            Ok(id)
        })
    }

    /// Unseal an entry, apply `edit`, and seal it again under a new nonce.
    pub fn edit_entry(&mut self, id: EntryId, edit: EntryEdit) -> Result<(), SessionError> {
        self.guarded(|s| {
            let current = s
                .vault
                .entries
                .get(&id)
                .ok_or_else(|| SessionError::EntryNotFound {
                    name: format!("#{id}"),
                })?;
            let mut open = envelope::unseal(current, &s.device).map_err(Self::envelope_err(Some(id)))?;

            if let Some(note) = edit.note {
                open.note = note;
            }
            if let Some(title) = edit.title {
                open.title = title;
            }
            if let Some(username) = edit.username {
                open.username = username;
            }
            if let Some(password) = edit.password {
                open.password = SecretField::plain(password.as_str());
            }
            if let Some(secret) = edit.secret {
                open.safe_note = SecretField::plain(secret.as_str());
            }
            if let Some(tags) = edit.tags {
                open.tags = tags;
            }
            s.validate_open_entry(&open)?;

            let sealed = envelope::seal(&open, &s.device).map_err(Self::envelope_err(Some(id)))?;
            s.vault.entries.insert(id, sealed);
            info!(entry = %id, "Edited entry");
            Ok(())
        })
    }

    pub fn remove_entry(&mut self, id: EntryId) -> Result<Entry, SessionError> {
        self.guarded(|s| {
            let removed = s
                .vault
                .entries
                .remove(&id)
                .ok_or_else(|| SessionError::EntryNotFound {
                    name: format!("#{id}"),
                })?;
            info!(entry = %id, "Removed entry");
            Ok(removed)
        })
    }

    /// Resolve an entry identifier (see [`LookupKey`]).
    pub fn resolve_entry(&self, key: &LookupKey) -> Result<(EntryId, &Entry), SessionError> {
        key.resolve(&self.vault)
            .ok_or_else(|| SessionError::EntryNotFound {
                name: key.to_string(),
            })
    }

    /// Entries listed under `tag`; the root tag also lists untagged entries.
    pub fn entries_by_tag(&self, tag: TagId) -> Vec<(EntryId, &Entry)> {
        self.vault.entries_by_tag(tag).collect()
    }

    /// Case-insensitive substring search over entry metadata and tag titles.
    /// Never contacts the device.
    pub fn find(&self, query: &str) -> FindResult {
        let needle = query.to_lowercase();
        FindResult {
            entries: self
                .vault
                .entries
                .iter()
                .filter(|(_, e)| e.matches_metadata(&needle))
                .map(|(id, _)| *id)
                .collect(),
            tags: self
                .vault
                .tags
                .iter()
                .filter(|(_, t)| t.title.to_lowercase().contains(&needle))
                .map(|(id, _)| *id)
                .collect(),
        }
    }

    /// Search every field of every entry, secrets included. Unseals each entry
    /// in a working copy; the stored entries stay sealed.
    #[instrument(level = "debug", skip(self, query))]
    pub fn grep(&self, query: &str, case_insensitive: bool) -> Result<Vec<GrepMatch>, SessionError> {
        let fold = |s: &str| {
            if case_insensitive {
                s.to_lowercase()
            } else {
                s.to_owned()
            }
        };
        let needle = fold(query);
        let mut matches = Vec::new();

        for (id, entry) in &self.vault.entries {
            let open = envelope::unseal(entry, &self.device).map_err(Self::envelope_err(Some(*id)))?;
            let candidates = [
                (MatchedField::Note, open.note.as_str()),
                (MatchedField::Title, open.title.as_str()),
                (MatchedField::Username, open.username.as_str()),
                (MatchedField::Password, open.password.as_plain().unwrap_or_default()),
                (MatchedField::Secret, open.safe_note.as_plain().unwrap_or_default()),
            ];
            for (field, value) in candidates {
                if Zeroizing::new(fold(value)).contains(needle.as_str()) {
                    matches.push(GrepMatch {
                        entry: *id,
                        note: open.note.clone(),
                        username: open.username.clone(),
                        field,
                        value: Zeroizing::new(value.to_owned()),
                    });
                }
            }
        }
        Ok(matches)
    }

    /// Open copy of an entry for display. The stored entry stays sealed.
    pub fn reveal(&self, id: EntryId) -> Result<Entry, SessionError> {
        let entry = self
            .vault
            .entries
            .get(&id)
            .ok_or_else(|| SessionError::EntryNotFound {
                name: format!("#{id}"),
            })?;
        envelope::unseal(entry, &self.device).map_err(Self::envelope_err(Some(id)))
    }

    // ==================== Tags ====================

    /// Resolve a tag by title (case-insensitive) or by `#id`.
    pub fn resolve_tag(&self, name: &str) -> Result<(TagId, &Tag), SessionError> {
        let not_found = || SessionError::TagNotFound {
            name: name.to_owned(),
        };
        if let Some(raw) = name.strip_prefix('#') {
            let id: TagId = raw.parse().map_err(|_| not_found())?;
            return self
                .vault
                .tags
                .get(&id)
                .map(|t| (id, t))
                .ok_or_else(not_found);
        }
        self.vault.tag_by_title(name.trim()).ok_or_else(not_found)
    }

    fn check_tag_title(&self, title: &str, except: Option<TagId>) -> Result<(), SessionError> {
        if title.is_empty() {
            return Err(SessionError::EmptyTagTitle);
        }
        match self.vault.tag_by_title(title) {
            Some((existing, _)) if Some(existing) != except => Err(SessionError::DuplicateTag {
                title: title.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    /// Add a tag. Titles are unique ignoring case.
    pub fn insert_tag(&mut self, title: &str, icon: Icon) -> Result<TagId, SessionError> {
        self.guarded(|s| {
            let title = title.trim();
            s.check_tag_title(title, None)?;
            let id = s
                .vault
                .next_tag_id()
                .ok_or(SessionError::IdsExhausted { kind: "tag" })?;
            s.vault.tags.insert(id, Tag::new(title, icon));
            info!(tag = %id, "Inserted tag");
            Ok(id)
        })
    }

    pub fn edit_tag(
        &mut self,
        id: TagId,
        title: Option<&str>,
        icon: Option<Icon>,
    ) -> Result<(), SessionError> {
        self.guarded(|s| {
            if id == ROOT_TAG {
                return Err(SessionError::ProtectedTag);
            }
            if !s.vault.tags.contains_key(&id) {
                return Err(SessionError::TagNotFound {
                    name: format!("#{id}"),
                });
            }
            let title = title.map(str::trim);
            if let Some(title) = title {
                s.check_tag_title(title, Some(id))?;
            }
            if let Some(tag) = s.vault.tags.get_mut(&id) {
                if let Some(title) = title {
                    title.clone_into(&mut tag.title);
                }
                if let Some(icon) = icon {
                    tag.icon = icon;
                }
            }
            info!(tag = %id, "Edited tag");
            Ok(())
        })
    }

    /// Remove a tag and strip it from every entry.
    pub fn remove_tag(&mut self, id: TagId) -> Result<Tag, SessionError> {
        self.guarded(|s| {
            if id == ROOT_TAG {
                return Err(SessionError::ProtectedTag);
            }
            let removed = s
                .vault
                .tags
                .remove(&id)
                .ok_or_else(|| SessionError::TagNotFound {
                    name: format!("#{id}"),
                })?;
            let mut stripped = 0usize;
            for entry in s.vault.entries.values_mut() {
                if entry.tags.remove(&id) {
                    stripped += 1;
                }
            }
            info!(tag = %id, stripped, "Removed tag");
            Ok(removed)
        })
    }

    // ==================== Interchange ====================

    /// Unseal every entry into a plaintext export document.
    pub fn export(&self) -> Result<ExportDocument, SessionError> {
        let mut document = ExportDocument::new();
        for (id, entry) in &self.vault.entries {
            let open = envelope::unseal(entry, &self.device).map_err(Self::envelope_err(Some(*id)))?;
            document.insert(*id, ExportRecord::from_open_entry(&open));
        }
        info!(entries = document.len(), "Exported entries");
        Ok(document)
    }

    /// Validate an import document, seal every record, and insert them under
    /// fresh ids. Either every record is imported or none is.
    pub fn import(&mut self, input: &str) -> Result<Vec<EntryId>, SessionError> {
        self.guarded(|s| {
            let records = interchange::parse_import(input)?;
            // Reserve every id before touching the vault
            let first = s.vault.next_entry_id().map(|id| id.0);
            let ids = (0..records.len())
                .map(|n| {
                    first
                        .zip(u32::try_from(n).ok())
                        .and_then(|(first, n)| first.checked_add(n))
                        .map(EntryId)
                        .ok_or(SessionError::IdsExhausted { kind: "entry" })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut sealed = Vec::with_capacity(records.len());
            for record in &records {
                let entry = record.to_open_entry();
                sealed.push(envelope::seal(&entry, &s.device).map_err(Self::envelope_err(None))?);
            }
            for (&id, entry) in ids.iter().zip(sealed) {
                s.vault.entries.insert(id, entry);
            }
            info!(entries = ids.len(), "Imported entries");
            Ok(ids)
        })
    }
}

impl<D: DeviceKeyProvider> Drop for VaultSession<D> {
    fn drop(&mut self) {
        self.release_lock();
    }
}
