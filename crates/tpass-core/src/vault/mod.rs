//! Password vault: document model, container format, entry envelopes,
//! cross-process locking and the session that ties them together.

pub mod cache;
pub mod codec;
pub mod envelope;
pub mod interchange;
pub mod lock;
pub mod lookup;
pub mod model;
pub mod session;

// Re-export commonly used types
pub use cache::{CacheLookup, MetadataCache, MissReason};
pub use interchange::{ExportDocument, ExportRecord};
pub use lock::{LockArbiter, LockRecord, LockToken, lock_path_for};
pub use lookup::LookupKey;
pub use model::{Entry, EntryId, FieldKind, Icon, ROOT_TAG, SecretField, Tag, TagId, Vault};
pub use session::{
    EntryDraft, EntryEdit, ErrorClass, FindResult, GrepMatch, MatchedField, SessionOptions,
    VaultSession,
};
