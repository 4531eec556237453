//! Plaintext export/import document.
//!
//! ```json
//! { "0": { "url": "github.com", "username": "octocat", "password": "…", "secret": "…" } }
//! ```
//!
//! Exported documents contain every secret in the clear. They are produced on
//! explicit request only and are never written by the library itself.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroize;

use crate::vault::model::{Entry, EntryId};

#[derive(Error, Debug)]
pub enum InterchangeError {
    #[error("Import document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Import document must be a JSON object mapping ids to entries")]
    NotAnObject,

    #[error("Import record '{key}' is not an object")]
    RecordNotAnObject { key: String },

    #[error("Import record '{key}' is missing field '{field}'")]
    MissingField { key: String, field: &'static str },

    #[error("Import record '{key}' field '{field}' must be a string")]
    NotAString { key: String, field: &'static str },

    #[error("Import record '{key}' has an empty url")]
    EmptyUrl { key: String },
}

/// One exported entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub url: String,
    pub username: String,
    pub password: String,
    pub secret: String,
}

impl ExportRecord {
    /// Build a record from an open entry. Sealed fields export as empty strings.
    pub fn from_open_entry(entry: &Entry) -> Self {
        Self {
            url: entry.note.clone(),
            username: entry.username.clone(),
            password: entry.password.as_plain().unwrap_or_default().to_owned(),
            secret: entry.safe_note.as_plain().unwrap_or_default().to_owned(),
        }
    }

    /// Open entry built from this record: `url` becomes both note and title.
    pub fn to_open_entry(&self) -> Entry {
        Entry::open(
            self.url.clone(),
            self.url.clone(),
            self.username.clone(),
            self.password.clone(),
            self.secret.clone(),
        )
    }
}

impl Drop for ExportRecord {
    fn drop(&mut self) {
        self.password.zeroize();
        self.secret.zeroize();
    }
}

impl fmt::Debug for ExportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRecord")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Exported vault, keyed by entry id.
pub type ExportDocument = BTreeMap<EntryId, ExportRecord>;

/// Serialize an export document as JSON.
pub fn to_json(document: &ExportDocument) -> Result<String, InterchangeError> {
    Ok(serde_json::to_string_pretty(document)?)
}

fn string_field(
    fields: &serde_json::Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<String, InterchangeError> {
    match fields.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(InterchangeError::NotAString {
            key: key.to_owned(),
            field,
        }),
        None => Err(InterchangeError::MissingField {
            key: key.to_owned(),
            field,
        }),
    }
}

/// Validate and parse an import document.
///
/// Every record must carry all four fields as strings, with a non-empty
/// `url`. The record keys are only used in error messages: imported entries
/// receive fresh ids. Records come back in key order.
pub fn parse_import(input: &str) -> Result<Vec<ExportRecord>, InterchangeError> {
    let value: Value = serde_json::from_str(input)?;
    let Value::Object(map) = value else {
        return Err(InterchangeError::NotAnObject);
    };

    let mut records = Vec::with_capacity(map.len());
    for (key, record) in map {
        let Value::Object(fields) = record else {
            return Err(InterchangeError::RecordNotAnObject { key });
        };
        let url = string_field(&fields, &key, "url")?;
        let username = string_field(&fields, &key, "username")?;
        let password = string_field(&fields, &key, "password")?;
        let secret = string_field(&fields, &key, "secret")?;
        if url.is_empty() {
            return Err(InterchangeError::EmptyUrl { key });
        }
        records.push(ExportRecord {
            url,
            username,
            password,
            secret,
        });
    }
    Ok(records)
}
