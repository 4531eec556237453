//! Entry identifier grammar.
//!
//! ```text
//! #12               entry with id 12 (anything before '#' is ignored)
//! github.com        entry whose note is github.com
//! work/github.com   ... carrying the tag titled "work"
//! work/github.com:octocat
//!                   ... with username octocat
//! ```
//!
//! Every comparison is case-insensitive.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::vault::model::{Entry, EntryId, ROOT_TAG, Vault};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("empty entry name")]
    Empty,

    #[error("invalid entry id '{0}'")]
    InvalidId(String),
}

/// Parsed entry identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    ById(EntryId),
    ByCompositeName {
        tag: Option<String>,
        note: String,
        username: Option<String>,
    },
}

impl FromStr for LookupKey {
    type Err = LookupError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LookupError::Empty);
        }

        if let Some((_, id)) = input.split_once('#') {
            return id
                .parse()
                .map(LookupKey::ById)
                .map_err(|_| LookupError::InvalidId(id.to_owned()));
        }

        let (tag, rest) = match input.split_once('/') {
            Some((tag, rest)) => (non_empty(tag), rest),
            None => (None, input),
        };
        let (note, username) = match rest.split_once(':') {
            Some((note, user)) if tag.is_some() => (note, non_empty(user)),
            _ => (rest, None),
        };
        if note.is_empty() {
            return Err(LookupError::Empty);
        }

        Ok(LookupKey::ByCompositeName {
            tag,
            note: note.to_owned(),
            username,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::ById(id) => write!(f, "#{id}"),
            LookupKey::ByCompositeName {
                tag,
                note,
                username,
            } => {
                if let Some(tag) = tag {
                    write!(f, "{tag}/")?;
                }
                f.write_str(note)?;
                if let Some(user) = username {
                    write!(f, ":{user}")?;
                }
                Ok(())
            }
        }
    }
}

impl LookupKey {
    /// First entry (in id order) matching this key.
    pub fn resolve<'v>(&self, vault: &'v Vault) -> Option<(EntryId, &'v Entry)> {
        match self {
            LookupKey::ById(id) => vault.entries.get(id).map(|e| (*id, e)),
            LookupKey::ByCompositeName {
                tag,
                note,
                username,
            } => {
                let tag_id = match tag {
                    Some(title) => Some(vault.tag_by_title(title)?.0),
                    None => None,
                };
                let note = note.to_lowercase();
                let username = username.as_deref().map(str::to_lowercase);
                vault
                    .entries
                    .iter()
                    .find(|(_, e)| {
                        e.note.to_lowercase() == note
                            && username
                                .as_ref()
                                .is_none_or(|u| e.username.to_lowercase() == *u)
                            && tag_id.is_none_or(|t| t == ROOT_TAG || e.tags.contains(&t))
                    })
                    .map(|(id, e)| (*id, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::model::{Icon, SecretField, Tag, TagId};

    fn key(s: &str) -> LookupKey {
        s.parse().unwrap()
    }

    fn composite(tag: Option<&str>, note: &str, username: Option<&str>) -> LookupKey {
        LookupKey::ByCompositeName {
            tag: tag.map(str::to_owned),
            note: note.to_owned(),
            username: username.map(str::to_owned),
        }
    }

    #[test]
    fn test_parse_grammar() {
        assert_eq!(key("#12"), LookupKey::ById(EntryId(12)));
        assert_eq!(key("github.com#3"), LookupKey::ById(EntryId(3)));
        assert_eq!(key("github.com"), composite(None, "github.com", None));
        assert_eq!(key("work/github.com"), composite(Some("work"), "github.com", None));
        assert_eq!(
            key("work/github.com:octocat"),
            composite(Some("work"), "github.com", Some("octocat"))
        );
        assert_eq!(key("/github.com"), composite(None, "github.com", None));
    }

    #[test]
    fn test_colon_without_tag_belongs_to_note() {
        assert_eq!(key("host:8080"), composite(None, "host:8080", None));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<LookupKey>(), Err(LookupError::Empty));
        assert_eq!("work/".parse::<LookupKey>(), Err(LookupError::Empty));
        assert_eq!(
            "#abc".parse::<LookupKey>(),
            Err(LookupError::InvalidId("abc".to_owned()))
        );
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["#4", "mail", "work/mail", "work/mail:me"] {
            assert_eq!(key(s).to_string(), s);
        }
    }

    fn sealed(note: &str, user: &str, tags: &[u32]) -> Entry {
        let mut e = Entry::open(note, note, user, "", "");
        e.password = SecretField::Sealed(vec![1]);
        e.safe_note = SecretField::Sealed(vec![2]);
        e.nonce = Some(vec![3]);
        e.export = false;
        e.tags = tags.iter().map(|t| TagId(*t)).collect();
        e
    }

    #[test]
    fn test_resolve() {
        let mut vault = Vault::new();
        vault.tags.insert(TagId(1), Tag::new("Work", Icon::Card));
        vault.entries.insert(EntryId(0), sealed("GitHub.com", "alice", &[]));
        vault.entries.insert(EntryId(1), sealed("github.com", "bob", &[1]));

        assert_eq!(key("github.com").resolve(&vault).unwrap().0, EntryId(0));
        assert_eq!(key("work/GITHUB.COM").resolve(&vault).unwrap().0, EntryId(1));
        assert_eq!(key("all/github.com:BOB").resolve(&vault).unwrap().0, EntryId(1));
        assert_eq!(key("#1").resolve(&vault).unwrap().0, EntryId(1));
        assert!(key("#9").resolve(&vault).is_none());
        assert!(key("work/github.com:alice").resolve(&vault).is_none());
        assert!(key("nope/github.com").resolve(&vault).is_none());
    }
}
