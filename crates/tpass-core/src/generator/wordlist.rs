//! Diceware word lists.
//!
//! Each non-blank line is a five-digit key of dice faces (`1`–`6`), a tab or a
//! space, and a word:
//!
//! ```text
//! 11111	abacus
//! 11112	abdomen
//! ```
//!
//! When a key appears twice, the first word wins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Number of dice rolled per word.
pub const KEY_DIGITS: usize = 5;

#[derive(Error, Debug)]
pub enum WordlistError {
    #[error("Failed to read wordlist '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed wordlist line {line}: expected five dice digits, a separator and a word")]
    Malformed { line: usize },

    #[error("Wordlist contains no words")]
    Empty,

    #[error("Wordlist has no word for dice roll {key}")]
    MissingKey { key: String },
}

/// Parsed diceware list.
#[derive(Debug, Clone)]
pub struct Wordlist {
    words: HashMap<String, String>,
}

fn is_dice_key(key: &str) -> bool {
    key.len() == KEY_DIGITS && key.bytes().all(|b| (b'1'..=b'6').contains(&b))
}

impl Wordlist {
    /// Parse a word list from text.
    pub fn parse(text: &str) -> Result<Self, WordlistError> {
        let mut words = HashMap::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let malformed = || WordlistError::Malformed { line: index + 1 };
            let (key, word) = line.split_once(['\t', ' ']).ok_or_else(malformed)?;
            let word = word.trim();
            if !is_dice_key(key) || word.is_empty() {
                return Err(malformed());
            }
            words
                .entry(key.to_owned())
                .or_insert_with(|| word.to_owned());
        }
        if words.is_empty() {
            return Err(WordlistError::Empty);
        }
        Ok(Self { words })
    }

    /// Read and parse a word list file.
    pub fn load(path: &Path) -> Result<Self, WordlistError> {
        let text = fs::read_to_string(path).map_err(|source| WordlistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::parse(&text)?;
        debug!(path = %path.display(), words = list.len(), "Loaded wordlist");
        Ok(list)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.words.get(key).map(String::as_str)
    }

    /// Look up a dice roll, failing if the list lacks it.
    pub fn word_for(&self, key: &str) -> Result<&str, WordlistError> {
        self.get(key).ok_or_else(|| WordlistError::MissingKey {
            key: key.to_owned(),
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
