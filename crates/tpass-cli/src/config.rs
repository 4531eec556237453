//! Configuration file support for the tpass CLI.
//!
//! Configuration lives at `~/.config/tpass/config.toml` (XDG) or
//! `~/Library/Application Support/tpass/config.toml` on macOS. Setting
//! `TPASS_CONFIG_DIR` moves the whole configuration directory.
//!
//! # Example configuration
//!
//! ```toml
//! store_path = "/home/user/Dropbox/tpass"
//! file_name = "store.pswd"
//! store_metadata_on_disk = true
//! default_length = 20
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tpass_core::vault::cache::SHM_DIR;
use tpass_core::vault::MetadataCache;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "TPASS_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the store file. Defaults to the configuration directory.
    pub store_path: Option<PathBuf>,

    /// Store file name inside `store_path`.
    pub file_name: String,

    /// Keep a plaintext metadata snapshot in memory-backed storage between runs.
    pub store_metadata_on_disk: bool,

    /// Directory for the metadata snapshot. Defaults to `/dev/shm`.
    pub cache_dir: Option<PathBuf>,

    /// Diceware word list. Defaults to `wordlist.txt` in the configuration directory.
    pub wordlist: Option<PathBuf>,

    /// Seed file of the software device. Defaults to `device.seed` in the
    /// configuration directory.
    pub device_seed: Option<PathBuf>,

    /// Length used by `generate` when none is given.
    pub default_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            file_name: "store.pswd".to_owned(),
            store_metadata_on_disk: true,
            cache_dir: None,
            wordlist: None,
            device_seed: None,
            default_length: 15,
        }
    }
}

impl Config {
    /// Load `config.toml` from `dir`, or return defaults if it does not exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the configuration to `config.toml` in `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Delete `config.toml` in `dir`. Returns whether a file was removed.
    pub fn reset(dir: &Path) -> Result<bool> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        Ok(true)
    }

    pub fn vault_path(&self, dir: &Path) -> PathBuf {
        self.store_path
            .as_deref()
            .unwrap_or(dir)
            .join(&self.file_name)
    }

    pub fn wordlist_path(&self, dir: &Path) -> PathBuf {
        self.wordlist
            .clone()
            .unwrap_or_else(|| dir.join("wordlist.txt"))
    }

    pub fn device_seed_path(&self, dir: &Path) -> PathBuf {
        self.device_seed
            .clone()
            .unwrap_or_else(|| dir.join("device.seed"))
    }

    /// Metadata cache for the store at `vault_path`, or `None` when disabled.
    pub fn metadata_cache(&self, vault_path: &Path) -> Option<MetadataCache> {
        if !self.store_metadata_on_disk {
            return None;
        }
        let preferred = self
            .cache_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(SHM_DIR));
        Some(MetadataCache::new(MetadataCache::location_in(preferred, vault_path)))
    }
}

/// Get the configuration directory.
///
/// Uses `TPASS_CONFIG_DIR` if set, else the platform config directory.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    #[cfg(target_os = "macos")]
    {
        Ok(base_dirs.home_dir().join("Library/Application Support/tpass"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Ok(base_dirs.config_dir().join("tpass"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.vault_path(dir.path()), dir.path().join("store.pswd"));
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "store_path = \"/srv/pw\"\nstore_metadata_on_disk = false\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.vault_path(dir.path()), Path::new("/srv/pw/store.pswd"));
        assert!(config.metadata_cache(&config.vault_path(dir.path())).is_none());
        assert_eq!(config.default_length, 15);
    }

    #[test]
    fn test_save_and_reset() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            file_name: "mine.pswd".to_owned(),
            ..Config::default()
        };
        config.save(dir.path()).unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), config);

        assert!(Config::reset(dir.path()).unwrap());
        assert!(!Config::reset(dir.path()).unwrap());
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "default_length = \"long\"").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn test_cache_dir_override() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let cache = config.metadata_cache(&dir.path().join("store.pswd")).unwrap();
        assert_eq!(cache.path().parent(), Some(dir.path()));
        let name = cache.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("store.pswd-") && name.ends_with(".json"), "{name}");

        let other = config.metadata_cache(&dir.path().join("other").join("store.pswd")).unwrap();
        assert_ne!(cache.path(), other.path());
    }
}
