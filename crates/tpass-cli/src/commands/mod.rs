pub mod break_lock;
pub mod config;
pub mod edit;
pub mod export;
pub mod find;
pub mod generate;
pub mod grep;
pub mod import;
pub mod init;
pub mod insert;
pub mod lock;
pub mod ls;
pub mod rm;
pub mod show;
pub mod unlock;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tpass_core::device::SoftDevice;
use tpass_core::vault::{EntryId, LookupKey, SessionOptions, TagId, VaultSession};

use crate::config::{self as cfg, Config};

/// Resolved configuration for one invocation.
#[derive(Debug)]
pub struct Store {
    pub config: Config,
    pub config_dir: PathBuf,
    pub vault_path: PathBuf,
}

impl Store {
    /// Load configuration; `store_override` replaces the configured store file.
    pub fn load(store_override: Option<PathBuf>) -> Result<Self> {
        let config_dir = cfg::config_dir()?;
        let config = Config::load(&config_dir)?;
        let vault_path = store_override.unwrap_or_else(|| config.vault_path(&config_dir));
        Ok(Self {
            config,
            config_dir,
            vault_path,
        })
    }

    pub fn device(&self) -> Result<SoftDevice> {
        let seed = self.config.device_seed_path(&self.config_dir);
        SoftDevice::load(&seed).context("Failed to reach the key device; run `tpass init` first")
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            cache: self.config.metadata_cache(&self.vault_path),
        }
    }

    /// Lock and decrypt the store.
    pub fn open(&self) -> Result<VaultSession<SoftDevice>> {
        let device = self.device()?;
        VaultSession::open(&self.vault_path, device, self.session_options()).with_context(|| {
            format!("Failed to open password store {}", self.vault_path.display())
        })
    }
}

/// Resolve an entry name (`#id`, `note`, `tag/note`, `tag/note:user`).
pub fn resolve_entry<D>(session: &VaultSession<D>, name: &str) -> Result<EntryId>
where
    D: tpass_core::DeviceKeyProvider,
{
    let key: LookupKey = name
        .parse()
        .with_context(|| format!("Invalid entry name '{name}'"))?;
    Ok(session.resolve_entry(&key)?.0)
}

/// Resolve tag titles (or `#id`s) to ids.
pub fn resolve_tags<D>(session: &VaultSession<D>, names: &[String]) -> Result<BTreeSet<TagId>>
where
    D: tpass_core::DeviceKeyProvider,
{
    names
        .iter()
        .map(|name| Ok(session.resolve_tag(name)?.0))
        .collect()
}
