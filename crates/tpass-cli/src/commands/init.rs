use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use tpass_core::device::SoftDevice;
use tpass_core::vault::VaultSession;

use super::Store;
use crate::config::Config;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory for the store file (default: configuration directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Store file name
    #[arg(long)]
    pub file_name: Option<String>,

    /// Do not keep a plaintext metadata snapshot between runs
    #[arg(short = 'd', long)]
    pub no_disk: bool,
}

pub fn execute(args: Args, store_override: Option<PathBuf>) -> Result<()> {
    let loaded = Store::load(None)?;
    let mut config = Config {
        store_metadata_on_disk: !args.no_disk,
        ..loaded.config
    };
    if let Some(path) = args.path {
        config.store_path = Some(path);
    }
    if let Some(name) = args.file_name {
        config.file_name = name;
    }
    // An explicit store file becomes the configured one
    if let Some(path) = store_override {
        let path = std::path::absolute(&path)
            .with_context(|| format!("Invalid store path {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Store path {} has no usable file name", path.display()))?;
        config.file_name = name.to_owned();
        config.store_path = path.parent().map(Path::to_path_buf);
    }

    let store = Store {
        vault_path: config.vault_path(&loaded.config_dir),
        config,
        config_dir: loaded.config_dir,
    };

    let seed_path = store.config.device_seed_path(&store.config_dir);
    let device = SoftDevice::load_or_create(&seed_path)
        .context("Failed to set up the key device")?;

    let session = VaultSession::create(&store.vault_path, device, store.session_options())
        .with_context(|| {
            format!("Failed to initialize password store {}", store.vault_path.display())
        })?;
    session.release()?;

    let config_file = store.config.save(&store.config_dir)?;
    tracing::info!(config = %config_file.display(), "Wrote configuration");
    println!("password store initialized in {}", store.vault_path.display());
    Ok(())
}
