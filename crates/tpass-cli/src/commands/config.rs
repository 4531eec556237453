use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use super::Store;
use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    /// Delete the configuration file, restoring defaults
    #[arg(short, long)]
    pub reset: bool,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    if args.reset {
        if Config::reset(&store.config_dir)? {
            println!("configuration reset");
        } else {
            println!("no configuration file to reset");
        }
        return Ok(());
    }

    println!("# {}", store.config_dir.join("config.toml").display());
    print!(
        "{}",
        toml::to_string_pretty(&store.config).context("Failed to serialize configuration")?
    );
    println!("# store: {}", store.vault_path.display());
    Ok(())
}
