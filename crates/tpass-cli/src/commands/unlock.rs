use anyhow::Result;
use clap::Args as ClapArgs;

use super::Store;

#[derive(ClapArgs)]
pub struct Args {}

/// Decrypt the store once so later read-only commands are served from the
/// metadata snapshot.
pub fn execute(store: &Store, _args: Args) -> Result<()> {
    let session = store.open()?;
    let entries = session.vault().entries.len();
    session.release()?;

    match store.config.metadata_cache(&store.vault_path) {
        Some(cache) => println!("metadata written: {} ({entries} entries)", cache.path().display()),
        None => println!("store unlocked ({entries} entries); metadata caching is disabled"),
    }
    Ok(())
}
