use anyhow::Result;
use clap::Args as ClapArgs;

use tpass_core::vault::MetadataCache;

use super::Store;

#[derive(ClapArgs)]
pub struct Args {}

/// Delete the plaintext metadata snapshot.
pub fn execute(store: &Store, _args: Args) -> Result<()> {
    let cache = store
        .config
        .metadata_cache(&store.vault_path)
        .unwrap_or_else(|| MetadataCache::default_location(&store.vault_path));
    if cache.remove()? {
        println!("metadata deleted: {}", cache.path().display());
    } else {
        println!("nothing to delete");
    }
    Ok(())
}
