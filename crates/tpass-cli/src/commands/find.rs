use anyhow::Result;
use clap::Args as ClapArgs;

use super::Store;
use crate::output::{entries_table, tags_table};

#[derive(ClapArgs)]
pub struct Args {
    /// Text to look for in item/url, title, username and tag titles
    pub query: String,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let session = store.open()?;
    let found = session.find(&args.query);
    let vault = session.vault();

    if found.entries.is_empty() && found.tags.is_empty() {
        eprintln!("No matches for '{}'", args.query);
        return Ok(());
    }
    if !found.entries.is_empty() {
        let rows = found.entries.iter().map(|id| (*id, &vault.entries[id]));
        println!("{}", entries_table(vault, rows));
    }
    if !found.tags.is_empty() {
        let rows = found.tags.iter().map(|id| (*id, &vault.tags[id]));
        println!("{}", tags_table(rows));
    }
    Ok(())
}
