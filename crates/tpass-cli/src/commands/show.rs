use anyhow::Result;
use clap::Args as ClapArgs;
use serde_json::json;

use super::{Store, resolve_entry};
use crate::output::entry_card;

#[derive(ClapArgs)]
pub struct Args {
    /// Entries to show: `#id`, `item`, `tag/item` or `tag/item:username`
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Decrypt and show password and secret note
    #[arg(short, long)]
    pub secrets: bool,

    /// Print the entry as JSON
    #[arg(short, long)]
    pub json: bool,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let session = store.open()?;
    for name in &args.names {
        let id = resolve_entry(&session, name)?;
        let entry = if args.secrets {
            session.reveal(id)?
        } else {
            session.vault().entries[&id].clone()
        };

        if args.json {
            println!("{}", serde_json::to_string_pretty(&json!({ id.to_string(): entry }))?);
        } else {
            println!("{}", entry_card(session.vault(), id, &entry, args.secrets));
        }
    }
    Ok(())
}
