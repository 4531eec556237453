use anyhow::{Result, bail};
use clap::Args as ClapArgs;

use super::{Store, resolve_entry};
use crate::prompt::confirm;

#[derive(ClapArgs)]
pub struct Args {
    /// Entry to remove, or the tag with --tag
    pub name: String,

    /// Remove a tag; its entries stay but lose the tag
    #[arg(short, long)]
    pub tag: bool,

    /// Remove without confirmation
    #[arg(short, long)]
    pub force: bool,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let mut session = store.open()?;

    if args.tag {
        let (id, tag) = session.resolve_tag(&args.name)?;
        let title = tag.title.clone();
        if !confirm(&format!("Delete tag '{title}'?"), args.force)? {
            bail!("Removal cancelled");
        }
        session.remove_tag(id)?;
        session.save()?;
        session.release()?;
        println!("Removed tag '{title}'");
        return Ok(());
    }

    let id = resolve_entry(&session, &args.name)?;
    let title = session.vault().entries[&id].title.clone();
    if !confirm(&format!("Delete entry '{title}'?"), args.force)? {
        bail!("Removal cancelled");
    }
    session.remove_entry(id)?;
    session.save()?;
    session.release()?;
    println!("Removed entry #{id}");
    Ok(())
}
