use anyhow::Result;
use clap::Args as ClapArgs;

use super::Store;
use crate::output::entries_table;

#[derive(ClapArgs)]
pub struct Args {
    /// Tag to list (default: every tag)
    pub tag: Option<String>,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let session = store.open()?;
    let tags: Vec<_> = match &args.tag {
        Some(name) => vec![session.resolve_tag(name)?.0],
        None => session.vault().tags.keys().copied().collect(),
    };

    for id in tags {
        let tag = &session.vault().tags[&id];
        println!("{} (#{id}, {})", tag.title, tag.icon);
        let entries = session.entries_by_tag(id);
        if entries.is_empty() {
            println!("  (no entries)");
        } else {
            println!("{}", entries_table(session.vault(), entries));
        }
    }
    Ok(())
}
