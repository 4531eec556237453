use anyhow::Result;
use clap::Args as ClapArgs;

use super::Store;

#[derive(ClapArgs)]
pub struct Args {
    /// Text to look for in every field, secrets included
    pub query: String,

    /// Ignore case when matching
    #[arg(short = 'i', long)]
    pub case_insensitive: bool,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let session = store.open()?;
    let matches = session.grep(&args.query, args.case_insensitive)?;
    for hit in &matches {
        println!(
            "{}:{}#{} <{}>: {}",
            hit.note,
            hit.username,
            hit.entry,
            hit.field,
            hit.value.as_str()
        );
    }
    if matches.is_empty() {
        eprintln!("No matches for '{}'", args.query);
    }
    Ok(())
}
