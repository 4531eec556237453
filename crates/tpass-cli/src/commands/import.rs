use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use zeroize::Zeroizing;

use super::Store;

#[derive(ClapArgs)]
pub struct Args {
    /// Interchange document to import, or `-` for stdin
    pub path: PathBuf,
}

/// Add every record of an interchange document as a new entry.
pub fn execute(store: &Store, args: Args) -> Result<()> {
    let mut input = Zeroizing::new(String::new());
    if args.path.as_os_str() == "-" {
        io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read import document from stdin")?;
    } else {
        *input = fs::read_to_string(&args.path)
            .with_context(|| format!("Failed to read {}", args.path.display()))?;
    }

    let mut session = store.open()?;
    let ids = session.import(&input)?;
    session.save()?;
    session.release()?;
    println!("Imported {} entries", ids.len());
    Ok(())
}
