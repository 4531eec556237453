use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args as ClapArgs;
use zeroize::Zeroizing;

use tpass_core::vault::interchange;

use super::Store;
use crate::prompt::confirm;

#[derive(ClapArgs)]
pub struct Args {
    /// Output file (default: stdout). Written with owner-only permissions.
    pub path: Option<PathBuf>,

    /// Overwrite an existing file without confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// Write every entry, secrets in the clear, as a JSON interchange document.
pub fn execute(store: &Store, args: Args) -> Result<()> {
    let session = store.open()?;
    let document = session.export()?;
    let json = Zeroizing::new(interchange::to_json(&document)?);
    session.release()?;

    let Some(path) = args.path else {
        println!("{}", json.as_str());
        return Ok(());
    };

    if path.exists() {
        if !confirm(&format!("Overwrite {}?", path.display()), args.force)? {
            bail!("Export cancelled");
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Exported {} entries to {}", document.len(), path.display());
    Ok(())
}
