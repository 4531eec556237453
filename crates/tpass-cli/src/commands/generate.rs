use anyhow::{Context, Result, bail};
use clap::Args as ClapArgs;

use tpass_core::DeviceKeyProvider;
use tpass_core::generator::{
    SecretKind, Wordlist, generate_passphrase, generate_password, generate_pin,
};
use tpass_core::vault::EntryEdit;

use super::{Store, resolve_entry};
use crate::prompt::confirm;

#[derive(ClapArgs)]
pub struct Args {
    /// Characters, words or digits (default: `default_length` from config)
    pub length: Option<usize>,

    /// Kind of secret: password, wordlist or pin
    #[arg(short = 't', long = "type", default_value = "password")]
    pub kind: SecretKind,

    /// Separator between passphrase words
    #[arg(short, long, default_value = " ")]
    pub separator: String,

    /// Mix entropy from the key device into the host's
    #[arg(short = 'd', long)]
    pub entropy: bool,

    /// Store the result as the password of this entry
    #[arg(short, long, value_name = "NAME")]
    pub insert: Option<String>,

    /// Skip confirmations
    #[arg(short, long)]
    pub force: bool,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let length = args.length.unwrap_or(store.config.default_length);
    if length < args.kind.min_recommended()
        && !confirm(
            &format!("Warning: {length} is too short for a {}. Continue?", args.kind),
            args.force,
        )?
    {
        bail!("Generation cancelled");
    }

    let device = if args.entropy {
        Some(store.device()?)
    } else {
        None
    };
    let device_ref = device.as_ref().map(|d| d as &dyn DeviceKeyProvider);

    let secret = match args.kind {
        SecretKind::Password => generate_password(length, device_ref)?,
        SecretKind::Pin => generate_pin(length, device_ref)?,
        SecretKind::Passphrase => {
            let path = store.config.wordlist_path(&store.config_dir);
            let wordlist = Wordlist::load(&path)
                .with_context(|| format!("Failed to load wordlist {}", path.display()))?;
            generate_passphrase(length, &wordlist, &args.separator, device_ref)?
        }
    };

    if let Some(name) = args.insert {
        let mut session = store.open()?;
        let id = resolve_entry(&session, &name)?;
        let title = session.vault().entries[&id].title.clone();
        if !confirm(&format!("Replace the password of '{title}'?"), args.force)? {
            bail!("Generation cancelled");
        }
        session.edit_entry(
            id,
            EntryEdit {
                password: Some(secret.clone()),
                ..EntryEdit::default()
            },
        )?;
        session.save()?;
        session.release()?;
        eprintln!("Password of #{id} updated");
    }

    println!("{}", secret.as_str());
    Ok(())
}
