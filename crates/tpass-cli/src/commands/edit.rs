use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use zeroize::Zeroizing;

use tpass_core::vault::{EntryEdit, Icon};

use super::{Store, resolve_entry, resolve_tags};
use crate::prompt::read_secret;

#[derive(ClapArgs)]
pub struct Args {
    /// Entry to edit, or the tag with --tag
    pub name: String,

    /// Edit a tag instead of an entry
    #[arg(short, long)]
    pub tag: bool,

    /// New item/url
    #[arg(long)]
    pub note: Option<String>,

    /// New title (entry or tag)
    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub username: Option<String>,

    /// New password (insecure; prefer --ask-password)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read the new password from the terminal or stdin
    #[arg(long, conflicts_with = "password")]
    pub ask_password: bool,

    /// New secret note
    #[arg(short, long)]
    pub secret: Option<String>,

    /// Replace the entry's tags, by title or #id
    #[arg(long = "tags", value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    /// New tag icon
    #[arg(long)]
    pub icon: Option<Icon>,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let mut session = store.open()?;

    if args.tag {
        let (id, _) = session.resolve_tag(&args.name)?;
        session.edit_tag(id, args.title.as_deref(), args.icon)?;
        session.save()?;
        session.release()?;
        println!("Updated tag #{id}");
        return Ok(());
    }
    if args.icon.is_some() {
        bail!("--icon only applies to tags");
    }

    let id = resolve_entry(&session, &args.name)?;
    let password = if args.ask_password {
        Some(read_secret("New password", None)?)
    } else {
        args.password.map(Zeroizing::new)
    };
    let tags = match &args.tags {
        Some(names) => Some(resolve_tags(&session, names)?),
        None => None,
    };

    let edit = EntryEdit {
        note: args.note,
        title: args.title,
        username: args.username,
        password,
        secret: args.secret.map(Zeroizing::new),
        tags,
    };
    session.edit_entry(id, edit)?;
    session.save()?;
    session.release()?;
    println!("Updated entry #{id}");
    Ok(())
}
