use anyhow::Result;
use clap::Args as ClapArgs;

use tpass_core::vault::{EntryDraft, Icon};

use super::{Store, resolve_tags};
use crate::prompt::read_secret;

#[derive(ClapArgs)]
pub struct Args {
    /// Item/URL of the new entry, or the title of the new tag with --tag
    pub name: String,

    /// Insert a tag instead of an entry
    #[arg(short, long)]
    pub tag: bool,

    /// Tag icon
    #[arg(long, default_value = "home")]
    pub icon: Icon,

    /// Entry title (default: the item/url)
    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long, default_value = "")]
    pub username: String,

    /// Password (insecure; prefer TPASS_PASSWORD, the prompt or stdin)
    #[arg(short, long, env = "TPASS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Secret note
    #[arg(short, long, env = "TPASS_SECRET", hide_env_values = true, default_value = "")]
    pub secret: String,

    /// Tags of the entry, by title or #id
    #[arg(long = "tags", value_delimiter = ',')]
    pub tags: Vec<String>,
}

pub fn execute(store: &Store, args: Args) -> Result<()> {
    let mut session = store.open()?;

    if args.tag {
        let id = session.insert_tag(&args.name, args.icon)?;
        session.save()?;
        session.release()?;
        println!("Inserted tag #{id}");
        return Ok(());
    }

    let tags = resolve_tags(&session, &args.tags)?;
    let password = read_secret("Password", args.password)?;
    let draft = EntryDraft {
        title: args.title.unwrap_or_else(|| args.name.clone()),
        note: args.name,
        username: args.username,
        password,
        secret: zeroize::Zeroizing::new(args.secret),
        tags,
    };
    let id = session.insert_entry(draft)?;
    session.save()?;
    session.release()?;
    println!("Inserted entry #{id}");
    Ok(())
}
