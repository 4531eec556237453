use anyhow::Result;
use clap::Args as ClapArgs;

use tpass_core::vault::LockArbiter;

use super::Store;
use crate::prompt::confirm;

#[derive(ClapArgs)]
pub struct Args {
    /// Remove without confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// Remove a lock record left behind by a crashed instance.
pub fn execute(store: &Store, args: Args) -> Result<()> {
    let arbiter = LockArbiter::new(&store.vault_path);
    let Some(holder) = arbiter.inspect().ok().flatten() else {
        if arbiter.lock_path().exists() {
            // Unreadable record: nothing to show, remove it anyway
            arbiter.break_lock()?;
            println!("Removed unreadable lock {}", arbiter.lock_path().display());
        } else {
            println!("Store is not locked");
        }
        return Ok(());
    };

    let owner = holder
        .pid
        .map_or_else(|| holder.owner_id.to_string(), |pid| format!("pid {pid}"));
    if !confirm(
        &format!("Store is locked by {owner}. Break the lock only if that instance is gone. Continue?"),
        args.force,
    )? {
        anyhow::bail!("Lock break cancelled");
    }
    arbiter.break_lock()?;
    println!("Removed lock held by {owner}");
    Ok(())
}
