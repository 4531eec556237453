#![forbid(unsafe_code)]

mod commands;
mod config;
mod exit_code;
mod output;
mod prompt;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tpass_core::error::{
    DeviceError, EnvelopeError, GeneratorError, LockError, LookupError, SessionError,
    WordlistError,
};
use tpass_core::ErrorClass;

use crate::commands::{
    Store, break_lock, config as config_cmd, edit, export, find, generate, grep, import, init,
    insert, lock, ls, rm, show, unlock,
};

#[derive(Parser)]
#[command(name = "tpass")]
#[command(author, version, about = "Password store rooted in a hardware key device")]
#[command(propagate_version = true)]
struct Cli {
    /// Store file to use instead of the configured one
    #[arg(long, env = "TPASS_STORE", global = true)]
    store: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new password store
    Init(init::Args),

    /// List entries and tags whose metadata matches
    Find(find::Args),

    /// Search decrypted entries, secrets included
    Grep(grep::Args),

    /// List entries by tag
    Ls(ls::Args),

    /// Show entries
    Show(show::Args),

    /// Generate a password, passphrase or PIN
    Generate(generate::Args),

    /// Insert an entry or tag
    Insert(insert::Args),

    /// Edit an entry or tag
    Edit(edit::Args),

    /// Remove an entry or tag
    Rm(rm::Args),

    /// Decrypt the store and write its metadata snapshot
    Unlock(unlock::Args),

    /// Delete the metadata snapshot
    Lock(lock::Args),

    /// Remove a lock left behind by a crashed instance
    BreakLock(break_lock::Args),

    /// Export every entry, secrets in the clear
    Export(export::Args),

    /// Import entries from an interchange document
    Import(import::Args),

    /// Show or reset the configuration
    Config(config_cmd::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = cli.quiet;
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);
            if !quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli { store, command, .. } = cli;
    let load = || -> Result<Store> {
        let store = Store::load(store.clone())?;
        tracing::debug!(store = %store.vault_path.display(), "Using password store");
        Ok(store)
    };

    match command {
        Commands::Init(args) => init::execute(args, store.clone()),
        Commands::Find(args) => find::execute(&load()?, args),
        Commands::Grep(args) => grep::execute(&load()?, args),
        Commands::Ls(args) => ls::execute(&load()?, args),
        Commands::Show(args) => show::execute(&load()?, args),
        Commands::Generate(args) => generate::execute(&load()?, args),
        Commands::Insert(args) => insert::execute(&load()?, args),
        Commands::Edit(args) => edit::execute(&load()?, args),
        Commands::Rm(args) => rm::execute(&load()?, args),
        Commands::Unlock(args) => unlock::execute(&load()?, args),
        Commands::Lock(args) => lock::execute(&load()?, args),
        Commands::BreakLock(args) => break_lock::execute(&load()?, args),
        Commands::Export(args) => export::execute(&load()?, args),
        Commands::Import(args) => import::execute(&load()?, args),
        Commands::Config(args) => config_cmd::execute(&load()?, args),
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

fn device_code(err: &DeviceError) -> u8 {
    match err {
        DeviceError::UserDeclined { .. } => exit_code::CANCELLED,
        DeviceError::InvalidNonce { .. } => exit_code::AUTH_FAILED,
        DeviceError::SeedFile { source, .. } if source.kind() == io::ErrorKind::NotFound => {
            exit_code::NOT_FOUND
        }
        DeviceError::Unavailable { .. }
        | DeviceError::SeedFile { .. }
        | DeviceError::InvalidSeed { .. } => exit_code::DEVICE_ERROR,
    }
}

fn io_code(err: &io::Error) -> Option<u8> {
    match err.kind() {
        io::ErrorKind::PermissionDenied => Some(exit_code::PERMISSION_DENIED),
        io::ErrorKind::NotFound => Some(exit_code::NOT_FOUND),
        io::ErrorKind::Interrupted => Some(exit_code::CANCELLED),
        _ => None,
    }
}

fn session_code(err: &SessionError) -> u8 {
    match err {
        SessionError::Device(d)
        | SessionError::Envelope {
            source: EnvelopeError::Device(d),
            ..
        } => device_code(d),
        SessionError::NotInitialized { .. }
        | SessionError::EntryNotFound { .. }
        | SessionError::TagNotFound { .. } => exit_code::NOT_FOUND,
        SessionError::Io { source, .. } => io_code(source).unwrap_or(exit_code::GENERAL_ERROR),
        _ => match err.class() {
            ErrorClass::Device => exit_code::DEVICE_ERROR,
            ErrorClass::Crypto => exit_code::AUTH_FAILED,
            ErrorClass::LockConflict => exit_code::LOCKED,
            ErrorClass::Format => exit_code::STORE_INVALID,
            ErrorClass::Input => exit_code::USAGE_ERROR,
            ErrorClass::InvalidState | ErrorClass::Io => exit_code::GENERAL_ERROR,
        },
    }
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<SessionError>() {
            return session_code(err);
        }
        if let Some(err) = cause.downcast_ref::<DeviceError>() {
            return device_code(err);
        }
        if let Some(GeneratorError::Device(err)) = cause.downcast_ref::<GeneratorError>() {
            return device_code(err);
        }
        if let Some(err) = cause.downcast_ref::<LockError>() {
            return match err {
                LockError::Io { source, .. } => io_code(source).unwrap_or(exit_code::GENERAL_ERROR),
                _ => exit_code::LOCKED,
            };
        }
        if let Some(WordlistError::Io { source, .. }) = cause.downcast_ref::<WordlistError>() {
            return io_code(source).unwrap_or(exit_code::GENERAL_ERROR);
        }
        if cause.downcast_ref::<LookupError>().is_some() {
            return exit_code::USAGE_ERROR;
        }
        if let Some(code) = cause.downcast_ref::<io::Error>().and_then(io_code) {
            return code;
        }
    }

    // Confirmation prompts answered "no" bail with a plain message
    let msg = format!("{e:#}").to_lowercase();
    if msg.contains("cancelled") {
        exit_code::CANCELLED
    } else {
        exit_code::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpass_core::device::DeviceOperation;

    #[test]
    fn test_declined_device_is_cancelled() {
        let err = anyhow::Error::new(SessionError::Device(DeviceError::UserDeclined {
            operation: DeviceOperation::DeriveMasterKey,
        }))
        .context("Failed to open password store");
        assert_eq!(categorize_error(&err), exit_code::CANCELLED);
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let err = anyhow::Error::new(SessionError::EntryNotFound {
            name: "github.com".to_owned(),
        });
        assert_eq!(categorize_error(&err), exit_code::NOT_FOUND);
    }

    #[test]
    fn test_lock_conflict() {
        let err = anyhow::Error::new(SessionError::Lock(LockError::AlreadyLocked {
            lock_path: PathBuf::from("/tmp/store.pswd.lock"),
            holder: None,
        }));
        assert_eq!(categorize_error(&err), exit_code::LOCKED);
    }

    #[test]
    fn test_user_cancellation() {
        let err = anyhow::anyhow!("Removal cancelled");
        assert_eq!(categorize_error(&err), exit_code::CANCELLED);
        assert_eq!(
            categorize_error(&anyhow::anyhow!("something else")),
            exit_code::GENERAL_ERROR
        );
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
