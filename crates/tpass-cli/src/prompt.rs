use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Result, bail};
use rpassword::read_password;
use zeroize::Zeroizing;

/// Resolve a secret value: an explicit flag (or its environment variable)
/// wins; otherwise read it from the terminal without echo, or take one line
/// from piped stdin.
pub fn read_secret(label: &str, given: Option<String>) -> Result<Zeroizing<String>> {
    if let Some(value) = given {
        return Ok(Zeroizing::new(value));
    }

    if io::stdin().is_terminal() {
        eprint!("{label}: ");
        io::stderr().flush()?;
        return Ok(Zeroizing::new(read_password()?));
    }

    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// Ask a yes/no question on stderr. `force` answers yes without asking.
pub fn confirm(question: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        bail!("{question} Refusing without a terminal; pass --force to confirm");
    }

    eprint!("{question} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
