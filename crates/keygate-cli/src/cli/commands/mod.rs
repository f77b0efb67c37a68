pub mod check;
pub mod keygen;
pub mod sign;
pub mod token;
pub mod verify;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use keygate_auth::AuthConfig;

use super::args::Command;
use crate::exit_codes;

pub fn dispatch(cmd: Command) -> i32 {
    match cmd {
        Command::Keygen(args) => keygen::cmd_keygen(args),
        Command::Sign(args) => sign::cmd_sign(args),
        Command::Verify(args) => verify::cmd_verify(args),
        Command::Token(args) => token::cmd_token(args),
        Command::Check(args) => check::cmd_check(args),
    }
}

/// Print the error chain and pick the exit code.
pub(crate) fn report(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_codes::for_error(&e)
        }
    }
}

/// Config from `--config`, falling back to `KEYGATE_CONFIG`.
pub(crate) fn load_config(path: Option<&Path>) -> Result<AuthConfig> {
    let config = match path {
        Some(path) => AuthConfig::from_file(path)?,
        None => AuthConfig::from_env()?,
    };
    Ok(config)
}

/// Read a file, or stdin for `-`.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
