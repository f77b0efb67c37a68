use clap::{Parser, Subcommand};

use super::commands::{check, keygen, sign, token, verify};

#[derive(Parser, Debug)]
#[command(
    name = "keygate",
    version,
    about = "Multisig authorization and confirmation tokens for the Keygate management API"
)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long = "json", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an ed25519 keypair (PKCS#8 / SPKI PEM)
    Keygen(keygen::KeygenArgs),

    /// Sign a JSON payload into an envelope
    Sign(sign::SignArgs),

    /// Verify an envelope against a scope policy
    Verify(verify::VerifyArgs),

    /// Issue or verify confirmation tokens
    Token(token::TokenArgs),

    /// Validate a configuration file
    Check(check::CheckArgs),
}
