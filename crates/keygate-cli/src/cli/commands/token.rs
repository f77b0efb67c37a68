//! `keygate token` - Issue and verify confirmation tokens.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use keygate_auth::{
    decode_and_verify, AuthConfig, ConfigError, ConfirmationClaims, ConfirmationConfig, CONFIG_ENV,
};

use crate::exit_codes;

#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub cmd: TokenCmd,
}

#[derive(Subcommand, Debug)]
pub enum TokenCmd {
    /// Sign a confirmation token with the service private key
    Issue(IssueArgs),

    /// Verify a token with the service public key
    Verify(TokenVerifyArgs),
}

#[derive(Args, Debug)]
pub struct IssueArgs {
    #[arg(long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub uid: String,

    /// Lifetime in seconds; overrides `confirmation.ttl_secs`, 0 means no expiry
    #[arg(long)]
    pub ttl: Option<u64>,
}

#[derive(Args, Debug)]
pub struct TokenVerifyArgs {
    #[arg(long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Compact token
    pub token: String,
}

pub fn cmd_token(args: TokenArgs) -> i32 {
    match args.cmd {
        TokenCmd::Issue(args) => super::report(run_issue(&args).map(|()| exit_codes::SUCCESS)),
        TokenCmd::Verify(args) => super::report(run_verify(&args)),
    }
}

fn confirmation_section(config: &AuthConfig) -> Result<&ConfirmationConfig> {
    config.confirmation.as_ref().ok_or_else(|| {
        ConfigError::Invalid {
            message: "config has no confirmation section".to_string(),
        }
        .into()
    })
}

fn run_issue(args: &IssueArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let section = confirmation_section(&config)?;
    let codec = section.codec(&config.base_dir)?;

    let claims = ConfirmationClaims::issue(
        args.email.as_str(),
        args.uid.as_str(),
        args.ttl.unwrap_or(section.ttl_secs),
    );
    println!("{}", codec.encode(&claims)?);
    tracing::info!(uid = %claims.uid, exp = ?claims.exp, "issued confirmation token");
    Ok(())
}

fn run_verify(args: &TokenVerifyArgs) -> Result<i32> {
    let config = super::load_config(args.config.as_deref())?;
    let section = confirmation_section(&config)?;
    let public_key = section.public_key(&config.base_dir)?;

    match decode_and_verify(args.token.trim(), &public_key, section.leeway_secs) {
        Ok(claims) => {
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            println!("rejected: {e}");
            Ok(exit_codes::DENIED)
        }
    }
}
