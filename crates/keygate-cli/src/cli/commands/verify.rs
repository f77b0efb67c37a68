//! `keygate verify` - Check an envelope against the configured scope policy.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use keygate_auth::{AuthorizationGateway, SignedEnvelope, CONFIG_ENV};
use keygate_management::LABEL_ROUTES;

use crate::exit_codes;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Envelope JSON file (`-` for stdin)
    pub envelope: PathBuf,

    /// Configuration file (YAML)
    #[arg(long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Scope to authorize
    #[arg(long, required_unless_present = "route", conflicts_with = "route")]
    pub scope: Option<String>,

    /// Management route id whose scope to authorize, e.g. `labels.create`
    #[arg(long)]
    pub route: Option<String>,

    /// Quiet mode - only exit code, no output
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn cmd_verify(args: VerifyArgs) -> i32 {
    super::report(run_verify(&args))
}

fn run_verify(args: &VerifyArgs) -> Result<i32> {
    let config = super::load_config(args.config.as_deref())?;
    let gateway = AuthorizationGateway::new(Arc::new(config.build_context()?), LABEL_ROUTES);
    let raw = super::read_input(&args.envelope)?;

    let result = SignedEnvelope::from_json(&raw).and_then(|envelope| {
        match (&args.scope, &args.route) {
            (Some(scope), _) => gateway.authorize_scope(&envelope, scope),
            (None, Some(route)) => gateway
                .authorize_route(route, &envelope)
                .map(|(_, verified)| verified),
            (None, None) => Err(keygate_auth::AuthorizationError::UnknownScope),
        }
    });

    match result {
        Ok(verified) => {
            if !args.quiet {
                let signers: Vec<&str> = verified.signers().iter().map(|s| s.as_str()).collect();
                println!(
                    "allowed: scope {} signed by [{}]",
                    verified.scope(),
                    signers.join(", ")
                );
            }
            Ok(exit_codes::SUCCESS)
        }
        Err(reason) => {
            if !args.quiet {
                println!("denied: {}", reason.reason_code());
            }
            Ok(exit_codes::DENIED)
        }
    }
}
