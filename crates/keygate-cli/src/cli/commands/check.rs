//! `keygate check` - Load a configuration and report what it grants.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use keygate_auth::{ConfigError, ConfirmationClaims, CONFIG_ENV};
use keygate_management::LABEL_ROUTES;

use crate::exit_codes;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
}

pub fn cmd_check(args: CheckArgs) -> i32 {
    super::report(run_check(&args).map(|()| exit_codes::SUCCESS))
}

fn run_check(args: &CheckArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let context = config.build_context()?;

    println!(
        "config ok: {} scope(s), {} signer(s)",
        context.registry().len(),
        context.keyring().len()
    );
    for policy in context.registry().scopes() {
        let join = |set: &std::collections::BTreeSet<keygate_auth::SignerId>| {
            set.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        };
        println!(
            "  scope {}: permitted [{}], mandatory [{}]",
            policy.name(),
            join(policy.permitted_signers()),
            join(policy.mandatory_signers())
        );
    }
    for route in LABEL_ROUTES {
        if context.registry().get(route.scope).is_none() {
            println!(
                "  warning: route {} ({} {}) requires unconfigured scope {}",
                route.id, route.method, route.path, route.scope
            );
        }
    }

    if let Some(section) = &config.confirmation {
        let public_key = section.public_key(&config.base_dir)?;
        if section.private_key_path.is_some() {
            // Catch a private key that does not match the published public key.
            let codec = section.codec(&config.base_dir)?;
            let sample = ConfirmationClaims::issue("check@keygate.invalid", "CHECK", 60);
            let token = codec.encode(&sample)?;
            codec
                .decode_and_verify(&token, &public_key)
                .map_err(|_| ConfigError::Invalid {
                    message: "confirmation private key does not match public key".to_string(),
                })?;
            println!("  confirmation: issue and verify (ttl {}s)", section.ttl_secs);
        } else {
            println!("  confirmation: verify only");
        }
    }
    Ok(())
}
