//! `keygate sign` - Wrap a JSON payload in a signed envelope.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use ed25519_dalek::SigningKey;
use keygate_auth::EnvelopeBuilder;

use crate::exit_codes;

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Payload JSON object (`-` for stdin)
    #[arg(long)]
    pub payload: PathBuf,

    /// Signer and PKCS#8 PEM private key, as NAME=PATH (repeatable)
    #[arg(long = "key", value_name = "NAME=PATH", required = true, value_parser = parse_signer_key)]
    pub keys: Vec<(String, PathBuf)>,

    /// Write the envelope here instead of stdout
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

fn parse_signer_key(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got `{s}`")),
    }
}

pub fn cmd_sign(args: SignArgs) -> i32 {
    super::report(run_sign(&args).map(|()| exit_codes::SUCCESS))
}

fn run_sign(args: &SignArgs) -> Result<()> {
    let payload_json = super::read_input(&args.payload)?;
    let payload: serde_json::Value = serde_json::from_str(&payload_json)
        .with_context(|| format!("failed to parse payload JSON: {}", args.payload.display()))?;
    if !payload.is_object() {
        anyhow::bail!("payload must be a JSON object");
    }

    let mut builder = EnvelopeBuilder::new(&payload)?;
    for (name, path) in &args.keys {
        builder = builder.sign(name.as_str(), &load_signing_key(path)?);
        tracing::debug!(signer = %name, "signed payload");
    }
    let envelope = builder.build().to_json();

    match &args.out {
        Some(out) => {
            fs::write(out, &envelope)
                .with_context(|| format!("failed to write envelope: {}", out.display()))?;
            eprintln!(
                "Wrote envelope with {} signature(s) to {}",
                args.keys.len(),
                out.display()
            );
        }
        None => println!("{envelope}"),
    }
    Ok(())
}

fn load_signing_key(path: &Path) -> Result<SigningKey> {
    use pkcs8::DecodePrivateKey;

    let pem = fs::read_to_string(path)
        .with_context(|| format!("failed to read private key: {}", path.display()))?;
    SigningKey::from_pkcs8_pem(&pem)
        .map_err(|e| anyhow::anyhow!("invalid PKCS#8 private key {}: {e}", path.display()))
}
