//! `keygate keygen` - Generate an ed25519 keypair for a signer or the service.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use ed25519_dalek::SigningKey;
use keygate_auth::compute_key_id;
use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

use crate::exit_codes;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory to write the keypair into (created if missing)
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Base file name: writes `<name>.pem` and `<name>.pub.pem`
    #[arg(long, default_value = "signer")]
    pub name: String,

    /// Replace an existing keypair of the same name
    #[arg(long, short)]
    pub force: bool,
}

pub fn cmd_keygen(args: KeygenArgs) -> i32 {
    super::report(run_keygen(&args).map(|()| exit_codes::SUCCESS))
}

fn run_keygen(args: &KeygenArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("cannot create {}", args.out.display()))?;

    let private_path = args.out.join(format!("{}.pem", args.name));
    let public_path = args.out.join(format!("{}.pub.pem", args.name));
    if !args.force {
        if let Some(existing) = [&private_path, &public_path].into_iter().find(|p| p.exists()) {
            anyhow::bail!("{} exists; pass --force to replace it", existing.display());
        }
    }

    let signing_key = SigningKey::generate(&mut rand::thread_rng());
    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("PKCS#8 encoding failed")?;
    let public_pem = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .context("SPKI encoding failed")?;

    write_private(&private_path, private_pem.as_bytes())?;
    fs::write(&public_path, public_pem)
        .with_context(|| format!("cannot write {}", public_path.display()))?;

    println!("{} (private, PKCS#8)", private_path.display());
    println!("{} (public, SPKI)", public_path.display());
    println!("key_id: {}", compute_key_id(&signing_key.verifying_key()));
    Ok(())
}

/// Owner-only permissions on unix.
fn write_private(path: &Path, pem: &[u8]) -> Result<()> {
    fs::write(path, pem).with_context(|| format!("cannot write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("cannot restrict {}", path.display()))?;
    }
    Ok(())
}
