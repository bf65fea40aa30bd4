use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::{info, warn};

use crate::{
    cli::build_storage,
    export::{MerkleDocument, json::from_merkle_document},
    merkle,
    settings::Settings,
    validator,
};

/// Reloads a persisted distribution and re-verifies it offline: every
/// recipient's proof must still fold up to the stored root, and the
/// distribution must still pass every §4.G validation check. Never reads
/// or writes the chain — a pure re-derivation over what was already
/// committed to disk.
#[derive(Debug, Args)]
pub struct VerifyArgs {}

pub async fn execute(_args: VerifyArgs, settings: &Settings) -> Result<()> {
    let storage = build_storage(settings).await?;
    let raw = storage.load(&settings.filenames.merkle_json).await?;
    let document: MerkleDocument =
        serde_json::from_slice(&raw).context("merkle.json is not a well-formed merkle document")?;
    let distribution = from_merkle_document(&document)?;

    let mut mismatches = Vec::new();
    for recipient in &distribution.recipients {
        let leaf = merkle::leaf_hash(recipient.address, recipient.total_reward);
        let recomputed = merkle::process_proof(leaf, &recipient.proof);
        if recomputed != distribution.merkle_root {
            mismatches.push(recipient.address);
        }
    }
    if !mismatches.is_empty() {
        for address in &mismatches {
            warn!(%address, "proof does not fold up to the stored root");
        }
        bail!("{} of {} proofs failed re-verification", mismatches.len(), distribution.recipient_count());
    }
    info!(
        recipients = distribution.recipient_count(),
        "every recipient's proof re-verifies against the stored root"
    );

    let validation = validator::validate(&distribution, settings.max_reward_deviation);
    if !validation.valid {
        for error in &validation.errors {
            warn!(error, "validation failure");
        }
        bail!("distribution failed re-validation");
    }
    for warning in &validation.warnings {
        warn!(warning, "validation warning");
    }
    info!("distribution re-validates cleanly");
    Ok(())
}
