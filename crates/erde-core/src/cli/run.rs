use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;
use erde_chain::{ChainReader, SubmitOutcome, Submitter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use web3::transports::Http;

use crate::{
    cli::{build_storage, read_user_addresses},
    domain::Epoch,
    orchestrator::{self, Orchestrator},
    settings::Settings,
};

/// Runs a single epoch: snapshot, TWAD weights, budget, allocation, Merkle
/// commitment, and validation, then optionally submits the root on-chain.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// File with one checksummed recipient address per line.
    #[arg(long, value_name = "FILE")]
    pub users: PathBuf,

    /// Epoch number to run. Must be >= 1.
    #[arg(long)]
    pub epoch: u64,

    /// Overrides the snapshot start block; defaults to
    /// `current_block - snapshot_block_range`.
    #[arg(long)]
    pub start_block: Option<u64>,

    /// Overrides the snapshot end block; defaults to the chain's current
    /// block at the moment the run starts.
    #[arg(long)]
    pub end_block: Option<u64>,

    /// Build, validate, and persist artifacts, but never call the
    /// submitter.
    #[arg(long)]
    pub dry_run: bool,

    /// Submit the resulting root on-chain after a successful, valid run.
    #[arg(long)]
    pub submit: bool,

    /// Overrides `FORCE_UPDATE` for this invocation only, permitting the
    /// submitter to overwrite an existing non-zero root.
    #[arg(long)]
    pub force: bool,

    /// Post a summary of this run to the `ERDE_SLACK_WEBHOOK` channel.
    #[arg(long)]
    pub notify_slack: bool,
}

pub async fn execute(args: RunArgs, settings: &Settings) -> Result<()> {
    if args.dry_run && args.submit {
        bail!("--dry-run and --submit are mutually exclusive");
    }

    let mut effective_settings = settings.clone();
    if args.force {
        effective_settings.force_update = true;
    }
    let settings = &effective_settings;

    let transport = Http::new(&settings.rpc_url).context("failed to build RPC transport")?;
    let web3 = web3::Web3::new(transport);
    let reader = orchestrator::evm_reader(web3, settings);

    let end_block = match args.end_block {
        Some(block) => block,
        None => reader
            .fetch_current_block()
            .await
            .context("failed to fetch current block")?,
    };
    let start_block = args
        .start_block
        .unwrap_or_else(|| end_block.saturating_sub(settings.snapshot_block_range));
    let epoch = Epoch::new(args.epoch, start_block, end_block, Utc::now().timestamp());
    if !epoch.is_valid() {
        bail!(
            "epoch {} has an invalid block range [{start_block}, {end_block}]",
            args.epoch
        );
    }

    let users = read_user_addresses(&args.users)?;
    if users.is_empty() {
        bail!("users file {:?} contained no addresses", args.users);
    }

    let storage = build_storage(settings).await?;
    let orchestrator = Orchestrator::new(settings, storage.as_ref());

    // A Ctrl-C only flips the token; the orchestrator checks it between
    // stages, never mid-stage, so every already-started stage still runs
    // to completion.
    let cancellation = CancellationToken::new();
    let watcher = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received ctrl-c, cancelling after the current stage completes");
            watcher.cancel();
        }
    });

    let output = orchestrator
        .run_epoch(&reader, epoch, &users, &cancellation)
        .await?;
    info!(
        epoch = epoch.number,
        recipients = output.distribution.recipient_count(),
        utilization = output.distribution.utilization(),
        "epoch run complete"
    );

    if args.notify_slack {
        slack_notifier::distribution::post_distribution_summary(
            output.distribution.epoch,
            output.distribution.merkle_root,
            output.distribution.recipient_count(),
            output.distribution.total_rewards.to_string(),
            output.distribution.weekly_budget.to_string(),
            output.validation.errors.len(),
            output.validation.warnings.len(),
            args.dry_run,
        )
        .await?;
    }

    if args.dry_run {
        info!("dry run requested, skipping submission");
        return Ok(());
    }
    if !args.submit {
        info!("run complete; pass --submit to broadcast the root on-chain");
        return Ok(());
    }

    let signer_key = settings.signer_secret_key()?;
    let submitter = Submitter::new(reader, signer_key, settings.submitter_confirmations);
    let outcome = orchestrator
        .submit(&submitter, &output.distribution)
        .await?;
    match outcome {
        SubmitOutcome::Submitted { tx_hash } => {
            info!(%tx_hash, "submitted merkle root on-chain");
        }
        SubmitOutcome::AlreadyCurrent => {
            info!("on-chain root already matches the computed root, nothing to submit");
        }
    }
    Ok(())
}
