//! Weekly-cadence automation: runs one epoch on a cron schedule instead
//! of a human invoking `erde run` by hand, tracking which epoch was last
//! processed in a small state file so a restart resumes rather than
//! reprocessing or skipping.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use erde_chain::{ChainReader, SubmitOutcome, Submitter};
use serde::{Deserialize, Serialize};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use web3::transports::Http;

use crate::{
    cli::{build_storage, read_user_addresses},
    domain::Epoch,
    orchestrator::{self, Orchestrator},
    settings::Settings,
};

/// A unit of work the scheduler can run on a fixed cadence: a name for
/// logging, and one fallible tick.
#[async_trait]
pub trait Schedulable: Send + Sync {
    fn name(&self) -> &'static str;
    async fn tick(&self, cancellation: &CancellationToken) -> Result<bool>;
}

/// Tracks the last epoch the scheduler successfully committed, persisted
/// to disk so a process restart doesn't reprocess or skip an epoch.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    pub last_processed_epoch: Option<u64>,
    pub consecutive_failures: u32,
}

impl SchedulerState {
    pub fn load_or_default(path: &Path) -> Self {
        std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self).context("failed to serialize scheduler state")?;
        std::fs::write(path, contents).context("failed to persist scheduler state")
    }

    fn next_epoch_number(&self) -> u64 {
        self.last_processed_epoch.map_or(1, |e| e + 1)
    }
}

/// The scheduled unit of work: run the next epoch, and submit unless
/// `dry_run` is set. One [`EpochJob`] is reused across every tick; its
/// state file is the only thing that changes between ticks.
pub struct EpochJob {
    settings: Settings,
    users_file: PathBuf,
    state_file: PathBuf,
    dry_run: bool,
    notify_slack: bool,
}

impl EpochJob {
    pub fn new(
        settings: Settings,
        users_file: PathBuf,
        state_file: PathBuf,
        dry_run: bool,
        notify_slack: bool,
    ) -> Self {
        Self {
            settings,
            users_file,
            state_file,
            dry_run,
            notify_slack,
        }
    }
}

#[async_trait]
impl Schedulable for EpochJob {
    fn name(&self) -> &'static str {
        "epoch-run"
    }

    /// Runs one epoch if a new one is due. Returns `Ok(false)` (not an
    /// error) when there's nothing new to do yet — "no new rewards to
    /// process" is a normal outcome, not a failure.
    async fn tick(&self, cancellation: &CancellationToken) -> Result<bool> {
        let mut state = SchedulerState::load_or_default(&self.state_file);

        let transport = Http::new(&self.settings.rpc_url).context("failed to build RPC transport")?;
        let web3 = web3::Web3::new(transport);
        let reader = orchestrator::evm_reader(web3, &self.settings);

        let current_block = reader
            .fetch_current_block()
            .await
            .context("failed to fetch current block")?;
        let end_block = current_block;
        let start_block = end_block.saturating_sub(self.settings.snapshot_block_range);
        let epoch_number = state.next_epoch_number();
        let epoch = Epoch::new(epoch_number, start_block, end_block, Utc::now().timestamp());
        if !epoch.is_valid() {
            info!(epoch = epoch_number, "chain has not advanced far enough for a new epoch yet");
            return Ok(false);
        }

        let users = read_user_addresses(&self.users_file)?;
        let storage = build_storage(&self.settings).await?;
        let orchestrator = Orchestrator::new(&self.settings, storage.as_ref());

        let result = orchestrator
            .run_epoch(&reader, epoch, &users, cancellation)
            .await;

        match result {
            Ok(output) => {
                if self.dry_run {
                    info!(epoch = epoch_number, "dry run: skipping submission");
                } else {
                    let signer_key = self.settings.signer_secret_key()?;
                    let submitter =
                        Submitter::new(reader, signer_key, self.settings.submitter_confirmations);
                    match orchestrator.submit(&submitter, &output.distribution).await? {
                        SubmitOutcome::Submitted { tx_hash } => {
                            info!(epoch = epoch_number, %tx_hash, "submitted merkle root on-chain");
                        }
                        SubmitOutcome::AlreadyCurrent => {
                            info!(epoch = epoch_number, "root already current on-chain");
                        }
                    }
                }

                if self.notify_slack {
                    slack_notifier::distribution::post_distribution_summary(
                        output.distribution.epoch,
                        output.distribution.merkle_root,
                        output.distribution.recipient_count(),
                        output.distribution.total_rewards.to_string(),
                        output.distribution.weekly_budget.to_string(),
                        output.validation.errors.len(),
                        output.validation.warnings.len(),
                        self.dry_run,
                    )
                    .await?;
                }

                state.last_processed_epoch = Some(epoch_number);
                state.consecutive_failures = 0;
                state.save(&self.state_file)?;
                metrics::counter!("erde_scheduler_runs_succeeded").increment(1);
                Ok(true)
            }
            Err(err) => {
                state.consecutive_failures += 1;
                state.save(&self.state_file)?;
                metrics::counter!("erde_scheduler_runs_failed").increment(1);
                if state.consecutive_failures > 0 && state.consecutive_failures % 10 == 0 {
                    error!(
                        epoch = epoch_number,
                        failures = state.consecutive_failures,
                        "scheduler has failed {} consecutive times",
                        state.consecutive_failures
                    );
                }
                Err(err)
            }
        }
    }
}

/// Starts a `tokio_cron_scheduler::JobScheduler` running `job` on `cron_expr`
/// (six-field: sec min hour day-of-month month day-of-week) until a Ctrl-C
/// is observed, at which point it shuts down after the in-flight tick (if
/// any) completes.
pub async fn run_scheduler(job: EpochJob, cron_expr: &str) -> Result<()> {
    let job = std::sync::Arc::new(job);
    let cancellation = CancellationToken::new();

    let scheduler = JobScheduler::new().await.context("failed to start job scheduler")?;

    let tick_job = job.clone();
    let tick_cancellation = cancellation.clone();
    let cron_job = Job::new_async(cron_expr, move |_uuid, _scheduler| {
        let job = tick_job.clone();
        let cancellation = tick_cancellation.clone();
        Box::pin(async move {
            info!(job = job.name(), "scheduler tick starting");
            match job.tick(&cancellation).await {
                Ok(true) => info!(job = job.name(), "scheduler tick processed a new epoch"),
                Ok(false) => info!(job = job.name(), "scheduler tick found nothing new to process"),
                Err(err) => warn!(job = job.name(), %err, "scheduler tick failed, will retry next cadence"),
            }
        })
    })
    .context("failed to build cron job")?;

    scheduler.add(cron_job).await.context("failed to register cron job")?;
    scheduler.start().await.context("failed to start job scheduler")?;

    info!(cron = cron_expr, "scheduler running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("received ctrl-c, shutting down scheduler");
    cancellation.cancel();
    scheduler.shutdown().await.context("failed to shut down job scheduler")?;
    Ok(())
}
