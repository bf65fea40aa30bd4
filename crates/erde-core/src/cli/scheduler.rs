use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::{
    scheduler::{self, EpochJob},
    settings::Settings,
};

/// Runs the engine automatically on a cron cadence instead of a one-off
/// `erde run` invocation.
#[derive(Debug, Args)]
pub struct SchedulerArgs {
    /// File with one checksummed recipient address per line, read fresh
    /// on every tick.
    #[arg(long, value_name = "FILE")]
    pub users: PathBuf,

    /// Where the scheduler persists the last successfully processed epoch.
    #[arg(long, value_name = "FILE", default_value = "scheduler-state.json")]
    pub state_file: PathBuf,

    /// Cron expression (sec min hour day-of-month month day-of-week).
    /// Defaults to Sunday at 00:00:00 — one reward epoch per week.
    #[arg(long, default_value = "0 0 0 * * Sun")]
    pub cron: String,

    /// Build and validate every tick, but never submit on-chain.
    #[arg(long)]
    pub dry_run: bool,

    /// Post a summary to `ERDE_SLACK_WEBHOOK` after every tick that
    /// processes a new epoch.
    #[arg(long)]
    pub notify_slack: bool,
}

pub async fn execute(args: SchedulerArgs, settings: &Settings) -> Result<()> {
    let job = EpochJob::new(
        settings.clone(),
        args.users,
        args.state_file,
        args.dry_run,
        args.notify_slack,
    );
    scheduler::run_scheduler(job, &args.cron).await
}
