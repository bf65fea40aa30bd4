//! Command surface: `run`, `export`, `inspect`, `verify`. Each subcommand
//! is its own module, mirroring the shape of a single dispatch enum over
//! per-command argument structs rather than one flat argument list.

pub mod export;
pub mod inspect;
pub mod run;
pub mod scheduler;
pub mod verify;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::{
    settings::{Settings, StorageBackend},
    storage::{ArtifactStorage, LocalFileStorage, S3Storage},
};

#[derive(Debug, Subcommand)]
pub enum ErdeCommand {
    /// Run one epoch end to end: snapshot through validation, optionally
    /// submitting the resulting root on-chain.
    Run(run::RunArgs),
    /// Re-export a persisted artifact in another format.
    Export(export::ExportArgs),
    /// Print a persisted artifact to stdout.
    Inspect(inspect::InspectArgs),
    /// Reload a persisted distribution and re-verify its Merkle proofs and
    /// validation checks without touching the chain.
    Verify(verify::VerifyArgs),
    /// Run automatically on a weekly cron cadence instead of a one-off
    /// invocation.
    Scheduler(scheduler::SchedulerArgs),
}

impl ErdeCommand {
    pub async fn try_into_execute(self, settings: &Settings) -> Result<()> {
        match self {
            ErdeCommand::Run(args) => run::execute(args, settings).await,
            ErdeCommand::Export(args) => export::execute(args, settings).await,
            ErdeCommand::Inspect(args) => inspect::execute(args, settings).await,
            ErdeCommand::Verify(args) => verify::execute(args, settings).await,
            ErdeCommand::Scheduler(args) => scheduler::execute(args, settings).await,
        }
    }
}

/// Builds the storage backend a settings file selects. Shared by every
/// subcommand that reads or writes artifacts, so `run`, `export`,
/// `inspect`, and `verify` all agree on where artifacts live.
pub(crate) async fn build_storage(settings: &Settings) -> Result<Box<dyn ArtifactStorage>> {
    match settings.storage_backend {
        StorageBackend::LocalFile => Ok(Box::new(LocalFileStorage::new(PathBuf::from(
            &settings.output_dir,
        )))),
        StorageBackend::S3 => {
            let aws = settings
                .aws
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage_backend = s3 requires an [aws] section"))?;
            Ok(Box::new(S3Storage::new(aws).await?))
        }
    }
}

/// Reads one checksummed address per line, skipping blank lines and `#`
/// comments, for the `--users` file the `run` command takes — the
/// snapshot stage needs the explicit contributor set, since the engine
/// has no independent way to enumerate every address with a position.
pub(crate) fn read_user_addresses(path: &std::path::Path) -> Result<Vec<erde_chain::Address>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read users file {path:?}: {e}"))?;
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            erde_chain::types::parse_checksummed_address(line)
                .map_err(|e| anyhow::anyhow!("malformed address {line:?} in users file: {e}"))
        })
        .collect()
}
