use anyhow::{Result, bail};
use clap::{Args, ValueEnum};

use crate::{cli::build_storage, settings::Settings};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Artifact {
    Snapshot,
    Weights,
    Rewards,
    Merkle,
    Summary,
}

/// Prints a persisted artifact from the configured storage backend
/// verbatim, without reinterpreting it.
#[derive(Debug, Args)]
pub struct InspectArgs {
    #[arg(value_enum)]
    pub artifact: Artifact,
}

pub async fn execute(args: InspectArgs, settings: &Settings) -> Result<()> {
    let storage = build_storage(settings).await?;
    let name = match args.artifact {
        Artifact::Snapshot => &settings.filenames.snapshot_csv,
        Artifact::Weights => &settings.filenames.weights_csv,
        Artifact::Rewards => &settings.filenames.rewards_csv,
        Artifact::Merkle => &settings.filenames.merkle_json,
        Artifact::Summary => &settings.filenames.summary_txt,
    };
    if !storage.exists(name).await? {
        bail!("no {name} artifact found under the configured storage backend");
    }
    let contents = storage.load(name).await?;
    println!("{}", String::from_utf8_lossy(&contents));
    Ok(())
}
