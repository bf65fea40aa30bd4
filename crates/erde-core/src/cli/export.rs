use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use crate::{
    cli::build_storage,
    export::{self, MerkleDocument, json::from_merkle_document},
    settings::Settings,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    JsonPretty,
}

/// Re-exports a persisted distribution in another format, without
/// recomputing anything.
#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value = "json-pretty")]
    pub format: OutputFormat,

    /// Write to this file instead of stdout.
    #[arg(long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,
}

pub async fn execute(args: ExportArgs, settings: &Settings) -> Result<()> {
    let storage = build_storage(settings).await?;
    let raw = storage.load(&settings.filenames.merkle_json).await?;
    let document: MerkleDocument =
        serde_json::from_slice(&raw).context("merkle.json is not a well-formed merkle document")?;
    let distribution = from_merkle_document(&document)?;

    let lp_pools = settings.lp_token_addresses();
    let rendered = match args.format {
        OutputFormat::Csv => export::csv::rewards_csv(&distribution, &lp_pools)?,
        OutputFormat::Json => export::merkle_json(&distribution, false)?,
        OutputFormat::JsonPretty => export::merkle_json(&distribution, true)?,
    };

    match args.output_file {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("failed to write export to {path:?}"))?;
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
