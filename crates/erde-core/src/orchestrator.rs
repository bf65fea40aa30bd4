use std::time::Instant;

use anyhow::{Context, Result, bail};
use erde_chain::{ChainReader, EvmChainReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use web3::Transport;

use crate::{
    aggregator, allocator,
    allocator::AllocationPolicy,
    budget,
    domain::{Epoch, RewardDistribution},
    error::ErdeError,
    export,
    merkle,
    settings::Settings,
    storage::ArtifactStorage,
    validator,
    weights,
};

/// Ties the pipeline stages together end to end: config is `settings`;
/// snapshot through submit runs sequentially within one call. There is no
/// long-lived shared mutable state — one `run` is one epoch.
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    storage: &'a dyn ArtifactStorage,
}

/// Everything a completed (but not necessarily submitted) run produced,
/// for the CLI layer to inspect, export, or hand to the submitter.
pub struct RunOutput {
    pub distribution: RewardDistribution,
    pub validation: validator::ValidationResult,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a Settings, storage: &'a dyn ArtifactStorage) -> Self {
        Self { settings, storage }
    }

    /// Runs Snapshot → TWAD weights → Budget → Allocate → Merkle → Validate,
    /// persisting every stage's artifact as it completes. Does not submit;
    /// callers decide whether/when to invoke the submitter separately, since
    /// submission is the one irreversible step in the pipeline.
    ///
    /// `cancellation` is checked between stages only, never mid-stage (spec
    /// §5 "Cancellation and timeouts" — a signal aborts after the current
    /// stage completes, never mid-mutation). A cancelled run leaves every
    /// artifact written so far on disk for inspection, same as any other
    /// abort path.
    pub async fn run_epoch(
        &self,
        reader: &(impl ChainReader + ?Sized),
        epoch: Epoch,
        users: &[erde_chain::Address],
        cancellation: &CancellationToken,
    ) -> Result<RunOutput> {
        let span = tracing::info_span!("epoch", epoch = epoch.number);
        let _guard = span.enter();

        if !epoch.is_valid() {
            bail!("epoch {} has an invalid block range", epoch.number);
        }

        let lp_pools = self.settings.lp_token_addresses();
        let treasury = self.settings.treasury();

        let start = Instant::now();
        info!("building epoch snapshot");
        let snapshot = aggregator::build_epoch_snapshot(
            reader,
            epoch,
            &lp_pools,
            users,
            self.settings.aggregator_concurrency,
        )
        .await?;
        metrics::histogram!("erde_stage_duration_seconds", "stage" => "snapshot")
            .record(start.elapsed().as_secs_f64());
        metrics::gauge!("erde_snapshot_user_count").set(snapshot.users.len() as f64);
        self.persist_csv("snapshot", &export::csv::snapshot_csv(&snapshot, &lp_pools)?)
            .await?;
        bail_if_cancelled(cancellation, "snapshot")?;

        let start = Instant::now();
        info!("computing TWAD weights");
        let weights = weights::compute_weights(&snapshot)?;
        metrics::histogram!("erde_stage_duration_seconds", "stage" => "weights")
            .record(start.elapsed().as_secs_f64());
        self.persist_csv("weights", &export::csv::weights_csv(&weights, &lp_pools)?)
            .await?;
        bail_if_cancelled(cancellation, "weights")?;

        let start = Instant::now();
        info!("fetching weekly budget");
        let weekly_budget = budget::fetch_weekly_budget(reader, epoch.number).await?;
        metrics::histogram!("erde_stage_duration_seconds", "stage" => "budget")
            .record(start.elapsed().as_secs_f64());
        bail_if_cancelled(cancellation, "budget")?;

        let start = Instant::now();
        info!("allocating channel rewards");
        let policy = AllocationPolicy::default();
        let split = allocator::split_budget(weekly_budget, policy);
        let rewards = allocator::allocate_rewards(&snapshot, &weights, &split, &lp_pools, treasury)?;
        metrics::histogram!("erde_stage_duration_seconds", "stage" => "allocate")
            .record(start.elapsed().as_secs_f64());
        bail_if_cancelled(cancellation, "allocate")?;

        let start = Instant::now();
        info!("building merkle commitment");
        let (root, recipients) = merkle::build_distribution(rewards, weekly_budget)?;
        metrics::histogram!("erde_stage_duration_seconds", "stage" => "merkle")
            .record(start.elapsed().as_secs_f64());

        let total_rewards = recipients
            .iter()
            .fold(erde_chain::U256::zero(), |acc, r| acc + r.total_reward);
        let distribution = RewardDistribution {
            epoch: epoch.number,
            merkle_root: root,
            total_rewards,
            recipients,
            weekly_budget,
            timestamp: epoch.timestamp,
        };
        self.persist_csv("rewards", &export::csv::rewards_csv(&distribution, &lp_pools)?)
            .await?;
        self.persist_json("merkle", &export::merkle_json(&distribution, true)?)
            .await?;

        info!("validating distribution");
        let validation = validator::validate(&distribution, self.settings.max_reward_deviation);
        metrics::gauge!("erde_validation_error_count").set(validation.errors.len() as f64);
        metrics::gauge!("erde_validation_warning_count").set(validation.warnings.len() as f64);
        for warning in &validation.warnings {
            warn!(warning, "validation warning");
        }

        let summary = export::summary_text(&distribution, &validation);
        self.persist_text("summary", &summary).await?;

        if !validation.valid {
            return Err(ErdeError::ValidationFail {
                errors: validation.errors.clone(),
            }
            .into());
        }

        Ok(RunOutput {
            distribution,
            validation,
        })
    }

    /// Runs the submitter against an already-validated distribution (spec
    /// §4.H). Separate from `run_epoch` so a `--dry-run` CLI invocation can
    /// build and validate without ever touching the signing path.
    pub async fn submit<T: Transport + Send + Sync>(
        &self,
        submitter: &erde_chain::Submitter<T>,
        distribution: &RewardDistribution,
    ) -> Result<erde_chain::SubmitOutcome>
    where
        T::Out: Send,
    {
        submitter
            .submit(distribution.epoch, distribution.merkle_root, self.settings.force_update)
            .await
            .map_err(ErdeError::from)
            .context("submission failed")
    }

    async fn persist_csv(&self, stage: &str, contents: &str) -> Result<()> {
        let name = match stage {
            "snapshot" => &self.settings.filenames.snapshot_csv,
            "weights" => &self.settings.filenames.weights_csv,
            "rewards" => &self.settings.filenames.rewards_csv,
            other => bail!("unknown csv artifact stage {other}"),
        };
        self.storage.save(name, contents.as_bytes()).await
    }

    async fn persist_json(&self, stage: &str, contents: &str) -> Result<()> {
        let name = match stage {
            "merkle" => &self.settings.filenames.merkle_json,
            other => bail!("unknown json artifact stage {other}"),
        };
        self.storage.save(name, contents.as_bytes()).await
    }

    async fn persist_text(&self, stage: &str, contents: &str) -> Result<()> {
        let name = match stage {
            "summary" => &self.settings.filenames.summary_txt,
            other => bail!("unknown text artifact stage {other}"),
        };
        self.storage.save(name, contents.as_bytes()).await
    }
}

/// `EvmChainReader` convenience constructor used by the CLI layer — kept
/// separate from the generic `Orchestrator` so tests can drive it against
/// `MockChainReader` without touching `web3::Transport`.
pub fn evm_reader<T: Transport + Send + Sync>(
    web3: web3::Web3<T>,
    settings: &Settings,
) -> EvmChainReader<T>
where
    T::Out: Send,
{
    EvmChainReader::new(
        web3,
        erde_chain::ChainAddresses {
            vault: settings.vault_address(),
            stability_pool: settings.stability_pool_address(),
            reward_distributor: settings.reward_distributor_address(),
            emission_manager: settings.emission_manager_address(),
            lp_tokens: settings.lp_token_addresses(),
        },
    )
}

fn bail_if_cancelled(cancellation: &CancellationToken, completed_stage: &str) -> Result<()> {
    if cancellation.is_cancelled() {
        bail!("run cancelled after the {completed_stage} stage completed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use erde_chain::{MockChainReader, U256, UserSnapshot};
    use tempfile::tempdir;

    use super::*;
    use crate::{
        settings::{ArtifactFilenames, Settings, StorageBackend},
        storage::LocalFileStorage,
    };

    fn addr(n: u64) -> erde_chain::Address {
        erde_chain::Address::from_low_u64_be(n)
    }

    fn test_settings(output_dir: &str) -> Settings {
        Settings {
            rpc_url: "http://localhost:8545".to_string(),
            vault: format!("{:#x}", addr(1)),
            stability_pool: format!("{:#x}", addr(2)),
            reward_distributor: format!("{:#x}", addr(3)),
            emission_manager: format!("{:#x}", addr(4)),
            lp_tokens: vec![],
            snapshot_block_range: 7_200,
            output_dir: output_dir.to_string(),
            filenames: ArtifactFilenames::default(),
            max_reward_deviation: 0.01,
            admin_private_key: "0x0000000000000000000000000000000000000000000000000000000000000001"
                .to_string(),
            force_update: false,
            treasury_address: format!("{:#x}", addr(999)),
            aggregator_concurrency: 8,
            submitter_confirmations: 1,
            storage_backend: StorageBackend::LocalFile,
            aws: None,
        }
    }

    #[tokio::test]
    async fn run_epoch_persists_every_artifact_and_validates() {
        let dir = tempdir().unwrap();
        let settings = test_settings(dir.path().to_str().unwrap());
        let storage = LocalFileStorage::new(dir.path().to_path_buf());
        let orchestrator = Orchestrator::new(&settings, &storage);

        let mut mock = MockChainReader::new();
        mock.expect_fetch_user_snapshot().returning(move |u, _| {
            Ok(UserSnapshot {
                address: u,
                debt: U256::from(100u64),
                lp_shares: BTreeMap::new(),
                sp_shares: U256::zero(),
                timestamp: 0,
            })
        });
        mock.expect_fetch_weekly_budget()
            .returning(|_| Ok(U256::from(1_000u64)));

        let epoch = Epoch::new(1, 100, 7_300, 0);
        let cancellation = CancellationToken::new();
        let output = orchestrator
            .run_epoch(&mock, epoch, &[addr(42)], &cancellation)
            .await
            .unwrap();

        assert!(output.validation.valid);
        assert_eq!(output.distribution.total_rewards, U256::from(1_000u64));
        assert!(dir.path().join(&settings.filenames.snapshot_csv).exists());
        assert!(dir.path().join(&settings.filenames.merkle_json).exists());
    }

    #[tokio::test]
    async fn rejects_an_epoch_with_an_inverted_block_range() {
        let dir = tempdir().unwrap();
        let settings = test_settings(dir.path().to_str().unwrap());
        let storage = LocalFileStorage::new(dir.path().to_path_buf());
        let orchestrator = Orchestrator::new(&settings, &storage);
        let mock = MockChainReader::new();

        let epoch = Epoch::new(1, 200, 100, 0);
        let cancellation = CancellationToken::new();
        let result = orchestrator
            .run_epoch(&mock, epoch, &[], &cancellation)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn a_cancellation_observed_before_the_run_aborts_after_the_snapshot_stage() {
        let dir = tempdir().unwrap();
        let settings = test_settings(dir.path().to_str().unwrap());
        let storage = LocalFileStorage::new(dir.path().to_path_buf());
        let orchestrator = Orchestrator::new(&settings, &storage);

        let mut mock = MockChainReader::new();
        mock.expect_fetch_user_snapshot().returning(move |u, _| {
            Ok(UserSnapshot {
                address: u,
                debt: U256::from(100u64),
                lp_shares: BTreeMap::new(),
                sp_shares: U256::zero(),
                timestamp: 0,
            })
        });

        let epoch = Epoch::new(1, 100, 7_300, 0);
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let result = orchestrator
            .run_epoch(&mock, epoch, &[addr(42)], &cancellation)
            .await;
        assert!(result.is_err());
        // The snapshot artifact was still persisted before the cancellation
        // was observed — partial progress stays on disk for post-mortem.
        assert!(dir.path().join(&settings.filenames.snapshot_csv).exists());
    }
}
