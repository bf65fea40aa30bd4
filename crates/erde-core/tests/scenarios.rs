//! Worked scenarios driven through the full pipeline with a mocked chain,
//! one test per scenario rather than one parameterized runner, so each
//! failure names the exact situation that broke.

use std::collections::BTreeMap;

use erde_chain::{Address, ChainFetchError, MockChainReader, SubmitError, U256, UserSnapshot};
use erde_core::{domain::Epoch, error::ErdeError, orchestrator::Orchestrator, settings::{ArtifactFilenames, Settings, StorageBackend}, storage::LocalFileStorage};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn test_settings(output_dir: &str, treasury: Address) -> Settings {
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
        treasury_address: format!("{treasury:#x}"),
        aggregator_concurrency: 8,
        submitter_confirmations: 1,
        storage_backend: StorageBackend::LocalFile,
        aws: None,
    }
}

/// S1: two users, debt only, budget 100 — 60/40 debt weights split 40% of
/// the budget, netting 24 and 16.
#[tokio::test]
async fn s1_two_users_debt_only() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path().to_str().unwrap(), addr(999));
    let storage = LocalFileStorage::new(dir.path().to_path_buf());
    let orchestrator = Orchestrator::new(&settings, &storage);

    let a = addr(1);
    let b = addr(2);
    let mut mock = MockChainReader::new();
    mock.expect_fetch_user_snapshot().returning(move |u, _| {
        let debt = if u == a { U256::from(60u64) } else { U256::from(40u64) };
        Ok(UserSnapshot { address: u, debt, lp_shares: BTreeMap::new(), sp_shares: U256::zero(), timestamp: 0 })
    });
    mock.expect_fetch_weekly_budget().returning(|_| Ok(U256::from(100u64)));

    let epoch = Epoch::new(1, 100, 7_300, 0);
    let cancellation = CancellationToken::new();
    let output = orchestrator.run_epoch(&mock, epoch, &[a, b], &cancellation).await.unwrap();

    let a_reward = output.distribution.recipients.iter().find(|r| r.address == a).unwrap();
    let b_reward = output.distribution.recipients.iter().find(|r| r.address == b).unwrap();
    assert_eq!(a_reward.total_reward, U256::from(24u64));
    assert_eq!(b_reward.total_reward, U256::from(16u64));
    assert!(output.validation.valid);
}

/// S2: two users, one LP pool, debt and stability-pool channels also
/// active, budget 100 — the residual (1) folds into the treasury record.
#[tokio::test]
async fn s2_two_users_all_channels_one_lp_pool() {
    let dir = tempdir().unwrap();
    let treasury = addr(999);
    let mut settings = test_settings(dir.path().to_str().unwrap(), treasury);
    let pool = addr(500);
    settings.lp_tokens = vec![format!("{pool:#x}")];
    let storage = LocalFileStorage::new(dir.path().to_path_buf());
    let orchestrator = Orchestrator::new(&settings, &storage);

    let a = addr(1);
    let b = addr(2);
    let mut mock = MockChainReader::new();
    mock.expect_fetch_user_snapshot().returning(move |u, _| {
        if u == a {
            Ok(UserSnapshot {
                address: u,
                debt: U256::from(1u64),
                lp_shares: BTreeMap::from([(pool, U256::from(3u64))]),
                sp_shares: U256::zero(),
                timestamp: 0,
            })
        } else {
            Ok(UserSnapshot {
                address: u,
                debt: U256::zero(),
                lp_shares: BTreeMap::from([(pool, U256::from(1u64))]),
                sp_shares: U256::from(1u64),
                timestamp: 0,
            })
        }
    });
    mock.expect_fetch_weekly_budget().returning(|_| Ok(U256::from(100u64)));

    let epoch = Epoch::new(1, 100, 7_300, 0);
    let cancellation = CancellationToken::new();
    let output = orchestrator.run_epoch(&mock, epoch, &[a, b], &cancellation).await.unwrap();

    let a_reward = output.distribution.recipients.iter().find(|r| r.address == a).unwrap();
    let b_reward = output.distribution.recipients.iter().find(|r| r.address == b).unwrap();
    let treasury_reward = output.distribution.recipients.iter().find(|r| r.address == treasury).unwrap();
    assert_eq!(a_reward.total_reward, U256::from(62u64));
    assert_eq!(b_reward.total_reward, U256::from(37u64));
    assert_eq!(treasury_reward.total_reward, U256::from(1u64));
    assert!(output.validation.valid);
}

/// S3: a duplicate address in the contributor input is rejected before
/// any reward math happens, never silently double-counted.
#[tokio::test]
async fn s3_duplicate_input_address_is_rejected() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path().to_str().unwrap(), addr(999));
    let storage = LocalFileStorage::new(dir.path().to_path_buf());
    let orchestrator = Orchestrator::new(&settings, &storage);

    let a = addr(1);
    let mut mock = MockChainReader::new();
    mock.expect_fetch_user_snapshot().returning(move |u, _| {
        Ok(UserSnapshot { address: u, debt: U256::from(10u64), lp_shares: BTreeMap::new(), sp_shares: U256::zero(), timestamp: 0 })
    });

    let epoch = Epoch::new(1, 100, 7_300, 0);
    let cancellation = CancellationToken::new();
    let result = orchestrator.run_epoch(&mock, epoch, &[a, a], &cancellation).await;
    assert!(result.is_err());
}

/// S4: re-running the same epoch (same pinned end block) against an
/// unchanged chain state produces byte-identical artifacts — pinning to a
/// block tag is what makes the snapshot stage immune to the chain having
/// moved on between the two reads.
#[tokio::test]
async fn s4_pinned_block_reruns_are_deterministic() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let settings_a = test_settings(dir_a.path().to_str().unwrap(), addr(999));
    let settings_b = test_settings(dir_b.path().to_str().unwrap(), addr(999));
    let storage_a = LocalFileStorage::new(dir_a.path().to_path_buf());
    let storage_b = LocalFileStorage::new(dir_b.path().to_path_buf());
    let orchestrator_a = Orchestrator::new(&settings_a, &storage_a);
    let orchestrator_b = Orchestrator::new(&settings_b, &storage_b);

    let a = addr(1);
    let b = addr(2);
    let make_mock = || {
        let mut mock = MockChainReader::new();
        mock.expect_fetch_user_snapshot().returning(move |u, block_tag| {
            assert_eq!(block_tag, 7_300, "every read in one epoch must pin the same block tag");
            let debt = if u == a { U256::from(60u64) } else { U256::from(40u64) };
            Ok(UserSnapshot { address: u, debt, lp_shares: BTreeMap::new(), sp_shares: U256::zero(), timestamp: 0 })
        });
        mock.expect_fetch_weekly_budget().returning(|_| Ok(U256::from(100u64)));
        mock
    };

    let epoch = Epoch::new(1, 100, 7_300, 0);
    let cancellation = CancellationToken::new();
    let output_a = orchestrator_a.run_epoch(&make_mock(), epoch, &[a, b], &cancellation).await.unwrap();
    let output_b = orchestrator_b.run_epoch(&make_mock(), epoch, &[a, b], &cancellation).await.unwrap();

    assert_eq!(output_a.distribution.merkle_root, output_b.distribution.merkle_root);
    assert_eq!(output_a.distribution.total_rewards, output_b.distribution.total_rewards);
}

/// S5: a resubmission attempt against an on-chain root that already
/// matches the one being submitted collapses into `IdempotenceConflict`
/// only when it *differs*; here we assert the error taxonomy mapping that
/// `Orchestrator::submit` relies on to distinguish the two cases, since
/// driving `Submitter<T>` itself needs a live or fake `web3::Transport`
/// this workspace has no test double for.
#[test]
fn s5_idempotence_conflict_maps_to_its_own_error_variant() {
    let submit_error = SubmitError::IdempotenceConflict {
        epoch: 1,
        existing: "aa".repeat(32),
        submitting: "bb".repeat(32),
    };
    let erde_error: ErdeError = submit_error.into();
    assert!(matches!(erde_error, ErdeError::IdempotenceConflict(_)));
}

/// S6: a signer that isn't the distributor's owner is a distinct,
/// non-retryable failure mode from an idempotence conflict.
#[test]
fn s6_authorization_mismatch_maps_to_its_own_error_variant() {
    let submit_error = SubmitError::AuthorizationMismatch {
        signer: addr(1).into(),
        owner: addr(2).into(),
    };
    let erde_error: ErdeError = submit_error.into();
    assert!(matches!(erde_error, ErdeError::AuthorizationMismatch(_)));
}

/// A transient chain-read failure, once it exhausts its retries, surfaces
/// as `ChainTransient` rather than aborting the whole orchestrator run with
/// an opaque anyhow error — useful alongside S5/S6 to cover the remaining
/// branch of the error taxonomy the tests above don't reach.
#[test]
fn exhausted_transient_chain_error_maps_to_chain_transient() {
    let fetch_error = ChainFetchError {
        attempts: 3,
        source: erde_chain::ChainError::Transport(web3::Error::Decoder("transient".into())),
    };
    let erde_error: ErdeError = fetch_error.into();
    assert!(matches!(erde_error, ErdeError::ChainTransient(_)));
}
