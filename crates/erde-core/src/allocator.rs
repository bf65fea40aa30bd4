use std::collections::BTreeMap;

use erde_chain::{Address, U256};

use crate::{
    domain::{ChannelSplit, EpochSnapshot, TWADWeight, UserReward},
    error::ErdeError,
};

/// Fixed 40/30/30 split of the weekly budget across debt, stability pool,
/// and LP channels. A policy input the allocator consumes as an immutable
/// configuration;
/// changing it is a deployment concern, not a runtime one.
#[derive(Debug, Clone, Copy)]
pub struct AllocationPolicy {
    pub debt_bps: u64,
    pub stability_pool_bps: u64,
    pub lp_bps: u64,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            debt_bps: 4_000,
            stability_pool_bps: 3_000,
            lp_bps: 3_000,
        }
    }
}

/// Splits `E(w)` into the four channels. The `eco` field immediately
/// absorbs the integer-flooring remainder of the 40/30/30 split, so
/// `ChannelSplit::sum() == weekly_budget` always holds exactly.
pub fn split_budget(weekly_budget: U256, policy: AllocationPolicy) -> ChannelSplit {
    let debt = weekly_budget * U256::from(policy.debt_bps) / U256::from(10_000u64);
    let stability_pool =
        weekly_budget * U256::from(policy.stability_pool_bps) / U256::from(10_000u64);
    let lp_pairs = weekly_budget * U256::from(policy.lp_bps) / U256::from(10_000u64);
    let eco = weekly_budget - debt - stability_pool - lp_pairs;
    ChannelSplit {
        debt,
        lp_pairs,
        stability_pool,
        eco,
    }
}

/// Computes every recipient's payout. `weights` is consumed to honor the
/// stage's documented input contract and to know which addresses
/// participate in each channel; the actual per-user amounts are derived
/// from `snapshot`'s integer totals directly so flooring happens in
/// integer arithmetic rather than through the weight's decimal rounding.
///
/// Rounding remainder policy (decided in DESIGN.md): every channel's
/// unallocated floor remainder, plus the budget-split's own remainder
/// (`ChannelSplit::eco`), is folded into a single residual credited to
/// `treasury`. Because `UserReward` has no dedicated "eco" field, the
/// residual is attributed to the treasury recipient's `debt_reward`
/// component so breakdown consistency still holds for that entry too.
pub fn allocate_rewards(
    snapshot: &EpochSnapshot,
    weights: &[TWADWeight],
    split: &ChannelSplit,
    lp_pools: &[Address],
    treasury: Address,
) -> Result<Vec<UserReward>, ErdeError> {
    if weights.len() != snapshot.users.len() {
        return Err(ErdeError::IntegrityMismatch {
            stage: "allocator",
            detail: "weight count does not match snapshot user count".to_string(),
        });
    }

    let mut rewards: BTreeMap<Address, UserReward> = snapshot
        .users
        .iter()
        .map(|u| {
            (
                u.address,
                UserReward {
                    address: u.address,
                    total_reward: U256::zero(),
                    debt_reward: U256::zero(),
                    lp_rewards: BTreeMap::new(),
                    sp_reward: U256::zero(),
                    proof: Vec::new(),
                },
            )
        })
        .collect();

    let mut residual = U256::zero();

    // Debt channel: proportional to each user's debt weight.
    let (debt_allocations, debt_remainder) =
        floor_allocate(split.debt, snapshot.users.iter().map(|u| (u.address, u.debt)), snapshot.total_debt)?;
    residual = residual.checked_add(debt_remainder).ok_or(overflow("allocator"))?;
    for (address, amount) in debt_allocations {
        let entry = rewards.get_mut(&address).expect("seeded above");
        entry.debt_reward = amount;
        entry.total_reward = entry.total_reward.checked_add(amount).ok_or(overflow("allocator"))?;
    }

    // Stability pool channel: proportional to each user's SP weight.
    let (sp_allocations, sp_remainder) = floor_allocate(
        split.stability_pool,
        snapshot.users.iter().map(|u| (u.address, u.sp_shares)),
        snapshot.total_sp_shares,
    )?;
    residual = residual.checked_add(sp_remainder).ok_or(overflow("allocator"))?;
    for (address, amount) in sp_allocations {
        let entry = rewards.get_mut(&address).expect("seeded above");
        entry.sp_reward = amount;
        entry.total_reward = entry.total_reward.checked_add(amount).ok_or(overflow("allocator"))?;
    }

    // LP channel: the combined slice is split evenly across configured
    // pools first (itself a floor, with its own leftover folded into the
    // residual), then each pool's share is allocated by per-pool weight.
    if !lp_pools.is_empty() {
        let pool_count = U256::from(lp_pools.len() as u64);
        let per_pool_slice = split.lp_pairs / pool_count;
        let pool_split_leftover = split.lp_pairs - per_pool_slice * pool_count;
        residual = residual.checked_add(pool_split_leftover).ok_or(overflow("allocator"))?;

        for pool in lp_pools {
            let pool_total = snapshot
                .total_lp_shares
                .get(pool)
                .copied()
                .unwrap_or(U256::zero());
            let per_user_amounts = snapshot.users.iter().map(|u| {
                (
                    u.address,
                    u.lp_shares.get(pool).copied().unwrap_or(U256::zero()),
                )
            });
            let (allocations, remainder) = floor_allocate(per_pool_slice, per_user_amounts, pool_total)?;
            residual = residual.checked_add(remainder).ok_or(overflow("allocator"))?;
            for (address, amount) in allocations {
                let entry = rewards.get_mut(&address).expect("seeded above");
                entry.lp_rewards.insert(*pool, amount);
                entry.total_reward =
                    entry.total_reward.checked_add(amount).ok_or(overflow("allocator"))?;
            }
        }
    } else {
        residual = residual.checked_add(split.lp_pairs).ok_or(overflow("allocator"))?;
    }

    let total_residual = residual.checked_add(split.eco).ok_or(overflow("allocator"))?;
    if !total_residual.is_zero() {
        let treasury_entry = rewards.entry(treasury).or_insert_with(|| UserReward {
            address: treasury,
            total_reward: U256::zero(),
            debt_reward: U256::zero(),
            lp_rewards: BTreeMap::new(),
            sp_reward: U256::zero(),
            proof: Vec::new(),
        });
        treasury_entry.debt_reward = treasury_entry
            .debt_reward
            .checked_add(total_residual)
            .ok_or(overflow("allocator"))?;
        treasury_entry.total_reward = treasury_entry
            .total_reward
            .checked_add(total_residual)
            .ok_or(overflow("allocator"))?;
    }

    Ok(rewards.into_values().collect())
}

/// `slice * amount_u / total`, floored, for every `(address, amount)` pair,
/// plus the channel's leftover after every floor is summed.
fn floor_allocate(
    slice: U256,
    amounts: impl Iterator<Item = (Address, U256)>,
    total: U256,
) -> Result<(Vec<(Address, U256)>, U256), ErdeError> {
    if total.is_zero() || slice.is_zero() {
        return Ok((Vec::new(), slice));
    }
    let mut allocations = Vec::new();
    let mut allocated = U256::zero();
    for (address, amount) in amounts {
        if amount.is_zero() {
            continue;
        }
        let product = slice
            .checked_mul(amount)
            .ok_or_else(|| overflow("allocator"))?;
        let share = product / total;
        allocated = allocated.checked_add(share).ok_or_else(|| overflow("allocator"))?;
        allocations.push((address, share));
    }
    let remainder = slice
        .checked_sub(allocated)
        .ok_or_else(|| overflow("allocator"))?;
    Ok((allocations, remainder))
}

fn overflow(stage: &'static str) -> ErdeError {
    ErdeError::IntegrityMismatch {
        stage,
        detail: "U256 arithmetic overflow during allocation".to_string(),
    }
}
