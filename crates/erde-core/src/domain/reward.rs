use std::collections::BTreeMap;

use erde_chain::{Address, U256};
use serde::{Deserialize, Serialize};

/// Per-epoch split of the weekly budget across channels.
/// `debt + lp_pairs + stability_pool + eco == E(w)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSplit {
    pub debt: U256,
    pub lp_pairs: U256,
    pub stability_pool: U256,
    pub eco: U256,
}

impl ChannelSplit {
    pub fn sum(&self) -> U256 {
        self.debt + self.lp_pairs + self.stability_pool + self.eco
    }
}

/// A recipient's payout. `total_reward` is an identity over the breakdown,
/// not a derived approximation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReward {
    pub address: Address,
    pub total_reward: U256,
    pub debt_reward: U256,
    pub lp_rewards: BTreeMap<Address, U256>,
    pub sp_reward: U256,
    pub proof: Vec<[u8; 32]>,
}

impl UserReward {
    pub fn breakdown_sum(&self) -> U256 {
        self.debt_reward
            + self.sp_reward
            + self
                .lp_rewards
                .values()
                .fold(U256::zero(), |acc, v| acc + *v)
    }

    pub fn breakdown_is_consistent(&self) -> bool {
        self.breakdown_sum() == self.total_reward
    }
}

/// The epoch's final artifact, committed on-chain once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDistribution {
    pub epoch: u64,
    pub merkle_root: [u8; 32],
    pub total_rewards: U256,
    pub recipients: Vec<UserReward>,
    pub weekly_budget: U256,
    pub timestamp: i64,
}

impl RewardDistribution {
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    pub fn utilization(&self) -> f64 {
        if self.weekly_budget.is_zero() {
            return 0.0;
        }
        // Diagnostic-only float division, via decimal strings so it never
        // panics on amounts wider than a machine word; never feeds the root
        // or any budget-safety check.
        let total: f64 = self.total_rewards.to_string().parse().unwrap_or(f64::INFINITY);
        let budget: f64 = self.weekly_budget.to_string().parse().unwrap_or(f64::INFINITY);
        total / budget
    }
}
