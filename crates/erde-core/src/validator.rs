use std::collections::BTreeSet;

use erde_chain::{Address, U256};
use serde::Serialize;
use tabled::Tabled;

use crate::{domain::RewardDistribution, merkle::MAX_RECIPIENTS};

/// Output of §4.G validation. Errors block submission; warnings surface on
/// the operations dashboard but never gate it.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: ValidationSummary,
}

/// The structured summary operations dashboards read. `Tabled` lets the
/// CLI render it as a table the same way worker summaries print elsewhere
/// in this codebase.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ValidationSummary {
    pub epoch: u64,
    pub recipient_count: usize,
    pub total_rewards: String,
    pub weekly_budget: String,
    pub utilization_pct: String,
}

/// Runs every §4.G check against a built distribution. Never mutates
/// `distribution` — validation is read-only by contract.
pub fn validate(
    distribution: &RewardDistribution,
    max_reward_deviation: f64,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // 1. totalRewards <= weeklyBudget
    if distribution.total_rewards > distribution.weekly_budget {
        errors.push(format!(
            "total_rewards {} exceeds weekly_budget {}",
            distribution.total_rewards, distribution.weekly_budget
        ));
    }

    // 2. mass balance: sum of recipient totals == totalRewards
    let recipients_sum = distribution
        .recipients
        .iter()
        .fold(U256::zero(), |acc, r| acc + r.total_reward);
    if recipients_sum != distribution.total_rewards {
        errors.push(format!(
            "sum of recipient totals {recipients_sum} does not equal total_rewards {}",
            distribution.total_rewards
        ));
    }

    // 3. root well-formed: a [u8; 32] is well-formed by construction, but
    // the all-zero root is never a legitimate commitment.
    if distribution.merkle_root == [0u8; 32] {
        errors.push("merkle root is the zero hash".to_string());
    }

    // 4. recipient count in [1, 2^20]
    let count = distribution.recipients.len();
    if count == 0 {
        errors.push("recipient list is empty".to_string());
    } else if count > MAX_RECIPIENTS {
        errors.push(format!(
            "recipient count {count} exceeds capacity {MAX_RECIPIENTS}"
        ));
    }

    // 5. no duplicate addresses
    let mut seen: BTreeSet<Address> = BTreeSet::new();
    for r in &distribution.recipients {
        if !seen.insert(r.address) {
            errors.push(format!("duplicate recipient address {:#x}", r.address));
            break;
        }
    }

    // 6. every recipient has a non-empty proof, except the single-recipient
    // case where the OpenZeppelin tree's root *is* the sole leaf hash and
    // the proof is legitimately empty.
    if count > 1 {
        for r in &distribution.recipients {
            if r.proof.is_empty() {
                errors.push(format!("recipient {:#x} has an empty proof", r.address));
                break;
            }
        }
    }

    // 7. per-recipient breakdown consistency
    for r in &distribution.recipients {
        if !r.breakdown_is_consistent() {
            errors.push(format!(
                "recipient {:#x} breakdown {} does not equal total_reward {}",
                r.address,
                r.breakdown_sum(),
                r.total_reward
            ));
            break;
        }
    }

    // Warning: utilization below threshold.
    if !distribution.weekly_budget.is_zero() {
        let threshold = apply_deviation(distribution.weekly_budget, max_reward_deviation);
        if distribution.total_rewards < threshold {
            warnings.push(format!(
                "utilization {} is below the {:.2}% deviation threshold of weekly_budget {}",
                distribution.total_rewards,
                max_reward_deviation * 100.0,
                distribution.weekly_budget
            ));
        }
    }

    // Warning: zero-reward recipients.
    let zero_count = distribution
        .recipients
        .iter()
        .filter(|r| r.total_reward.is_zero())
        .count();
    if zero_count > 0 {
        warnings.push(format!("{zero_count} recipient(s) have a zero total_reward"));
    }

    let summary = ValidationSummary {
        epoch: distribution.epoch,
        recipient_count: count,
        total_rewards: distribution.total_rewards.to_string(),
        weekly_budget: distribution.weekly_budget.to_string(),
        utilization_pct: format!("{:.4}", distribution.utilization() * 100.0),
    };

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        summary,
    }
}

/// `(1 - deviation) * budget`, done in integer arithmetic via a basis-point
/// approximation so the threshold itself never touches a float.
fn apply_deviation(budget: U256, deviation: f64) -> U256 {
    let deviation_bps = (deviation * 10_000.0).round().clamp(0.0, 10_000.0) as u64;
    let retained_bps = 10_000u64.saturating_sub(deviation_bps);
    budget * U256::from(retained_bps) / U256::from(10_000u64)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::UserReward;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn reward(n: u64, amount: u64, proof: Vec<[u8; 32]>) -> UserReward {
        UserReward {
            address: addr(n),
            total_reward: U256::from(amount),
            debt_reward: U256::from(amount),
            lp_rewards: BTreeMap::new(),
            sp_reward: U256::zero(),
            proof,
        }
    }

    fn base_distribution(recipients: Vec<UserReward>, budget: u64) -> RewardDistribution {
        let total = recipients
            .iter()
            .fold(U256::zero(), |acc, r| acc + r.total_reward);
        RewardDistribution {
            epoch: 1,
            merkle_root: [1u8; 32],
            total_rewards: total,
            recipients,
            weekly_budget: U256::from(budget),
            timestamp: 0,
        }
    }

    #[test]
    fn a_well_formed_multi_recipient_distribution_is_valid() {
        let dist = base_distribution(
            vec![
                reward(1, 60, vec![[2u8; 32]]),
                reward(2, 40, vec![[3u8; 32]]),
            ],
            100,
        );
        let result = validate(&dist, 0.01);
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn single_recipient_with_empty_proof_is_not_an_error() {
        let dist = base_distribution(vec![reward(1, 100, vec![])], 100);
        let result = validate(&dist, 0.01);
        assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn multi_recipient_with_empty_proof_is_rejected() {
        let dist = base_distribution(
            vec![reward(1, 60, vec![]), reward(2, 40, vec![[3u8; 32]])],
            100,
        );
        let result = validate(&dist, 0.01);
        assert!(!result.valid);
    }

    #[test]
    fn exceeding_budget_is_rejected() {
        let dist = base_distribution(vec![reward(1, 150, vec![])], 100);
        let result = validate(&dist, 0.01);
        assert!(!result.valid);
    }

    #[test]
    fn zero_root_is_rejected() {
        let mut dist = base_distribution(vec![reward(1, 10, vec![])], 100);
        dist.merkle_root = [0u8; 32];
        let result = validate(&dist, 0.01);
        assert!(!result.valid);
    }

    #[test]
    fn low_utilization_is_a_warning_not_an_error() {
        let dist = base_distribution(vec![reward(1, 10, vec![])], 100);
        let result = validate(&dist, 0.01);
        assert!(result.valid);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn zero_reward_recipient_is_a_warning() {
        let dist = base_distribution(
            vec![reward(1, 100, vec![[2u8; 32]]), reward(2, 0, vec![[3u8; 32]])],
            100,
        );
        let result = validate(&dist, 0.01);
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("zero total_reward")));
    }
}
