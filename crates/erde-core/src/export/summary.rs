use tabled::{Table, Tabled};

use crate::{domain::RewardDistribution, validator::ValidationResult};

#[derive(Tabled)]
struct TopRecipientRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Total Reward")]
    total_reward: String,
}

/// Human-readable run report, including the top-10 recipients by total
/// reward.
pub fn summary_text(distribution: &RewardDistribution, validation: &ValidationResult) -> String {
    let mut top: Vec<&crate::domain::UserReward> = distribution.recipients.iter().collect();
    top.sort_by(|a, b| b.total_reward.cmp(&a.total_reward));
    let rows: Vec<TopRecipientRow> = top
        .into_iter()
        .take(10)
        .map(|r| TopRecipientRow {
            address: format!("{:#x}", r.address),
            total_reward: r.total_reward.to_string(),
        })
        .collect();
    let table = Table::new(rows).to_string();

    let mut out = String::new();
    out.push_str(&format!("Epoch Reward Distribution — epoch {}\n", distribution.epoch));
    out.push_str(&"=".repeat(48));
    out.push('\n');
    out.push_str(&format!("Merkle root:      0x{}\n", hex::encode(distribution.merkle_root)));
    out.push_str(&format!("Weekly budget:    {}\n", distribution.weekly_budget));
    out.push_str(&format!("Total rewards:    {}\n", distribution.total_rewards));
    out.push_str(&format!("Utilization:      {:.4}%\n", distribution.utilization() * 100.0));
    out.push_str(&format!("Recipient count:  {}\n", distribution.recipient_count()));
    out.push_str(&format!("Validation:       {}\n", if validation.valid { "PASS" } else { "FAIL" }));
    if !validation.errors.is_empty() {
        out.push_str("Errors:\n");
        for e in &validation.errors {
            out.push_str(&format!("  - {e}\n"));
        }
    }
    if !validation.warnings.is_empty() {
        out.push_str("Warnings:\n");
        for w in &validation.warnings {
            out.push_str(&format!("  - {w}\n"));
        }
    }
    out.push('\n');
    out.push_str("Top 10 recipients by total reward:\n");
    out.push_str(&table);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use erde_chain::{Address, U256};

    use super::*;
    use crate::{domain::UserReward, validator};

    #[test]
    fn renders_top_recipients_and_validation_status() {
        let recipients = vec![
            UserReward {
                address: Address::from_low_u64_be(1),
                total_reward: U256::from(60u64),
                debt_reward: U256::from(60u64),
                lp_rewards: BTreeMap::new(),
                sp_reward: U256::zero(),
                proof: vec![[1u8; 32]],
            },
            UserReward {
                address: Address::from_low_u64_be(2),
                total_reward: U256::from(40u64),
                debt_reward: U256::from(40u64),
                lp_rewards: BTreeMap::new(),
                sp_reward: U256::zero(),
                proof: vec![[2u8; 32]],
            },
        ];
        let distribution = RewardDistribution {
            epoch: 7,
            merkle_root: [9u8; 32],
            total_rewards: U256::from(100u64),
            recipients,
            weekly_budget: U256::from(100u64),
            timestamp: 0,
        };
        let validation = validator::validate(&distribution, 0.01);
        let text = summary_text(&distribution, &validation);
        assert!(text.contains("epoch 7"));
        assert!(text.contains("PASS"));
    }
}
