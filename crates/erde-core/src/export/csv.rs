use erde_chain::Address;
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::{
    domain::{EpochSnapshot, RewardDistribution, TWADWeight},
    weights::format_weight_18dp,
};

fn zero_weight() -> BigRational {
    BigRational::from_integer(BigInt::from(0))
}

/// Snapshot CSV: one row per user.
pub fn snapshot_csv(snapshot: &EpochSnapshot, lp_pools: &[Address]) -> anyhow::Result<String> {
    let mut header = vec!["Address".to_string(), "Debt".to_string(), "Stability Pool Shares".to_string()];
    for pool in lp_pools {
        header.push(format!("LP Pool ({:#x})", pool));
    }
    header.push("Timestamp".to_string());

    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(&header)?;
    for user in &snapshot.users {
        let mut row = vec![
            format!("{:#x}", user.address),
            user.debt.to_string(),
            user.sp_shares.to_string(),
        ];
        for pool in lp_pools {
            let share = user.lp_shares.get(pool).copied().unwrap_or_default();
            row.push(share.to_string());
        }
        row.push(iso8601(user.timestamp));
        wtr.write_record(&row)?;
    }
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

/// Weights CSV: every weight formatted at 18 decimal places.
pub fn weights_csv(weights: &[TWADWeight], lp_pools: &[Address]) -> anyhow::Result<String> {
    let mut header = vec!["Address".to_string(), "Debt Weight".to_string(), "Stability Pool Weight".to_string()];
    for pool in lp_pools {
        header.push(format!("LP Pool ({:#x}) Weight", pool));
    }

    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(&header)?;
    for w in weights {
        let mut row = vec![
            format!("{:#x}", w.address),
            format_weight_18dp(&w.debt_weight),
            format_weight_18dp(&w.sp_weight),
        ];
        for pool in lp_pools {
            let weight = w.lp_weights.get(pool).cloned().unwrap_or_else(zero_weight);
            row.push(format_weight_18dp(&weight));
        }
        wtr.write_record(&row)?;
    }
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

/// Rewards CSV: per-recipient breakdown plus proof length.
pub fn rewards_csv(distribution: &RewardDistribution, lp_pools: &[Address]) -> anyhow::Result<String> {
    let mut header = vec![
        "Address".to_string(),
        "Total Reward".to_string(),
        "Debt Reward".to_string(),
        "Stability Pool Reward".to_string(),
    ];
    for pool in lp_pools {
        header.push(format!("LP Reward ({:#x})", pool));
    }
    header.push("Proof Length".to_string());

    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(&header)?;
    for r in &distribution.recipients {
        let mut row = vec![
            format!("{:#x}", r.address),
            r.total_reward.to_string(),
            r.debt_reward.to_string(),
            r.sp_reward.to_string(),
        ];
        for pool in lp_pools {
            let amount = r.lp_rewards.get(pool).copied().unwrap_or_default();
            row.push(amount.to_string());
        }
        row.push(r.proof.len().to_string());
        wtr.write_record(&row)?;
    }
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn iso8601(unix_seconds: i64) -> String {
    chrono::DateTime::from_timestamp(unix_seconds, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use erde_chain::{U256, UserSnapshot};

    use super::*;
    use crate::domain::Epoch;

    #[test]
    fn snapshot_csv_has_one_header_and_one_data_row_per_user() {
        let user = UserSnapshot {
            address: Address::from_low_u64_be(1),
            debt: U256::from(10u64),
            lp_shares: BTreeMap::new(),
            sp_shares: U256::zero(),
            timestamp: 0,
        };
        let snapshot = EpochSnapshot {
            epoch: Epoch::new(1, 0, 1, 0),
            users: vec![user],
            total_debt: U256::from(10u64),
            total_lp_shares: BTreeMap::new(),
            total_sp_shares: U256::zero(),
        };
        let csv = snapshot_csv(&snapshot, &[]).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.starts_with("Address,Debt,Stability Pool Shares"));
    }
}
