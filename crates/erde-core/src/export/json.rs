use std::collections::BTreeMap;

use anyhow::{Context, Result};
use erde_chain::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::domain::{RewardDistribution, UserReward};

/// The canonical Merkle JSON document. Big integers serialize as decimal
/// strings, never as JSON numbers, so downstream consumers never lose
/// precision to a float-based JSON parser.
#[derive(Debug, Serialize, Deserialize)]
pub struct MerkleDocument {
    pub epoch: u64,
    #[serde(rename = "merkleRoot")]
    pub merkle_root: String,
    #[serde(rename = "totalRewards")]
    pub total_rewards: String,
    #[serde(rename = "weeklyBudget")]
    pub weekly_budget: String,
    pub timestamp: i64,
    #[serde(rename = "recipientCount")]
    pub recipient_count: usize,
    pub recipients: Vec<MerkleRecipient>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MerkleRecipient {
    pub address: String,
    #[serde(rename = "totalReward")]
    pub total_reward: String,
    #[serde(rename = "debtReward")]
    pub debt_reward: String,
    #[serde(rename = "lpRewards")]
    pub lp_rewards: BTreeMap<String, String>,
    #[serde(rename = "stabilityPoolReward")]
    pub stability_pool_reward: String,
    pub proof: Vec<String>,
}

pub fn to_merkle_document(distribution: &RewardDistribution) -> MerkleDocument {
    MerkleDocument {
        epoch: distribution.epoch,
        merkle_root: format!("0x{}", hex::encode(distribution.merkle_root)),
        total_rewards: distribution.total_rewards.to_string(),
        weekly_budget: distribution.weekly_budget.to_string(),
        timestamp: distribution.timestamp,
        recipient_count: distribution.recipient_count(),
        recipients: distribution
            .recipients
            .iter()
            .map(|r| MerkleRecipient {
                address: format!("{:#x}", r.address),
                total_reward: r.total_reward.to_string(),
                debt_reward: r.debt_reward.to_string(),
                lp_rewards: r
                    .lp_rewards
                    .iter()
                    .map(|(pool, amount): (&Address, &U256)| {
                        (format!("{pool:#x}"), amount.to_string())
                    })
                    .collect(),
                stability_pool_reward: r.sp_reward.to_string(),
                proof: r.proof.iter().map(|p| format!("0x{}", hex::encode(p))).collect(),
            })
            .collect(),
    }
}

pub fn merkle_json(distribution: &RewardDistribution, pretty: bool) -> anyhow::Result<String> {
    let document = to_merkle_document(distribution);
    if pretty {
        Ok(serde_json::to_string_pretty(&document)?)
    } else {
        Ok(serde_json::to_string(&document)?)
    }
}

fn parse_word(hex_str: &str) -> Result<[u8; 32]> {
    let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(trimmed).context("malformed hex word in merkle document")?;
    if bytes.len() != 32 {
        anyhow::bail!("expected a 32-byte word, got {} bytes", bytes.len());
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&bytes);
    Ok(word)
}

/// The inverse of [`to_merkle_document`], used by the `verify` CLI command
/// to reload a persisted artifact without ever touching the chain.
pub fn from_merkle_document(document: &MerkleDocument) -> Result<RewardDistribution> {
    let recipients = document
        .recipients
        .iter()
        .map(|r| {
            let lp_rewards = r
                .lp_rewards
                .iter()
                .map(|(pool, amount)| {
                    let pool = erde_chain::types::parse_checksummed_address(pool)
                        .map_err(|e| anyhow::anyhow!("{e}"))
                        .context("malformed lp pool address in merkle document")?;
                    let amount = U256::from_dec_str(amount)
                        .map_err(|e| anyhow::anyhow!("malformed lp reward amount: {e}"))?;
                    Ok::<_, anyhow::Error>((pool, amount))
                })
                .collect::<Result<BTreeMap<Address, U256>>>()?;
            Ok(UserReward {
                address: erde_chain::types::parse_checksummed_address(&r.address)
                    .map_err(|e| anyhow::anyhow!("{e}"))
                    .context("malformed recipient address in merkle document")?,
                total_reward: U256::from_dec_str(&r.total_reward)
                    .map_err(|e| anyhow::anyhow!("malformed total_reward: {e}"))?,
                debt_reward: U256::from_dec_str(&r.debt_reward)
                    .map_err(|e| anyhow::anyhow!("malformed debt_reward: {e}"))?,
                lp_rewards,
                sp_reward: U256::from_dec_str(&r.stability_pool_reward)
                    .map_err(|e| anyhow::anyhow!("malformed stability_pool_reward: {e}"))?,
                proof: r
                    .proof
                    .iter()
                    .map(|p| parse_word(p))
                    .collect::<Result<Vec<_>>>()?,
            })
        })
        .collect::<Result<Vec<UserReward>>>()?;

    Ok(RewardDistribution {
        epoch: document.epoch,
        merkle_root: parse_word(&document.merkle_root)?,
        total_rewards: U256::from_dec_str(&document.total_rewards)
            .map_err(|e| anyhow::anyhow!("malformed total_rewards: {e}"))?,
        recipients,
        weekly_budget: U256::from_dec_str(&document.weekly_budget)
            .map_err(|e| anyhow::anyhow!("malformed weekly_budget: {e}"))?,
        timestamp: document.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap as Map;

    use crate::domain::UserReward;

    use super::*;

    #[test]
    fn big_integers_serialize_as_strings_not_numbers() {
        let recipient = UserReward {
            address: Address::from_low_u64_be(1),
            total_reward: U256::from(123456789u64),
            debt_reward: U256::from(123456789u64),
            lp_rewards: Map::new(),
            sp_reward: U256::zero(),
            proof: vec![[1u8; 32]],
        };
        let distribution = RewardDistribution {
            epoch: 1,
            merkle_root: [2u8; 32],
            total_rewards: U256::from(123456789u64),
            recipients: vec![recipient],
            weekly_budget: U256::from(200_000_000u64),
            timestamp: 0,
        };
        let json = merkle_json(&distribution, false).unwrap();
        assert!(json.contains("\"totalReward\":\"123456789\""));
        assert!(!json.contains("123456789,"));
    }
}
