use std::collections::BTreeMap;

use erde_chain::{Address, U256, UserSnapshot};
use serde::{Deserialize, Serialize};

use super::epoch::Epoch;

/// Aggregate of all user snapshots for an epoch, pinned at `endBlock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSnapshot {
    pub epoch: Epoch,
    pub users: Vec<UserSnapshot>,
    pub total_debt: U256,
    pub total_lp_shares: BTreeMap<Address, U256>,
    pub total_sp_shares: U256,
}

impl EpochSnapshot {
    pub fn lp_pools(&self) -> impl Iterator<Item = &Address> {
        self.total_lp_shares.keys()
    }
}
