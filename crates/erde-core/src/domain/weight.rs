use std::collections::BTreeMap;

use erde_chain::Address;
use num_rational::BigRational;

/// A user's fractional share within each channel. Each component is `>= 0`
/// and `<= 1`; per-channel weights sum to 1 across
/// all users whenever that channel's total is non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TWADWeight {
    pub address: Address,
    pub debt_weight: BigRational,
    pub lp_weights: BTreeMap<Address, BigRational>,
    pub sp_weight: BigRational,
}
