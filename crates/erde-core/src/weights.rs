use std::collections::BTreeMap;

use erde_chain::{Address, U256};
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::{
    domain::{EpochSnapshot, TWADWeight},
    error::ErdeError,
};

/// Tolerance for the sum-to-unity check: `1e-10`.
fn sum_to_unity_tolerance() -> BigRational {
    BigRational::new(BigInt::from(1), BigInt::from(10_000_000_000u64))
}

fn zero() -> BigRational {
    BigRational::from_integer(BigInt::from(0))
}

fn one() -> BigRational {
    BigRational::from_integer(BigInt::from(1))
}

/// Computes one [`TWADWeight`] per user: `weight_u,c = a_u,c / T_c` when
/// `T_c > 0`, else `0`. Uses an arbitrary-precision rational (`BigInt`
/// numerator and denominator) rather than a fixed-precision decimal or
/// IEEE-754 float, since a chain-scale total (U256, up to 78 digits) would
/// otherwise overflow a fixed-digit type well before the channel's real
/// total supply does.
pub fn compute_weights(snapshot: &EpochSnapshot) -> Result<Vec<TWADWeight>, ErdeError> {
    let total_debt = u256_to_bigint(snapshot.total_debt);
    let total_sp = u256_to_bigint(snapshot.total_sp_shares);
    let total_lp: BTreeMap<Address, BigInt> = snapshot
        .total_lp_shares
        .iter()
        .map(|(pool, total)| (*pool, u256_to_bigint(*total)))
        .collect();

    let mut weights = Vec::with_capacity(snapshot.users.len());
    let mut debt_sum = zero();
    let mut sp_sum = zero();
    let mut lp_sums: BTreeMap<Address, BigRational> =
        total_lp.keys().map(|p| (*p, zero())).collect();

    for user in &snapshot.users {
        let debt_weight = weight_of(u256_to_bigint(user.debt), &total_debt)?;
        debt_sum = debt_sum + debt_weight.clone();

        let sp_weight = weight_of(u256_to_bigint(user.sp_shares), &total_sp)?;
        sp_sum = sp_sum + sp_weight.clone();

        let mut lp_weights = BTreeMap::new();
        for (pool, pool_total) in &total_lp {
            let amount = user
                .lp_shares
                .get(pool)
                .copied()
                .map(u256_to_bigint)
                .unwrap_or_else(|| BigInt::from(0));
            let w = weight_of(amount, pool_total)?;
            let pool_sum = lp_sums.get_mut(pool).expect("seeded above");
            *pool_sum = pool_sum.clone() + w.clone();
            lp_weights.insert(*pool, w);
        }

        weights.push(TWADWeight {
            address: user.address,
            debt_weight,
            lp_weights,
            sp_weight,
        });
    }

    let tolerance = sum_to_unity_tolerance();
    assert_sum_to_unity("debt", &total_debt, &debt_sum, &tolerance)?;
    assert_sum_to_unity("stability_pool", &total_sp, &sp_sum, &tolerance)?;
    for (pool, sum) in &lp_sums {
        assert_sum_to_unity("lp", &total_lp[pool], sum, &tolerance)?;
    }

    Ok(weights)
}

fn weight_of(amount: BigInt, total: &BigInt) -> Result<BigRational, ErdeError> {
    if *total == BigInt::from(0) {
        return Ok(zero());
    }
    let weight = BigRational::new(amount, total.clone());
    if weight < zero() || weight > one() {
        return Err(ErdeError::IntegrityMismatch {
            stage: "weight_calculator",
            detail: format!("weight {weight} out of bounds [0, 1]"),
        });
    }
    Ok(weight)
}

fn assert_sum_to_unity(
    channel: &str,
    total: &BigInt,
    sum: &BigRational,
    tolerance: &BigRational,
) -> Result<(), ErdeError> {
    if *total == BigInt::from(0) {
        return Ok(());
    }
    let one = one();
    let deviation = if *sum >= one { sum - &one } else { &one - sum };
    if deviation >= *tolerance {
        return Err(ErdeError::IntegrityMismatch {
            stage: "weight_calculator",
            detail: format!(
                "{channel} channel weights sum to {sum}, deviating from 1 by {deviation} \
                 (tolerance {tolerance})"
            ),
        });
    }
    Ok(())
}

fn u256_to_bigint(value: U256) -> BigInt {
    value
        .to_string()
        .parse::<BigInt>()
        .expect("U256 decimal string is always a valid BigInt")
}

/// Renders a weight in `[0, 1]` as a fixed 18-decimal-place string, the
/// same precision the rest of the pipeline uses for on-chain amounts.
/// `BigRational`'s `Display` prints `numer/denom`, which isn't suitable
/// for a CSV column.
pub fn format_weight_18dp(weight: &BigRational) -> String {
    let scale: BigInt = "1000000000000000000".parse().expect("valid literal");
    let scaled = (weight.numer() * &scale) / weight.denom();
    let digits = scaled.to_str_radix(10);
    let padded = if digits.len() <= 18 {
        format!("{digits:0>19}")
    } else {
        digits
    };
    let split_at = padded.len() - 18;
    format!("{}.{}", &padded[..split_at], &padded[split_at..])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap as Map;

    use erde_chain::UserSnapshot;

    use super::*;
    use crate::domain::Epoch;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn sole_holder_gets_exactly_unit_weight() {
        let user = UserSnapshot {
            address: addr(1),
            debt: U256::from(100u64),
            lp_shares: Map::new(),
            sp_shares: U256::zero(),
            timestamp: 0,
        };
        let snapshot = EpochSnapshot {
            epoch: Epoch::new(1, 0, 1, 0),
            users: vec![user],
            total_debt: U256::from(100u64),
            total_lp_shares: Map::new(),
            total_sp_shares: U256::zero(),
        };
        let weights = compute_weights(&snapshot).unwrap();
        assert_eq!(weights[0].debt_weight, one());
        assert_eq!(weights[0].sp_weight, zero());
    }

    #[test]
    fn empty_snapshot_is_valid_and_empty() {
        let snapshot = EpochSnapshot {
            epoch: Epoch::new(1, 0, 1, 0),
            users: vec![],
            total_debt: U256::zero(),
            total_lp_shares: Map::new(),
            total_sp_shares: U256::zero(),
        };
        let weights = compute_weights(&snapshot).unwrap();
        assert!(weights.is_empty());
    }

    #[test]
    fn two_user_debt_weights_sum_to_one() {
        let a = UserSnapshot {
            address: addr(1),
            debt: U256::from(60u64),
            lp_shares: Map::new(),
            sp_shares: U256::zero(),
            timestamp: 0,
        };
        let b = UserSnapshot {
            address: addr(2),
            debt: U256::from(40u64),
            lp_shares: Map::new(),
            sp_shares: U256::zero(),
            timestamp: 0,
        };
        let snapshot = EpochSnapshot {
            epoch: Epoch::new(1, 0, 1, 0),
            users: vec![a, b],
            total_debt: U256::from(100u64),
            total_lp_shares: Map::new(),
            total_sp_shares: U256::zero(),
        };
        let weights = compute_weights(&snapshot).unwrap();
        let sum = &weights[0].debt_weight + &weights[1].debt_weight;
        assert_eq!(sum, one());
    }

    /// A total supply far beyond any fixed-precision decimal's ~28-digit
    /// ceiling (here ~58 digits) must still produce a valid weight instead
    /// of halting the pipeline with an integrity error.
    #[test]
    fn totals_far_beyond_decimal_precision_still_compute() {
        let huge = U256::from(10u64).pow(U256::from(58u64));
        let user = UserSnapshot {
            address: addr(1),
            debt: huge,
            lp_shares: Map::new(),
            sp_shares: U256::zero(),
            timestamp: 0,
        };
        let snapshot = EpochSnapshot {
            epoch: Epoch::new(1, 0, 1, 0),
            users: vec![user],
            total_debt: huge,
            total_lp_shares: Map::new(),
            total_sp_shares: U256::zero(),
        };
        let weights = compute_weights(&snapshot).unwrap();
        assert_eq!(weights[0].debt_weight, one());
    }

    #[test]
    fn formats_weight_at_eighteen_decimal_places() {
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        assert_eq!(format_weight_18dp(&half), "0.500000000000000000");
        assert_eq!(format_weight_18dp(&one()), "1.000000000000000000");
        assert_eq!(format_weight_18dp(&zero()), "0.000000000000000000");
    }
}
