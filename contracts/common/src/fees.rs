//! Platform Fee Model
//!
//! Tiered share of paid interest routed to the protocol collector.

use crate::constants::scale::ONE_MILLION;
use crate::datums::LoanFeeDetails;
use crate::errors::{LendingError, LendingResult};
use crate::math::{mul_div_floor, safe_add};

/// Platform fee rate (ppm of interest) for a loan against current pool state
///
/// Utilization here is the loan's share of total pool value, not the pool
/// utilization used by the interest curve.
pub fn get_platform_fee(
    loan_amount: u64,
    balance: u64,
    lent_out: u64,
    tiers: &LoanFeeDetails,
) -> LendingResult<u64> {
    let total = safe_add(lent_out, balance)?;
    if total == 0 {
        return Err(LendingError::InvalidPoolState {
            reason: "pool holds no value",
        });
    }
    let utilization = mul_div_floor(loan_amount, ONE_MILLION, total)?;
    let fee = if utilization < tiers.tier_1_threshold {
        tiers.tier_1_fee
    } else if utilization < tiers.tier_2_threshold {
        tiers.tier_2_fee
    } else {
        tiers.tier_3_fee
    };
    Ok(fee)
}

/// Amount of loan asset owed to the collector: `floor(interest * fee / 1e6)`
pub fn platform_fee_amount(interest: u64, fee_rate: u64) -> LendingResult<u64> {
    mul_div_floor(interest, fee_rate, ONE_MILLION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn tiers() -> LoanFeeDetails {
        LoanFeeDetails {
            tier_1_fee: 100_000,
            tier_1_threshold: 100_000,
            tier_2_fee: 200_000,
            tier_2_threshold: 300_000,
            tier_3_fee: 300_000,
            tier_3_threshold: 500_000,
            liquidation_fee: 50_000,
            platform_fee_collector: Address::key(vec![1; 28], None),
        }
    }

    #[test]
    fn test_tier_boundaries() {
        let t = tiers();
        // utilization 50_000
        assert_eq!(get_platform_fee(5, 100, 0, &t).unwrap(), 100_000);
        // exactly on tier 1 threshold falls through to tier 2
        assert_eq!(get_platform_fee(10, 100, 0, &t).unwrap(), 200_000);
        assert_eq!(get_platform_fee(29, 50, 50, &t).unwrap(), 200_000);
        assert_eq!(get_platform_fee(30, 50, 50, &t).unwrap(), 300_000);
        assert_eq!(get_platform_fee(90, 100, 0, &t).unwrap(), 300_000);
    }

    #[test]
    fn test_zero_denominator() {
        assert!(get_platform_fee(1, 0, 0, &tiers()).is_err());
    }

    #[test]
    fn test_fee_amount_floors() {
        assert_eq!(platform_fee_amount(1_000, 200_000).unwrap(), 200);
        assert_eq!(platform_fee_amount(4, 200_000).unwrap(), 0);
        assert_eq!(platform_fee_amount(0, 200_000).unwrap(), 0);
    }
}
