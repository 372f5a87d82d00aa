//! LP Token Model
//!
//! Share accounting for deposits and withdrawals. Every conversion floors,
//! so the pool can under-credit by at most one unit but never over-mint.

use crate::errors::{LendingError, LendingResult};
use crate::math::{mul_div_floor, safe_add};

fn pool_value(balance: u64, lent_out: u64) -> LendingResult<u64> {
    let total = safe_add(balance, lent_out)?;
    if total == 0 {
        return Err(LendingError::InvalidPoolState {
            reason: "pool holds no value",
        });
    }
    Ok(total)
}

/// LP tokens minted for depositing `deposit_amount`
///
/// `floor(deposit_amount * total_lp / (balance + lent_out))`
pub fn lp_tokens_for_deposit(
    balance: u64,
    lent_out: u64,
    deposit_amount: u64,
    total_lp: u64,
) -> LendingResult<u64> {
    mul_div_floor(deposit_amount, total_lp, pool_value(balance, lent_out)?)
}

/// LP tokens burned for withdrawing `withdraw_amount`; same rounding as deposits
pub fn lp_burn_for_withdraw(
    balance: u64,
    lent_out: u64,
    withdraw_amount: u64,
    total_lp: u64,
) -> LendingResult<u64> {
    mul_div_floor(withdraw_amount, total_lp, pool_value(balance, lent_out)?)
}

/// Underlying redeemed by burning `lp_burn` tokens
///
/// `floor(lp_burn * (balance + lent_out) / total_lp)`
pub fn amount_for_lp_burn(
    lp_burn: u64,
    balance: u64,
    lent_out: u64,
    total_lp: u64,
) -> LendingResult<u64> {
    if total_lp == 0 {
        return Err(LendingError::InvalidPoolState {
            reason: "no LP tokens outstanding",
        });
    }
    mul_div_floor(lp_burn, safe_add(balance, lent_out)?, total_lp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_at_par() {
        assert_eq!(
            lp_tokens_for_deposit(1_000_000, 0, 1_000_000, 1_000_000).unwrap(),
            1_000_000
        );
    }

    #[test]
    fn test_deposit_counts_lent_out() {
        // pool worth 150 with 100 LP outstanding
        assert_eq!(lp_tokens_for_deposit(100, 50, 30, 100).unwrap(), 20);
        assert_eq!(lp_tokens_for_deposit(100, 50, 31, 100).unwrap(), 20);
    }

    #[test]
    fn test_withdraw_symmetry() {
        for (balance, lent, amount, lp) in [(100u64, 50u64, 31u64, 100u64), (7, 3, 9, 13)] {
            assert_eq!(
                lp_burn_for_withdraw(balance, lent, amount, lp).unwrap(),
                lp_tokens_for_deposit(balance, lent, amount, lp).unwrap()
            );
        }
    }

    #[test]
    fn test_round_trip_favors_pool() {
        let states = [
            (1_000_000u64, 0u64, 1_000_000u64),
            (97_000_001, 3_333_333, 88_888_888),
            (13, 29, 7),
            (500_000_000, 250_000_000, 600_000_000),
        ];
        for (balance, lent, total_lp) in states {
            for deposit in [1u64, 7, 999, 1_000_003, 55_555_555] {
                let lp = lp_tokens_for_deposit(balance, lent, deposit, total_lp).unwrap();
                let recovered = amount_for_lp_burn(lp, balance, lent, total_lp).unwrap();
                assert!(recovered <= deposit, "{} > {}", recovered, deposit);
            }
        }
    }

    #[test]
    fn test_empty_pool() {
        assert!(lp_tokens_for_deposit(0, 0, 1, 1).is_err());
        assert!(amount_for_lp_burn(1, 1, 0, 0).is_err());
    }
}
