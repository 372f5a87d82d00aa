//! Interest Rate Model
//!
//! Two-slope utilization curve and time-proportional accrual, both in
//! parts-per-million and rounded the way the pool validator rounds.

use num_bigint::BigInt;

use crate::constants::scale::{MS_PER_YEAR, ONE_MILLION};
use crate::datums::InterestParams;
use crate::errors::{LendingError, LendingResult};
use crate::math::{big, div_ceil, div_floor, safe_add, to_u64};

/// Utilization after lending `loan_amount` more, in ppm
///
/// `(lent_out + loan_amount) * 1e6 / (balance + lent_out)`, floored to a
/// whole ppm before any slope is applied, so near a curve boundary the rate
/// can sit 1 ppm below what fractional utilization would give.
pub fn utilization_after_loan(loan_amount: u64, lent_out: u64, balance: u64) -> LendingResult<u64> {
    let total = safe_add(balance, lent_out)?;
    if total == 0 {
        return Err(LendingError::InvalidPoolState {
            reason: "pool holds no value",
        });
    }
    let used = big(lent_out) + big(loan_amount);
    to_u64(&div_floor(&(used * big(ONE_MILLION)), &big(total))?)
}

/// Annual rate at a given utilization (ppm)
pub fn rate_at_utilization(curve: &InterestParams, utilization: u64) -> LendingResult<u64> {
    let base = big(curve.base_interest_rate) * big(ONE_MILLION);
    let numerator: BigInt = if utilization <= curve.optimal_utilization {
        base + big(utilization) * big(curve.rslope1)
    } else {
        base + big(curve.rslope1) * big(curve.optimal_utilization)
            + big(utilization - curve.optimal_utilization) * big(curve.rslope2)
    };
    to_u64(&div_floor(&numerator, &big(ONE_MILLION))?)
}

/// Interest rate a new loan of `loan_amount` would be fixed at
///
/// # Arguments
/// * `curve` - Pool interest curve
/// * `loan_amount` - Principal of the new loan
/// * `lent_out` - Pool lent-out before the loan
/// * `balance` - Pool balance before the loan
///
/// # Returns
/// Rate in ppm per year; `InvalidPoolState` for an empty pool
pub fn get_interest_rate(
    curve: &InterestParams,
    loan_amount: u64,
    lent_out: u64,
    balance: u64,
) -> LendingResult<u64> {
    let utilization = utilization_after_loan(loan_amount, lent_out, balance)?;
    rate_at_utilization(curve, utilization)
}

/// Interest owed on `principal` between two POSIX-ms instants
///
/// Rounded up and never below 1. A window that ends before it starts is
/// rejected as `InvalidInput` rather than clamped.
pub fn get_accrued_interest(
    rate: u64,
    principal: u64,
    start_time: i64,
    end_time: i64,
) -> LendingResult<u64> {
    if end_time < start_time {
        return Err(LendingError::InvalidInput {
            param: "end_time",
            reason: "accrual window ends before it starts",
        });
    }
    let elapsed = BigInt::from(end_time) - BigInt::from(start_time);
    let numerator = big(principal) * big(rate) * elapsed;
    let denominator = big(MS_PER_YEAR) * big(ONE_MILLION);
    let interest = to_u64(&div_ceil(&numerator, &denominator)?)?;
    Ok(interest.max(1))
}
