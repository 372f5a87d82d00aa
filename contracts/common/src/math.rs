//! Fixed-Point Math
//!
//! Integer arithmetic matching the on-chain validators bit-for-bit.
//! Intermediates are arbitrary precision (`BigInt`) and every division
//! names its rounding direction; no floating point is used anywhere.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::errors::{LendingError, LendingResult};

/// Lift a `u64` into an arbitrary-precision integer
pub fn big(value: u64) -> BigInt {
    BigInt::from(value)
}

/// Divide rounding toward negative infinity
///
/// `BigInt` division truncates toward zero, so a non-zero remainder whose
/// sign differs from the divisor's moves the quotient down by one.
pub fn div_floor(numerator: &BigInt, denominator: &BigInt) -> LendingResult<BigInt> {
    if denominator.is_zero() {
        return Err(LendingError::DivisionByZero);
    }
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if !remainder.is_zero() && (remainder.is_negative() != denominator.is_negative()) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Divide rounding toward positive infinity
pub fn div_ceil(numerator: &BigInt, denominator: &BigInt) -> LendingResult<BigInt> {
    if denominator.is_zero() {
        return Err(LendingError::DivisionByZero);
    }
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if !remainder.is_zero() && (remainder.is_negative() == denominator.is_negative()) {
        Ok(quotient + 1)
    } else {
        Ok(quotient)
    }
}

/// `floor(a * b / c)`
///
/// # Arguments
/// * `a`, `b` - Factors
/// * `c` - Divisor
///
/// # Returns
/// The floored quotient, or an error on zero divisor / `u64` overflow
pub fn mul_div_floor(a: u64, b: u64, c: u64) -> LendingResult<u64> {
    to_u64(&div_floor(&(big(a) * big(b)), &big(c))?)
}

/// `ceil(a * b / c)`
pub fn mul_div_ceil(a: u64, b: u64, c: u64) -> LendingResult<u64> {
    to_u64(&div_ceil(&(big(a) * big(b)), &big(c))?)
}

/// Narrow an intermediate back to `u64`
///
/// Negative values are a caller-side invariant violation, not an overflow.
pub fn to_u64(value: &BigInt) -> LendingResult<u64> {
    if value.is_negative() {
        return Err(LendingError::InvalidInput {
            param: "amount",
            reason: "computed value is negative",
        });
    }
    value.to_u64().ok_or(LendingError::Overflow)
}

/// Narrow an intermediate to `i64`
pub fn to_i64(value: &BigInt) -> LendingResult<i64> {
    value.to_i64().ok_or(LendingError::Overflow)
}

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> LendingResult<u64> {
    a.checked_add(b).ok_or(LendingError::Overflow)
}

/// Safe subtraction; underflow means the pool datum cannot support the move
pub fn safe_sub(a: u64, b: u64) -> LendingResult<u64> {
    a.checked_sub(b).ok_or(LendingError::InvalidPoolState {
        reason: "subtraction below zero",
    })
}
