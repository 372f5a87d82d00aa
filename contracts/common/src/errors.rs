//! Error Types for the Lending Protocol SDK
//!
//! Every failure an operation can hit is one variant of [`LendingError`].
//! Operation boundaries convert these into a failed `BuilderResponse`;
//! nothing here is ever surfaced as a panic.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for SDK operations
pub type LendingResult<T> = Result<T, LendingError>;

/// Main error enum for all SDK failures
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum LendingError {
    // ============ Lookup Errors ============
    /// No output carries the pool identity token
    #[error("pool not found: {pool_nft_name}")]
    PoolNotFound { pool_nft_name: String },

    /// Batcher order output is missing from the ledger
    #[error("order not found: {out_ref}")]
    OrderNotFound { out_ref: String },

    /// Collateral (loan) output is missing from the ledger
    #[error("collateral output not found: {out_ref}")]
    CollateralNotFound { out_ref: String },

    /// Pool config output is missing from the ledger
    #[error("pool config not found: {config_nft_name}")]
    ConfigNotFound { config_nft_name: String },

    // ============ Protocol Rule Errors ============
    /// Amount is below the pool's configured minimum
    #[error("amount {amount} below protocol minimum {minimum}")]
    BelowProtocolMinimum { amount: u64, minimum: u64 },

    /// Requested loan exceeds what the pool holds
    #[error("pool balance {available} cannot cover {requested}")]
    InsufficientPoolBalance { available: u64, requested: u64 },

    /// Realized rate is above the order's ceiling
    #[error("interest rate {rate} exceeds order maximum {max_rate}")]
    InterestRateExceeded { rate: u64, max_rate: u64 },

    /// Position is healthy and cannot be liquidated
    #[error("loan is not liquidatable (health factor {health_factor_ppm} ppm)")]
    NotLiquidatable { health_factor_ppm: u64 },

    /// Pool datum cannot support the requested computation
    #[error("invalid pool state: {reason}")]
    InvalidPoolState { reason: &'static str },

    // ============ Oracle Errors ============
    /// No valid signed price attestation could be collected
    #[error("oracle price unavailable for {asset}")]
    OraclePriceUnavailable { asset: String },

    // ============ Codec Errors ============
    /// Datum does not match any known schema
    #[error("datum shape not recognized: {expected}")]
    InvalidDatumShape { expected: &'static str },

    /// CBOR encoding or decoding failed
    #[error("cbor codec failure: {0}")]
    Codec(String),

    // ============ External Errors ============
    /// Propagated verbatim from the ledger client
    #[error("ledger rejected request: {0}")]
    LedgerRejection(String),

    /// HTTP transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Deployment configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    // ============ Input and Math Errors ============
    /// Caller supplied an invalid parameter
    #[error("invalid input {param}: {reason}")]
    InvalidInput {
        param: &'static str,
        reason: &'static str,
    },

    /// Arithmetic overflow
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,
}

impl LendingError {
    /// Get error code for logging and client-side matching
    pub fn code(&self) -> &'static str {
        match self {
            // Lookup errors (1xx)
            LendingError::PoolNotFound { .. } => "E101_POOL_NOT_FOUND",
            LendingError::OrderNotFound { .. } => "E102_ORDER_NOT_FOUND",
            LendingError::CollateralNotFound { .. } => "E103_COLLATERAL_NOT_FOUND",
            LendingError::ConfigNotFound { .. } => "E104_CONFIG_NOT_FOUND",

            // Protocol rule errors (2xx)
            LendingError::BelowProtocolMinimum { .. } => "E201_BELOW_PROTOCOL_MINIMUM",
            LendingError::InsufficientPoolBalance { .. } => "E202_INSUFFICIENT_POOL_BALANCE",
            LendingError::InterestRateExceeded { .. } => "E203_INTEREST_RATE_EXCEEDED",
            LendingError::NotLiquidatable { .. } => "E204_NOT_LIQUIDATABLE",
            LendingError::InvalidPoolState { .. } => "E205_INVALID_POOL_STATE",

            // Oracle errors (3xx)
            LendingError::OraclePriceUnavailable { .. } => "E301_ORACLE_PRICE_UNAVAILABLE",

            // Codec errors (4xx)
            LendingError::InvalidDatumShape { .. } => "E401_INVALID_DATUM_SHAPE",
            LendingError::Codec(_) => "E402_CODEC",

            // External errors (5xx)
            LendingError::LedgerRejection(_) => "E501_LEDGER_REJECTION",
            LendingError::Network(_) => "E502_NETWORK",
            LendingError::Config(_) => "E503_CONFIG",

            // Input and math errors (9xx)
            LendingError::InvalidInput { .. } => "E901_INVALID_INPUT",
            LendingError::Overflow => "E902_OVERFLOW",
            LendingError::DivisionByZero => "E903_DIVISION_BY_ZERO",
        }
    }

    /// Check if re-invoking the operation against fresh chain state may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LendingError::InsufficientPoolBalance { .. }
                | LendingError::InterestRateExceeded { .. }
                | LendingError::OraclePriceUnavailable { .. }
                | LendingError::LedgerRejection(_)
                | LendingError::Network(_)
                | LendingError::PoolNotFound { .. }
        )
    }
}

impl From<std::io::Error> for LendingError {
    fn from(err: std::io::Error) -> Self {
        LendingError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for LendingError {
    fn from(err: serde_json::Error) -> Self {
        LendingError::Config(err.to_string())
    }
}

impl From<hex::FromHexError> for LendingError {
    fn from(err: hex::FromHexError) -> Self {
        LendingError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            LendingError::PoolNotFound { pool_nft_name: String::new() },
            LendingError::OrderNotFound { out_ref: String::new() },
            LendingError::CollateralNotFound { out_ref: String::new() },
            LendingError::ConfigNotFound { config_nft_name: String::new() },
            LendingError::BelowProtocolMinimum { amount: 1, minimum: 2 },
            LendingError::InsufficientPoolBalance { available: 1, requested: 2 },
            LendingError::InterestRateExceeded { rate: 2, max_rate: 1 },
            LendingError::NotLiquidatable { health_factor_ppm: 1_000_000 },
            LendingError::InvalidPoolState { reason: "" },
            LendingError::OraclePriceUnavailable { asset: String::new() },
            LendingError::InvalidDatumShape { expected: "" },
            LendingError::Codec(String::new()),
            LendingError::LedgerRejection(String::new()),
            LendingError::Network(String::new()),
            LendingError::Config(String::new()),
            LendingError::InvalidInput { param: "", reason: "" },
            LendingError::Overflow,
            LendingError::DivisionByZero,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_display_carries_amounts() {
        let err = LendingError::BelowProtocolMinimum {
            amount: 10,
            minimum: 50_000_000,
        };
        assert_eq!(err.to_string(), "amount 10 below protocol minimum 50000000");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(LendingError::LedgerRejection("stale input".into()).is_recoverable());
        assert!(!LendingError::InvalidDatumShape { expected: "order" }.is_recoverable());
        assert!(!LendingError::Overflow.is_recoverable());
    }
}
