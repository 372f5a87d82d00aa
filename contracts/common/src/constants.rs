//! Protocol Constants
//!
//! Fixed numbers the on-chain validators agree on. Anything a pool can
//! override lives in its `PoolConfig` datum instead; the values in
//! [`defaults`] only seed new pools.

/// Fixed-point scales
pub mod scale {
    /// Rates, utilization and fee tiers are parts-per-million
    pub const ONE_MILLION: u64 = 1_000_000;

    /// Milliseconds in a 365-day year (interest accrual denominator)
    pub const MS_PER_YEAR: u64 = 31_536_000_000;
}

/// Lovelace amounts attached to outputs
pub mod ada {
    /// Minimum ADA carried by a receiver output
    pub const MIN_ADA: u64 = 2_000_000;

    /// Batcher fee recorded in every order datum
    pub const BATCHER_FEE: u64 = 2_000_000;

    /// ADA locked with an order: batcher fee plus returned deposit
    pub const ORDER_DEPOSIT: u64 = 4_000_000;

    /// Order deposit when native collateral must come back in two outputs
    pub const ORDER_DEPOSIT_NATIVE_COLLATERAL: u64 = 7_500_000;
}

/// Constant-product swap parameters used by pooled price feeds
pub mod amm {
    /// Swap fee numerator (0.3% fee)
    pub const FEE_NUMERATOR: u64 = 997;

    /// Swap fee denominator
    pub const FEE_DENOMINATOR: u64 = 1_000;

    /// Extra units added when converting a leftover ADA value back to collateral
    pub const LEFTOVER_ROUNDING_BUFFER: u64 = 10;
}

/// Time windows in POSIX milliseconds
pub mod time {
    /// Validity start is placed this far before "now"
    pub const VALIDITY_LOOKBACK_MS: i64 = 120_000;

    /// Validity window length
    pub const VALIDITY_TTL_MS: i64 = 10 * 60 * 1_000;

    /// Expiry of a price feed submitted for signing
    pub const ORACLE_FEED_TTL_MS: i64 = 14 * 60 * 1_000;

    /// Aggregate timeout for a round of oracle signing requests
    pub const ORACLE_TIMEOUT_MS: u64 = 5_000;

    /// Extra accrual window for delayed repayments merged later by a batcher
    pub const MERGE_GRACE_MS: i64 = 10 * 60 * 1_000;
}

/// Transaction metadata labels
pub mod metadata {
    /// CIP-20 message label
    pub const MESSAGE: u64 = 674;

    /// Loan asset price snapshot attached to borrow orders
    pub const LOAN_PRICE: u64 = 404;

    /// Collateral asset price snapshot attached to borrow orders
    pub const COLLATERAL_PRICE: u64 = 405;

    /// Message attached to direct deposits
    pub const DEPOSIT_MESSAGE: &str = "Lendpool: DEPOSITED to pool.";
}

/// Seed values for new pool configs
pub mod defaults {
    pub const LIQUIDATION_THRESHOLD: u64 = 2_000_000;
    pub const INITIAL_COLLATERAL_RATIO: u64 = 2_100_000;
    pub const POOL_FEE: u64 = 1_000_000;
    pub const MERGE_ACTION_FEE: u64 = 2_000_000;
    pub const MIN_TRANSITION: u64 = 50_000_000;
    pub const MIN_LOAN: u64 = 50_000_000;
    pub const MIN_FEE: u64 = 5_000_000;
    pub const MIN_LIQUIDATION_FEE: u64 = 3_000_000;

    /// Platform fee tiers as (fee, utilization threshold)
    pub const TIER_1: (u64, u64) = (200_000, 0);
    pub const TIER_2: (u64, u64) = (200_000, 150_000);
    pub const TIER_3: (u64, u64) = (200_000, 450_000);

    /// Liquidation fee rate in ppm of the collateral surplus
    pub const LIQUIDATION_FEE: u64 = 50_000;

    /// Platform fee collector payment key hash
    pub const FEE_COLLECTOR_PAYMENT_KEY: &str =
        "0c8b9cc1657e5139be7a331036c5499f0c2dc09fd8680e9773e4a01a";

    /// Platform fee collector stake key hash
    pub const FEE_COLLECTOR_STAKE_KEY: &str =
        "6e0defd3cf3a4307652e956b3ca65789ca5b7836ae5494ebc546ad8a";
}

/// Interest curves as (optimal utilization, base rate, slope 1, slope 2), all ppm
pub mod curves {
    /// Pools lending a native token
    pub const TOKEN_LOAN: (u64, u64, u64, u64) = (450_000, 30_000, 75_000, 3_000_000);

    /// Pools lending ADA
    pub const ADA_LOAN: (u64, u64, u64, u64) = (650_000, 60_000, 200_000, 1_000_000);
}
