//! Liquidation Model
//!
//! Health check and settlement split for an under-collateralized loan.
//!
//! ```text
//! collateral value (ADA) ──┐
//!                          ├─► health factor = coll * 1e6 / debt / threshold
//! debt + interest (ADA) ───┘            │
//!                                ┌──────┴──────┐
//!                              >= 1           < 1
//!                                │             │
//!                             reject      fee = max(min, floor(surplus * rate / 1e6) + 1)
//!                                              │
//!                                   remaining = coll - debt - fee
//!                                              │
//!                                   > 0 ─► leftover output for the borrower
//!                                  <= 0 ─► protocol keeps it all
//! ```
//!
//! Values of non-ADA assets are taken from oracle price feeds: debt as the
//! ADA needed to buy it back, collateral as the ADA its sale would yield.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::constants::amm::LEFTOVER_ROUNDING_BUFFER;
use crate::constants::scale::ONE_MILLION;
use crate::datums::CollateralPosition;
use crate::errors::{LendingError, LendingResult};
use crate::math::{big, div_floor, safe_add, to_u64};
use crate::pricing::{ada_if_bought, ada_if_sold, asset_gain_ada_sale, PriceFeed};
use crate::types::AssetClass;

/// Settlement figures for one liquidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationQuote {
    /// Interest accrued up to the liquidation
    pub interest: u64,
    pub debt_value: u64,
    pub collateral_value: u64,
    /// Health factor in ppm; below 1_000_000 means liquidatable
    pub health_factor_ppm: u64,
    /// Liquidator fee in ADA terms
    pub fee: u64,
    /// Collateral returned to the borrower, in collateral units
    pub leftover: Option<u64>,
}

/// Health factor scaled to ppm: `floor(coll * 1e12 / (debt * threshold))`
pub fn health_factor_ppm(
    collateral_value: u64,
    debt_value: u64,
    liquidation_threshold: u64,
) -> LendingResult<u64> {
    let numerator = big(collateral_value) * big(ONE_MILLION) * big(ONE_MILLION);
    let denominator = big(debt_value) * big(liquidation_threshold);
    to_u64(&div_floor(&numerator, &denominator)?)
}

/// Exact form of `health_factor < 1`
pub fn is_liquidatable(collateral_value: u64, debt_value: u64, liquidation_threshold: u64) -> bool {
    big(collateral_value) * big(ONE_MILLION) < big(debt_value) * big(liquidation_threshold)
}

/// Liquidator fee: `max(min_fee, floor((coll - debt) * rate / 1e6) + 1)`
///
/// The surplus may be negative for deeply underwater loans, in which case
/// the minimum applies.
pub fn liquidation_fee(
    collateral_value: u64,
    debt_value: u64,
    fee_rate: u64,
    min_fee: u64,
) -> LendingResult<u64> {
    let surplus = big(collateral_value) - big(debt_value);
    let fee = div_floor(&(surplus * big(fee_rate)), &big(ONE_MILLION))? + 1;
    let fee = if fee < big(min_fee) { big(min_fee) } else { fee };
    to_u64(&fee)
}

fn required_feed<'a>(
    asset: &AssetClass,
    feed: Option<&'a PriceFeed>,
) -> LendingResult<&'a PriceFeed> {
    feed.ok_or_else(|| LendingError::OraclePriceUnavailable {
        asset: asset.unit(),
    })
}

/// Value a loan position and decide whether and how it can be liquidated
///
/// # Arguments
/// * `position` - Collateral datum of the loan
/// * `interest` - Interest accrued to the end of the validity window
/// * `loan_feed` - Price feed for a non-ADA loan asset
/// * `collateral_feed` - Price feed for a non-ADA collateral asset
///
/// # Returns
/// The settlement split, or `NotLiquidatable` for a healthy loan
pub fn quote_liquidation(
    position: &CollateralPosition,
    interest: u64,
    loan_feed: Option<&PriceFeed>,
    collateral_feed: Option<&PriceFeed>,
) -> LendingResult<LiquidationQuote> {
    let debt = safe_add(position.loan_amount, interest)?;
    let debt_value = if position.loan_asset.is_ada() {
        debt
    } else {
        ada_if_bought(required_feed(&position.loan_asset, loan_feed)?, &position.loan_asset, debt)?
    };

    let collateral_value = if position.collateral_asset.is_ada() {
        position.collateral_amount
    } else {
        ada_if_sold(
            required_feed(&position.collateral_asset, collateral_feed)?,
            &position.collateral_asset,
            position.collateral_amount,
        )?
    };

    let threshold = position.pool_config.liquidation_threshold;
    let health_factor_ppm = health_factor_ppm(collateral_value, debt_value, threshold)?;
    if !is_liquidatable(collateral_value, debt_value, threshold) {
        return Err(LendingError::NotLiquidatable { health_factor_ppm });
    }

    let fee = liquidation_fee(
        collateral_value,
        debt_value,
        position.pool_config.loan_fee_details.liquidation_fee,
        position.pool_config.min_liquidation_fee,
    )?;

    let remaining: BigInt = big(collateral_value) - big(debt_value) - big(fee);
    let leftover = if remaining > BigInt::zero() {
        let remaining = to_u64(&remaining)?;
        let in_collateral = if position.collateral_asset.is_ada() {
            remaining
        } else {
            let gained = asset_gain_ada_sale(
                required_feed(&position.collateral_asset, collateral_feed)?,
                &position.collateral_asset,
                remaining,
            )?;
            safe_add(gained, LEFTOVER_ROUNDING_BUFFER)?
        };
        Some(in_collateral)
    } else {
        None
    };

    Ok(LiquidationQuote {
        interest,
        debt_value,
        collateral_value,
        health_factor_ppm,
        fee,
        leftover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pool_config;
    use crate::types::PriceSnapshot;

    fn position(loan_amount: u64, collateral_amount: u64) -> CollateralPosition {
        CollateralPosition {
            pool_nft_name: vec![0x50; 28],
            loan_asset: AssetClass::ada(),
            loan_amount,
            pool_config: pool_config(),
            collateral_asset: AssetClass::ada(),
            collateral_amount,
            interest_rate: 50_000,
            deposit_time: 0,
            borrower_token_name: vec![0xbb; 32],
            oracle_collateral_nft: AssetClass::ada(),
            oracle_loan_nft: AssetClass::ada(),
            tag: None,
            lent_out: 0,
            balance: 1_000_000_000,
        }
    }

    #[test]
    fn test_health_factor() {
        // 300 collateral, 100 debt, threshold 2.0 -> 1.5
        assert_eq!(health_factor_ppm(300, 100, 2_000_000).unwrap(), 1_500_000);
        assert!(!is_liquidatable(300, 100, 2_000_000));
        assert!(!is_liquidatable(200, 100, 2_000_000));
        assert!(is_liquidatable(199, 100, 2_000_000));
        assert!(health_factor_ppm(1, 0, 2_000_000).is_err());
    }

    #[test]
    fn test_fee_floor_plus_one() {
        // surplus 100_000_000 at 5% -> 5_000_000 + 1
        assert_eq!(liquidation_fee(200_000_000, 100_000_000, 50_000, 3_000_000).unwrap(), 5_000_001);
        // small surplus takes the minimum
        assert_eq!(liquidation_fee(101_000_000, 100_000_000, 50_000, 3_000_000).unwrap(), 3_000_000);
        // underwater
        assert_eq!(liquidation_fee(90_000_000, 100_000_000, 50_000, 3_000_000).unwrap(), 3_000_000);
        assert_eq!(liquidation_fee(90, 100, 50_000, 0).unwrap(), 0);
    }

    #[test]
    fn test_healthy_loan_rejected() {
        let result = quote_liquidation(&position(100_000_000, 300_000_000), 1, None, None);
        assert!(matches!(result, Err(LendingError::NotLiquidatable { health_factor_ppm }) if health_factor_ppm >= 1_000_000));
    }

    #[test]
    fn test_ada_liquidation_with_leftover() {
        let quote = quote_liquidation(&position(100_000_000, 150_000_000), 1_000_000, None, None).unwrap();
        assert_eq!(quote.debt_value, 101_000_000);
        // floor(49_000_000 * 0.05) + 1
        assert_eq!(quote.fee, 2_450_001.max(3_000_000));
        assert_eq!(quote.leftover, Some(150_000_000 - 101_000_000 - 3_000_000));
    }

    #[test]
    fn test_underwater_leaves_nothing() {
        let quote = quote_liquidation(&position(100_000_000, 90_000_000), 1, None, None).unwrap();
        assert_eq!(quote.leftover, None);
    }

    #[test]
    fn test_native_collateral_leftover_converted() {
        let coll = AssetClass::new(vec![0xcc; 28], b"COLL".to_vec());
        let mut p = position(100_000_000, 1_000_000_000);
        p.collateral_asset = coll.clone();
        // deep pool: 1 token ~ 0.15 ADA
        let feed = PriceFeed::pooled(coll.clone(), PriceSnapshot::new(100_000_000_000, 15_000_000_000), 0);
        let quote = quote_liquidation(&p, 1, None, Some(&feed)).unwrap();
        let remaining = quote.collateral_value - quote.debt_value - quote.fee;
        let expected = asset_gain_ada_sale(&feed, &coll, remaining).unwrap() + LEFTOVER_ROUNDING_BUFFER;
        assert_eq!(quote.leftover, Some(expected));
    }

    #[test]
    fn test_native_asset_without_feed() {
        let mut p = position(100_000_000, 1_000);
        p.loan_asset = AssetClass::new(vec![0xdd; 28], b"LOAN".to_vec());
        assert!(matches!(
            quote_liquidation(&p, 1, None, None),
            Err(LendingError::OraclePriceUnavailable { .. })
        ));
    }
}
