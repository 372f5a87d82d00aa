//! On-chain Datums
//!
//! Schemas of every datum the SDK reads or writes. Field order is the
//! wire order; decoders are strict and reject foreign shapes.

use crate::errors::{LendingError, LendingResult};
use crate::math::{safe_add, safe_sub};
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};
use crate::types::{Address, AssetClass, OutputReference};

// ============ Pool ============

/// Immutable parameters fixed at pool creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolParams {
    /// Address where loan collateral is locked
    pub collateral_address: Address,
    pub loan_asset: AssetClass,
    pub collateral_asset: AssetClass,
    /// Oracle NFT pricing the collateral asset
    pub oracle_collateral_nft: AssetClass,
    /// Oracle NFT pricing the loan asset
    pub oracle_loan_nft: AssetClass,
    pub lp_token: AssetClass,
    /// Pool identity token name (also the pool stake script hash)
    pub pool_nft_name: Vec<u8>,
    /// Pool config token name
    pub pool_config_name: Vec<u8>,
}

impl ToPlutusData for PoolParams {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.collateral_address.to_plutus_data(),
                self.loan_asset.to_plutus_data(),
                self.collateral_asset.to_plutus_data(),
                self.oracle_collateral_nft.to_plutus_data(),
                self.oracle_loan_nft.to_plutus_data(),
                self.lp_token.to_plutus_data(),
                PlutusData::bytes(&self.pool_nft_name),
                PlutusData::bytes(&self.pool_config_name),
            ],
        )
    }
}

impl FromPlutusData for PoolParams {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 8, "pool params")?;
        Ok(Self {
            collateral_address: Address::from_plutus_data(&f[0])?,
            loan_asset: AssetClass::from_plutus_data(&f[1])?,
            collateral_asset: AssetClass::from_plutus_data(&f[2])?,
            oracle_collateral_nft: AssetClass::from_plutus_data(&f[3])?,
            oracle_loan_nft: AssetClass::from_plutus_data(&f[4])?,
            lp_token: AssetClass::from_plutus_data(&f[5])?,
            pool_nft_name: f[6].as_bytes()?.to_vec(),
            pool_config_name: f[7].as_bytes()?.to_vec(),
        })
    }
}

/// Pool datum, replaced wholesale by every settling transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub params: PoolParams,
    pub balance: u64,
    pub lent_out: u64,
    pub total_lp_tokens: u64,
}

impl PoolState {
    /// Successor after lending `loan` out of the pool
    pub fn after_borrow(&self, loan: u64, pool_fee: u64) -> LendingResult<Self> {
        Ok(Self {
            balance: safe_add(safe_sub(self.balance, loan)?, pool_fee)?,
            lent_out: safe_add(self.lent_out, loan)?,
            ..self.clone()
        })
    }

    /// Successor after a loan of `loan` is closed with `interest` paid
    ///
    /// Shared by repayment, liquidation and delayed merges.
    pub fn after_loan_closed(&self, loan: u64, interest: u64, pool_fee: u64) -> LendingResult<Self> {
        Ok(Self {
            balance: safe_add(safe_add(safe_add(self.balance, loan)?, interest)?, pool_fee)?,
            lent_out: safe_sub(self.lent_out, loan)?,
            ..self.clone()
        })
    }

    /// Successor after `amount` is deposited for `lp_minted` LP tokens
    pub fn after_deposit(&self, amount: u64, lp_minted: u64, pool_fee: u64) -> LendingResult<Self> {
        Ok(Self {
            balance: safe_add(safe_add(self.balance, amount)?, pool_fee)?,
            total_lp_tokens: safe_add(self.total_lp_tokens, lp_minted)?,
            ..self.clone()
        })
    }

    /// Successor after `amount` is withdrawn burning `lp_burned` LP tokens
    pub fn after_withdraw(&self, amount: u64, lp_burned: u64, pool_fee: u64) -> LendingResult<Self> {
        Ok(Self {
            balance: safe_add(safe_sub(self.balance, amount)?, pool_fee)?,
            total_lp_tokens: safe_sub(self.total_lp_tokens, lp_burned)?,
            ..self.clone()
        })
    }

    /// Balance plus outstanding loans
    pub fn total_value(&self) -> LendingResult<u64> {
        safe_add(self.balance, self.lent_out)
    }
}

impl ToPlutusData for PoolState {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.params.to_plutus_data(),
                PlutusData::int(self.balance),
                PlutusData::int(self.lent_out),
                PlutusData::int(self.total_lp_tokens),
            ],
        )
    }
}

impl FromPlutusData for PoolState {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 4, "pool datum")?;
        Ok(Self {
            params: PoolParams::from_plutus_data(&f[0])?,
            balance: f[1].as_u64()?,
            lent_out: f[2].as_u64()?,
            total_lp_tokens: f[3].as_u64()?,
        })
    }
}

// ============ Pool Config ============

/// Two-slope utilization curve, all values ppm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestParams {
    pub optimal_utilization: u64,
    pub base_interest_rate: u64,
    pub rslope1: u64,
    pub rslope2: u64,
}

impl InterestParams {
    pub fn from_tuple((optimal_utilization, base_interest_rate, rslope1, rslope2): (u64, u64, u64, u64)) -> Self {
        Self {
            optimal_utilization,
            base_interest_rate,
            rslope1,
            rslope2,
        }
    }
}

impl ToPlutusData for InterestParams {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::int(self.optimal_utilization),
                PlutusData::int(self.base_interest_rate),
                PlutusData::int(self.rslope1),
                PlutusData::int(self.rslope2),
            ],
        )
    }
}

impl FromPlutusData for InterestParams {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 4, "interest params")?;
        Ok(Self {
            optimal_utilization: f[0].as_u64()?,
            base_interest_rate: f[1].as_u64()?,
            rslope1: f[2].as_u64()?,
            rslope2: f[3].as_u64()?,
        })
    }
}

/// Platform fee tiers, liquidation fee rate and fee collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanFeeDetails {
    pub tier_1_fee: u64,
    pub tier_1_threshold: u64,
    pub tier_2_fee: u64,
    pub tier_2_threshold: u64,
    pub tier_3_fee: u64,
    pub tier_3_threshold: u64,
    pub liquidation_fee: u64,
    pub platform_fee_collector: Address,
}

impl ToPlutusData for LoanFeeDetails {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::int(self.tier_1_fee),
                PlutusData::int(self.tier_1_threshold),
                PlutusData::int(self.tier_2_fee),
                PlutusData::int(self.tier_2_threshold),
                PlutusData::int(self.tier_3_fee),
                PlutusData::int(self.tier_3_threshold),
                PlutusData::int(self.liquidation_fee),
                self.platform_fee_collector.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for LoanFeeDetails {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 8, "loan fee details")?;
        Ok(Self {
            tier_1_fee: f[0].as_u64()?,
            tier_1_threshold: f[1].as_u64()?,
            tier_2_fee: f[2].as_u64()?,
            tier_2_threshold: f[3].as_u64()?,
            tier_3_fee: f[4].as_u64()?,
            tier_3_threshold: f[5].as_u64()?,
            liquidation_fee: f[6].as_u64()?,
            platform_fee_collector: Address::from_plutus_data(&f[7])?,
        })
    }
}

/// Pool config datum, referenced (not spent) by normal operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub liquidation_threshold: u64,
    pub initial_collateral_ratio: u64,
    pub pool_fee: u64,
    pub merge_action_fee: u64,
    pub min_transition: u64,
    pub min_loan: u64,
    pub min_fee: u64,
    pub min_liquidation_fee: u64,
    pub loan_fee_details: LoanFeeDetails,
    pub interest_params: InterestParams,
}

impl PoolConfig {
    /// Fail with `BelowProtocolMinimum` unless `amount >= min_transition`
    pub fn check_transition(&self, amount: u64) -> LendingResult<()> {
        if amount < self.min_transition {
            return Err(LendingError::BelowProtocolMinimum {
                amount,
                minimum: self.min_transition,
            });
        }
        Ok(())
    }

    /// Fail with `BelowProtocolMinimum` unless `loan >= min_loan`
    pub fn check_loan(&self, loan: u64) -> LendingResult<()> {
        if loan < self.min_loan {
            return Err(LendingError::BelowProtocolMinimum {
                amount: loan,
                minimum: self.min_loan,
            });
        }
        Ok(())
    }
}

impl ToPlutusData for PoolConfig {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::int(self.liquidation_threshold),
                PlutusData::int(self.initial_collateral_ratio),
                PlutusData::int(self.pool_fee),
                PlutusData::int(self.merge_action_fee),
                PlutusData::int(self.min_transition),
                PlutusData::int(self.min_loan),
                PlutusData::int(self.min_fee),
                PlutusData::int(self.min_liquidation_fee),
                self.loan_fee_details.to_plutus_data(),
                self.interest_params.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for PoolConfig {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 10, "pool config")?;
        Ok(Self {
            liquidation_threshold: f[0].as_u64()?,
            initial_collateral_ratio: f[1].as_u64()?,
            pool_fee: f[2].as_u64()?,
            merge_action_fee: f[3].as_u64()?,
            min_transition: f[4].as_u64()?,
            min_loan: f[5].as_u64()?,
            min_fee: f[6].as_u64()?,
            min_liquidation_fee: f[7].as_u64()?,
            loan_fee_details: LoanFeeDetails::from_plutus_data(&f[8])?,
            interest_params: InterestParams::from_plutus_data(&f[9])?,
        })
    }
}

// ============ Loans ============

/// One open loan; locked at the pool's collateral address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollateralPosition {
    pub pool_nft_name: Vec<u8>,
    pub loan_asset: AssetClass,
    pub loan_amount: u64,
    /// Config snapshot at origination
    pub pool_config: PoolConfig,
    pub collateral_asset: AssetClass,
    pub collateral_amount: u64,
    /// Fixed at origination, ppm per year
    pub interest_rate: u64,
    /// Origination time (POSIX ms)
    pub deposit_time: i64,
    pub borrower_token_name: Vec<u8>,
    pub oracle_collateral_nft: AssetClass,
    pub oracle_loan_nft: AssetClass,
    /// Originating batcher order, if any
    pub tag: Option<OutputReference>,
    /// Pool lent-out snapshot before origination
    pub lent_out: u64,
    /// Pool balance snapshot before origination
    pub balance: u64,
}

impl ToPlutusData for CollateralPosition {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(&self.pool_nft_name),
                self.loan_asset.to_plutus_data(),
                PlutusData::int(self.loan_amount),
                self.pool_config.to_plutus_data(),
                self.collateral_asset.to_plutus_data(),
                PlutusData::int(self.collateral_amount),
                PlutusData::int(self.interest_rate),
                PlutusData::int(self.deposit_time),
                PlutusData::bytes(&self.borrower_token_name),
                self.oracle_collateral_nft.to_plutus_data(),
                self.oracle_loan_nft.to_plutus_data(),
                self.tag.to_plutus_data(),
                PlutusData::int(self.lent_out),
                PlutusData::int(self.balance),
            ],
        )
    }
}

impl FromPlutusData for CollateralPosition {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 14, "collateral datum")?;
        Ok(Self {
            pool_nft_name: f[0].as_bytes()?.to_vec(),
            loan_asset: AssetClass::from_plutus_data(&f[1])?,
            loan_amount: f[2].as_u64()?,
            pool_config: PoolConfig::from_plutus_data(&f[3])?,
            collateral_asset: AssetClass::from_plutus_data(&f[4])?,
            collateral_amount: f[5].as_u64()?,
            interest_rate: f[6].as_u64()?,
            deposit_time: f[7].as_i64()?,
            borrower_token_name: f[8].as_bytes()?.to_vec(),
            oracle_collateral_nft: AssetClass::from_plutus_data(&f[9])?,
            oracle_loan_nft: AssetClass::from_plutus_data(&f[10])?,
            tag: Option::<OutputReference>::from_plutus_data(&f[11])?,
            lent_out: f[12].as_u64()?,
            balance: f[13].as_u64()?,
        })
    }
}

/// Leftover collateral after liquidation, claimable with the borrower NFT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeftoverDatum {
    pub borrower_nft: AssetClass,
}

impl ToPlutusData for LeftoverDatum {
    fn to_plutus_data(&self) -> PlutusData {
        self.borrower_nft.to_plutus_data()
    }
}

impl FromPlutusData for LeftoverDatum {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        Ok(Self {
            borrower_nft: AssetClass::from_plutus_data(data)?,
        })
    }
}

/// Delayed repayment waiting to be merged into the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeDatum {
    pub borrower_token_name: Vec<u8>,
    pub pool_nft_name: Vec<u8>,
    pub repay_amount: u64,
    pub loan_amount: u64,
    pub collateral_oref: OutputReference,
}

impl ToPlutusData for MergeDatum {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(&self.borrower_token_name),
                PlutusData::bytes(&self.pool_nft_name),
                PlutusData::int(self.repay_amount),
                PlutusData::int(self.loan_amount),
                self.collateral_oref.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for MergeDatum {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 5, "merge datum")?;
        Ok(Self {
            borrower_token_name: f[0].as_bytes()?.to_vec(),
            pool_nft_name: f[1].as_bytes()?.to_vec(),
            repay_amount: f[2].as_u64()?,
            loan_amount: f[3].as_u64()?,
            collateral_oref: OutputReference::from_plutus_data(&f[4])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pool_config, pool_state};

    #[test]
    fn test_pool_datum_round_trip() {
        let state = pool_state(100_000_000, 5_000_000, 100_000_000);
        let cbor = state.to_plutus_data().to_cbor().unwrap();
        let decoded = PoolState::from_plutus_data(&PlutusData::from_cbor(&cbor).unwrap()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.to_plutus_data().to_cbor().unwrap(), cbor);
    }

    #[test]
    fn test_collateral_datum_round_trip() {
        let position = CollateralPosition {
            pool_nft_name: vec![0x50; 28],
            loan_asset: AssetClass::ada(),
            loan_amount: 60_000_000,
            pool_config: pool_config(),
            collateral_asset: AssetClass::new(vec![0xcc; 28], b"COLL".to_vec()),
            collateral_amount: 500_000_000,
            interest_rate: 45_000,
            deposit_time: 1_700_000_000_000,
            borrower_token_name: vec![0xbb; 32],
            oracle_collateral_nft: AssetClass::new(vec![0x0a; 28], b"oc".to_vec()),
            oracle_loan_nft: AssetClass::new(vec![0x0a; 28], b"ol".to_vec()),
            tag: Some(OutputReference::new(vec![3u8; 32], 2)),
            lent_out: 0,
            balance: 100_000_000,
        };
        let data = position.to_plutus_data();
        assert_eq!(CollateralPosition::from_plutus_data(&data).unwrap(), position);
    }

    #[test]
    fn test_pool_decoder_rejects_config() {
        let config = pool_config().to_plutus_data();
        assert!(matches!(
            PoolState::from_plutus_data(&config),
            Err(LendingError::InvalidDatumShape { .. })
        ));
    }

    #[test]
    fn test_state_transitions() {
        let state = pool_state(100_000_000, 0, 100_000_000);

        let borrowed = state.after_borrow(10_000_000, 1_000_000).unwrap();
        assert_eq!(borrowed.balance, 91_000_000);
        assert_eq!(borrowed.lent_out, 10_000_000);

        let repaid = borrowed.after_loan_closed(10_000_000, 500, 1_000_000).unwrap();
        assert_eq!(repaid.balance, 102_000_500);
        assert_eq!(repaid.lent_out, 0);

        assert!(state.after_borrow(200_000_000, 0).is_err());
        assert!(state.after_loan_closed(1, 1, 0).is_err());
    }

    #[test]
    fn test_minimum_checks() {
        let config = pool_config();
        assert!(config.check_transition(50_000_000).is_ok());
        assert_eq!(
            config.check_transition(49_999_999),
            Err(LendingError::BelowProtocolMinimum {
                amount: 49_999_999,
                minimum: 50_000_000
            })
        );
        assert!(config.check_loan(10_000_000).is_err());
    }
}
