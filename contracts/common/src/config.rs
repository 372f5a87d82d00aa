//! Deployment Configuration
//!
//! Script hashes, reference-script outputs and oracle endpoints of one
//! protocol deployment, loaded from JSON. Pool configs for new pools are
//! built fresh per call from the immutable defaults in
//! [`crate::constants::defaults`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{curves, defaults, time};
use crate::datums::{InterestParams, LoanFeeDetails, PoolConfig};
use crate::errors::{LendingError, LendingResult};
use crate::types::{Address, AssetClass, Hash, OutputReference};

/// Hashes of every deployed validator and policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolScripts {
    /// Pool validator; also the pool NFT policy
    #[serde(with = "hex::serde")]
    pub pool: Hash,
    /// Collateral validator; also the borrower NFT policy
    #[serde(with = "hex::serde")]
    pub collateral: Hash,
    #[serde(with = "hex::serde")]
    pub leftovers: Hash,
    #[serde(with = "hex::serde")]
    pub delayed_merge: Hash,
    #[serde(with = "hex::serde")]
    pub pool_config_validator: Hash,
    #[serde(with = "hex::serde")]
    pub pool_config_policy: Hash,
    #[serde(with = "hex::serde")]
    pub delegator_nft_policy: Hash,
    #[serde(with = "hex::serde")]
    pub order_deposit: Hash,
    #[serde(with = "hex::serde")]
    pub order_withdraw: Hash,
    #[serde(with = "hex::serde")]
    pub order_borrow: Hash,
    #[serde(with = "hex::serde")]
    pub order_repay: Hash,
}

impl ProtocolScripts {
    fn all(&self) -> [(&'static str, &Hash); 11] {
        [
            ("pool", &self.pool),
            ("collateral", &self.collateral),
            ("leftovers", &self.leftovers),
            ("delayed_merge", &self.delayed_merge),
            ("pool_config_validator", &self.pool_config_validator),
            ("pool_config_policy", &self.pool_config_policy),
            ("delegator_nft_policy", &self.delegator_nft_policy),
            ("order_deposit", &self.order_deposit),
            ("order_withdraw", &self.order_withdraw),
            ("order_borrow", &self.order_borrow),
            ("order_repay", &self.order_repay),
        ]
    }
}

/// Outputs carrying deployed reference scripts
///
/// A missing entry means the script is attached to each transaction instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptReferences {
    pub pool: Option<OutputReference>,
    pub collateral: Option<OutputReference>,
    pub leftovers: Option<OutputReference>,
    pub pool_config_policy: Option<OutputReference>,
    pub delegator_nft_policy: Option<OutputReference>,
    pub order_deposit: Option<OutputReference>,
    pub order_withdraw: Option<OutputReference>,
    pub order_borrow: Option<OutputReference>,
    pub order_repay: Option<OutputReference>,
}

fn default_oracle_timeout_ms() -> u64 {
    time::ORACLE_TIMEOUT_MS
}

/// Oracle signing service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    pub endpoints: Vec<String>,
    /// Aggregate timeout for one signing round
    #[serde(default = "default_oracle_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_ms: time::ORACLE_TIMEOUT_MS,
        }
    }
}

/// One protocol deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkConfig {
    pub scripts: ProtocolScripts,
    #[serde(default)]
    pub references: ScriptReferences,
    /// Governance NFT controlling pool configs
    pub gov_nft: AssetClass,
    pub oracle: OracleConfig,
}

impl SdkConfig {
    pub fn from_json_str(json: &str) -> LendingResult<Self> {
        let config: SdkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> LendingResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject empty script hashes and a missing oracle endpoint
    pub fn validate(&self) -> LendingResult<()> {
        for (name, hash) in self.scripts.all() {
            if hash.is_empty() {
                return Err(LendingError::Config(format!("script hash `{}` is empty", name)));
            }
        }
        if self.oracle.endpoints.is_empty() {
            return Err(LendingError::Config("no oracle endpoints configured".to_string()));
        }
        if self.oracle.timeout_ms == 0 {
            return Err(LendingError::Config("oracle timeout must be positive".to_string()));
        }
        Ok(())
    }

    // ============ Derived Identities ============

    pub fn pool_nft(&self, pool_nft_name: &[u8]) -> AssetClass {
        AssetClass::new(self.scripts.pool.clone(), pool_nft_name)
    }

    /// Pool address, staked by the pool's own stake validator
    pub fn pool_address(&self, pool_nft_name: &[u8]) -> Address {
        Address::script(self.scripts.pool.clone(), Some(pool_nft_name.to_vec()))
    }

    pub fn config_nft(&self, config_nft_name: &[u8]) -> AssetClass {
        AssetClass::new(self.scripts.pool_config_policy.clone(), config_nft_name)
    }

    pub fn pool_config_address(&self) -> Address {
        Address::script(self.scripts.pool_config_validator.clone(), None)
    }

    pub fn delegator_nft(&self, config_nft_name: &[u8]) -> AssetClass {
        AssetClass::new(self.scripts.delegator_nft_policy.clone(), config_nft_name)
    }

    pub fn borrower_nft(&self, borrower_token_name: &[u8]) -> AssetClass {
        AssetClass::new(self.scripts.collateral.clone(), borrower_token_name)
    }

    pub fn collateral_address(&self, pool_nft_name: &[u8]) -> Address {
        Address::script(self.scripts.collateral.clone(), Some(pool_nft_name.to_vec()))
    }

    pub fn leftovers_address(&self, pool_nft_name: &[u8]) -> Address {
        Address::script(self.scripts.leftovers.clone(), Some(pool_nft_name.to_vec()))
    }

    pub fn merge_address(&self, pool_nft_name: &[u8]) -> Address {
        Address::script(self.scripts.delayed_merge.clone(), Some(pool_nft_name.to_vec()))
    }

    pub fn order_address(&self, script: &Hash) -> Address {
        Address::script(script.clone(), None)
    }
}

// ============ New Pool Config ============

/// Per-asset risk parameters supplied when creating a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParameters {
    /// Oracle NFT locked at the asset's price feed
    pub oracle_nft: AssetClass,
    pub initial_collateral_ratio: u64,
    pub liquidation_threshold: u64,
    pub liquidation_fee: u64,
    pub min_fee: u64,
    pub pool_fee: u64,
    pub min_transition: u64,
    /// Minimum liquidator fee
    pub min_liquidation_amount: u64,
    pub merge_action_fee: u64,
    pub min_loan_amount: u64,
}

impl PoolConfig {
    /// Config for a new pool, assembled from explicit parameters
    ///
    /// Collateral-side risk (ratios, liquidation minimum) comes from the
    /// collateral parameters, fees and minimums from the loan parameters.
    /// The higher of the two liquidation fees applies. ADA-lending pools
    /// get the ADA interest curve.
    pub fn for_new_pool(loan_asset: &AssetClass, loan: &TokenParameters, collateral: &TokenParameters) -> LendingResult<Self> {
        let curve = if loan_asset.is_ada() {
            curves::ADA_LOAN
        } else {
            curves::TOKEN_LOAN
        };
        Ok(Self {
            liquidation_threshold: collateral.liquidation_threshold,
            initial_collateral_ratio: collateral.initial_collateral_ratio,
            pool_fee: loan.pool_fee,
            merge_action_fee: loan.merge_action_fee,
            min_transition: loan.min_transition,
            min_loan: loan.min_loan_amount,
            min_fee: loan.min_fee,
            min_liquidation_fee: collateral.min_liquidation_amount,
            loan_fee_details: LoanFeeDetails {
                tier_1_fee: defaults::TIER_1.0,
                tier_1_threshold: defaults::TIER_1.1,
                tier_2_fee: defaults::TIER_2.0,
                tier_2_threshold: defaults::TIER_2.1,
                tier_3_fee: defaults::TIER_3.0,
                tier_3_threshold: defaults::TIER_3.1,
                liquidation_fee: loan.liquidation_fee.max(collateral.liquidation_fee),
                platform_fee_collector: Address::key(
                    hex::decode(defaults::FEE_COLLECTOR_PAYMENT_KEY)?,
                    Some(hex::decode(defaults::FEE_COLLECTOR_STAKE_KEY)?),
                ),
            },
            interest_params: InterestParams::from_tuple(curve),
        })
    }
}
