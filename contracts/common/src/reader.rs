//! Pool State Reader
//!
//! Fetches and decodes the on-chain entities an operation works from. Every
//! call goes back to the ledger; nothing is cached between operations.

use tracing::debug;

use crate::config::SdkConfig;
use crate::datums::{CollateralPosition, LeftoverDatum, MergeDatum, PoolConfig, PoolState};
use crate::errors::{LendingError, LendingResult};
use crate::ledger::LedgerClient;
use crate::orders::Order;
use crate::types::{OutputReference, Utxo};

/// Pool output and its config output, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pool_utxo: Utxo,
    pub pool: PoolState,
    pub config_utxo: Utxo,
    pub config: PoolConfig,
}

/// Spent output together with its decoded datum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    pub utxo: Utxo,
    pub datum: T,
}

pub struct PoolStateReader<'a> {
    ledger: &'a dyn LedgerClient,
    config: &'a SdkConfig,
}

impl<'a> PoolStateReader<'a> {
    pub fn new(ledger: &'a dyn LedgerClient, config: &'a SdkConfig) -> Self {
        Self { ledger, config }
    }

    /// Current pool datum and pool config for `pool_nft_name`
    ///
    /// Fails with `PoolNotFound` when no output holds the pool NFT and
    /// `ConfigNotFound` when the config token is missing.
    pub async fn read_pool(&self, pool_nft_name: &[u8]) -> LendingResult<PoolSnapshot> {
        let pool_nft = self.config.pool_nft(pool_nft_name);
        let pool_utxo = self
            .ledger
            .utxo_by_unit(&pool_nft)
            .await?
            .ok_or_else(|| LendingError::PoolNotFound {
                pool_nft_name: hex::encode(pool_nft_name),
            })?;
        let pool: PoolState = pool_utxo.inline_datum()?;

        let config_nft = self.config.config_nft(&pool.params.pool_config_name);
        let config_utxo = self
            .ledger
            .utxo_by_unit(&config_nft)
            .await?
            .ok_or_else(|| LendingError::ConfigNotFound {
                config_nft_name: hex::encode(&pool.params.pool_config_name),
            })?;
        let config: PoolConfig = config_utxo.inline_datum()?;

        debug!(
            pool = %hex::encode(pool_nft_name),
            balance = pool.balance,
            lent_out = pool.lent_out,
            total_lp = pool.total_lp_tokens,
            "pool snapshot"
        );
        Ok(PoolSnapshot {
            pool_utxo,
            pool,
            config_utxo,
            config,
        })
    }

    async fn read_output(&self, out_ref: &OutputReference) -> LendingResult<Option<Utxo>> {
        let found = self
            .ledger
            .utxos_by_output_reference(std::slice::from_ref(out_ref))
            .await?;
        Ok(found.into_iter().next())
    }

    /// Open loan locked at `out_ref`
    pub async fn read_collateral(&self, out_ref: &OutputReference) -> LendingResult<Located<CollateralPosition>> {
        let utxo = self
            .read_output(out_ref)
            .await?
            .ok_or_else(|| LendingError::CollateralNotFound {
                out_ref: out_ref.to_string(),
            })?;
        let datum = utxo.inline_datum()?;
        Ok(Located { utxo, datum })
    }

    /// Leftover collateral of a liquidated loan
    pub async fn read_leftover(&self, out_ref: &OutputReference) -> LendingResult<Located<LeftoverDatum>> {
        let utxo = self
            .read_output(out_ref)
            .await?
            .ok_or_else(|| LendingError::CollateralNotFound {
                out_ref: out_ref.to_string(),
            })?;
        let datum = utxo.inline_datum()?;
        Ok(Located { utxo, datum })
    }

    /// Pending delayed repayment
    pub async fn read_merge(&self, out_ref: &OutputReference) -> LendingResult<Located<MergeDatum>> {
        let utxo = self
            .read_output(out_ref)
            .await?
            .ok_or_else(|| LendingError::OrderNotFound {
                out_ref: out_ref.to_string(),
            })?;
        let datum = utxo.inline_datum()?;
        Ok(Located { utxo, datum })
    }

    /// Batcher order at `out_ref`, type detected by trial decoding
    pub async fn read_order(&self, out_ref: &OutputReference) -> LendingResult<Located<Order>> {
        let utxo = self
            .read_output(out_ref)
            .await?
            .ok_or_else(|| LendingError::OrderNotFound {
                out_ref: out_ref.to_string(),
            })?;
        let datum = match &utxo.datum {
            Some(data) => Order::decode(data)?,
            None => {
                return Err(LendingError::InvalidDatumShape {
                    expected: "batcher order",
                })
            }
        };
        Ok(Located { utxo, datum })
    }
}
