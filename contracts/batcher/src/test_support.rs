//! Batcher test environment

use lendpool_common::testing::*;
use lendpool_common::{CollateralPosition, OutputReference, PlutusData, PoolState, SdkConfig, Utxo, Value};
use lendpool_price_oracle::testing::signing_collector;
use lendpool_price_oracle::OracleProofCollector;

use crate::Batcher;

pub const ORDER_TX: [u8; 32] = [0x0d; 32];

pub struct TestEnv {
    pub ledger: MockLedger,
    pub config: SdkConfig,
    pub oracle: OracleProofCollector,
}

impl TestEnv {
    pub fn new(pool: PoolState) -> Self {
        Self::with_ledger(MockLedger::new(), pool)
    }

    pub fn with_ledger(ledger: MockLedger, pool: PoolState) -> Self {
        let config = sdk_config();
        let ledger = ledger
            .with_pool(&config, &pool, &pool_config())
            .with_utxo(oracle_utxo(pool.params.oracle_collateral_nft.clone(), 0))
            .with_utxo(oracle_utxo(pool.params.oracle_loan_nft.clone(), 1));
        Self {
            ledger,
            config,
            oracle: signing_collector(),
        }
    }

    pub fn with_loan(self, position: &CollateralPosition) -> Self {
        let TestEnv { ledger, config, oracle } = self;
        let ledger = ledger.with_utxo(collateral_utxo(&config, position));
        Self { ledger, config, oracle }
    }

    /// Order output locked at `script`, referenced as `ORDER_TX#index`
    pub fn with_order(self, index: u64, script: &[u8], datum: PlutusData, value: Value) -> Self {
        let TestEnv { ledger, config, oracle } = self;
        let utxo = Utxo {
            out_ref: order_ref(index),
            address: config.order_address(&script.to_vec()),
            value,
            datum: Some(datum),
        };
        Self {
            ledger: ledger.with_utxo(utxo),
            config,
            oracle,
        }
    }

    pub fn batcher(&self) -> Batcher<'_> {
        Batcher::new(&self.ledger, &self.config, &self.oracle)
    }
}

pub fn order_ref(index: u64) -> OutputReference {
    OutputReference::new(ORDER_TX.to_vec(), index)
}
