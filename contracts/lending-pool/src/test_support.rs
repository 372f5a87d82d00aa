//! Shared operation test environment

use lendpool_common::testing::*;
use lendpool_common::{CollateralPosition, PoolState, SdkConfig};
use lendpool_price_oracle::testing::signing_collector;
use lendpool_price_oracle::OracleProofCollector;

use crate::LendingPool;

/// Fixture pool on a mock ledger with both oracle outputs deployed
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

    pub fn pool(&self) -> LendingPool<'_> {
        LendingPool::new(&self.ledger, &self.config, &self.oracle, &MockParameterizer)
    }
}
