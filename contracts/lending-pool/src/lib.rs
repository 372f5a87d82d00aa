//! Lendpool Pool Operations
//!
//! Direct, single-transaction interactions with a lending pool. Each
//! operation reads fresh pool state, computes the successor datum with the
//! shared models and assembles a [`TxPlan`](lendpool_common::TxPlan) that
//! the ledger client completes.
//!
//! ## Operations
//!
//! - **create_pool / delete_pool / delegate_pool**: pool lifecycle and staking
//! - **borrow / repay**: open and close a loan against the pool
//! - **deposit / withdraw**: add or remove liquidity for LP tokens
//! - **create_liquidation / claim_liquidated**: settle an unhealthy loan and
//!   return any leftover collateral to its borrower
//!
//! Every public operation returns a
//! [`BuilderResponse`](lendpool_common::BuilderResponse); failures never
//! escape as panics or bare errors.
//!
//! ## Transaction Shape
//!
//! ```text
//! inputs:  pool output (+ collateral output)      ref inputs: config, scripts, oracle NFTs
//!            │
//! outputs: [leftover] ─ pool successor ─ [collateral lock] ─ [platform fee]
//!            │
//! mints:   LP tokens / borrower NFT / pool NFTs    withdrawals: oracle proofs (amount 0)
//! ```

pub mod assembly;

pub mod admin;
pub mod liquidation;
pub mod liquidity;
pub mod loans;

#[cfg(test)]
mod test_support;

pub use admin::{CreatePoolParams, DelegatePoolParams, DeletePoolParams};
pub use liquidation::{ClaimLiquidatedParams, LiquidateParams};
pub use liquidity::{DepositParams, WithdrawParams};
pub use loans::{BorrowParams, RepayParams};

use lendpool_common::{LedgerClient, PoolStateReader, ScriptParameterizer, SdkConfig};
use lendpool_price_oracle::OracleProofCollector;

/// Everything an operation needs besides its own parameters
pub struct LendingPool<'a> {
    ledger: &'a dyn LedgerClient,
    config: &'a SdkConfig,
    oracle: &'a OracleProofCollector,
    parameterizer: &'a dyn ScriptParameterizer,
}

impl<'a> LendingPool<'a> {
    pub fn new(
        ledger: &'a dyn LedgerClient,
        config: &'a SdkConfig,
        oracle: &'a OracleProofCollector,
        parameterizer: &'a dyn ScriptParameterizer,
    ) -> Self {
        Self {
            ledger,
            config,
            oracle,
            parameterizer,
        }
    }

    pub(crate) fn reader(&self) -> PoolStateReader<'a> {
        PoolStateReader::new(self.ledger, self.config)
    }
}
