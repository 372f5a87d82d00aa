//! Lendpool Batcher
//!
//! Two-phase pool interactions. A user locks an order at one of the order
//! contracts; any batcher later spends that order together with the pool
//! output and pays the user what the order datum demands. Orders never
//! contend for the pool output at placement time, so many users can queue
//! actions against the same pool within one block.
//!
//! ```text
//!  user                     order contract                 batcher
//!   │ place_*_order ───────────▶ │ order datum + funds         │
//!   │                            │ ◀──────────── execute_* ────│ spends order + pool
//!   │ ◀──────────────────────────┼─ partial / expected output ─│
//!   │ cancel_order ────────────▶ │ (owner signature)           │
//! ```
//!
//! Repayment has its own asynchronous path: [`Batcher::repay_with_merge`]
//! releases the collateral immediately and leaves the repayment at the
//! delayed merge address for the pool to absorb later.

pub mod cancel;
pub mod execute;
pub mod merge;
pub mod place;

pub use cancel::CancelOrderParams;
pub use execute::{ExecuteBorrowParams, ExecuteOrderParams, ExecuteRepayParams};
pub use merge::RepayMergeParams;
pub use place::{BorrowOrderParams, DepositOrderParams, WithdrawOrderParams};

use lendpool_common::{
    Located, LedgerClient, LendingError, LendingResult, Order, OrderKind, OutputReference, PoolStateReader,
    SdkConfig,
};
use lendpool_price_oracle::OracleProofCollector;

/// Everything a batch operation needs besides its own parameters
pub struct Batcher<'a> {
    ledger: &'a dyn LedgerClient,
    config: &'a SdkConfig,
    oracle: &'a OracleProofCollector,
}

impl<'a> Batcher<'a> {
    pub fn new(ledger: &'a dyn LedgerClient, config: &'a SdkConfig, oracle: &'a OracleProofCollector) -> Self {
        Self { ledger, config, oracle }
    }

    pub(crate) fn reader(&self) -> PoolStateReader<'a> {
        PoolStateReader::new(self.ledger, self.config)
    }

    /// Order contract script for `kind`, with its deployed reference
    pub(crate) fn order_script(&self, kind: OrderKind) -> (&'a [u8], Option<&'a OutputReference>) {
        let config: &'a SdkConfig = self.config;
        let (scripts, refs) = (&config.scripts, &config.references);
        match kind {
            OrderKind::Deposit => (scripts.order_deposit.as_slice(), refs.order_deposit.as_ref()),
            OrderKind::Withdraw => (scripts.order_withdraw.as_slice(), refs.order_withdraw.as_ref()),
            OrderKind::Borrow => (scripts.order_borrow.as_slice(), refs.order_borrow.as_ref()),
            OrderKind::Repay => (scripts.order_repay.as_slice(), refs.order_repay.as_ref()),
        }
    }

    /// Order at `out_ref`, which must be of `kind`
    pub(crate) async fn read_order_of(
        &self,
        out_ref: &OutputReference,
        kind: OrderKind,
        expected: &'static str,
    ) -> LendingResult<Located<Order>> {
        let located = self.reader().read_order(out_ref).await?;
        if located.datum.kind() != kind {
            return Err(LendingError::InvalidDatumShape { expected });
        }
        Ok(located)
    }
}

#[cfg(test)]
mod test_support;
