//! Order cancellation by its owner.

use serde::{Deserialize, Serialize};
use tracing::info;

use lendpool_common::{
    BuilderResponse, CompletedTx, EventLog, LendingError, LendingResult, OrderRedeemer, OutputReference,
    PoolEvent, ToPlutusData, TxBuilder,
};
use lendpool_pool::assembly::complete;

use crate::Batcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderParams {
    pub order_ref: OutputReference,
}

impl<'a> Batcher<'a> {
    /// Reclaim an unexecuted order; the wallet must hold the order's control key
    pub async fn cancel_order(&self, params: CancelOrderParams) -> BuilderResponse {
        BuilderResponse::from_result("cancel_order", self.build_cancel(params).await)
    }

    async fn build_cancel(&self, params: CancelOrderParams) -> LendingResult<(CompletedTx, EventLog)> {
        let order = self.reader().read_order(&params.order_ref).await?;
        let kind = order.datum.kind();
        let owner = order.datum.control_credential().hash().to_vec();

        let wallet = self.ledger.wallet_address().await?;
        if wallet.payment_key_hash() != Some(owner.as_slice()) {
            return Err(LendingError::InvalidInput {
                param: "wallet",
                reason: "not the order's control key",
            });
        }

        let (script, reference) = self.order_script(kind);
        let builder = TxBuilder::new()
            .collect_from(order.utxo, OrderRedeemer::Cancel.to_plutus_data())
            .with_script(script, reference)
            .add_signer(owner);

        info!(order = %params.order_ref, ?kind, "cancelling order");
        let mut events = EventLog::new();
        events.emit(PoolEvent::OrderCancelled {
            order: params.order_ref.to_string(),
            kind,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        complete(self.ledger, builder, events).await
    }
}
