//! Delayed Repayment
//!
//! Closing a loan without touching the pool output: the collateral is
//! released now and the repayment waits at the delayed-merge address until
//! a batcher folds it into the pool. Interest is charged up to the end of
//! the validity window plus a grace period covering that later merge.

use serde::{Deserialize, Serialize};
use tracing::info;

use lendpool_common::constants::time::MERGE_GRACE_MS;
use lendpool_common::interest::get_accrued_interest;
use lendpool_common::math::safe_add;
use lendpool_common::{
    BuilderResponse, CollateralAction, CollateralMint, CollateralRedeemer, CompletedTx, EventLog, LendingError,
    LendingResult, MergeDatum, MergeType, OrderKind, OutputReference, PoolEvent, ToPlutusData, TxBuilder,
    ValidityRange, Value,
};
use lendpool_pool::assembly::{complete, pay_platform_fee, platform_fee};

use crate::Batcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayMergeParams {
    pub collateral_ref: OutputReference,
    pub validity: ValidityRange,
}

impl<'a> Batcher<'a> {
    /// Repay a loan into the delayed-merge queue and release its collateral
    ///
    /// The platform fee tier comes from the loan's origination snapshot in
    /// the collateral datum, not the pool's current `loan_fee_details`.
    pub async fn repay_with_merge(&self, params: RepayMergeParams) -> BuilderResponse {
        BuilderResponse::from_result("repay_with_merge", self.build_repay_merge(params).await)
    }

    async fn build_repay_merge(&self, params: RepayMergeParams) -> LendingResult<(CompletedTx, EventLog)> {
        let loan = self.reader().read_collateral(&params.collateral_ref).await?;
        let position = &loan.datum;
        let snapshot = self.reader().read_pool(&position.pool_nft_name).await?;

        let accrue_until = params
            .validity
            .valid_to
            .checked_add(MERGE_GRACE_MS)
            .ok_or(LendingError::Overflow)?;
        let interest = get_accrued_interest(
            position.interest_rate,
            position.loan_amount,
            position.deposit_time,
            accrue_until,
        )?;
        let repay_amount = safe_add(position.loan_amount, interest)?;
        let fee = platform_fee(position, interest)?;

        let builder = pay_platform_fee(
            TxBuilder::new(),
            &snapshot.config.loan_fee_details.platform_fee_collector,
            position,
            fee,
        );
        let merge_output = builder.next_output_index();
        let merge_amount = safe_add(
            safe_add(repay_amount, position.pool_config.merge_action_fee)?,
            snapshot.config.pool_fee,
        )?;
        let merge_datum = MergeDatum {
            borrower_token_name: position.borrower_token_name.clone(),
            pool_nft_name: position.pool_nft_name.clone(),
            repay_amount,
            loan_amount: position.loan_amount,
            collateral_oref: loan.utxo.out_ref.clone(),
        };
        let collateral_redeemer = CollateralRedeemer {
            action: CollateralAction::Repay,
            interest,
            merge_type: MergeType::DelayedIntoPool {
                output_index: merge_output,
                amount_repaying: repay_amount,
            },
        };

        let builder = builder
            .pay_to_contract(
                self.config.merge_address(&position.pool_nft_name),
                Value::single(position.loan_asset.clone(), merge_amount),
                merge_datum.to_plutus_data(),
            )
            .collect_from(loan.utxo.clone(), collateral_redeemer.to_plutus_data())
            .with_script(&self.config.scripts.collateral, self.config.references.collateral.as_ref())
            .mint(
                self.config.scripts.collateral.clone(),
                position.borrower_token_name.clone(),
                -1,
                CollateralMint::burn(position.borrower_token_name.clone()).to_plutus_data(),
            )
            .validity(params.validity);

        info!(
            loan = %params.collateral_ref,
            repay_amount,
            interest,
            "queueing delayed repayment"
        );
        let mut events = EventLog::new();
        events.emit(PoolEvent::LoanClosed {
            pool_nft_name: position.pool_nft_name.clone(),
            borrower_token_name: position.borrower_token_name.clone(),
            loan_amount: position.loan_amount,
            interest,
            platform_fee: fee,
            timestamp_ms: params.validity.valid_to,
        });
        events.emit(PoolEvent::OrderPlaced {
            pool_nft_name: position.pool_nft_name.clone(),
            kind: OrderKind::Repay,
            amount: repay_amount,
            timestamp_ms: params.validity.valid_to,
        });
        complete(self.ledger, builder, events).await
    }
}
