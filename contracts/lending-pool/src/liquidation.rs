//! Liquidation
//!
//! An unhealthy loan is closed by anyone willing to repay its debt to the
//! pool. The liquidator takes the collateral minus whatever the borrower is
//! still owed, which is locked at the leftovers address until the borrower
//! claims it with their NFT.

use serde::{Deserialize, Serialize};
use tracing::info;

use lendpool_common::interest::get_accrued_interest;
use lendpool_common::liquidation::quote_liquidation;
use lendpool_common::math::safe_add;
use lendpool_common::{
    AssetClass, BuilderResponse, CollateralAction, CollateralMint, CollateralRedeemer, CompletedTx,
    ContinuingAction, EventLog, LeftoverDatum, LendingResult, MergeType, OutputReference, PlutusData, PoolAction,
    PoolEvent, PriceFeed, PriceSnapshot, ToPlutusData, TxBuilder, ValidityRange, Value,
};
use lendpool_price_oracle::attach_proofs;

use crate::assembly::{
    complete, continue_pool, log_transition, pay_platform_fee, platform_fee, price_proofs, spend_pool,
};
use crate::LendingPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateParams {
    pub collateral_ref: OutputReference,
    pub validity: ValidityRange,
    pub loan_price: Option<PriceSnapshot>,
    pub collateral_price: Option<PriceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLiquidatedParams {
    pub leftover_ref: OutputReference,
}

fn feed(asset: &AssetClass, snapshot: Option<PriceSnapshot>, valid_to: i64) -> Option<PriceFeed> {
    match snapshot {
        Some(snapshot) if !asset.is_ada() => Some(PriceFeed::pooled(asset.clone(), snapshot, valid_to)),
        _ => None,
    }
}

impl<'a> LendingPool<'a> {
    /// Liquidate an unhealthy loan
    pub async fn create_liquidation(&self, params: LiquidateParams) -> BuilderResponse {
        BuilderResponse::from_result("create_liquidation", self.build_liquidation(params).await)
    }

    async fn build_liquidation(&self, params: LiquidateParams) -> LendingResult<(CompletedTx, EventLog)> {
        let loan = self.reader().read_collateral(&params.collateral_ref).await?;
        let position = &loan.datum;
        let snapshot = self.reader().read_pool(&position.pool_nft_name).await?;
        let valid_to = params.validity.valid_to;

        let interest = get_accrued_interest(
            position.interest_rate,
            position.loan_amount,
            position.deposit_time,
            valid_to,
        )?;
        let repay_amount = safe_add(position.loan_amount, interest)?;
        let loan_feed = feed(&position.loan_asset, params.loan_price, valid_to);
        let collateral_feed = feed(&position.collateral_asset, params.collateral_price, valid_to);
        let quote = quote_liquidation(position, interest, loan_feed.as_ref(), collateral_feed.as_ref())?;

        let proofs = price_proofs(
            self.oracle,
            self.ledger,
            &snapshot.pool,
            params.loan_price,
            params.collateral_price,
        )
        .await?;

        let next = snapshot
            .pool
            .after_loan_closed(position.loan_amount, interest, snapshot.config.pool_fee)?;
        let fee = platform_fee(position, interest)?;

        let mut builder = TxBuilder::new();
        if let Some(leftover) = quote.leftover {
            let datum = LeftoverDatum {
                borrower_nft: self.config.borrower_nft(&position.borrower_token_name),
            };
            builder = builder.pay_to_contract(
                self.config.leftovers_address(&position.pool_nft_name),
                Value::single(position.collateral_asset.clone(), leftover),
                datum.to_plutus_data(),
            );
        }
        let continuing_output = builder.next_output_index();

        let action = PoolAction::Continuing(ContinuingAction::CloseLoan {
            loan_amount: position.loan_amount,
            repay_amount,
            continuing_output,
        });
        let collateral_redeemer = CollateralRedeemer {
            action: CollateralAction::Liquidate(0),
            interest,
            merge_type: MergeType::ImmediateWithPool(snapshot.pool_utxo.out_ref.clone()),
        };

        let builder = spend_pool(builder, self.config, &snapshot, action, None);
        let builder = continue_pool(builder, self.config, &snapshot, &next)
            .collect_from(loan.utxo.clone(), collateral_redeemer.to_plutus_data())
            .with_script(&self.config.scripts.collateral, self.config.references.collateral.as_ref())
            .validity(params.validity);
        let builder = attach_proofs(builder, &proofs);
        let builder = pay_platform_fee(
            builder,
            &snapshot.config.loan_fee_details.platform_fee_collector,
            position,
            fee,
        );

        info!(
            borrower = %hex::encode(&position.borrower_token_name),
            health_factor_ppm = quote.health_factor_ppm,
            debt = quote.debt_value,
            collateral = quote.collateral_value,
            "liquidating loan"
        );
        log_transition("create_liquidation", &next);
        let mut events = EventLog::new();
        events.emit(PoolEvent::Liquidated {
            pool_nft_name: position.pool_nft_name.clone(),
            borrower_token_name: position.borrower_token_name.clone(),
            debt_value: quote.debt_value,
            collateral_value: quote.collateral_value,
            liquidation_fee: quote.fee,
            leftover: quote.leftover.unwrap_or(0),
            timestamp_ms: valid_to,
        });
        complete(self.ledger, builder, events).await
    }

    /// Release leftover collateral to the holder of the borrower NFT
    pub async fn claim_liquidated(&self, params: ClaimLiquidatedParams) -> BuilderResponse {
        BuilderResponse::from_result("claim_liquidated", self.build_claim(params).await)
    }

    async fn build_claim(&self, params: ClaimLiquidatedParams) -> LendingResult<(CompletedTx, EventLog)> {
        let leftover = self.reader().read_leftover(&params.leftover_ref).await?;
        let borrower_nft = &leftover.datum.borrower_nft;

        let native: u64 = leftover
            .utxo
            .value
            .iter()
            .filter(|(asset, _)| !asset.is_ada())
            .map(|(_, amount)| *amount)
            .sum();
        let amount = if native > 0 { native } else { leftover.utxo.value.coin() };

        let builder = TxBuilder::new()
            .collect_from(leftover.utxo.clone(), PlutusData::void())
            .mint(
                borrower_nft.policy_id.clone(),
                borrower_nft.asset_name.clone(),
                -1,
                CollateralMint::burn(borrower_nft.asset_name.clone()).to_plutus_data(),
            )
            .with_script(&self.config.scripts.collateral, self.config.references.collateral.as_ref())
            .with_script(&self.config.scripts.leftovers, self.config.references.leftovers.as_ref());

        let mut events = EventLog::new();
        events.emit(PoolEvent::LeftoverClaimed {
            borrower_token_name: borrower_nft.asset_name.clone(),
            amount,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        complete(self.ledger, builder, events).await
    }
}
