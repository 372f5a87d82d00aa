//! Borrow and Repay
//!
//! Opening a loan moves `loan_amount` out of the pool into the borrower's
//! wallet and locks the collateral at the collateral address under a fresh
//! borrower NFT. Closing it returns principal plus interest to the pool and
//! burns that NFT.

use serde::{Deserialize, Serialize};

use lendpool_common::interest::{get_accrued_interest, get_interest_rate};
use lendpool_common::math::safe_add;
use lendpool_common::{
    BuilderResponse, CollateralAction, CollateralMint, CollateralPosition, CollateralRedeemer, CompletedTx,
    ContinuingAction, EventLog, LendingError, LendingResult, MergeType, OutputReference, PoolAction, PoolEvent,
    PriceSnapshot, ToPlutusData, TxBuilder, ValidityRange, Value,
};
use lendpool_price_oracle::attach_proofs;

use crate::assembly::{
    complete, continue_pool, log_transition, pay_platform_fee, platform_fee, price_proofs, spend_pool,
};
use crate::LendingPool;

/// Index of the new collateral output in a direct borrow
const COLLATERAL_OUTPUT: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    pub loan_amount: u64,
    pub collateral_amount: u64,
    pub validity: ValidityRange,
    /// Reserve snapshot for a native loan asset
    pub loan_price: Option<PriceSnapshot>,
    /// Reserve snapshot for a native collateral asset
    pub collateral_price: Option<PriceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayParams {
    /// Collateral output of the loan being closed
    pub collateral_ref: OutputReference,
    pub validity: ValidityRange,
}

impl<'a> LendingPool<'a> {
    /// Open a loan against the pool
    pub async fn borrow(&self, params: BorrowParams) -> BuilderResponse {
        BuilderResponse::from_result("borrow", self.build_borrow(params).await)
    }

    async fn build_borrow(&self, params: BorrowParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        let pool = &snapshot.pool;

        snapshot.config.check_loan(params.loan_amount)?;
        if params.loan_amount >= pool.balance {
            return Err(LendingError::InsufficientPoolBalance {
                available: pool.balance,
                requested: params.loan_amount,
            });
        }
        if params.collateral_amount == 0 {
            return Err(LendingError::InvalidInput {
                param: "collateral_amount",
                reason: "must be positive",
            });
        }

        let interest_rate = get_interest_rate(
            &snapshot.config.interest_params,
            params.loan_amount,
            pool.lent_out,
            pool.balance,
        )?;
        let next = pool.after_borrow(params.loan_amount, snapshot.config.pool_fee)?;
        let borrower_token_name = snapshot.pool_utxo.out_ref.derived_token_name()?;

        let position = CollateralPosition {
            pool_nft_name: pool.params.pool_nft_name.clone(),
            loan_asset: pool.params.loan_asset.clone(),
            loan_amount: params.loan_amount,
            pool_config: snapshot.config.clone(),
            collateral_asset: pool.params.collateral_asset.clone(),
            collateral_amount: params.collateral_amount,
            interest_rate,
            deposit_time: params.validity.valid_from,
            borrower_token_name: borrower_token_name.clone(),
            oracle_collateral_nft: pool.params.oracle_collateral_nft.clone(),
            oracle_loan_nft: pool.params.oracle_loan_nft.clone(),
            tag: None,
            lent_out: pool.lent_out,
            balance: pool.balance,
        };

        let proofs = price_proofs(
            self.oracle,
            self.ledger,
            pool,
            params.loan_price,
            params.collateral_price,
        )
        .await?;

        let action = PoolAction::Continuing(ContinuingAction::Borrow {
            loan_amount: params.loan_amount,
            collateral_amount: params.collateral_amount,
            borrower_token_name: borrower_token_name.clone(),
            interest_rate,
            continuing_output: 0,
        });
        let builder = spend_pool(TxBuilder::new(), self.config, &snapshot, action, None);
        let builder = continue_pool(builder, self.config, &snapshot, &next)
            .pay_to_contract(
                pool.params.collateral_address.clone(),
                Value::single(pool.params.collateral_asset.clone(), params.collateral_amount),
                position.to_plutus_data(),
            )
            .mint(
                self.config.scripts.collateral.clone(),
                borrower_token_name.clone(),
                1,
                CollateralMint::mint(snapshot.pool_utxo.out_ref.clone(), COLLATERAL_OUTPUT).to_plutus_data(),
            )
            .with_script(&self.config.scripts.collateral, self.config.references.collateral.as_ref())
            .validity(params.validity);
        let builder = attach_proofs(builder, &proofs);

        log_transition("borrow", &next);
        let mut events = EventLog::new();
        events.emit(PoolEvent::Borrowed {
            pool_nft_name: pool.params.pool_nft_name.clone(),
            borrower_token_name,
            loan_amount: params.loan_amount,
            collateral_amount: params.collateral_amount,
            interest_rate,
            timestamp_ms: params.validity.valid_from,
        });
        complete(self.ledger, builder, events).await
    }

    /// Repay a loan in full and release its collateral
    pub async fn repay(&self, params: RepayParams) -> BuilderResponse {
        BuilderResponse::from_result("repay", self.build_repay(params).await)
    }

    async fn build_repay(&self, params: RepayParams) -> LendingResult<(CompletedTx, EventLog)> {
        let loan = self.reader().read_collateral(&params.collateral_ref).await?;
        let position = &loan.datum;
        let snapshot = self.reader().read_pool(&position.pool_nft_name).await?;

        let interest = get_accrued_interest(
            position.interest_rate,
            position.loan_amount,
            position.deposit_time,
            params.validity.valid_to,
        )?;
        let repay_amount = safe_add(position.loan_amount, interest)?;
        let next = snapshot
            .pool
            .after_loan_closed(position.loan_amount, interest, snapshot.config.pool_fee)?;
        let fee = platform_fee(position, interest)?;

        let action = PoolAction::Continuing(ContinuingAction::CloseLoan {
            loan_amount: position.loan_amount,
            repay_amount,
            continuing_output: 0,
        });
        let collateral_redeemer = CollateralRedeemer {
            action: CollateralAction::Repay,
            interest,
            merge_type: MergeType::ImmediateWithPool(snapshot.pool_utxo.out_ref.clone()),
        };

        let builder = spend_pool(TxBuilder::new(), self.config, &snapshot, action, None);
        let builder = continue_pool(builder, self.config, &snapshot, &next)
            .collect_from(loan.utxo.clone(), collateral_redeemer.to_plutus_data())
            .with_script(&self.config.scripts.collateral, self.config.references.collateral.as_ref())
            .mint(
                self.config.scripts.collateral.clone(),
                position.borrower_token_name.clone(),
                -1,
                CollateralMint::burn(position.borrower_token_name.clone()).to_plutus_data(),
            )
            .validity(params.validity);
        let builder = pay_platform_fee(
            builder,
            &snapshot.config.loan_fee_details.platform_fee_collector,
            position,
            fee,
        );

        log_transition("repay", &next);
        let mut events = EventLog::new();
        events.emit(PoolEvent::LoanClosed {
            pool_nft_name: position.pool_nft_name.clone(),
            borrower_token_name: position.borrower_token_name.clone(),
            loan_amount: position.loan_amount,
            interest,
            platform_fee: fee,
            timestamp_ms: params.validity.valid_to,
        });
        complete(self.ledger, builder, events).await
    }
}
