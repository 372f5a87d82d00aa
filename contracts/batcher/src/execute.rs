//! Order Execution
//!
//! A batcher spends one order together with the pool output and produces
//! exactly what the order datum asks for. The order's own value pays the
//! pool fee and batcher fee; the pool moves the same amounts a direct
//! operation would.
//!
//! Output layouts (index order):
//!
//! | order    | outputs                                                   |
//! |----------|-----------------------------------------------------------|
//! | deposit  | pool, receiver (partial + LP minted)                      |
//! | withdraw | pool, receiver (partial + loan asset)                     |
//! | borrow   | pool, collateral, receiver (partial + borrower NFT), loan |
//! | repay    | pool, expected output, platform fee                       |

use serde::{Deserialize, Serialize};
use tracing::info;

use lendpool_common::interest::{get_accrued_interest, get_interest_rate};
use lendpool_common::liquidity::{amount_for_lp_burn, lp_tokens_for_deposit};
use lendpool_common::math::safe_add;
use lendpool_common::{
    BorrowProcessData, BuilderResponse, CollateralAction, CollateralMint, CollateralPosition, CollateralRedeemer,
    CompletedTx, ContinuingAction, EventLog, ExpectedOutput, LendingError, LendingResult, LpTokenRedeemer,
    MergeType, Order, OrderKind, OrderRedeemer, OutputDatum, OutputReference, OutputTemplate, PoolAction,
    PoolEvent, PoolSnapshot, PoolState, PriceSnapshot, ToPlutusData, TxBuilder, Utxo, ValidityRange, Value,
};
use lendpool_pool::assembly::{
    complete, continue_pool, log_transition, mint_quantity, pay_platform_fee, platform_fee, price_proofs, spend_pool,
};
use lendpool_price_oracle::attach_proofs;

use crate::Batcher;

/// Index of the collateral output in an executed borrow
const COLLATERAL_OUTPUT: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOrderParams {
    pub order_ref: OutputReference,
    /// Reference script output for the pool's LP policy
    pub lp_policy_ref: Option<OutputReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteBorrowParams {
    pub order_ref: OutputReference,
    pub validity: ValidityRange,
    pub loan_price: Option<PriceSnapshot>,
    pub collateral_price: Option<PriceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRepayParams {
    pub order_ref: OutputReference,
    pub validity: ValidityRange,
}

/// Receiver output: the partial template topped up with `extra`
fn pay_partial(
    builder: TxBuilder,
    partial: &OutputTemplate,
    extra: Value,
    order_ref: &OutputReference,
) -> LendingResult<TxBuilder> {
    Ok(builder.pay_to_contract(
        partial.address.clone(),
        partial.value.clone().checked_merge(&extra)?,
        order_ref.to_plutus_data(),
    ))
}

fn pay_expected(builder: TxBuilder, expected: &ExpectedOutput) -> TxBuilder {
    match &expected.datum {
        OutputDatum::InlineDatum(datum) => {
            builder.pay_to_contract(expected.address.clone(), expected.value.clone(), datum.clone())
        }
        _ => builder.pay_to_address(expected.address.clone(), expected.value.clone()),
    }
}

/// Spend the order for the pool transaction at `pool_oref`
fn process_order(
    builder: TxBuilder,
    order: Utxo,
    pool_oref: &OutputReference,
    additional_data: Option<BorrowProcessData>,
    script: (&[u8], Option<&OutputReference>),
) -> TxBuilder {
    let redeemer = OrderRedeemer::Process {
        pool_oref: pool_oref.clone(),
        additional_data,
    };
    builder
        .collect_from(order, redeemer.to_plutus_data())
        .with_script(script.0, script.1)
}

fn lp_mint(
    builder: TxBuilder,
    snapshot: &PoolSnapshot,
    quantity: i64,
    reference: Option<&OutputReference>,
) -> TxBuilder {
    let lp_token = &snapshot.pool.params.lp_token;
    let redeemer = LpTokenRedeemer::TransitionPool {
        pool_oref: snapshot.pool_utxo.out_ref.clone(),
        continuing_output: 0,
    };
    builder
        .mint(
            lp_token.policy_id.clone(),
            lp_token.asset_name.clone(),
            quantity,
            redeemer.to_plutus_data(),
        )
        .with_script(&lp_token.policy_id, reference)
}

fn executed(pool: &PoolState, order_ref: &OutputReference, kind: OrderKind, timestamp_ms: i64) -> EventLog {
    let mut events = EventLog::new();
    events.emit(PoolEvent::OrderExecuted {
        pool_nft_name: pool.params.pool_nft_name.clone(),
        order: order_ref.to_string(),
        kind,
        timestamp_ms,
    });
    events
}

impl<'a> Batcher<'a> {
    async fn pool_for(&self, order: &Order) -> LendingResult<PoolSnapshot> {
        self.reader().read_pool(&order.pool_nft().asset_name).await
    }

    /// Execute a deposit order: mint LP tokens to the depositor
    pub async fn execute_deposit(&self, params: ExecuteOrderParams) -> BuilderResponse {
        BuilderResponse::from_result("execute_deposit", self.build_execute_deposit(params).await)
    }

    async fn build_execute_deposit(&self, params: ExecuteOrderParams) -> LendingResult<(CompletedTx, EventLog)> {
        let located = self
            .read_order_of(&params.order_ref, OrderKind::Deposit, "deposit order")
            .await?;
        let snapshot = self.pool_for(&located.datum).await?;
        let Order::Deposit(order) = located.datum else {
            return Err(LendingError::InvalidDatumShape { expected: "deposit order" });
        };
        let pool = &snapshot.pool;
        let amount = order.order.deposit_amount;

        snapshot.config.check_transition(amount)?;
        let lp_minted = lp_tokens_for_deposit(pool.balance, pool.lent_out, amount, pool.total_lp_tokens)?;
        if lp_minted == 0 {
            return Err(LendingError::InvalidInput {
                param: "deposit_amount",
                reason: "deposit too small to mint any LP tokens",
            });
        }
        let next = pool.after_deposit(amount, lp_minted, snapshot.config.pool_fee)?;

        let action = PoolAction::Continuing(ContinuingAction::LpAdjust {
            value_delta: mint_quantity(amount)?,
            continuing_output: 0,
        });
        let pool_oref = &snapshot.pool_utxo.out_ref;
        let builder = spend_pool(TxBuilder::new(), self.config, &snapshot, action, Some(params.order_ref.clone()));
        let builder = continue_pool(builder, self.config, &snapshot, &next);
        let builder = process_order(builder, located.utxo, pool_oref, None, self.order_script(OrderKind::Deposit));
        let builder = pay_partial(
            builder,
            &order.order.partial_output,
            Value::single(pool.params.lp_token.clone(), lp_minted),
            &params.order_ref,
        )?;
        let builder = lp_mint(builder, &snapshot, mint_quantity(lp_minted)?, params.lp_policy_ref.as_ref());

        log_transition("execute_deposit", &next);
        let events = executed(pool, &params.order_ref, OrderKind::Deposit, self.ledger.current_time_ms());
        complete(self.ledger, builder, events).await
    }

    /// Execute a withdraw order: burn the locked LP tokens and pay out their share
    pub async fn execute_withdraw(&self, params: ExecuteOrderParams) -> BuilderResponse {
        BuilderResponse::from_result("execute_withdraw", self.build_execute_withdraw(params).await)
    }

    async fn build_execute_withdraw(&self, params: ExecuteOrderParams) -> LendingResult<(CompletedTx, EventLog)> {
        let located = self
            .read_order_of(&params.order_ref, OrderKind::Withdraw, "withdraw order")
            .await?;
        let snapshot = self.pool_for(&located.datum).await?;
        let Order::Withdraw(order) = located.datum else {
            return Err(LendingError::InvalidDatumShape { expected: "withdraw order" });
        };
        let pool = &snapshot.pool;
        let lp_burned = order.order.lp_tokens_burn;

        // the minimum was enforced at placement; rounding may land a lovelace under it
        let amount = amount_for_lp_burn(lp_burned, pool.balance, pool.lent_out, pool.total_lp_tokens)?;
        if amount > pool.balance {
            return Err(LendingError::InsufficientPoolBalance {
                available: pool.balance,
                requested: amount,
            });
        }
        let next = pool.after_withdraw(amount, lp_burned, snapshot.config.pool_fee)?;

        let action = PoolAction::Continuing(ContinuingAction::LpAdjust {
            value_delta: -mint_quantity(amount)?,
            continuing_output: 0,
        });
        let pool_oref = &snapshot.pool_utxo.out_ref;
        let builder = spend_pool(TxBuilder::new(), self.config, &snapshot, action, Some(params.order_ref.clone()));
        let builder = continue_pool(builder, self.config, &snapshot, &next);
        let builder = process_order(builder, located.utxo, pool_oref, None, self.order_script(OrderKind::Withdraw));
        let builder = pay_partial(
            builder,
            &order.order.partial_output,
            Value::single(order.order.receive_asset.clone(), amount),
            &params.order_ref,
        )?;
        let builder = lp_mint(builder, &snapshot, -mint_quantity(lp_burned)?, params.lp_policy_ref.as_ref());

        log_transition("execute_withdraw", &next);
        let events = executed(pool, &params.order_ref, OrderKind::Withdraw, self.ledger.current_time_ms());
        complete(self.ledger, builder, events).await
    }

    /// Execute a borrow order, refusing if the pool's rate rose above the order's cap
    pub async fn execute_borrow(&self, params: ExecuteBorrowParams) -> BuilderResponse {
        BuilderResponse::from_result("execute_borrow", self.build_execute_borrow(params).await)
    }

    async fn build_execute_borrow(&self, params: ExecuteBorrowParams) -> LendingResult<(CompletedTx, EventLog)> {
        let located = self
            .read_order_of(&params.order_ref, OrderKind::Borrow, "borrow order")
            .await?;
        let snapshot = self.pool_for(&located.datum).await?;
        let Order::Borrow(order) = located.datum else {
            return Err(LendingError::InvalidDatumShape { expected: "borrow order" });
        };
        let pool = &snapshot.pool;
        let borrow = &order.order;

        let loan_amount = borrow.expected_output.value.get(&pool.params.loan_asset);
        if loan_amount == 0 {
            return Err(LendingError::InvalidInput {
                param: "expected_output",
                reason: "order asks for no loan asset",
            });
        }
        snapshot.config.check_loan(loan_amount)?;
        if loan_amount >= pool.balance {
            return Err(LendingError::InsufficientPoolBalance {
                available: pool.balance,
                requested: loan_amount,
            });
        }
        let interest_rate = get_interest_rate(
            &snapshot.config.interest_params,
            loan_amount,
            pool.lent_out,
            pool.balance,
        )?;
        if interest_rate > borrow.max_interest_rate {
            return Err(LendingError::InterestRateExceeded {
                rate: interest_rate,
                max_rate: borrow.max_interest_rate,
            });
        }

        let collateral_amount = borrow.min_collateral_amount;
        let next = pool.after_borrow(loan_amount, snapshot.config.pool_fee)?;
        let pool_oref = snapshot.pool_utxo.out_ref.clone();
        let borrower_token_name = pool_oref.derived_token_name()?;
        let position = CollateralPosition {
            pool_nft_name: pool.params.pool_nft_name.clone(),
            loan_asset: pool.params.loan_asset.clone(),
            loan_amount,
            pool_config: snapshot.config.clone(),
            collateral_asset: pool.params.collateral_asset.clone(),
            collateral_amount,
            interest_rate,
            deposit_time: borrow.min_deposit_time,
            borrower_token_name: borrower_token_name.clone(),
            oracle_collateral_nft: pool.params.oracle_collateral_nft.clone(),
            oracle_loan_nft: pool.params.oracle_loan_nft.clone(),
            tag: Some(params.order_ref.clone()),
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
            loan_amount,
            collateral_amount,
            borrower_token_name: borrower_token_name.clone(),
            interest_rate,
            continuing_output: 0,
        });
        let process = BorrowProcessData {
            borrower_token_name: borrower_token_name.clone(),
            additional_ada: 0,
        };
        let builder = spend_pool(TxBuilder::new(), self.config, &snapshot, action, Some(params.order_ref.clone()));
        let builder = continue_pool(builder, self.config, &snapshot, &next)
            .pay_to_contract(
                borrow.collateral_address.clone(),
                Value::single(pool.params.collateral_asset.clone(), collateral_amount),
                position.to_plutus_data(),
            )
            .pay_to_address(
                borrow.partial_output.address.clone(),
                borrow
                    .partial_output
                    .value
                    .clone()
                    .with(self.config.borrower_nft(&borrower_token_name), 1),
            );
        let builder = pay_expected(builder, &borrow.expected_output);
        let builder = process_order(
            builder,
            located.utxo,
            &pool_oref,
            Some(process),
            self.order_script(OrderKind::Borrow),
        )
        .mint(
            self.config.scripts.collateral.clone(),
            borrower_token_name.clone(),
            1,
            CollateralMint::mint(pool_oref.clone(), COLLATERAL_OUTPUT).to_plutus_data(),
        )
        .with_script(&self.config.scripts.collateral, self.config.references.collateral.as_ref())
        .validity(params.validity);
        let builder = attach_proofs(builder, &proofs);

        log_transition("execute_borrow", &next);
        let mut events = executed(pool, &params.order_ref, OrderKind::Borrow, params.validity.valid_from);
        events.emit(PoolEvent::Borrowed {
            pool_nft_name: pool.params.pool_nft_name.clone(),
            borrower_token_name,
            loan_amount,
            collateral_amount,
            interest_rate,
            timestamp_ms: params.validity.valid_from,
        });
        complete(self.ledger, builder, events).await
    }

    /// Execute a repay order: close the loan against the pool and release the collateral
    pub async fn execute_repay(&self, params: ExecuteRepayParams) -> BuilderResponse {
        BuilderResponse::from_result("execute_repay", self.build_execute_repay(params).await)
    }

    async fn build_execute_repay(&self, params: ExecuteRepayParams) -> LendingResult<(CompletedTx, EventLog)> {
        let located = self
            .read_order_of(&params.order_ref, OrderKind::Repay, "repay order")
            .await?;
        let snapshot = self.pool_for(&located.datum).await?;
        let Order::Repay(order) = located.datum else {
            return Err(LendingError::InvalidDatumShape { expected: "repay order" });
        };
        let repay = &order.order;
        let loan = self.reader().read_collateral(&repay.order).await?;
        let position = &loan.datum;
        if position.pool_nft_name != snapshot.pool.params.pool_nft_name {
            return Err(LendingError::InvalidInput {
                param: "order",
                reason: "loan belongs to a different pool",
            });
        }

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
        let pool_oref = snapshot.pool_utxo.out_ref.clone();
        let collateral_redeemer = CollateralRedeemer {
            action: CollateralAction::Repay,
            interest,
            merge_type: MergeType::ImmediateWithPool(pool_oref.clone()),
        };

        let builder = spend_pool(TxBuilder::new(), self.config, &snapshot, action, Some(params.order_ref.clone()));
        let builder = continue_pool(builder, self.config, &snapshot, &next);
        let builder = process_order(builder, located.utxo, &pool_oref, None, self.order_script(OrderKind::Repay))
            .collect_from(loan.utxo.clone(), collateral_redeemer.to_plutus_data())
            .with_script(&self.config.scripts.collateral, self.config.references.collateral.as_ref());
        let builder = pay_expected(builder, &repay.expected_output)
            .mint(
                repay.burn_asset.policy_id.clone(),
                repay.burn_asset.asset_name.clone(),
                -1,
                CollateralMint::burn(repay.burn_asset.asset_name.clone()).to_plutus_data(),
            )
            .validity(params.validity);
        let builder = pay_platform_fee(
            builder,
            &snapshot.config.loan_fee_details.platform_fee_collector,
            position,
            fee,
        );

        log_transition("execute_repay", &next);
        info!(loan = %repay.order, repay_amount, "repay order executed");
        let mut events = executed(&snapshot.pool, &params.order_ref, OrderKind::Repay, params.validity.valid_to);
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
