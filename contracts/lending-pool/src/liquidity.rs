//! Deposit and Withdraw
//!
//! LP tokens track a share of `balance + lent_out`. Both directions round
//! down, so a depositor never receives more than their share and a
//! withdrawal never burns less than it should.

use serde::{Deserialize, Serialize};
use serde_json::json;

use lendpool_common::constants::metadata;
use lendpool_common::liquidity::{lp_burn_for_withdraw, lp_tokens_for_deposit};
use lendpool_common::{
    validity_range, BuilderResponse, CompletedTx, ContinuingAction, EventLog, LendingError, LendingResult,
    LpTokenRedeemer, OutputReference, PoolAction, PoolEvent, PoolSnapshot, PoolState, ToPlutusData, TxBuilder,
};

use crate::assembly::{complete, continue_pool, log_transition, mint_quantity, spend_pool};
use crate::LendingPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    pub amount: u64,
    /// Reference script output for the pool's LP policy
    pub lp_policy_ref: Option<OutputReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    pub amount: u64,
    pub lp_policy_ref: Option<OutputReference>,
}

/// Spend the pool, recreate it with `next` and mint or burn LP by `lp_delta`
fn adjust_liquidity(
    pool: &LendingPool<'_>,
    snapshot: &PoolSnapshot,
    next: &PoolState,
    value_delta: i64,
    lp_delta: i64,
    lp_policy_ref: Option<&OutputReference>,
) -> TxBuilder {
    let action = PoolAction::Continuing(ContinuingAction::LpAdjust {
        value_delta,
        continuing_output: 0,
    });
    let lp_token = &snapshot.pool.params.lp_token;
    let lp_redeemer = LpTokenRedeemer::TransitionPool {
        pool_oref: snapshot.pool_utxo.out_ref.clone(),
        continuing_output: 0,
    };

    let builder = spend_pool(TxBuilder::new(), pool.config, snapshot, action, None);
    continue_pool(builder, pool.config, snapshot, next)
        .mint(
            lp_token.policy_id.clone(),
            lp_token.asset_name.clone(),
            lp_delta,
            lp_redeemer.to_plutus_data(),
        )
        .with_script(&lp_token.policy_id, lp_policy_ref)
        .validity(validity_range(pool.ledger))
}

impl<'a> LendingPool<'a> {
    /// Deposit loan asset into the pool for freshly minted LP tokens
    pub async fn deposit(&self, params: DepositParams) -> BuilderResponse {
        BuilderResponse::from_result("deposit", self.build_deposit(params).await)
    }

    async fn build_deposit(&self, params: DepositParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        let pool = &snapshot.pool;

        let lp_minted = lp_tokens_for_deposit(pool.balance, pool.lent_out, params.amount, pool.total_lp_tokens)?;
        if lp_minted == 0 {
            return Err(LendingError::InvalidInput {
                param: "amount",
                reason: "deposit too small to mint any LP tokens",
            });
        }
        let next = pool.after_deposit(params.amount, lp_minted, snapshot.config.pool_fee)?;

        let builder = adjust_liquidity(
            self,
            &snapshot,
            &next,
            mint_quantity(params.amount)?,
            mint_quantity(lp_minted)?,
            params.lp_policy_ref.as_ref(),
        )
        .attach_metadata(metadata::MESSAGE, json!({ "msg": [metadata::DEPOSIT_MESSAGE] }));

        log_transition("deposit", &next);
        let mut events = EventLog::new();
        events.emit(PoolEvent::LiquidityAdded {
            pool_nft_name: pool.params.pool_nft_name.clone(),
            amount: params.amount,
            lp_minted,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        complete(self.ledger, builder, events).await
    }

    /// Withdraw loan asset from the pool by burning LP tokens
    pub async fn withdraw(&self, params: WithdrawParams) -> BuilderResponse {
        BuilderResponse::from_result("withdraw", self.build_withdraw(params).await)
    }

    async fn build_withdraw(&self, params: WithdrawParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        let pool = &snapshot.pool;

        snapshot.config.check_transition(params.amount)?;
        if params.amount > pool.balance {
            return Err(LendingError::InsufficientPoolBalance {
                available: pool.balance,
                requested: params.amount,
            });
        }
        let lp_burned = lp_burn_for_withdraw(pool.balance, pool.lent_out, params.amount, pool.total_lp_tokens)?;
        let next = pool.after_withdraw(params.amount, lp_burned, snapshot.config.pool_fee)?;

        let builder = adjust_liquidity(
            self,
            &snapshot,
            &next,
            -mint_quantity(params.amount)?,
            -mint_quantity(lp_burned)?,
            params.lp_policy_ref.as_ref(),
        );

        log_transition("withdraw", &next);
        let mut events = EventLog::new();
        events.emit(PoolEvent::LiquidityRemoved {
            pool_nft_name: pool.params.pool_nft_name.clone(),
            amount: params.amount,
            lp_burned,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        complete(self.ledger, builder, events).await
    }
}
