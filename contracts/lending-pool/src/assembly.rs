//! Assembly Helpers
//!
//! Pieces every pool-spending transaction shares: the pool input and its
//! successor output, oracle proofs, the platform fee output and the final
//! hand-off to the ledger client. The batcher crate builds on these too.

use tracing::{debug, info};

use lendpool_common::fees::{get_platform_fee, platform_fee_amount};
use lendpool_common::{
    Address, CollateralPosition, CompletedTx, EventLog, LedgerClient, LendingError, LendingResult,
    OutputReference, PlutusData, PoolAction, PoolRedeemer, PoolSnapshot, PoolState, PriceSnapshot, SdkConfig,
    ToPlutusData, TxBuilder, Value,
};
use lendpool_price_oracle::{OracleProof, OracleProofCollector};

/// Value locked at a pool output: its balance plus the pool NFT
pub fn pool_value(config: &SdkConfig, pool: &PoolState) -> Value {
    Value::single(pool.params.loan_asset.clone(), pool.balance)
        .with(config.pool_nft(&pool.params.pool_nft_name), 1)
}

/// Spend the pool output and reference its config
pub fn spend_pool(
    builder: TxBuilder,
    config: &SdkConfig,
    snapshot: &PoolSnapshot,
    action: PoolAction,
    order: Option<OutputReference>,
) -> TxBuilder {
    let redeemer = PoolRedeemer {
        action,
        config_ref: snapshot.config_utxo.out_ref.clone(),
        order,
    };
    builder
        .collect_from(snapshot.pool_utxo.clone(), redeemer.to_plutus_data())
        .with_script(&config.scripts.pool, config.references.pool.as_ref())
        .read_from(snapshot.config_utxo.out_ref.clone())
}

/// Recreate the pool at its own address with the successor datum
pub fn continue_pool(builder: TxBuilder, config: &SdkConfig, snapshot: &PoolSnapshot, next: &PoolState) -> TxBuilder {
    builder.pay_to_contract(
        snapshot.pool_utxo.address.clone(),
        pool_value(config, next),
        next.to_plutus_data(),
    )
}

/// Mint quantity for a token amount
pub fn mint_quantity(amount: u64) -> LendingResult<i64> {
    i64::try_from(amount).map_err(|_| LendingError::Overflow)
}

/// Platform share of `interest`, priced with the loan's origination snapshot
pub fn platform_fee(position: &CollateralPosition, interest: u64) -> LendingResult<u64> {
    let rate = get_platform_fee(
        position.loan_amount,
        position.balance,
        position.lent_out,
        &position.pool_config.loan_fee_details,
    )?;
    platform_fee_amount(interest, rate)
}

/// Pay the platform fee to the collector, tagged with the borrower token
///
/// Nothing is added when the fee rounds to zero.
pub fn pay_platform_fee(
    builder: TxBuilder,
    collector: &Address,
    position: &CollateralPosition,
    amount: u64,
) -> TxBuilder {
    if amount == 0 {
        return builder;
    }
    builder.pay_to_contract(
        collector.clone(),
        Value::single(position.loan_asset.clone(), amount),
        PlutusData::bytes(&position.borrower_token_name),
    )
}

/// Proofs for the pool's loan and collateral assets
///
/// ADA sides need none; a native side without a snapshot fails the
/// operation with `OraclePriceUnavailable`.
pub async fn price_proofs(
    oracle: &OracleProofCollector,
    ledger: &dyn LedgerClient,
    pool: &PoolState,
    loan_price: Option<PriceSnapshot>,
    collateral_price: Option<PriceSnapshot>,
) -> LendingResult<Vec<OracleProof>> {
    let params = &pool.params;
    let mut proofs = oracle
        .collect_if_native(ledger, &params.oracle_loan_nft, &params.loan_asset, loan_price)
        .await?;
    proofs.extend(
        oracle
            .collect_if_native(ledger, &params.oracle_collateral_nft, &params.collateral_asset, collateral_price)
            .await?,
    );
    Ok(proofs)
}

pub fn log_transition(operation: &'static str, next: &PoolState) {
    info!(
        operation,
        pool = %hex::encode(&next.params.pool_nft_name),
        balance = next.balance,
        lent_out = next.lent_out,
        total_lp = next.total_lp_tokens,
        "pool transition"
    );
}

/// Hand the plan to the ledger client for balancing
pub async fn complete(
    ledger: &dyn LedgerClient,
    builder: TxBuilder,
    events: EventLog,
) -> LendingResult<(CompletedTx, EventLog)> {
    let tx = ledger.complete(builder.build()).await?;
    debug!(tx_hash = %tx.tx_hash, fee = tx.fee, "transaction completed");
    Ok((tx, events))
}
