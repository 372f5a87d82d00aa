//! Orders placed by a user and then picked up by a batcher

use lendpool_batcher::{
    Batcher, CancelOrderParams, DepositOrderParams, ExecuteOrderParams, WithdrawOrderParams,
};
use lendpool_common::testing::*;
use lendpool_common::{
    FromPlutusData, LendingError, OutputReference, PoolEvent, PoolState, SdkConfig, TxPlan, Utxo,
};
use lendpool_price_oracle::testing::signing_collector;
use tracing_subscriber::EnvFilter;

const ONE_ADA: u64 = 1_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ledger(config: &SdkConfig, pool: &PoolState) -> MockLedger {
    MockLedger::new().with_pool(config, pool, &pool_config())
}

/// First output of a placement plan, as it lands on chain
fn landed_order(plan: &TxPlan) -> Utxo {
    let output = &plan.outputs[0];
    Utxo {
        out_ref: OutputReference::new(vec![0xee; 32], 0),
        address: output.address.clone(),
        value: output.value.clone(),
        datum: output.datum.clone(),
    }
}

#[tokio::test]
async fn test_deposit_order_round_trip() {
    init_tracing();
    let config = sdk_config();
    let oracle = signing_collector();
    let pool = pool_state(100 * ONE_ADA, 50 * ONE_ADA, 100 * ONE_ADA);

    let user_ledger = ledger(&config, &pool);
    let placed = Batcher::new(&user_ledger, &config, &oracle)
        .place_deposit_order(DepositOrderParams {
            pool_nft_name: POOL_NFT_NAME.to_vec(),
            amount: 75 * ONE_ADA,
        })
        .await
        .into_result()
        .unwrap();
    let order = landed_order(&placed.plan);

    let batcher_ledger = ledger(&config, &pool).with_utxo(order.clone());
    let response = Batcher::new(&batcher_ledger, &config, &oracle)
        .execute_deposit(ExecuteOrderParams {
            order_ref: order.out_ref.clone(),
            lp_policy_ref: None,
        })
        .await;
    assert!(response.success, "{:?}", response.error);
    assert!(matches!(response.events[0], PoolEvent::OrderExecuted { .. }));
    let plan = response.into_result().unwrap().plan;

    // 75 ADA into a 150 ADA pool backed by 100 LP
    let next = PoolState::from_plutus_data(plan.outputs[0].datum.as_ref().unwrap()).unwrap();
    assert_eq!(next.total_lp_tokens, 150 * ONE_ADA);
    assert_eq!(plan.outputs[1].address, wallet_address());
    assert_eq!(plan.outputs[1].value.get(&pool.params.lp_token), 50 * ONE_ADA);
    assert!(plan.input(&order.out_ref).is_some());
}

#[tokio::test]
async fn test_withdraw_order_cancelled_by_owner() {
    init_tracing();
    let config = sdk_config();
    let oracle = signing_collector();
    let pool = pool_state(200 * ONE_ADA, 100 * ONE_ADA, 150 * ONE_ADA);

    let user_ledger = ledger(&config, &pool);
    let placed = Batcher::new(&user_ledger, &config, &oracle)
        .place_withdraw_order(WithdrawOrderParams {
            pool_nft_name: POOL_NFT_NAME.to_vec(),
            amount: 60 * ONE_ADA,
        })
        .await
        .into_result()
        .unwrap();
    let order = landed_order(&placed.plan);

    let later = ledger(&config, &pool).with_utxo(order.clone());
    let batcher = Batcher::new(&later, &config, &oracle);

    // a deposit executor refuses the withdraw order
    let wrong = batcher
        .execute_deposit(ExecuteOrderParams {
            order_ref: order.out_ref.clone(),
            lp_policy_ref: None,
        })
        .await;
    assert_eq!(
        wrong.error,
        Some(LendingError::InvalidDatumShape { expected: "deposit order" })
    );

    let cancelled = batcher
        .cancel_order(CancelOrderParams {
            order_ref: order.out_ref.clone(),
        })
        .await
        .into_result()
        .unwrap();
    assert_eq!(cancelled.plan.inputs.len(), 1);
    assert_eq!(cancelled.plan.required_signers, vec![vec![0x0e; 28]]);
}

#[tokio::test]
async fn test_withdraw_order_at_minimum_executes() {
    init_tracing();
    let config = sdk_config();
    let oracle = signing_collector();
    let pool = pool_state(200 * ONE_ADA, 100 * ONE_ADA, 149 * ONE_ADA);
    let minimum = pool_config().min_transition;

    let user_ledger = ledger(&config, &pool);
    let placed = Batcher::new(&user_ledger, &config, &oracle)
        .place_withdraw_order(WithdrawOrderParams {
            pool_nft_name: POOL_NFT_NAME.to_vec(),
            amount: minimum,
        })
        .await
        .into_result()
        .unwrap();
    let order = landed_order(&placed.plan);
    let lp_burned = order.value.get(&pool.params.lp_token);

    let batcher_ledger = ledger(&config, &pool).with_utxo(order.clone());
    let response = Batcher::new(&batcher_ledger, &config, &oracle)
        .execute_withdraw(ExecuteOrderParams {
            order_ref: order.out_ref.clone(),
            lp_policy_ref: None,
        })
        .await;
    assert!(response.success, "{:?}", response.error);
    let plan = response.into_result().unwrap().plan;

    // 50 ADA requested, one lovelace lost to the two floor divisions
    let next = PoolState::from_plutus_data(plan.outputs[0].datum.as_ref().unwrap()).unwrap();
    assert_eq!(next.total_lp_tokens, 149 * ONE_ADA - lp_burned);
    assert_eq!(next.balance, 200 * ONE_ADA - (minimum - 1) + pool_config().pool_fee);
    assert_eq!(plan.outputs[1].address, wallet_address());
}
