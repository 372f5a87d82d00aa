//! Order Placement
//!
//! Each placement locks the user's funds at an order contract together with
//! a datum naming the pool, the owner allowed to cancel and the output the
//! batcher must produce. The locked value always covers the batcher fee and
//! a refundable deposit on top of the pool fee the execution will pay.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use lendpool_common::constants::ada::{BATCHER_FEE, MIN_ADA, ORDER_DEPOSIT, ORDER_DEPOSIT_NATIVE_COLLATERAL};
use lendpool_common::constants::metadata;
use lendpool_common::interest::get_interest_rate;
use lendpool_common::liquidity::lp_burn_for_withdraw;
use lendpool_common::{
    derive_stake_credential, Address, AssetClass, BorrowOrder, BuilderResponse, CompletedTx, Credential,
    DepositOrder, EventLog, ExpectedOutput, Hash, LendingError, LendingResult, OrderDatum, OrderKind,
    OutputDatum, OutputTemplate, PoolEvent, PriceSnapshot, ToPlutusData, TxBuilder, ValidityRange, Value,
    WithdrawOrder,
};
use lendpool_pool::assembly::complete;

use crate::Batcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOrderParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawOrderParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    /// Loan asset amount to receive
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowOrderParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    pub loan_amount: u64,
    pub collateral_amount: u64,
    pub validity: ValidityRange,
    pub loan_price: Option<PriceSnapshot>,
    pub collateral_price: Option<PriceSnapshot>,
}

/// Wallet key and the address order outputs pay back to
struct Owner {
    key_hash: Hash,
    address: Address,
}

impl Owner {
    fn template(&self, value: Value) -> OutputTemplate {
        OutputTemplate {
            address: self.address.clone(),
            value,
            datum: OutputDatum::NoDatum,
        }
    }

    fn envelope<T>(&self, pool_nft: AssetClass, order: T) -> OrderDatum<T> {
        OrderDatum {
            control_credential: Credential::VerificationKey(self.key_hash.clone()),
            pool_nft,
            batcher_fee_ada: BATCHER_FEE,
            order,
        }
    }
}

/// Price metadata `{a, l}` for a native asset
fn price_metadata(asset: &AssetClass, snapshot: Option<PriceSnapshot>) -> LendingResult<Option<serde_json::Value>> {
    if asset.is_ada() {
        return Ok(None);
    }
    let snapshot = snapshot.ok_or_else(|| LendingError::OraclePriceUnavailable { asset: asset.unit() })?;
    Ok(Some(json!({ "a": snapshot.token_amount, "l": snapshot.lovelace_amount })))
}

impl<'a> Batcher<'a> {
    async fn owner(&self) -> LendingResult<Owner> {
        let wallet = self.ledger.wallet_address().await?;
        let key_hash = wallet
            .payment_key_hash()
            .ok_or(LendingError::InvalidInput {
                param: "wallet",
                reason: "payment credential is not a key",
            })?
            .to_vec();
        let address = Address {
            payment: Credential::VerificationKey(key_hash.clone()),
            stake: derive_stake_credential(&wallet),
        };
        Ok(Owner { key_hash, address })
    }

    fn placed(&self, pool_nft_name: &[u8], kind: OrderKind, amount: u64) -> EventLog {
        info!(pool = %hex::encode(pool_nft_name), ?kind, amount, "placing order");
        let mut events = EventLog::new();
        events.emit(PoolEvent::OrderPlaced {
            pool_nft_name: pool_nft_name.to_vec(),
            kind,
            amount,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        events
    }

    /// Queue a deposit of `amount` loan asset
    pub async fn place_deposit_order(&self, params: DepositOrderParams) -> BuilderResponse {
        BuilderResponse::from_result("place_deposit_order", self.build_deposit_order(params).await)
    }

    async fn build_deposit_order(&self, params: DepositOrderParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        snapshot.config.check_transition(params.amount)?;
        let pool = &snapshot.pool;
        let owner = self.owner().await?;

        let datum = owner.envelope(
            self.config.pool_nft(&params.pool_nft_name),
            DepositOrder {
                deposit_amount: params.amount,
                partial_output: owner.template(Value::lovelace(MIN_ADA)),
                lp_asset: pool.params.lp_token.clone(),
            },
        );
        let value = Value::lovelace(ORDER_DEPOSIT)
            .with(pool.params.loan_asset.clone(), params.amount)
            .with(pool.params.loan_asset.clone(), snapshot.config.pool_fee);

        let builder = TxBuilder::new().pay_to_contract(
            self.config.order_address(&self.config.scripts.order_deposit),
            value,
            datum.to_plutus_data(),
        );
        let events = self.placed(&params.pool_nft_name, OrderKind::Deposit, params.amount);
        complete(self.ledger, builder, events).await
    }

    /// Queue a withdrawal of `amount` loan asset, locking the LP tokens it burns
    pub async fn place_withdraw_order(&self, params: WithdrawOrderParams) -> BuilderResponse {
        BuilderResponse::from_result("place_withdraw_order", self.build_withdraw_order(params).await)
    }

    async fn build_withdraw_order(&self, params: WithdrawOrderParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        snapshot.config.check_transition(params.amount)?;
        let pool = &snapshot.pool;
        let lp_tokens_burn = lp_burn_for_withdraw(pool.balance, pool.lent_out, params.amount, pool.total_lp_tokens)?;
        let owner = self.owner().await?;

        let datum = owner.envelope(
            self.config.pool_nft(&params.pool_nft_name),
            WithdrawOrder {
                lp_tokens_burn,
                partial_output: owner.template(Value::lovelace(MIN_ADA)),
                receive_asset: pool.params.loan_asset.clone(),
                lp_asset: pool.params.lp_token.clone(),
            },
        );
        let value = Value::lovelace(ORDER_DEPOSIT)
            .with(pool.params.lp_token.clone(), lp_tokens_burn)
            .with(pool.params.loan_asset.clone(), snapshot.config.pool_fee);

        let builder = TxBuilder::new().pay_to_contract(
            self.config.order_address(&self.config.scripts.order_withdraw),
            value,
            datum.to_plutus_data(),
        );
        let events = self.placed(&params.pool_nft_name, OrderKind::Withdraw, lp_tokens_burn);
        complete(self.ledger, builder, events).await
    }

    /// Queue a loan, capping the rate at what the pool charges right now
    pub async fn place_borrow_order(&self, params: BorrowOrderParams) -> BuilderResponse {
        BuilderResponse::from_result("place_borrow_order", self.build_borrow_order(params).await)
    }

    async fn build_borrow_order(&self, params: BorrowOrderParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        snapshot.config.check_loan(params.loan_amount)?;
        if params.collateral_amount == 0 {
            return Err(LendingError::InvalidInput {
                param: "collateral_amount",
                reason: "must be positive",
            });
        }
        let pool = &snapshot.pool;
        let loan_metadata = price_metadata(&pool.params.loan_asset, params.loan_price)?;
        let collateral_metadata = price_metadata(&pool.params.collateral_asset, params.collateral_price)?;

        let max_interest_rate = get_interest_rate(
            &snapshot.config.interest_params,
            params.loan_amount,
            pool.lent_out,
            pool.balance,
        )?;
        let owner = self.owner().await?;

        let mut expected_value = Value::single(pool.params.loan_asset.clone(), params.loan_amount);
        if !pool.params.loan_asset.is_ada() {
            expected_value.add(AssetClass::ada(), MIN_ADA);
        }
        let datum = owner.envelope(
            self.config.pool_nft(&params.pool_nft_name),
            BorrowOrder {
                expected_output: ExpectedOutput {
                    address: owner.address.clone(),
                    value: expected_value,
                    datum: OutputDatum::NoDatum,
                    reference_script: None,
                },
                partial_output: owner.template(Value::lovelace(MIN_ADA)),
                borrower_nft_policy: self.config.scripts.collateral.clone(),
                min_collateral_amount: params.collateral_amount,
                min_deposit_time: params.validity.valid_from,
                max_interest_rate,
                collateral_address: pool.params.collateral_address.clone(),
            },
        );

        let deposit = if pool.params.collateral_asset.is_ada() {
            ORDER_DEPOSIT
        } else {
            ORDER_DEPOSIT_NATIVE_COLLATERAL
        };
        let value = Value::lovelace(deposit)
            .with(pool.params.collateral_asset.clone(), params.collateral_amount)
            .with(pool.params.loan_asset.clone(), snapshot.config.pool_fee);

        let mut builder = TxBuilder::new().pay_to_contract(
            self.config.order_address(&self.config.scripts.order_borrow),
            value,
            datum.to_plutus_data(),
        );
        if let Some(prices) = loan_metadata {
            builder = builder.attach_metadata(metadata::LOAN_PRICE, prices);
        }
        if let Some(prices) = collateral_metadata {
            builder = builder.attach_metadata(metadata::COLLATERAL_PRICE, prices);
        }

        let events = self.placed(&params.pool_nft_name, OrderKind::Borrow, params.loan_amount);
        complete(self.ledger, builder, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use lendpool_common::testing::*;
    use lendpool_common::{FromPlutusData, Order, StakeCredential};

    const ONE_ADA: u64 = 1_000_000;

    #[tokio::test]
    async fn test_deposit_order_locks_amount_and_fees() {
        let env = TestEnv::new(pool_state(100 * ONE_ADA, 0, 100 * ONE_ADA));
        let response = env
            .batcher()
            .place_deposit_order(DepositOrderParams {
                pool_nft_name: POOL_NFT_NAME.to_vec(),
                amount: 75 * ONE_ADA,
            })
            .await;
        assert!(response.success, "{:?}", response.error);
        let plan = response.into_result().unwrap().plan;

        let output = &plan.outputs[0];
        assert_eq!(output.address, env.config.order_address(&env.config.scripts.order_deposit));
        assert_eq!(output.value.coin(), 4 * ONE_ADA + 75 * ONE_ADA + pool_config().pool_fee);

        let Order::Deposit(datum) = Order::decode(output.datum.as_ref().unwrap()).unwrap() else {
            panic!("expected a deposit order");
        };
        assert_eq!(datum.control_credential, Credential::VerificationKey(vec![0x0e; 28]));
        assert_eq!(datum.pool_nft, env.config.pool_nft(&POOL_NFT_NAME));
        assert_eq!(datum.batcher_fee_ada, BATCHER_FEE);
        assert_eq!(datum.order.deposit_amount, 75 * ONE_ADA);
        assert_eq!(
            datum.order.partial_output.address.stake,
            Some(StakeCredential::Inline(Credential::VerificationKey(vec![0x5e; 28])))
        );
    }

    #[tokio::test]
    async fn test_withdraw_order_locks_lp_tokens() {
        // 300 ADA of value behind 150 LP
        let env = TestEnv::new(pool_state(200 * ONE_ADA, 100 * ONE_ADA, 150 * ONE_ADA));
        let response = env
            .batcher()
            .place_withdraw_order(WithdrawOrderParams {
                pool_nft_name: POOL_NFT_NAME.to_vec(),
                amount: 60 * ONE_ADA,
            })
            .await;
        let plan = response.into_result().unwrap().plan;

        let lp = pool_state(0, 0, 0).params.lp_token;
        let output = &plan.outputs[0];
        assert_eq!(output.value.get(&lp), 30 * ONE_ADA);
        assert_eq!(output.value.coin(), 4 * ONE_ADA + pool_config().pool_fee);
        let Order::Withdraw(datum) = Order::decode(output.datum.as_ref().unwrap()).unwrap() else {
            panic!("expected a withdraw order");
        };
        assert_eq!(datum.order.lp_tokens_burn, 30 * ONE_ADA);
        assert_eq!(datum.order.receive_asset, AssetClass::ada());
    }

    #[tokio::test]
    async fn test_small_orders_rejected() {
        let env = TestEnv::new(pool_state(100 * ONE_ADA, 0, 100 * ONE_ADA));
        let response = env
            .batcher()
            .place_deposit_order(DepositOrderParams {
                pool_nft_name: POOL_NFT_NAME.to_vec(),
                amount: 10 * ONE_ADA,
            })
            .await;
        assert!(matches!(response.error, Some(LendingError::BelowProtocolMinimum { .. })));
        assert!(env.ledger.completed().is_empty());
    }

    #[tokio::test]
    async fn test_borrow_order_with_native_collateral() {
        let env = TestEnv::new(pool_state(500 * ONE_ADA, 0, 500 * ONE_ADA));
        let validity = ValidityRange::new(1_699_999_880_000, 1_700_000_600_000);
        let response = env
            .batcher()
            .place_borrow_order(BorrowOrderParams {
                pool_nft_name: POOL_NFT_NAME.to_vec(),
                loan_amount: 60 * ONE_ADA,
                collateral_amount: 400 * ONE_ADA,
                validity,
                loan_price: None,
                collateral_price: Some(PriceSnapshot::new(1_000, 2_000)),
            })
            .await;
        assert!(response.success, "{:?}", response.error);
        let plan = response.into_result().unwrap().plan;

        let output = &plan.outputs[0];
        assert_eq!(output.value.coin(), 7_500_000 + pool_config().pool_fee);
        assert_eq!(output.value.get(&collateral_asset()), 400 * ONE_ADA);

        let Order::Borrow(datum) = Order::decode(output.datum.as_ref().unwrap()).unwrap() else {
            panic!("expected a borrow order");
        };
        let rate = get_interest_rate(&pool_config().interest_params, 60 * ONE_ADA, 0, 500 * ONE_ADA).unwrap();
        assert_eq!(datum.order.max_interest_rate, rate);
        assert_eq!(datum.order.min_deposit_time, validity.valid_from);
        assert_eq!(datum.order.expected_output.value, Value::lovelace(60 * ONE_ADA));
        assert_eq!(datum.order.borrower_nft_policy, env.config.scripts.collateral);

        assert_eq!(plan.metadata.get(&metadata::COLLATERAL_PRICE), Some(&json!({ "a": 1_000, "l": 2_000 })));
        assert!(!plan.metadata.contains_key(&metadata::LOAN_PRICE));
    }

    #[tokio::test]
    async fn test_borrow_order_needs_collateral_price() {
        let env = TestEnv::new(pool_state(500 * ONE_ADA, 0, 500 * ONE_ADA));
        let response = env
            .batcher()
            .place_borrow_order(BorrowOrderParams {
                pool_nft_name: POOL_NFT_NAME.to_vec(),
                loan_amount: 60 * ONE_ADA,
                collateral_amount: 400 * ONE_ADA,
                validity: ValidityRange::new(0, 1),
                loan_price: None,
                collateral_price: None,
            })
            .await;
        assert!(matches!(response.error, Some(LendingError::OraclePriceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_script_wallet_cannot_place_orders() {
        let env = TestEnv::with_ledger(
            MockLedger::new().with_wallet(Address::script(vec![0x99; 28], None)),
            pool_state(100 * ONE_ADA, 0, 100 * ONE_ADA),
        );
        let response = env
            .batcher()
            .place_deposit_order(DepositOrderParams {
                pool_nft_name: POOL_NFT_NAME.to_vec(),
                amount: 60 * ONE_ADA,
            })
            .await;
        assert!(matches!(response.error, Some(LendingError::InvalidInput { param: "wallet", .. })));
    }

    #[test]
    fn test_decoded_order_round_trips_through_owner() {
        let owner = Owner {
            key_hash: vec![0x0e; 28],
            address: wallet_address(),
        };
        let datum = owner.envelope(
            AssetClass::new(vec![0x90; 28], POOL_NFT_NAME.to_vec()),
            DepositOrder {
                deposit_amount: 1,
                partial_output: owner.template(Value::lovelace(MIN_ADA)),
                lp_asset: AssetClass::ada(),
            },
        );
        let decoded = OrderDatum::<DepositOrder>::from_plutus_data(&datum.to_plutus_data()).unwrap();
        assert_eq!(decoded, datum);
    }
}
