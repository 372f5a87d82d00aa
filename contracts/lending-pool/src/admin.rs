//! Pool Lifecycle
//!
//! Creating a pool consumes a wallet seed output. The seed names the config
//! NFT and the delegator NFT, and through the parameterized stake validator
//! it also fixes the pool NFT name. Whoever holds the delegator NFT owns the
//! pool's staking rights and can later redelegate or delete it.

use serde::{Deserialize, Serialize};
use tracing::info;

use lendpool_common::constants::ada::MIN_ADA;
use lendpool_common::{
    AssetClass, BuilderResponse, CompletedTx, Credential, EventLog, LendingError, LendingResult,
    LpTokenRedeemer, NftRedeemer, OutputReference, PoolAction, PoolConfig, PoolEvent, PoolNftRedeemer,
    PoolParams, PoolSnapshot, PoolState, StakeRedeemer, ToPlutusData, TokenParameters, TxBuilder, Utxo, Value,
};

use crate::assembly::{complete, mint_quantity, pool_value, spend_pool};
use crate::LendingPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePoolParams {
    pub loan_asset: AssetClass,
    pub collateral_asset: AssetClass,
    pub initial_deposit: u64,
    /// Stake pool to delegate to, as used in the delegation certificate
    pub stake_pool: String,
    /// Hex stake pool id recorded in the pool NFT redeemer
    pub stake_pool_id: String,
    pub loan_params: TokenParameters,
    pub collateral_params: TokenParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePoolParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    pub lp_policy_ref: Option<OutputReference>,
    pub stake_script_ref: Option<OutputReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatePoolParams {
    #[serde(with = "hex::serde")]
    pub pool_nft_name: Vec<u8>,
    pub stake_pool: String,
    pub stake_script_ref: Option<OutputReference>,
}

impl<'a> LendingPool<'a> {
    /// Create a pool seeded with `initial_deposit` of the loan asset
    pub async fn create_pool(&self, params: CreatePoolParams) -> BuilderResponse {
        BuilderResponse::from_result("create_pool", self.build_create_pool(params).await)
    }

    async fn build_create_pool(&self, params: CreatePoolParams) -> LendingResult<(CompletedTx, EventLog)> {
        if params.initial_deposit == 0 {
            return Err(LendingError::InvalidInput {
                param: "initial_deposit",
                reason: "must be positive",
            });
        }
        let delegation = hex::decode(&params.stake_pool_id).map_err(|_| LendingError::InvalidInput {
            param: "stake_pool_id",
            reason: "not hex",
        })?;
        let seed = self
            .ledger
            .wallet_utxos()
            .await?
            .pop()
            .ok_or(LendingError::InvalidInput {
                param: "wallet",
                reason: "no output to seed the pool",
            })?;

        let scripts = &self.config.scripts;
        let config_nft_name = seed.out_ref.derived_token_name()?;
        let delegator_nft = self.config.delegator_nft(&config_nft_name);
        let pool_nft_name = self
            .parameterizer
            .pool_stake_hash(&scripts.pool, &delegator_nft, &seed.out_ref)?;
        let lp_policy = self.parameterizer.lp_token_policy(&scripts.pool, &pool_nft_name)?;

        let pool = PoolState {
            params: PoolParams {
                collateral_address: self.config.collateral_address(&pool_nft_name),
                loan_asset: params.loan_asset.clone(),
                collateral_asset: params.collateral_asset,
                oracle_collateral_nft: params.collateral_params.oracle_nft.clone(),
                oracle_loan_nft: params.loan_params.oracle_nft.clone(),
                lp_token: AssetClass::new(lp_policy.clone(), pool_nft_name.clone()),
                pool_nft_name: pool_nft_name.clone(),
                pool_config_name: config_nft_name.clone(),
            },
            balance: params.initial_deposit,
            lent_out: 0,
            total_lp_tokens: params.initial_deposit,
        };
        let pool_config = PoolConfig::for_new_pool(&params.loan_asset, &params.loan_params, &params.collateral_params)?;
        let stake = Credential::Script(pool_nft_name.clone());
        let nft_redeemer = NftRedeemer::Mint {
            seed: seed.out_ref.clone(),
            output_index: 0,
        }
        .to_plutus_data();

        let builder = TxBuilder::new()
            .spend(seed.clone())
            .with_script(&scripts.pool, self.config.references.pool.as_ref())
            .mint(
                scripts.pool.clone(),
                pool_nft_name.clone(),
                1,
                PoolNftRedeemer::Mint {
                    output_index: 0,
                    initial_pool_delegation: delegation,
                }
                .to_plutus_data(),
            )
            .pay_to_contract(
                self.config.pool_address(&pool_nft_name),
                pool_value(self.config, &pool),
                pool.to_plutus_data(),
            )
            .mint(
                lp_policy.clone(),
                pool_nft_name.clone(),
                mint_quantity(params.initial_deposit)?,
                LpTokenRedeemer::CreatePool { produced_output: 0 }.to_plutus_data(),
            )
            .attach_script(lp_policy)
            .mint(
                scripts.delegator_nft_policy.clone(),
                config_nft_name.clone(),
                1,
                nft_redeemer.clone(),
            )
            .with_script(
                &scripts.delegator_nft_policy,
                self.config.references.delegator_nft_policy.as_ref(),
            )
            .mint(scripts.pool_config_policy.clone(), config_nft_name.clone(), 1, nft_redeemer)
            .with_script(
                &scripts.pool_config_policy,
                self.config.references.pool_config_policy.as_ref(),
            )
            .pay_to_contract(
                self.config.pool_config_address(),
                Value::lovelace(MIN_ADA).with(self.config.config_nft(&config_nft_name), 1),
                pool_config.to_plutus_data(),
            )
            .register_stake(stake.clone())
            .delegate_to(
                stake,
                params.stake_pool.clone(),
                StakeRedeemer::CreatePool(seed.out_ref.clone()).to_plutus_data(),
            )
            .attach_script(pool_nft_name.clone());

        info!(
            pool = %hex::encode(&pool_nft_name),
            config = %hex::encode(&config_nft_name),
            seed = %seed.out_ref,
            initial_deposit = params.initial_deposit,
            "creating pool"
        );
        let mut events = EventLog::new();
        events.emit(PoolEvent::PoolCreated {
            pool_nft_name,
            config_nft_name,
            initial_deposit: params.initial_deposit,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        complete(self.ledger, builder, events).await
    }

    /// Output holding the pool's delegator NFT
    async fn pool_owner(&self, snapshot: &PoolSnapshot) -> LendingResult<Utxo> {
        let delegator_nft = self.config.delegator_nft(&snapshot.pool.params.pool_config_name);
        self.ledger
            .utxo_by_unit(&delegator_nft)
            .await?
            .ok_or(LendingError::InvalidPoolState {
                reason: "delegator NFT not found",
            })
    }

    /// Destroy a pool, burning its LP supply and identity tokens
    pub async fn delete_pool(&self, params: DeletePoolParams) -> BuilderResponse {
        BuilderResponse::from_result("delete_pool", self.build_delete_pool(params).await)
    }

    async fn build_delete_pool(&self, params: DeletePoolParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        let owner = self.pool_owner(&snapshot).await?;
        let pool = &snapshot.pool;
        let scripts = &self.config.scripts;
        let stake = Credential::Script(pool.params.pool_nft_name.clone());
        let rewards = self.ledger.delegation(&stake).await?.rewards;

        let mut builder = spend_pool(TxBuilder::new(), self.config, &snapshot, PoolAction::Destroy, None)
            .spend(owner.clone());
        if pool.total_lp_tokens > 0 {
            builder = builder
                .mint(
                    pool.params.lp_token.policy_id.clone(),
                    pool.params.lp_token.asset_name.clone(),
                    -mint_quantity(pool.total_lp_tokens)?,
                    LpTokenRedeemer::DestroyPool {
                        pool_oref: snapshot.pool_utxo.out_ref.clone(),
                    }
                    .to_plutus_data(),
                )
                .with_script(&pool.params.lp_token.policy_id, params.lp_policy_ref.as_ref());
        }
        builder = builder
            .mint(
                scripts.pool.clone(),
                pool.params.pool_nft_name.clone(),
                -1,
                PoolNftRedeemer::Burn {
                    pool_nft_name: pool.params.pool_nft_name.clone(),
                }
                .to_plutus_data(),
            )
            .mint(
                scripts.delegator_nft_policy.clone(),
                pool.params.pool_config_name.clone(),
                -1,
                NftRedeemer::Burn {
                    token_name: pool.params.pool_config_name.clone(),
                }
                .to_plutus_data(),
            )
            .with_script(
                &scripts.delegator_nft_policy,
                self.config.references.delegator_nft_policy.as_ref(),
            );

        // rewards must be withdrawn before the credential can go
        let deregistered = rewards == 0;
        if deregistered {
            builder = builder
                .deregister_stake(
                    stake,
                    StakeRedeemer::Publish {
                        pool_owner_oref: owner.out_ref.clone(),
                    }
                    .to_plutus_data(),
                )
                .with_script(&pool.params.pool_nft_name, params.stake_script_ref.as_ref());
        }

        info!(
            pool = %hex::encode(&pool.params.pool_nft_name),
            lp_burned = pool.total_lp_tokens,
            rewards,
            deregistered,
            "deleting pool"
        );
        let mut events = EventLog::new();
        events.emit(PoolEvent::PoolDeleted {
            pool_nft_name: pool.params.pool_nft_name.clone(),
            lp_burned: pool.total_lp_tokens,
            deregistered,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        complete(self.ledger, builder, events).await
    }

    /// Redelegate the pool's stake credential
    pub async fn delegate_pool(&self, params: DelegatePoolParams) -> BuilderResponse {
        BuilderResponse::from_result("delegate_pool", self.build_delegate_pool(params).await)
    }

    async fn build_delegate_pool(&self, params: DelegatePoolParams) -> LendingResult<(CompletedTx, EventLog)> {
        let snapshot = self.reader().read_pool(&params.pool_nft_name).await?;
        let owner = self.pool_owner(&snapshot).await?;
        let pool_nft_name = snapshot.pool.params.pool_nft_name.clone();

        let builder = TxBuilder::new()
            .spend(owner.clone())
            .delegate_to(
                Credential::Script(pool_nft_name.clone()),
                params.stake_pool.clone(),
                StakeRedeemer::Publish {
                    pool_owner_oref: owner.out_ref,
                }
                .to_plutus_data(),
            )
            .with_script(&pool_nft_name, params.stake_script_ref.as_ref());

        let mut events = EventLog::new();
        events.emit(PoolEvent::PoolDelegated {
            pool_nft_name,
            stake_pool_id: params.stake_pool,
            timestamp_ms: self.ledger.current_time_ms(),
        });
        complete(self.ledger, builder, events).await
    }
}
