//! Test Utilities
//!
//! In-memory [`LedgerClient`] plus fixture builders shared by the operation
//! crates' tests. Enabled by the `test-utils` feature.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use blake2::digest::consts::U28;
use blake2::{Blake2b, Digest};

use crate::config::{OracleConfig, ProtocolScripts, ScriptReferences, SdkConfig};
use crate::constants::defaults;
use crate::datums::{CollateralPosition, InterestParams, LoanFeeDetails, PoolConfig, PoolParams, PoolState};
use crate::errors::{LendingError, LendingResult};
use crate::ledger::{DelegationInfo, LedgerClient, ScriptParameterizer};
use crate::plutus::ToPlutusData;
use crate::tx::{CompletedTx, TxPlan};
use crate::types::{Address, AssetClass, Credential, Hash, OutputReference, Utxo, Value};

type Blake2b224 = Blake2b<U28>;

/// Milliseconds per slot on the mock chain
pub const SLOT_LENGTH_MS: i64 = 1_000;

/// Fee reported for every completed transaction
pub const MOCK_FEE: u64 = 180_000;

#[derive(Debug, Default)]
struct MockState {
    utxos: Vec<Utxo>,
    wallet_utxos: Vec<Utxo>,
    delegations: HashMap<Credential, DelegationInfo>,
    completed: Vec<TxPlan>,
    submitted: Vec<String>,
}

/// In-memory ledger with one-second slots starting at POSIX zero
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<MockState>,
    wallet: Address,
    time_ms: i64,
    reject: Option<String>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            wallet: wallet_address(),
            time_ms: 1_700_000_000_000,
            reject: None,
        }
    }

    pub fn with_time(mut self, time_ms: i64) -> Self {
        self.time_ms = time_ms;
        self
    }

    pub fn with_wallet(mut self, address: Address) -> Self {
        self.wallet = address;
        self
    }

    pub fn with_utxo(self, utxo: Utxo) -> Self {
        self.lock().utxos.push(utxo);
        self
    }

    pub fn with_wallet_utxo(self, utxo: Utxo) -> Self {
        self.lock().wallet_utxos.push(utxo);
        self
    }

    pub fn with_delegation(self, credential: Credential, info: DelegationInfo) -> Self {
        self.lock().delegations.insert(credential, info);
        self
    }

    /// Make `complete` and `submit` fail with `message`
    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject = Some(message.to_string());
        self
    }

    /// Pool output and its config output, laid out as deployed
    pub fn with_pool(self, config: &SdkConfig, pool: &PoolState, pool_config: &PoolConfig) -> Self {
        self.with_utxo(pool_utxo(config, pool)).with_utxo(config_utxo(config, pool, pool_config))
    }

    /// Plans completed so far, oldest first
    pub fn completed(&self) -> Vec<TxPlan> {
        self.lock().completed.clone()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_rejection(&self) -> LendingResult<()> {
        match &self.reject {
            Some(message) => Err(LendingError::LedgerRejection(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn utxo_by_unit(&self, asset: &AssetClass) -> LendingResult<Option<Utxo>> {
        let state = self.lock();
        Ok(state
            .utxos
            .iter()
            .chain(state.wallet_utxos.iter())
            .find(|u| u.value.get(asset) > 0)
            .cloned())
    }

    async fn utxos_by_output_reference(&self, refs: &[OutputReference]) -> LendingResult<Vec<Utxo>> {
        let state = self.lock();
        Ok(refs
            .iter()
            .filter_map(|r| {
                state
                    .utxos
                    .iter()
                    .chain(state.wallet_utxos.iter())
                    .find(|u| &u.out_ref == r)
                    .cloned()
            })
            .collect())
    }

    async fn delegation(&self, credential: &Credential) -> LendingResult<DelegationInfo> {
        Ok(self.lock().delegations.get(credential).cloned().unwrap_or_default())
    }

    async fn wallet_address(&self) -> LendingResult<Address> {
        Ok(self.wallet.clone())
    }

    async fn wallet_utxos(&self) -> LendingResult<Vec<Utxo>> {
        Ok(self.lock().wallet_utxos.clone())
    }

    fn current_time_ms(&self) -> i64 {
        self.time_ms
    }

    fn unix_time_to_slot(&self, time_ms: i64) -> u64 {
        time_ms.div_euclid(SLOT_LENGTH_MS).max(0) as u64
    }

    fn slot_to_unix_time(&self, slot: u64) -> i64 {
        slot as i64 * SLOT_LENGTH_MS
    }

    async fn complete(&self, plan: TxPlan) -> LendingResult<CompletedTx> {
        self.check_rejection()?;
        let mut state = self.lock();
        let tx_hash = hex::encode(Blake2b224::digest(format!("{:?}", plan).as_bytes()));
        state.completed.push(plan.clone());
        Ok(CompletedTx {
            tx_hash,
            cbor_hex: String::new(),
            fee: MOCK_FEE,
            plan,
        })
    }

    async fn submit(&self, tx: &CompletedTx) -> LendingResult<String> {
        self.check_rejection()?;
        self.lock().submitted.push(tx.tx_hash.clone());
        Ok(tx.tx_hash.clone())
    }
}

/// Parameterizer deriving script hashes by hashing their parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct MockParameterizer;

impl ScriptParameterizer for MockParameterizer {
    fn pool_stake_hash(
        &self,
        pool_script_hash: &[u8],
        delegator_nft: &AssetClass,
        seed: &OutputReference,
    ) -> LendingResult<Hash> {
        let mut hasher = Blake2b224::new();
        hasher.update(pool_script_hash);
        hasher.update(delegator_nft.unit().as_bytes());
        hasher.update(seed.to_plutus_data().to_cbor()?);
        Ok(hasher.finalize().to_vec())
    }

    fn lp_token_policy(&self, pool_hash: &[u8], pool_nft_name: &[u8]) -> LendingResult<Hash> {
        let mut hasher = Blake2b224::new();
        hasher.update(pool_hash);
        hasher.update(pool_nft_name);
        Ok(hasher.finalize().to_vec())
    }
}

// ============ Fixtures ============

pub const POOL_NFT_NAME: [u8; 28] = [0x50; 28];
pub const CONFIG_NFT_NAME: [u8; 32] = [0xcf; 32];

pub fn wallet_address() -> Address {
    Address::key(vec![0x0e; 28], Some(vec![0x5e; 28]))
}

/// Wallet output holding `lovelace` plus `extra`
pub fn wallet_utxo(index: u64, lovelace: u64, extra: &Value) -> Utxo {
    Utxo {
        out_ref: OutputReference::new(vec![0xaa; 32], index),
        address: wallet_address(),
        value: Value::lovelace(lovelace).merge(extra),
        datum: None,
    }
}

pub fn sdk_config() -> SdkConfig {
    let hash = |b: u8| vec![b; 28];
    SdkConfig {
        scripts: ProtocolScripts {
            pool: hash(0x90),
            collateral: hash(0xc0),
            leftovers: hash(0x1e),
            delayed_merge: hash(0xde),
            pool_config_validator: hash(0xcf),
            pool_config_policy: hash(0xcc),
            delegator_nft_policy: hash(0xd1),
            order_deposit: hash(0x0d),
            order_withdraw: hash(0x0a),
            order_borrow: hash(0x0b),
            order_repay: hash(0x0f),
        },
        references: ScriptReferences::default(),
        gov_nft: AssetClass::new(hash(0x77), b"gov".to_vec()),
        oracle: OracleConfig {
            endpoints: vec!["http://oracle-0.invalid/validateData".to_string()],
            timeout_ms: 5_000,
        },
    }
}

pub fn pool_config() -> PoolConfig {
    PoolConfig {
        liquidation_threshold: defaults::LIQUIDATION_THRESHOLD,
        initial_collateral_ratio: defaults::INITIAL_COLLATERAL_RATIO,
        pool_fee: defaults::POOL_FEE,
        merge_action_fee: defaults::MERGE_ACTION_FEE,
        min_transition: defaults::MIN_TRANSITION,
        min_loan: defaults::MIN_LOAN,
        min_fee: defaults::MIN_FEE,
        min_liquidation_fee: defaults::MIN_LIQUIDATION_FEE,
        loan_fee_details: LoanFeeDetails {
            tier_1_fee: 200_000,
            tier_1_threshold: 0,
            tier_2_fee: 200_000,
            tier_2_threshold: 150_000,
            tier_3_fee: 200_000,
            tier_3_threshold: 450_000,
            liquidation_fee: 50_000,
            platform_fee_collector: Address::key(vec![0x0c; 28], Some(vec![0x6e; 28])),
        },
        interest_params: InterestParams {
            optimal_utilization: 450_000,
            base_interest_rate: 30_000,
            rslope1: 75_000,
            rslope2: 3_000_000,
        },
    }
}

/// ADA-lending pool taking `COLL` tokens as collateral
pub fn pool_state(balance: u64, lent_out: u64, total_lp_tokens: u64) -> PoolState {
    PoolState {
        params: PoolParams {
            collateral_address: Address::script(vec![0xc0; 28], Some(POOL_NFT_NAME.to_vec())),
            loan_asset: AssetClass::ada(),
            collateral_asset: collateral_asset(),
            oracle_collateral_nft: AssetClass::new(vec![0x0a; 28], b"oc".to_vec()),
            oracle_loan_nft: AssetClass::new(vec![0x0a; 28], b"ol".to_vec()),
            lp_token: AssetClass::new(vec![0x1b; 28], POOL_NFT_NAME.to_vec()),
            pool_nft_name: POOL_NFT_NAME.to_vec(),
            pool_config_name: CONFIG_NFT_NAME.to_vec(),
        },
        balance,
        lent_out,
        total_lp_tokens,
    }
}

pub fn collateral_asset() -> AssetClass {
    AssetClass::new(vec![0xcc; 28], b"COLL".to_vec())
}

pub fn pool_utxo(config: &SdkConfig, pool: &PoolState) -> Utxo {
    let nft = config.pool_nft(&pool.params.pool_nft_name);
    Utxo {
        out_ref: OutputReference::new(vec![0x9a; 32], 0),
        address: config.pool_address(&pool.params.pool_nft_name),
        value: Value::single(pool.params.loan_asset.clone(), pool.balance).with(nft, 1),
        datum: Some(pool.to_plutus_data()),
    }
}

pub fn config_utxo(config: &SdkConfig, pool: &PoolState, pool_config: &PoolConfig) -> Utxo {
    Utxo {
        out_ref: OutputReference::new(vec![0xcf; 32], 0),
        address: config.pool_config_address(),
        value: Value::lovelace(2_000_000).with(config.config_nft(&pool.params.pool_config_name), 1),
        datum: Some(pool_config.to_plutus_data()),
    }
}

/// Open loan against the fixture pool
pub fn collateral_position(
    loan_amount: u64,
    collateral_amount: u64,
    interest_rate: u64,
    deposit_time: i64,
) -> CollateralPosition {
    let pool = pool_state(100_000_000, 0, 100_000_000);
    CollateralPosition {
        pool_nft_name: POOL_NFT_NAME.to_vec(),
        loan_asset: pool.params.loan_asset.clone(),
        loan_amount,
        pool_config: pool_config(),
        collateral_asset: pool.params.collateral_asset.clone(),
        collateral_amount,
        interest_rate,
        deposit_time,
        borrower_token_name: vec![0xbb; 32],
        oracle_collateral_nft: pool.params.oracle_collateral_nft.clone(),
        oracle_loan_nft: pool.params.oracle_loan_nft.clone(),
        tag: None,
        lent_out: pool.lent_out,
        balance: pool.balance,
    }
}

pub fn collateral_utxo(config: &SdkConfig, position: &CollateralPosition) -> Utxo {
    Utxo {
        out_ref: OutputReference::new(vec![0xc1; 32], 1),
        address: config.collateral_address(&position.pool_nft_name),
        value: Value::lovelace(2_000_000)
            .with(position.collateral_asset.clone(), position.collateral_amount),
        datum: Some(position.to_plutus_data()),
    }
}

/// Oracle validator output holding `nft`, as the price oracle deploys it
pub fn oracle_utxo(nft: AssetClass, output_index: u64) -> Utxo {
    Utxo {
        out_ref: OutputReference::new(vec![0x0a; 32], output_index),
        address: Address::script(vec![0x0e; 28], None),
        value: Value::lovelace(2_000_000).with(nft, 1),
        datum: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_by_unit_and_reference() {
        let config = sdk_config();
        let pool = pool_state(10, 0, 10);
        let ledger = MockLedger::new().with_pool(&config, &pool, &pool_config());

        let found = ledger.utxo_by_unit(&config.pool_nft(&POOL_NFT_NAME)).await.unwrap();
        assert_eq!(found.unwrap().out_ref, OutputReference::new(vec![0x9a; 32], 0));

        let missing = OutputReference::new(vec![0; 32], 9);
        let found = ledger
            .utxos_by_output_reference(&[missing, OutputReference::new(vec![0xcf; 32], 0)])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_records_plan() {
        let ledger = MockLedger::new();
        let tx = ledger.complete(TxPlan::default()).await.unwrap();
        assert_eq!(tx.fee, MOCK_FEE);
        assert_eq!(ledger.completed().len(), 1);
        assert_eq!(ledger.submit(&tx).await.unwrap(), tx.tx_hash);
    }

    #[tokio::test]
    async fn test_rejection_is_verbatim() {
        let ledger = MockLedger::new().rejecting("insufficient funds");
        let err = ledger.complete(TxPlan::default()).await.unwrap_err();
        assert_eq!(err, LendingError::LedgerRejection("insufficient funds".into()));
    }

    #[test]
    fn test_parameterizer_is_deterministic() {
        let seed = OutputReference::new(vec![1; 32], 0);
        let nft = AssetClass::new(vec![0xd1; 28], vec![2; 32]);
        let a = MockParameterizer.pool_stake_hash(&[0x90; 28], &nft, &seed).unwrap();
        assert_eq!(a.len(), 28);
        assert_eq!(a, MockParameterizer.pool_stake_hash(&[0x90; 28], &nft, &seed).unwrap());
        let other = OutputReference::new(vec![1; 32], 1);
        assert_ne!(a, MockParameterizer.pool_stake_hash(&[0x90; 28], &nft, &other).unwrap());
    }
}
