//! Transaction Plans
//!
//! Operations describe their transaction as a [`TxPlan`]: inputs with
//! redeemers, ordered outputs, mints, zero-amount withdrawals, stake
//! certificates and metadata. Balancing, fee calculation and signing are
//! left to the ledger client, which turns a plan into a [`CompletedTx`].
//!
//! Output order is part of the contract: redeemers refer to outputs by
//! index, so builders hand out indices as outputs are appended.

use std::collections::BTreeMap;

use tracing::warn;

use crate::errors::{LendingError, LendingResult};
use crate::events::{EventLog, PoolEvent};
use crate::plutus::PlutusData;
use crate::types::{Address, Credential, Hash, OutputReference, Utxo, ValidityRange, Value};

/// Spent output, with a redeemer when it is script-locked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub utxo: Utxo,
    pub redeemer: Option<PlutusData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    /// Inline datum
    pub datum: Option<PlutusData>,
}

/// Mint (positive) or burn (negative) under one policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mint {
    pub policy_id: Hash,
    pub assets: Vec<(Vec<u8>, i64)>,
    pub redeemer: PlutusData,
}

/// Zero-amount reward withdrawal used to run a staking validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    pub credential: Credential,
    pub amount: u64,
    pub redeemer: PlutusData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    RegisterStake(Credential),
    DeregisterStake {
        credential: Credential,
        redeemer: PlutusData,
    },
    Delegate {
        credential: Credential,
        stake_pool_id: String,
        redeemer: PlutusData,
    },
}

/// Unbalanced transaction description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxPlan {
    pub inputs: Vec<TxInput>,
    pub reference_inputs: Vec<OutputReference>,
    pub outputs: Vec<TxOutput>,
    pub mints: Vec<Mint>,
    pub withdrawals: Vec<Withdrawal>,
    pub certificates: Vec<Certificate>,
    pub validity: Option<ValidityRange>,
    pub required_signers: Vec<Hash>,
    pub metadata: BTreeMap<u64, serde_json::Value>,
    /// Scripts the completer must attach because no reference input carries them
    pub attached_scripts: Vec<Hash>,
}

impl TxPlan {
    /// Net quantity minted for `policy_id` / `asset_name`
    pub fn minted(&self, policy_id: &[u8], asset_name: &[u8]) -> i64 {
        self.mints
            .iter()
            .filter(|m| m.policy_id == policy_id)
            .flat_map(|m| m.assets.iter())
            .filter(|(name, _)| name == asset_name)
            .map(|(_, qty)| *qty)
            .sum()
    }

    pub fn input(&self, out_ref: &OutputReference) -> Option<&TxInput> {
        self.inputs.iter().find(|i| &i.utxo.out_ref == out_ref)
    }
}

/// Fluent builder for a [`TxPlan`]
#[derive(Debug, Default)]
pub struct TxBuilder {
    plan: TxPlan,
}

impl TxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend a script output with a redeemer
    pub fn collect_from(mut self, utxo: Utxo, redeemer: PlutusData) -> Self {
        self.plan.inputs.push(TxInput {
            utxo,
            redeemer: Some(redeemer),
        });
        self
    }

    /// Spend a key-locked output
    pub fn spend(mut self, utxo: Utxo) -> Self {
        self.plan.inputs.push(TxInput {
            utxo,
            redeemer: None,
        });
        self
    }

    pub fn read_from(mut self, out_ref: OutputReference) -> Self {
        if !self.plan.reference_inputs.contains(&out_ref) {
            self.plan.reference_inputs.push(out_ref);
        }
        self
    }

    /// Index the next appended output will get
    pub fn next_output_index(&self) -> u64 {
        self.plan.outputs.len() as u64
    }

    pub fn pay_to_address(mut self, address: Address, value: Value) -> Self {
        self.plan.outputs.push(TxOutput {
            address,
            value,
            datum: None,
        });
        self
    }

    pub fn pay_to_contract(mut self, address: Address, value: Value, datum: PlutusData) -> Self {
        self.plan.outputs.push(TxOutput {
            address,
            value,
            datum: Some(datum),
        });
        self
    }

    /// Mint or burn; entries for the same policy share one redeemer
    pub fn mint(mut self, policy_id: Hash, asset_name: Vec<u8>, quantity: i64, redeemer: PlutusData) -> Self {
        match self.plan.mints.iter_mut().find(|m| m.policy_id == policy_id) {
            Some(existing) => existing.assets.push((asset_name, quantity)),
            None => self.plan.mints.push(Mint {
                policy_id,
                assets: vec![(asset_name, quantity)],
                redeemer,
            }),
        }
        self
    }

    pub fn withdraw(mut self, credential: Credential, redeemer: PlutusData) -> Self {
        self.plan.withdrawals.push(Withdrawal {
            credential,
            amount: 0,
            redeemer,
        });
        self
    }

    pub fn register_stake(mut self, credential: Credential) -> Self {
        self.plan.certificates.push(Certificate::RegisterStake(credential));
        self
    }

    pub fn deregister_stake(mut self, credential: Credential, redeemer: PlutusData) -> Self {
        self.plan.certificates.push(Certificate::DeregisterStake {
            credential,
            redeemer,
        });
        self
    }

    pub fn delegate_to(mut self, credential: Credential, stake_pool_id: String, redeemer: PlutusData) -> Self {
        self.plan.certificates.push(Certificate::Delegate {
            credential,
            stake_pool_id,
            redeemer,
        });
        self
    }

    pub fn validity(mut self, range: ValidityRange) -> Self {
        self.plan.validity = Some(range);
        self
    }

    pub fn add_signer(mut self, key_hash: Hash) -> Self {
        self.plan.required_signers.push(key_hash);
        self
    }

    pub fn attach_metadata(mut self, label: u64, metadata: serde_json::Value) -> Self {
        self.plan.metadata.insert(label, metadata);
        self
    }

    /// Use a deployed reference script, or ask the completer to attach it
    pub fn with_script(self, script_hash: &[u8], reference: Option<&OutputReference>) -> Self {
        match reference {
            Some(out_ref) => self.read_from(out_ref.clone()),
            None => self.attach_script(script_hash.to_vec()),
        }
    }

    pub fn attach_script(mut self, script_hash: Hash) -> Self {
        if !self.plan.attached_scripts.contains(&script_hash) {
            self.plan.attached_scripts.push(script_hash);
        }
        self
    }

    pub fn build(self) -> TxPlan {
        self.plan
    }
}

/// Balanced, fee-paid transaction returned by the ledger client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTx {
    pub tx_hash: String,
    pub cbor_hex: String,
    pub fee: u64,
    /// Plan the transaction was completed from
    pub plan: TxPlan,
}

/// Result of one public operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderResponse {
    pub success: bool,
    pub tx: Option<CompletedTx>,
    pub events: Vec<PoolEvent>,
    pub error: Option<LendingError>,
}

impl BuilderResponse {
    /// Fold an operation result into a response, logging failures once
    pub fn from_result(operation: &'static str, result: LendingResult<(CompletedTx, EventLog)>) -> Self {
        match result {
            Ok((tx, events)) => Self {
                success: true,
                tx: Some(tx),
                events: events.into_events(),
                error: None,
            },
            Err(error) => {
                warn!(operation, code = error.code(), %error, "operation failed");
                Self {
                    success: false,
                    tx: None,
                    events: Vec::new(),
                    error: Some(error),
                }
            }
        }
    }

    pub fn into_result(self) -> LendingResult<CompletedTx> {
        match (self.tx, self.error) {
            (Some(tx), _) => Ok(tx),
            (None, Some(error)) => Err(error),
            (None, None) => Err(LendingError::InvalidInput {
                param: "response",
                reason: "neither transaction nor error",
            }),
        }
    }
}
