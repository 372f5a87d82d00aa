//! Core Ledger Types
//!
//! Assets, credentials, addresses, output references and values as the
//! validators see them, with their PlutusData schemas.

use std::collections::BTreeMap;
use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::errors::{LendingError, LendingResult};
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};

type Blake2b256 = Blake2b<U32>;

/// Script or key hash bytes
pub type Hash = Vec<u8>;

// ============ Assets ============

/// Policy id plus asset name; the empty class is ADA
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetClass {
    #[serde(with = "hex::serde")]
    pub policy_id: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub asset_name: Vec<u8>,
}

impl AssetClass {
    pub fn new(policy_id: impl Into<Vec<u8>>, asset_name: impl Into<Vec<u8>>) -> Self {
        Self {
            policy_id: policy_id.into(),
            asset_name: asset_name.into(),
        }
    }

    /// Lovelace
    pub fn ada() -> Self {
        Self::default()
    }

    /// Parse from hex policy id and hex asset name
    pub fn from_hex(policy_id: &str, asset_name: &str) -> LendingResult<Self> {
        Ok(Self::new(hex::decode(policy_id)?, hex::decode(asset_name)?))
    }

    pub fn is_ada(&self) -> bool {
        self.policy_id.is_empty()
    }

    /// Ledger unit string: `lovelace` or hex policy id followed by hex name
    pub fn unit(&self) -> String {
        if self.is_ada() {
            "lovelace".to_string()
        } else {
            format!("{}{}", hex::encode(&self.policy_id), hex::encode(&self.asset_name))
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unit())
    }
}

impl ToPlutusData for AssetClass {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(&self.policy_id),
                PlutusData::bytes(&self.asset_name),
            ],
        )
    }
}

impl FromPlutusData for AssetClass {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 2, "asset class")?;
        Ok(Self::new(f[0].as_bytes()?, f[1].as_bytes()?))
    }
}

// ============ Output References ============

/// Transaction hash plus output index
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputReference {
    #[serde(with = "hex::serde")]
    pub tx_hash: Vec<u8>,
    pub output_index: u64,
}

impl OutputReference {
    pub fn new(tx_hash: impl Into<Vec<u8>>, output_index: u64) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
        }
    }

    pub fn from_hex(tx_hash: &str, output_index: u64) -> LendingResult<Self> {
        Ok(Self::new(hex::decode(tx_hash)?, output_index))
    }

    /// Unique token name derived from this output
    ///
    /// `blake2b-256` of the CBOR encoded reference. Consuming the output in
    /// the minting transaction makes the name unrepeatable.
    pub fn derived_token_name(&self) -> LendingResult<Vec<u8>> {
        let cbor = self.to_plutus_data().to_cbor()?;
        Ok(Blake2b256::digest(&cbor).to_vec())
    }
}

impl fmt::Display for OutputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", hex::encode(&self.tx_hash), self.output_index)
    }
}

impl ToPlutusData for OutputReference {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::constr(0, vec![PlutusData::bytes(&self.tx_hash)]),
                PlutusData::int(self.output_index),
            ],
        )
    }
}

impl FromPlutusData for OutputReference {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 2, "output reference")?;
        let tx_id = f[0].fields(0, 1, "transaction id")?;
        Ok(Self::new(tx_id[0].as_bytes()?, f[1].as_u64()?))
    }
}

// ============ Credentials and Addresses ============

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Credential {
    VerificationKey(#[serde(with = "hex::serde")] Hash),
    Script(#[serde(with = "hex::serde")] Hash),
}

impl Credential {
    pub fn hash(&self) -> &[u8] {
        match self {
            Credential::VerificationKey(h) | Credential::Script(h) => h,
        }
    }
}

impl ToPlutusData for Credential {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            Credential::VerificationKey(h) => PlutusData::constr(0, vec![PlutusData::bytes(h)]),
            Credential::Script(h) => PlutusData::constr(1, vec![PlutusData::bytes(h)]),
        }
    }
}

impl FromPlutusData for Credential {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        match data.as_variant()? {
            (0, [h]) => Ok(Credential::VerificationKey(h.as_bytes()?.to_vec())),
            (1, [h]) => Ok(Credential::Script(h.as_bytes()?.to_vec())),
            _ => Err(LendingError::InvalidDatumShape { expected: "credential" }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeCredential {
    Inline(Credential),
    Pointer {
        slot_number: u64,
        transaction_index: u64,
        certificate_index: u64,
    },
}

impl ToPlutusData for StakeCredential {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            StakeCredential::Inline(c) => PlutusData::constr(0, vec![c.to_plutus_data()]),
            StakeCredential::Pointer {
                slot_number,
                transaction_index,
                certificate_index,
            } => PlutusData::constr(
                1,
                vec![
                    PlutusData::int(*slot_number),
                    PlutusData::int(*transaction_index),
                    PlutusData::int(*certificate_index),
                ],
            ),
        }
    }
}

impl FromPlutusData for StakeCredential {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        match data.as_variant()? {
            (0, [c]) => Ok(StakeCredential::Inline(Credential::from_plutus_data(c)?)),
            (1, [s, t, c]) => Ok(StakeCredential::Pointer {
                slot_number: s.as_u64()?,
                transaction_index: t.as_u64()?,
                certificate_index: c.as_u64()?,
            }),
            _ => Err(LendingError::InvalidDatumShape {
                expected: "stake credential",
            }),
        }
    }
}

/// Shelley address in its on-chain structured form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub payment: Credential,
    pub stake: Option<StakeCredential>,
}

impl Address {
    /// Script address, optionally staked by a script credential
    pub fn script(hash: impl Into<Hash>, stake_script: Option<Hash>) -> Self {
        Self {
            payment: Credential::Script(hash.into()),
            stake: stake_script.map(|h| StakeCredential::Inline(Credential::Script(h))),
        }
    }

    /// Key address with an optional inline stake key
    pub fn key(hash: impl Into<Hash>, stake_key: Option<Hash>) -> Self {
        Self {
            payment: Credential::VerificationKey(hash.into()),
            stake: stake_key.map(|h| StakeCredential::Inline(Credential::VerificationKey(h))),
        }
    }

    /// Payment key hash, when the address is key-controlled
    pub fn payment_key_hash(&self) -> Option<&[u8]> {
        match &self.payment {
            Credential::VerificationKey(h) => Some(h),
            Credential::Script(_) => None,
        }
    }
}

impl ToPlutusData for Address {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![self.payment.to_plutus_data(), self.stake.to_plutus_data()],
        )
    }
}

impl FromPlutusData for Address {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 2, "address")?;
        Ok(Self {
            payment: Credential::from_plutus_data(&f[0])?,
            stake: Option::<StakeCredential>::from_plutus_data(&f[1])?,
        })
    }
}

/// Stake credential to embed in datums that pay back to a wallet
///
/// Every order-placing operation goes through here so receivers keep
/// their staking rights exactly as their wallet address carries them.
pub fn derive_stake_credential(address: &Address) -> Option<StakeCredential> {
    match &address.stake {
        Some(StakeCredential::Inline(credential)) => {
            Some(StakeCredential::Inline(credential.clone()))
        }
        Some(pointer @ StakeCredential::Pointer { .. }) => Some(pointer.clone()),
        None => None,
    }
}

// ============ Values ============

/// Multi-asset quantity map, ADA keyed by the empty asset class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value(BTreeMap<AssetClass, u64>);

impl Value {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lovelace(amount: u64) -> Self {
        Self::single(AssetClass::ada(), amount)
    }

    pub fn single(asset: AssetClass, amount: u64) -> Self {
        let mut value = Self::new();
        value.add(asset, amount);
        value
    }

    /// Add a quantity, saturating at `u64::MAX`; zero quantities are not stored
    pub fn add(&mut self, asset: AssetClass, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.0.entry(asset).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Add a quantity, failing with `Overflow` instead of saturating
    pub fn try_add(&mut self, asset: AssetClass, amount: u64) -> LendingResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.0.entry(asset).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(LendingError::Overflow)?;
        Ok(())
    }

    pub fn with(mut self, asset: AssetClass, amount: u64) -> Self {
        self.add(asset, amount);
        self
    }

    pub fn merge(mut self, other: &Value) -> Self {
        for (asset, amount) in &other.0 {
            self.add(asset.clone(), *amount);
        }
        self
    }

    pub fn checked_merge(mut self, other: &Value) -> LendingResult<Self> {
        for (asset, amount) in &other.0 {
            self.try_add(asset.clone(), *amount)?;
        }
        Ok(self)
    }

    pub fn get(&self, asset: &AssetClass) -> u64 {
        self.0.get(asset).copied().unwrap_or(0)
    }

    pub fn coin(&self) -> u64 {
        self.get(&AssetClass::ada())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetClass, &u64)> {
        self.0.iter()
    }
}

impl ToPlutusData for Value {
    fn to_plutus_data(&self) -> PlutusData {
        let mut by_policy: BTreeMap<&[u8], Vec<(PlutusData, PlutusData)>> = BTreeMap::new();
        for (asset, amount) in &self.0 {
            by_policy
                .entry(asset.policy_id.as_slice())
                .or_default()
                .push((PlutusData::bytes(&asset.asset_name), PlutusData::int(*amount)));
        }
        PlutusData::Map(
            by_policy
                .into_iter()
                .map(|(policy, assets)| (PlutusData::bytes(policy), PlutusData::Map(assets)))
                .collect(),
        )
    }
}

impl FromPlutusData for Value {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let mut value = Value::new();
        for (policy, assets) in data.as_map()? {
            let policy = policy.as_bytes()?;
            for (name, amount) in assets.as_map()? {
                value.try_add(AssetClass::new(policy, name.as_bytes()?), amount.as_u64()?)?;
            }
        }
        Ok(value)
    }
}

// ============ Outputs ============

/// Datum attached to an output described inside another datum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDatum {
    NoDatum,
    DatumHash(Hash),
    InlineDatum(PlutusData),
}

impl ToPlutusData for OutputDatum {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            OutputDatum::NoDatum => PlutusData::unit(0),
            OutputDatum::DatumHash(h) => PlutusData::constr(1, vec![PlutusData::bytes(h)]),
            OutputDatum::InlineDatum(d) => PlutusData::constr(2, vec![d.clone()]),
        }
    }
}

impl FromPlutusData for OutputDatum {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        match data.as_variant()? {
            (0, []) => Ok(OutputDatum::NoDatum),
            (1, [h]) => Ok(OutputDatum::DatumHash(h.as_bytes()?.to_vec())),
            (2, [d]) => Ok(OutputDatum::InlineDatum(d.clone())),
            _ => Err(LendingError::InvalidDatumShape { expected: "output datum" }),
        }
    }
}

/// Unspent output as returned by the ledger client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub out_ref: OutputReference,
    pub address: Address,
    pub value: Value,
    pub datum: Option<PlutusData>,
}

impl Utxo {
    /// Decode the inline datum with a strict schema
    pub fn inline_datum<T: FromPlutusData>(&self) -> LendingResult<T> {
        match &self.datum {
            Some(datum) => T::from_plutus_data(datum),
            None => Err(LendingError::InvalidDatumShape {
                expected: "inline datum",
            }),
        }
    }
}

/// Transaction validity interval in POSIX milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityRange {
    pub valid_from: i64,
    pub valid_to: i64,
}

impl ValidityRange {
    pub fn new(valid_from: i64, valid_to: i64) -> Self {
        Self { valid_from, valid_to }
    }
}

/// Caller-supplied exchange snapshot for a non-ADA asset
///
/// `token_amount` tokens trade against `lovelace_amount` lovelace in the
/// reference liquidity pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub token_amount: u64,
    pub lovelace_amount: u64,
}

impl PriceSnapshot {
    pub fn new(token_amount: u64, lovelace_amount: u64) -> Self {
        Self {
            token_amount,
            lovelace_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_strings() {
        assert_eq!(AssetClass::ada().unit(), "lovelace");
        let token = AssetClass::new(vec![0xaa, 0xbb], b"X".to_vec());
        assert_eq!(token.unit(), "aabb58");
    }

    #[test]
    fn test_derived_token_name_is_deterministic() {
        let a = OutputReference::new(vec![1u8; 32], 0);
        let b = OutputReference::new(vec![1u8; 32], 1);
        let name = a.derived_token_name().unwrap();
        assert_eq!(name.len(), 32);
        assert_eq!(name, a.derived_token_name().unwrap());
        assert_ne!(name, b.derived_token_name().unwrap());
    }

    #[test]
    fn test_value_groups_by_policy() {
        let value = Value::lovelace(2_000_000)
            .with(AssetClass::new(vec![1], b"a".to_vec()), 5)
            .with(AssetClass::new(vec![1], b"b".to_vec()), 6)
            .with(AssetClass::new(vec![1], b"a".to_vec()), 1);
        assert_eq!(value.get(&AssetClass::new(vec![1], b"a".to_vec())), 6);

        let data = value.to_plutus_data();
        let entries = data.as_map().unwrap();
        // ADA policy sorts first, then one entry per policy
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, PlutusData::bytes(b""));
        assert_eq!(entries[1].1.as_map().unwrap().len(), 2);
        assert_eq!(Value::from_plutus_data(&data).unwrap(), value);
    }

    #[test]
    fn test_zero_quantities_dropped() {
        let value = Value::new().with(AssetClass::ada(), 0);
        assert!(value.is_empty());
    }

    #[test]
    fn test_value_overflow() {
        let mut value = Value::lovelace(u64::MAX - 1);
        assert_eq!(value.try_add(AssetClass::ada(), 2), Err(LendingError::Overflow));
        assert_eq!(value.coin(), u64::MAX - 1);

        let saturated = value.clone().with(AssetClass::ada(), 2);
        assert_eq!(saturated.coin(), u64::MAX);
        assert_eq!(
            value.clone().checked_merge(&Value::lovelace(5)),
            Err(LendingError::Overflow)
        );

        // the same asset listed twice on chain cannot wrap
        let token = PlutusData::bytes(b"T");
        let data = PlutusData::Map(vec![(
            PlutusData::bytes(&[0xaa]),
            PlutusData::Map(vec![
                (token.clone(), PlutusData::int(u64::MAX)),
                (token, PlutusData::int(1)),
            ]),
        )]);
        assert_eq!(Value::from_plutus_data(&data), Err(LendingError::Overflow));
    }

    #[test]
    fn test_address_schema() {
        let addr = Address::key(vec![7u8; 28], Some(vec![8u8; 28]));
        let data = addr.to_plutus_data();
        assert_eq!(Address::from_plutus_data(&data).unwrap(), addr);

        let enterprise = Address::script(vec![9u8; 28], None);
        let enterprise_data = enterprise.to_plutus_data();
        let (_, fields) = enterprise_data.as_variant().unwrap().clone();
        assert_eq!(fields[1], PlutusData::unit(1));
    }

    #[test]
    fn test_derive_stake_credential() {
        let staked = Address::key(vec![1u8; 28], Some(vec![2u8; 28]));
        assert_eq!(
            derive_stake_credential(&staked),
            Some(StakeCredential::Inline(Credential::VerificationKey(vec![2u8; 28])))
        );
        let enterprise = Address::key(vec![1u8; 28], None);
        assert_eq!(derive_stake_credential(&enterprise), None);
    }

    #[test]
    fn test_missing_inline_datum() {
        let utxo = Utxo {
            out_ref: OutputReference::new(vec![0u8; 32], 0),
            address: Address::key(vec![1u8; 28], None),
            value: Value::lovelace(1),
            datum: None,
        };
        assert!(utxo.inline_datum::<AssetClass>().is_err());
    }
}
