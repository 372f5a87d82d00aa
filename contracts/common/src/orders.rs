//! Batch Order Protocol
//!
//! Deferred user actions locked at an order contract until a batcher
//! executes them or their owner cancels them.
//!
//! ## Order Detection
//!
//! Order datums carry no variant tag of their own; every order type is a
//! `Constr 0` envelope around a payload of a different shape. [`Order::decode`]
//! tries each known payload schema in a fixed priority order and returns the
//! first exact match:
//!
//! 1. Deposit
//! 2. Withdraw
//! 3. Borrow
//! 4. Repay
//!
//! Decoders are strict on constructor index and field count, so the order
//! only matters if two schemas ever become structurally identical.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{LendingError, LendingResult};
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};
use crate::types::{Address, AssetClass, Credential, Hash, OutputDatum, OutputReference, Value};

/// Output the batcher must pay back to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    pub address: Address,
    pub value: Value,
    pub datum: OutputDatum,
}

impl ToPlutusData for OutputTemplate {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.address.to_plutus_data(),
                self.value.to_plutus_data(),
                self.datum.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for OutputTemplate {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 3, "partial output")?;
        Ok(Self {
            address: Address::from_plutus_data(&f[0])?,
            value: Value::from_plutus_data(&f[1])?,
            datum: OutputDatum::from_plutus_data(&f[2])?,
        })
    }
}

/// Full expected output, including an optional reference script hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutput {
    pub address: Address,
    pub value: Value,
    pub datum: OutputDatum,
    pub reference_script: Option<Hash>,
}

impl ToPlutusData for ExpectedOutput {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.address.to_plutus_data(),
                self.value.to_plutus_data(),
                self.datum.to_plutus_data(),
                self.reference_script
                    .as_ref()
                    .map(|h| PlutusData::bytes(h))
                    .to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for ExpectedOutput {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 4, "expected output")?;
        let reference_script = match Option::<PlutusData>::from_plutus_data(&f[3])? {
            Some(hash) => Some(hash.as_bytes()?.to_vec()),
            None => None,
        };
        Ok(Self {
            address: Address::from_plutus_data(&f[0])?,
            value: Value::from_plutus_data(&f[1])?,
            datum: OutputDatum::from_plutus_data(&f[2])?,
            reference_script,
        })
    }
}

// ============ Payloads ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositOrder {
    pub deposit_amount: u64,
    pub partial_output: OutputTemplate,
    pub lp_asset: AssetClass,
}

impl ToPlutusData for DepositOrder {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::int(self.deposit_amount),
                self.partial_output.to_plutus_data(),
                self.lp_asset.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for DepositOrder {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 3, "deposit order")?;
        Ok(Self {
            deposit_amount: f[0].as_u64()?,
            partial_output: OutputTemplate::from_plutus_data(&f[1])?,
            lp_asset: AssetClass::from_plutus_data(&f[2])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawOrder {
    pub lp_tokens_burn: u64,
    pub partial_output: OutputTemplate,
    pub receive_asset: AssetClass,
    pub lp_asset: AssetClass,
}

impl ToPlutusData for WithdrawOrder {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::int(self.lp_tokens_burn),
                self.partial_output.to_plutus_data(),
                self.receive_asset.to_plutus_data(),
                self.lp_asset.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for WithdrawOrder {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 4, "withdraw order")?;
        Ok(Self {
            lp_tokens_burn: f[0].as_u64()?,
            partial_output: OutputTemplate::from_plutus_data(&f[1])?,
            receive_asset: AssetClass::from_plutus_data(&f[2])?,
            lp_asset: AssetClass::from_plutus_data(&f[3])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowOrder {
    /// Receives the loan
    pub expected_output: ExpectedOutput,
    /// Receives the borrower NFT
    pub partial_output: OutputTemplate,
    pub borrower_nft_policy: Hash,
    pub min_collateral_amount: u64,
    pub min_deposit_time: i64,
    /// Highest rate the borrower accepts at execution
    pub max_interest_rate: u64,
    pub collateral_address: Address,
}

impl ToPlutusData for BorrowOrder {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.expected_output.to_plutus_data(),
                self.partial_output.to_plutus_data(),
                PlutusData::bytes(&self.borrower_nft_policy),
                PlutusData::int(self.min_collateral_amount),
                PlutusData::int(self.min_deposit_time),
                PlutusData::int(self.max_interest_rate),
                self.collateral_address.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for BorrowOrder {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 7, "borrow order")?;
        Ok(Self {
            expected_output: ExpectedOutput::from_plutus_data(&f[0])?,
            partial_output: OutputTemplate::from_plutus_data(&f[1])?,
            borrower_nft_policy: f[2].as_bytes()?.to_vec(),
            min_collateral_amount: f[3].as_u64()?,
            min_deposit_time: f[4].as_i64()?,
            max_interest_rate: f[5].as_u64()?,
            collateral_address: Address::from_plutus_data(&f[6])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepayOrder {
    /// Receives the released collateral
    pub expected_output: ExpectedOutput,
    /// Collateral output being repaid
    pub order: OutputReference,
    /// Borrower NFT burned on execution
    pub burn_asset: AssetClass,
}

impl ToPlutusData for RepayOrder {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.expected_output.to_plutus_data(),
                self.order.to_plutus_data(),
                self.burn_asset.to_plutus_data(),
            ],
        )
    }
}

impl FromPlutusData for RepayOrder {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 3, "repay order")?;
        Ok(Self {
            expected_output: ExpectedOutput::from_plutus_data(&f[0])?,
            order: OutputReference::from_plutus_data(&f[1])?,
            burn_asset: AssetClass::from_plutus_data(&f[2])?,
        })
    }
}

// ============ Envelope ============

/// Common order datum wrapped around an action payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDatum<T> {
    /// Key allowed to cancel the order
    pub control_credential: Credential,
    pub pool_nft: AssetClass,
    pub batcher_fee_ada: u64,
    pub order: T,
}

impl<T: ToPlutusData> ToPlutusData for OrderDatum<T> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.control_credential.to_plutus_data(),
                self.pool_nft.to_plutus_data(),
                PlutusData::int(self.batcher_fee_ada),
                self.order.to_plutus_data(),
            ],
        )
    }
}

impl<T: FromPlutusData> FromPlutusData for OrderDatum<T> {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        let f = data.fields(0, 4, "order datum")?;
        Ok(Self {
            control_credential: Credential::from_plutus_data(&f[0])?,
            pool_nft: AssetClass::from_plutus_data(&f[1])?,
            batcher_fee_ada: f[2].as_u64()?,
            order: T::from_plutus_data(&f[3])?,
        })
    }
}

/// Order type, also the detection priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum OrderKind {
    Deposit = 0,
    Withdraw = 1,
    Borrow = 2,
    Repay = 3,
}

/// Any decoded order datum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    Deposit(OrderDatum<DepositOrder>),
    Withdraw(OrderDatum<WithdrawOrder>),
    Borrow(OrderDatum<BorrowOrder>),
    Repay(OrderDatum<RepayOrder>),
}

/// Attempt one schema; a mismatch is a `None`, not an error
fn attempt<T: FromPlutusData>(data: &PlutusData) -> Option<T> {
    T::from_plutus_data(data).ok()
}

impl Order {
    /// Detect the order type by trial decoding in priority order
    pub fn decode(data: &PlutusData) -> LendingResult<Self> {
        attempt(data)
            .map(Order::Deposit)
            .or_else(|| attempt(data).map(Order::Withdraw))
            .or_else(|| attempt(data).map(Order::Borrow))
            .or_else(|| attempt(data).map(Order::Repay))
            .ok_or(LendingError::InvalidDatumShape {
                expected: "batcher order",
            })
    }

    pub fn kind(&self) -> OrderKind {
        match self {
            Order::Deposit(_) => OrderKind::Deposit,
            Order::Withdraw(_) => OrderKind::Withdraw,
            Order::Borrow(_) => OrderKind::Borrow,
            Order::Repay(_) => OrderKind::Repay,
        }
    }

    pub fn control_credential(&self) -> &Credential {
        match self {
            Order::Deposit(o) => &o.control_credential,
            Order::Withdraw(o) => &o.control_credential,
            Order::Borrow(o) => &o.control_credential,
            Order::Repay(o) => &o.control_credential,
        }
    }

    pub fn pool_nft(&self) -> &AssetClass {
        match self {
            Order::Deposit(o) => &o.pool_nft,
            Order::Withdraw(o) => &o.pool_nft,
            Order::Borrow(o) => &o.pool_nft,
            Order::Repay(o) => &o.pool_nft,
        }
    }
}

impl ToPlutusData for Order {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            Order::Deposit(o) => o.to_plutus_data(),
            Order::Withdraw(o) => o.to_plutus_data(),
            Order::Borrow(o) => o.to_plutus_data(),
            Order::Repay(o) => o.to_plutus_data(),
        }
    }
}
