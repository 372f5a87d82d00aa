//! Lendpool Common Library
//!
//! Shared types, math and transaction assembly for the lendpool lending
//! protocol on Cardano.
//!
//! A pool is a single script output carrying a unique identity NFT and a
//! datum with its balance, outstanding loans and LP supply. Every operation
//! consumes that output and recreates it with a successor datum, so the
//! ledger's UTXO exclusivity serializes all pool transitions. Loans live in
//! their own collateral outputs, each tied to a borrower NFT.
//!
//! This crate owns everything the operation crates share:
//!
//! - **Math**: interest curve, platform fees, LP shares and AMM price
//!   conversion, all in arbitrary-precision integers with the validators'
//!   rounding
//! - **Wire format**: PlutusData CBOR codec and every datum and redeemer
//!   schema
//! - **Batch orders**: the place/execute/cancel order datums and their
//!   trial-decode detection
//! - **Assembly**: [`TxBuilder`] plans, the [`LedgerClient`] seam and the
//!   [`PoolStateReader`]
//! - **Ambient**: deployment config, error taxonomy and pool events
//!
//! Balancing, signing and submission belong to the embedding application's
//! ledger client; this crate never touches the network itself.

pub mod constants;
pub mod errors;
pub mod math;
pub mod plutus;
pub mod types;

pub mod datums;
pub mod redeemers;

pub mod fees;
pub mod interest;
pub mod liquidation;
pub mod liquidity;
pub mod pricing;

pub mod config;
pub mod events;
pub mod ledger;
pub mod orders;
pub mod reader;
pub mod tx;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use config::{OracleConfig, ProtocolScripts, ScriptReferences, SdkConfig, TokenParameters};
pub use datums::*;
pub use errors::*;
pub use events::*;
pub use ledger::{validity_range, DelegationInfo, LedgerClient, ScriptParameterizer};
pub use orders::{
    BorrowOrder, DepositOrder, ExpectedOutput, Order, OrderDatum, OrderKind, OutputTemplate, RepayOrder,
    WithdrawOrder,
};
pub use plutus::{FromPlutusData, PlutusData, ToPlutusData};
pub use pricing::{OracleRedeemer, PriceFeed, SignedData};
pub use reader::{Located, PoolSnapshot, PoolStateReader};
pub use redeemers::*;
pub use tx::{BuilderResponse, CompletedTx, TxBuilder, TxPlan};
pub use types::*;
