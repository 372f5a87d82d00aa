//! Ledger Client Seam
//!
//! The SDK never talks to a node itself. UTXO queries, wallet access,
//! balancing and submission all go through [`LedgerClient`], implemented
//! by the embedding application over whatever chain indexer it uses.

use async_trait::async_trait;

use crate::constants::time::{VALIDITY_LOOKBACK_MS, VALIDITY_TTL_MS};
use crate::errors::LendingResult;
use crate::tx::{CompletedTx, TxPlan};
use crate::types::{Address, AssetClass, Credential, Hash, OutputReference, Utxo, ValidityRange};

/// Stake delegation state of a reward account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationInfo {
    /// Stake pool currently delegated to, if any
    pub pool_id: Option<String>,
    /// Withdrawable rewards in lovelace
    pub rewards: u64,
}

/// Chain access consumed by every operation
///
/// Errors surface as `LendingError::LedgerRejection` carrying the client's
/// message verbatim.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The single output holding `asset`, if it exists
    async fn utxo_by_unit(&self, asset: &AssetClass) -> LendingResult<Option<Utxo>>;

    /// Outputs for the given references; missing ones are omitted
    async fn utxos_by_output_reference(&self, refs: &[OutputReference]) -> LendingResult<Vec<Utxo>>;

    async fn delegation(&self, credential: &Credential) -> LendingResult<DelegationInfo>;

    async fn wallet_address(&self) -> LendingResult<Address>;

    async fn wallet_utxos(&self) -> LendingResult<Vec<Utxo>>;

    /// Current POSIX time in milliseconds
    fn current_time_ms(&self) -> i64;

    fn unix_time_to_slot(&self, time_ms: i64) -> u64;

    fn slot_to_unix_time(&self, slot: u64) -> i64;

    /// Balance, add fees and change, and serialize a plan
    async fn complete(&self, plan: TxPlan) -> LendingResult<CompletedTx>;

    /// Submit a signed transaction, returning its hash
    async fn submit(&self, tx: &CompletedTx) -> LendingResult<String>;
}

/// Hashing of parameterized validators
///
/// Compiled blueprints live outside the SDK, so the caller applies the
/// parameters and reports the resulting script hashes.
pub trait ScriptParameterizer: Send + Sync {
    /// Pool stake validator hash; also the pool NFT name
    ///
    /// Parameterized by the pool validator, the delegator NFT of the new
    /// pool and the seed output consumed at creation.
    fn pool_stake_hash(
        &self,
        pool_script_hash: &[u8],
        delegator_nft: &AssetClass,
        seed: &OutputReference,
    ) -> LendingResult<Hash>;

    /// LP token policy for the pool validator `pool_hash` and pool NFT name
    fn lp_token_policy(&self, pool_hash: &[u8], pool_nft_name: &[u8]) -> LendingResult<Hash>;
}

fn snap_to_slot(client: &dyn LedgerClient, time_ms: i64) -> i64 {
    client.slot_to_unix_time(client.unix_time_to_slot(time_ms))
}

/// Default validity window: two minutes back to ten minutes ahead of now
pub fn validity_range(client: &dyn LedgerClient) -> ValidityRange {
    let now = client.current_time_ms();
    ValidityRange::new(
        snap_to_slot(client, now - VALIDITY_LOOKBACK_MS),
        snap_to_slot(client, now + VALIDITY_TTL_MS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLedger;

    #[test]
    fn test_validity_range_snaps_to_slots() {
        let ledger = MockLedger::new().with_time(1_700_000_000_500);
        let range = validity_range(&ledger);
        // one-second slots drop the sub-second part
        assert_eq!(range.valid_from, 1_699_999_880_000);
        assert_eq!(range.valid_to, 1_700_000_600_000);
    }
}
