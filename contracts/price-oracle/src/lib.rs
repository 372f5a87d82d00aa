//! Price Oracle Proofs
//!
//! Borrowing and liquidating against a native asset needs a signed price
//! attestation. The oracle validator checks it as a zero-amount reward
//! withdrawal whose redeemer carries the signed price feed, while the
//! oracle NFT output is read as a reference input.
//!
//! ## Collection
//!
//! ```text
//! snapshot ─► Pooled feed (expires now + 14 min) ─► cbor hex
//!                                                    │
//!                 ┌──────────────┬───────────────────┼──────────────┐
//!              endpoint 0     endpoint 1         endpoint n
//!                 └──────────────┴─── one shared deadline ──────────┘
//!                                                    │
//!                          signed responses ─► one proof each
//!                          failures, late ones ─► warn and drop
//! ```
//!
//! No retries: zero signatures fails the whole operation with
//! `OraclePriceUnavailable` and the caller starts over.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use lendpool_common::constants::time::ORACLE_FEED_TTL_MS;
use lendpool_common::{
    AssetClass, Credential, LedgerClient, LendingError, LendingResult, OracleConfig, OracleRedeemer,
    PriceFeed, PriceSnapshot, SignedData, ToPlutusData, TxBuilder, Utxo,
};

// ============ Endpoints ============

/// One oracle signing service
#[async_trait]
pub trait SignatureEndpoint: Send + Sync {
    fn url(&self) -> &str;

    /// Signature over a CBOR hex encoded price feed
    async fn sign(&self, data_cbor_hex: &str) -> LendingResult<Vec<u8>>;
}

#[derive(Serialize)]
struct SignRequest<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
struct SignResponse {
    /// hex encoded
    signature: String,
}

/// Oracle node reached over HTTP: `POST {url} {"data": ..}` answering `{"signature": ..}`
pub struct HttpEndpoint {
    url: String,
    http: reqwest::Client,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self { url: url.into(), http }
    }
}

#[async_trait]
impl SignatureEndpoint for HttpEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn sign(&self, data_cbor_hex: &str) -> LendingResult<Vec<u8>> {
        let resp = self
            .http
            .post(&self.url)
            .json(&SignRequest { data: data_cbor_hex })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LendingError::Network(e.to_string()))?;

        let body: SignResponse = resp
            .json()
            .await
            .map_err(|e| LendingError::Network(e.to_string()))?;
        Ok(hex::decode(body.signature)?)
    }
}

// ============ Proofs ============

/// Everything a transaction needs to prove one price
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleProof {
    /// Output holding the oracle NFT, read as a reference input
    pub reference_utxo: Utxo,
    /// Oracle validator's reward credential, withdrawn with amount zero
    pub reward_credential: Credential,
    pub redeemer: OracleRedeemer,
}

/// Add proofs to a transaction
///
/// A reward account can only be withdrawn once per transaction, so proofs
/// for the same oracle are merged into one redeemer carrying every
/// signature.
pub fn attach_proofs(mut builder: TxBuilder, proofs: &[OracleProof]) -> TxBuilder {
    let mut merged: Vec<OracleProof> = Vec::new();
    for proof in proofs {
        match merged.iter_mut().find(|p| {
            p.reward_credential == proof.reward_credential && p.redeemer.data == proof.redeemer.data
        }) {
            Some(existing) => existing
                .redeemer
                .signatures
                .extend(proof.redeemer.signatures.iter().cloned()),
            None => merged.push(proof.clone()),
        }
    }
    for proof in merged {
        builder = builder
            .withdraw(proof.reward_credential, proof.redeemer.to_plutus_data())
            .read_from(proof.reference_utxo.out_ref);
    }
    builder
}

// ============ Collector ============

/// Fans a price feed out to every signing endpoint under one deadline
pub struct OracleProofCollector {
    endpoints: Vec<Box<dyn SignatureEndpoint>>,
    timeout: Duration,
}

impl OracleProofCollector {
    pub fn new(endpoints: Vec<Box<dyn SignatureEndpoint>>, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }

    /// HTTP endpoints sharing one client
    pub fn from_config(config: &OracleConfig) -> Self {
        let http = reqwest::Client::new();
        let endpoints = config
            .endpoints
            .iter()
            .map(|url| Box::new(HttpEndpoint::new(url.clone(), http.clone())) as Box<dyn SignatureEndpoint>)
            .collect();
        Self::new(endpoints, Duration::from_millis(config.timeout_ms))
    }

    /// Collect signed proofs pricing `asset` from a caller snapshot
    ///
    /// # Arguments
    /// * `ledger` - Used to locate the oracle NFT output and read the clock
    /// * `oracle_nft` - Token identifying the asset's oracle
    /// * `asset` - Native asset being priced
    /// * `snapshot` - Reserve amounts of the reference liquidity pool
    ///
    /// # Returns
    /// One proof per endpoint that signed in time; never empty
    pub async fn collect(
        &self,
        ledger: &dyn LedgerClient,
        oracle_nft: &AssetClass,
        asset: &AssetClass,
        snapshot: PriceSnapshot,
    ) -> LendingResult<Vec<OracleProof>> {
        let unavailable = || LendingError::OraclePriceUnavailable { asset: asset.unit() };

        let reference_utxo = ledger.utxo_by_unit(oracle_nft).await?.ok_or_else(unavailable)?;
        let reward_credential = Credential::Script(reference_utxo.address.payment.hash().to_vec());

        let feed = PriceFeed::pooled(
            asset.clone(),
            snapshot,
            ledger.current_time_ms() + ORACLE_FEED_TTL_MS,
        );
        let data = feed.to_plutus_data().to_cbor_hex()?;

        let deadline = Instant::now() + self.timeout;
        let requests = self.endpoints.iter().map(|endpoint| timeout_at(deadline, endpoint.sign(&data)));
        let results = join_all(requests).await;

        let mut proofs = Vec::new();
        for (position, (endpoint, result)) in self.endpoints.iter().zip(results).enumerate() {
            match result {
                Ok(Ok(signature)) => proofs.push(OracleProof {
                    reference_utxo: reference_utxo.clone(),
                    reward_credential: reward_credential.clone(),
                    redeemer: OracleRedeemer {
                        data: feed.clone(),
                        signatures: vec![SignedData {
                            signature,
                            key_position: position as u64,
                        }],
                    },
                }),
                Ok(Err(error)) => warn!(endpoint = endpoint.url(), %error, "oracle signing failed"),
                Err(_) => warn!(endpoint = endpoint.url(), "oracle signing timed out"),
            }
        }

        if proofs.is_empty() {
            return Err(unavailable());
        }
        debug!(asset = %asset, signatures = proofs.len(), "oracle proofs collected");
        Ok(proofs)
    }

    /// Proofs for a native asset, nothing for ADA
    ///
    /// A native asset without a caller snapshot cannot be priced and fails
    /// with `OraclePriceUnavailable`.
    pub async fn collect_if_native(
        &self,
        ledger: &dyn LedgerClient,
        oracle_nft: &AssetClass,
        asset: &AssetClass,
        snapshot: Option<PriceSnapshot>,
    ) -> LendingResult<Vec<OracleProof>> {
        if asset.is_ada() {
            return Ok(Vec::new());
        }
        match snapshot {
            Some(snapshot) => self.collect(ledger, oracle_nft, asset, snapshot).await,
            None => Err(LendingError::OraclePriceUnavailable { asset: asset.unit() }),
        }
    }
}

/// Canned endpoints for operation tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;

    /// Always answers with the same signature
    pub struct StaticEndpoint {
        pub url: String,
        pub signature: Vec<u8>,
    }

    #[async_trait]
    impl SignatureEndpoint for StaticEndpoint {
        fn url(&self) -> &str {
            &self.url
        }

        async fn sign(&self, _data_cbor_hex: &str) -> LendingResult<Vec<u8>> {
            Ok(self.signature.clone())
        }
    }

    /// Always refuses
    pub struct FailingEndpoint;

    #[async_trait]
    impl SignatureEndpoint for FailingEndpoint {
        fn url(&self) -> &str {
            "http://down.invalid"
        }

        async fn sign(&self, _data_cbor_hex: &str) -> LendingResult<Vec<u8>> {
            Err(LendingError::Network("connection refused".into()))
        }
    }

    /// Collector with one signing endpoint
    pub fn signing_collector() -> OracleProofCollector {
        OracleProofCollector::new(
            vec![Box::new(StaticEndpoint {
                url: "http://oracle-0.invalid".into(),
                signature: vec![0x51; 64],
            })],
            Duration::from_millis(5_000),
        )
    }

    /// Collector whose only endpoint is down
    pub fn failing_collector() -> OracleProofCollector {
        OracleProofCollector::new(vec![Box::new(FailingEndpoint)], Duration::from_millis(5_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendpool_common::testing::{oracle_utxo, MockLedger};
    use lendpool_common::OutputReference;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Sign(u8),
        Fail,
        Hang,
    }

    struct FakeEndpoint {
        url: String,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SignatureEndpoint for FakeEndpoint {
        fn url(&self) -> &str {
            &self.url
        }

        async fn sign(&self, data_cbor_hex: &str) -> LendingResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(hex::decode(data_cbor_hex).is_ok());
            match self.behaviour {
                Behaviour::Sign(byte) => Ok(vec![byte; 64]),
                Behaviour::Fail => Err(LendingError::Network("503".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok(vec![0; 64])
                }
            }
        }
    }

    fn collector(behaviours: Vec<Behaviour>, calls: &Arc<AtomicUsize>) -> OracleProofCollector {
        let endpoints = behaviours
            .into_iter()
            .enumerate()
            .map(|(i, behaviour)| {
                Box::new(FakeEndpoint {
                    url: format!("http://oracle-{}.invalid", i),
                    behaviour,
                    calls: calls.clone(),
                }) as Box<dyn SignatureEndpoint>
            })
            .collect();
        OracleProofCollector::new(endpoints, Duration::from_millis(5_000))
    }

    fn oracle_nft() -> AssetClass {
        AssetClass::new(vec![0x0a; 28], b"oc".to_vec())
    }

    fn asset() -> AssetClass {
        AssetClass::new(vec![0xcc; 28], b"COLL".to_vec())
    }

    fn ledger() -> MockLedger {
        MockLedger::new().with_utxo(oracle_utxo(oracle_nft(), 0))
    }

    #[tokio::test]
    async fn test_one_proof_per_signature() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = collector(vec![Behaviour::Sign(1), Behaviour::Fail, Behaviour::Sign(3)], &calls);
        let ledger = ledger();

        let proofs = collector
            .collect(&ledger, &oracle_nft(), &asset(), PriceSnapshot::new(1_000, 400))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(proofs.len(), 2);
        assert_eq!(proofs[0].reward_credential, Credential::Script(vec![0x0e; 28]));
        assert_eq!(proofs[1].redeemer.signatures[0].key_position, 2);

        let PriceFeed::Pooled(prices) = &proofs[0].redeemer.data else {
            panic!("expected pooled feed");
        };
        assert_eq!(prices[0].valid_to, ledger.current_time_ms() + ORACLE_FEED_TTL_MS);
        assert_eq!(prices[0].token_a_amount, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_endpoints_time_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = collector(vec![Behaviour::Hang, Behaviour::Hang], &calls);
        let started = Instant::now();

        let err = collector
            .collect(&ledger(), &oracle_nft(), &asset(), PriceSnapshot::new(1_000, 400))
            .await
            .unwrap_err();
        assert_eq!(err, LendingError::OraclePriceUnavailable { asset: asset().unit() });
        assert_eq!(started.elapsed(), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_endpoint_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = collector(vec![Behaviour::Hang, Behaviour::Sign(7)], &calls);
        let proofs = collector
            .collect(&ledger(), &oracle_nft(), &asset(), PriceSnapshot::new(1_000, 400))
            .await
            .unwrap();
        assert_eq!(proofs.len(), 1);
        assert_eq!(proofs[0].redeemer.signatures[0].signature, vec![7; 64]);
    }

    #[tokio::test]
    async fn test_missing_oracle_output() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = collector(vec![Behaviour::Sign(1)], &calls);
        let err = collector
            .collect(&MockLedger::new(), &oracle_nft(), &asset(), PriceSnapshot::new(1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::OraclePriceUnavailable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ada_needs_no_proof() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = collector(vec![Behaviour::Sign(1)], &calls);
        let ledger = ledger();
        let proofs = collector
            .collect_if_native(&ledger, &oracle_nft(), &AssetClass::ada(), None)
            .await
            .unwrap();
        assert!(proofs.is_empty());

        let err = collector
            .collect_if_native(&ledger, &oracle_nft(), &asset(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::OraclePriceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_attach_merges_same_oracle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = collector(vec![Behaviour::Sign(1), Behaviour::Sign(2)], &calls);
        let proofs = collector
            .collect(&ledger(), &oracle_nft(), &asset(), PriceSnapshot::new(1_000, 400))
            .await
            .unwrap();

        let plan = attach_proofs(TxBuilder::new(), &proofs).build();
        assert_eq!(plan.withdrawals.len(), 1);
        assert_eq!(plan.withdrawals[0].amount, 0);
        assert_eq!(plan.reference_inputs, vec![OutputReference::new(vec![0x0a; 32], 0)]);

        let mut merged = proofs[0].redeemer.clone();
        merged.signatures.push(proofs[1].redeemer.signatures[0].clone());
        assert_eq!(plan.withdrawals[0].redeemer, merged.to_plutus_data());
    }
}
