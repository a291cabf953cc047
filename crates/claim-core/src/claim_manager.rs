//! The orchestration hub wiring Channel Registry, Claim Store, Chain
//! Adapters and Claim Codec together.

use std::collections::HashMap;
use std::sync::Arc;

use claim_codec::ClaimEvent;
use claim_store::ClaimStore;
use claim_types::{Chain, ChainAdapter, ChannelKey, ClaimRequest, SignedClaim};

use crate::channel_registry::ChannelRegistry;

/// One entry per claim or request the pipeline could not accept, carrying
/// enough context for structured logs and operator tooling; never
/// propagated to the wire response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClaimProcessError {
    #[error("claim signer on {chain} does not match {peer_id}'s registered wallet")]
    WrongSigner { peer_id: String, chain: Chain },
    #[error("no chain adapter configured for {chain}")]
    NoAdapter { chain: Chain },
    #[error("signature verification failed on {chain}: {source}")]
    VerificationFailed { chain: Chain, source: String },
    #[error("claim on {chain} was not strictly greater than the stored value")]
    StaleSequence { chain: Chain },
    #[error("claim amount on {chain} exceeds the inbound channel deposit")]
    OverDeposit { chain: Chain },
}

/// Outcome of [`ClaimManager::process_received_claim_event`]. Total: every
/// failure in the pipeline becomes an entry here rather than an error return.
#[derive(Debug, Default)]
pub struct ProcessResult {
    pub stored_claims: Vec<SignedClaim>,
    pub unsigned_requests: Vec<ClaimRequest>,
    pub signed_responses: Vec<SignedClaim>,
    pub errors: Vec<ClaimProcessError>,
}

/// The only component that wires Channel Registry, Claim Store, Chain
/// Adapters and Claim Codec together.
pub struct ClaimManager {
    registry: Arc<ChannelRegistry>,
    store: ClaimStore,
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl ClaimManager {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        store: ClaimStore,
        adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
    ) -> Self {
        Self {
            registry,
            store,
            adapters,
        }
    }

    /// Looks up the outbound Channel State, checks `amount` against the
    /// on-chain deposit, and asks the adapter to sign. `None` means the
    /// channel is unknown or the adapter refused (stale nonce/amount) — in
    /// either case this is an invariant violation, not an error to bubble.
    pub async fn generate_claim(
        &self,
        peer_id: &str,
        chain: Chain,
        channel: &ChannelKey,
        amount: u128,
        nonce: Option<u64>,
    ) -> Option<SignedClaim> {
        let channel_state = self.registry.find_channel(peer_id, chain)?;
        let deposit = channel_state.deposit().ok()?;
        if amount > deposit {
            tracing::warn!(peer_id, %chain, amount, deposit, "refusing to sign claim above channel deposit");
            return None;
        }
        let adapter = self.adapters.get(&chain)?;
        match adapter.sign(channel, amount, nonce).await {
            Ok(claim) => Some(claim),
            Err(error) => {
                tracing::warn!(peer_id, %chain, %error, "chain adapter refused to sign claim");
                None
            }
        }
    }

    /// Delegates to the Claim Codec; always succeeds since [`ClaimEvent::new`]
    /// cannot fail, but returns `Option` for symmetry with the rest of the
    /// pipeline (a future codec revision may reject an oversized event).
    pub fn generate_claim_event(
        &self,
        inner_content: String,
        claims: Vec<SignedClaim>,
        requests: Vec<ClaimRequest>,
    ) -> Option<ClaimEvent> {
        Some(ClaimEvent::new(inner_content, claims, requests))
    }

    /// Runs the full invariant pipeline over a raw wire payload. Returns an
    /// empty [`ProcessResult`] without error if `raw_event` is not a claim
    /// event at all — the Wire Bridge still delivers it to the Event Handler
    /// unchanged.
    pub async fn process_received_claim_event(
        &self,
        peer_id: &str,
        raw_event: &str,
        peer_wallets: &HashMap<Chain, String>,
    ) -> ProcessResult {
        let mut result = ProcessResult::default();

        let event = match claim_codec::decode(raw_event) {
            Ok(Some(event)) => event,
            Ok(None) | Err(_) => return result,
        };

        for claim in &event.claims {
            self.process_one_claim(peer_id, claim, peer_wallets, &mut result)
                .await;
        }

        for request in &event.requests {
            match self.try_answer_request(peer_id, request).await {
                Some(response) => result.signed_responses.push(response),
                None => result.unsigned_requests.push(request.clone()),
            }
        }

        result
    }

    async fn process_one_claim(
        &self,
        peer_id: &str,
        claim: &SignedClaim,
        peer_wallets: &HashMap<Chain, String>,
        result: &mut ProcessResult,
    ) {
        let chain = claim.chain();

        let Some(expected_signer) = peer_wallets.get(&chain) else {
            result.errors.push(ClaimProcessError::WrongSigner {
                peer_id: peer_id.to_string(),
                chain,
            });
            return;
        };
        if claim.signer_hex() != *expected_signer {
            result.errors.push(ClaimProcessError::WrongSigner {
                peer_id: peer_id.to_string(),
                chain,
            });
            return;
        }

        let Some(adapter) = self.adapters.get(&chain) else {
            result.errors.push(ClaimProcessError::NoAdapter { chain });
            return;
        };
        match adapter.verify(claim, expected_signer).await {
            Ok(true) => {}
            Ok(false) => {
                result.errors.push(ClaimProcessError::WrongSigner {
                    peer_id: peer_id.to_string(),
                    chain,
                });
                return;
            }
            Err(error) => {
                result.errors.push(ClaimProcessError::VerificationFailed {
                    chain,
                    source: error.to_string(),
                });
                return;
            }
        }

        let Some(channel_state) = self.registry.find_channel(peer_id, chain) else {
            result.errors.push(ClaimProcessError::OverDeposit { chain });
            return;
        };
        let deposit = channel_state.deposit().unwrap_or(0);
        if claim_amount(claim) > deposit {
            result.errors.push(ClaimProcessError::OverDeposit { chain });
            return;
        }

        if self.store.store(peer_id, claim.clone()) {
            result.stored_claims.push(claim.clone());
        } else {
            result.errors.push(ClaimProcessError::StaleSequence { chain });
        }
    }

    /// Signs a response reflecting our current outbound channel state,
    /// treating the request's literal amount/nonce as a prompt rather than
    /// an authoritative demand). The
    /// adapter's own outbound guard still refuses a regression, so a
    /// concurrent newer claim simply falls through to `unsigned_requests`.
    async fn try_answer_request(&self, peer_id: &str, request: &ClaimRequest) -> Option<SignedClaim> {
        let chain = request.chain();
        let channel_state = self.registry.find_channel(peer_id, chain)?;
        let amount = channel_state.transferred().ok()?;
        let channel_key = channel_state.channel_key();
        self.generate_claim(peer_id, chain, &channel_key, amount, None)
            .await
    }

    /// Thin pass-through to the Claim Store, used by operator tooling and
    /// the Settlement Trigger.
    pub fn get_claims_for_settlement(&self, peer_id: &str, chain: Chain) -> Vec<SignedClaim> {
        self.store.claims_for_peer_chain(peer_id, chain)
    }
}

fn claim_amount(claim: &SignedClaim) -> u128 {
    match claim {
        SignedClaim::Evm {
            transferred_amount, ..
        } => transferred_amount.parse().unwrap_or(u128::MAX),
        SignedClaim::Xrp { amount, .. } => *amount as u128,
        SignedClaim::Aptos { amount, .. } => *amount as u128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_codec::encode;
    use claim_types::EvmChannelStatus;

    struct StubAdapter;

    #[async_trait::async_trait]
    impl ChainAdapter for StubAdapter {
        async fn sign(
            &self,
            _channel: &ChannelKey,
            amount: u128,
            nonce: Option<u64>,
        ) -> Result<SignedClaim, claim_types::AdapterError> {
            Ok(SignedClaim::Evm {
                channel_id: [1; 32],
                nonce: nonce.unwrap_or(1),
                transferred_amount: amount.to_string(),
                locked_amount: "0".into(),
                locks_root: [0; 32],
                signature: [9; 65],
                signer: [7; 20],
            })
        }

        async fn verify(
            &self,
            claim: &SignedClaim,
            expected_signer: &str,
        ) -> Result<bool, claim_types::AdapterError> {
            Ok(claim.signer_hex() == expected_signer)
        }

        async fn cooperative_settle(
            &self,
            _channel: &ChannelKey,
            _our_claim: &SignedClaim,
            _peer_claim: &SignedClaim,
        ) -> Result<claim_types::SettlementReceipt, claim_types::AdapterError> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn manager() -> (ClaimManager, Arc<ChannelRegistry>) {
        let registry = Arc::new(ChannelRegistry::new());
        registry.insert(
            "peer-1",
            claim_types::ChannelState::Evm {
                channel_id: [1; 32],
                peer_address: [7; 20],
                deposit: "1000000".into(),
                status: EvmChannelStatus::Opened,
                nonce: 0,
                transferred_amount: "0".into(),
            },
        );
        let store = ClaimStore::temporary().unwrap();
        let mut adapters: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();
        adapters.insert(Chain::Evm, Arc::new(StubAdapter));
        let manager = ClaimManager::new(registry.clone(), store, adapters);
        (manager, registry)
    }

    #[tokio::test]
    async fn generate_claim_refuses_amount_over_deposit() {
        let (manager, _registry) = manager();
        let channel = ChannelKey::Evm { channel_id: [1; 32] };
        let claim = manager
            .generate_claim("peer-1", Chain::Evm, &channel, 2_000_000, Some(1))
            .await;
        assert!(claim.is_none());
    }

    #[tokio::test]
    async fn generate_claim_succeeds_within_deposit() {
        let (manager, _registry) = manager();
        let channel = ChannelKey::Evm { channel_id: [1; 32] };
        let claim = manager
            .generate_claim("peer-1", Chain::Evm, &channel, 500, Some(1))
            .await;
        assert!(claim.is_some());
    }

    /// A plain event is not touched by the claim pipeline at all.
    #[tokio::test]
    async fn plain_event_yields_empty_process_result() {
        let (manager, _registry) = manager();
        let mut wallets = HashMap::new();
        wallets.insert(Chain::Evm, hex::encode([7u8; 20]));
        let result = manager
            .process_received_claim_event("peer-1", r#"{"kind":1,"content":"hi"}"#, &wallets)
            .await;
        assert!(result.stored_claims.is_empty());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn claim_event_from_wrong_signer_is_rejected() {
        let (manager, _registry) = manager();
        let event = ClaimEvent::new(
            "hi".into(),
            vec![SignedClaim::Evm {
                channel_id: [1; 32],
                nonce: 1,
                transferred_amount: "100".into(),
                locked_amount: "0".into(),
                locks_root: [0; 32],
                signature: [0; 65],
                signer: [99; 20],
            }],
            vec![],
        );
        let mut wallets = HashMap::new();
        wallets.insert(Chain::Evm, hex::encode([7u8; 20]));
        let raw = encode(&event).unwrap();
        let result = manager
            .process_received_claim_event("peer-1", &raw, &wallets)
            .await;
        assert!(result.stored_claims.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            result.errors[0],
            ClaimProcessError::WrongSigner { .. }
        ));
    }

    #[tokio::test]
    async fn claim_event_with_valid_signer_is_stored() {
        let (manager, _registry) = manager();
        let event = ClaimEvent::new(
            "hi".into(),
            vec![SignedClaim::Evm {
                channel_id: [1; 32],
                nonce: 1,
                transferred_amount: "100".into(),
                locked_amount: "0".into(),
                locks_root: [0; 32],
                signature: [0; 65],
                signer: [7; 20],
            }],
            vec![],
        );
        let mut wallets = HashMap::new();
        wallets.insert(Chain::Evm, hex::encode([7u8; 20]));
        let raw = encode(&event).unwrap();
        let result = manager
            .process_received_claim_event("peer-1", &raw, &wallets)
            .await;
        assert_eq!(result.stored_claims.len(), 1);
        assert!(result.errors.is_empty());
    }
}
