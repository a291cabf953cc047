//! The prepare/fulfill state machine and outbound prepare construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use claim_core::{ChannelRegistry, ClaimManager, SettlementTrigger};
use claim_types::Chain;

use crate::correlation::{CorrelationTable, PendingPrepare};
use crate::event_handler::EventHandler;
use crate::packet::{Fulfill, Packet, Prepare, Reject, RejectCode};
use crate::timestamp::Expiry;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("upstream forwarding failed: {0}")]
    Upstream(String),
}

/// Handles a prepare destined for a private-messaging gateway or similar
/// side channel before connector/local-termination logic runs.
#[async_trait::async_trait]
pub trait SideChannelGateway: Send + Sync {
    fn accepts(&self, destination: &str) -> bool;
    async fn handle(&self, prepare: &Prepare) -> Option<Packet>;
}

/// The upstream client used to forward a prepare one hop further toward a
/// non-local destination.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward_prepare(&self, prepare: &Prepare) -> Result<Packet, WireError>;
}

/// Terminates bilateral connections, frames packets, correlates responses,
/// forwards non-local prepares, and dispatches locally-terminating ones into
/// the Claim Manager and Event Handler.
pub struct WireBridge<E: EventHandler> {
    local_address: String,
    claim_exchange_enabled: bool,
    claim_manager: Arc<ClaimManager>,
    registry: Arc<ChannelRegistry>,
    settlement: Arc<SettlementTrigger>,
    event_handler: Arc<E>,
    side_channel: Option<Arc<dyn SideChannelGateway>>,
    upstream: Option<Arc<dyn UpstreamClient>>,
    correlation: CorrelationTable,
    peer_wallets: DashMap<String, HashMap<Chain, String>>,
    next_packet_id: AtomicU64,
}

impl<E: EventHandler> WireBridge<E> {
    pub fn new(
        local_address: impl Into<String>,
        claim_exchange_enabled: bool,
        claim_manager: Arc<ClaimManager>,
        registry: Arc<ChannelRegistry>,
        settlement: Arc<SettlementTrigger>,
        event_handler: Arc<E>,
    ) -> Self {
        Self {
            local_address: local_address.into(),
            claim_exchange_enabled,
            claim_manager,
            registry,
            settlement,
            event_handler,
            side_channel: None,
            upstream: None,
            correlation: CorrelationTable::new(),
            peer_wallets: DashMap::new(),
            next_packet_id: AtomicU64::new(0),
        }
    }

    pub fn with_side_channel(mut self, gateway: Arc<dyn SideChannelGateway>) -> Self {
        self.side_channel = Some(gateway);
        self
    }

    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Registers the wallet addresses `peer_id` has asserted for each chain,
    /// used by the Claim Manager's signer-binding check.
    pub fn register_peer_wallets(&self, peer_id: impl Into<String>, wallets: HashMap<Chain, String>) {
        self.peer_wallets.insert(peer_id.into(), wallets);
    }

    pub fn correlation(&self) -> &CorrelationTable {
        &self.correlation
    }

    /// Runs the full per-prepare state machine.
    pub async fn handle_prepare(&self, from_peer: &str, prepare: Prepare) -> Packet {
        if prepare.amount.parse::<u128>().is_err() {
            return Packet::Reject(Reject::new(RejectCode::F01, "amount is not a valid decimal"));
        }

        if let Some(gateway) = &self.side_channel {
            if gateway.accepts(&prepare.destination) {
                if let Some(response) = gateway.handle(&prepare).await {
                    return response;
                }
            }
        }

        if prepare.destination != self.local_address {
            return self.forward(&prepare).await;
        }

        self.terminate_locally(from_peer, &prepare).await
    }

    async fn forward(&self, prepare: &Prepare) -> Packet {
        let Some(upstream) = &self.upstream else {
            return Packet::Reject(Reject::new(RejectCode::T01, "no upstream configured"));
        };
        let Some(forwarded_amount) = connector_fee(&prepare.amount) else {
            return Packet::Reject(Reject::new(RejectCode::F01, "amount is not a valid decimal"));
        };
        let forwarded = Prepare {
            amount: forwarded_amount.to_string(),
            destination: prepare.destination.clone(),
            execution_condition: prepare.execution_condition,
            expires_at: prepare.expires_at.shrink_by_one_second(),
            data: prepare.data.clone(),
        };
        match upstream.forward_prepare(&forwarded).await {
            Ok(packet) => packet,
            Err(error) => {
                tracing::warn!(%error, "forwarding to upstream failed");
                Packet::Reject(Reject::new(RejectCode::T01, error.to_string()))
            }
        }
    }

    async fn terminate_locally(&self, from_peer: &str, prepare: &Prepare) -> Packet {
        let raw_event = match std::str::from_utf8(&prepare.data) {
            Ok(s) => s,
            Err(_) => {
                return Packet::Reject(Reject::new(RejectCode::F01, "prepare data is not valid utf-8"));
            }
        };

        if !self.claim_exchange_enabled {
            self.event_handler.handle_inbound(from_peer, raw_event).await;
            return Packet::Fulfill(Fulfill {
                fulfillment: prepare.execution_condition,
                data: Vec::new(),
            });
        }

        let peer_wallets = self
            .peer_wallets
            .get(from_peer)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let result = self
            .claim_manager
            .process_received_claim_event(from_peer, raw_event, &peer_wallets)
            .await;

        let inner_content = match claim_codec::decode(raw_event) {
            Ok(Some(event)) => event.content,
            Ok(None) | Err(_) => raw_event.to_string(),
        };

        if !self.event_handler.accepts(&inner_content).await {
            return Packet::Reject(Reject::new(RejectCode::F99, "application handler refused event"));
        }
        self.event_handler.handle_inbound(from_peer, &inner_content).await;

        for error in &result.errors {
            tracing::warn!(peer_id = from_peer, %error, "claim pipeline error on inbound event");
        }

        let response_data = if result.signed_responses.is_empty() {
            Vec::new()
        } else {
            self.claim_manager
                .generate_claim_event(String::new(), result.signed_responses, Vec::new())
                .and_then(|event| claim_codec::encode(&event).ok())
                .map(String::into_bytes)
                .unwrap_or_default()
        };

        Packet::Fulfill(Fulfill {
            fulfillment: prepare.execution_condition,
            data: response_data,
        })
    }

    /// Generates claims, debits Channel State, checks the settlement
    /// threshold, wraps and frames a prepare, and registers it for
    /// correlation.
    pub async fn construct_outbound_prepare(
        &self,
        peer_id: &str,
        destination: impl Into<String>,
        amount: u128,
        content: String,
        execution_condition: [u8; 32],
        ttl_millis: u64,
    ) -> (String, Packet) {
        let destination = destination.into();
        let claims = self.generate_outbound_claims(peer_id, amount).await;

        let data = if self.claim_exchange_enabled {
            self.claim_manager
                .generate_claim_event(content.clone(), claims, Vec::new())
                .and_then(|event| claim_codec::encode(&event).ok())
                .map(String::into_bytes)
                .unwrap_or_else(|| content.clone().into_bytes())
        } else {
            content.clone().into_bytes()
        };

        let expires_at = Expiry::now_plus_millis(ttl_millis);
        let prepare = Prepare {
            amount: amount.to_string(),
            destination: destination.clone(),
            execution_condition,
            expires_at,
            data,
        };

        let chain = claims.first().map(claim_types::SignedClaim::chain);
        let packet_id = format!("{peer_id}-{}", self.next_packet_id.fetch_add(1, Ordering::Relaxed));
        self.correlation.register(
            packet_id.clone(),
            PendingPrepare {
                destination,
                amount: amount.to_string(),
                chain,
                expires_at,
            },
        );

        (packet_id, Packet::Prepare(prepare))
    }

    /// One claim per chain where `peer_id` holds a channel, preferring EVM,
    /// then XRP, then APTOS. Debits the registry
    /// first so the claim is signed for the post-debit cumulative amount,
    /// then checks the settlement threshold against that same value.
    async fn generate_outbound_claims(
        &self,
        peer_id: &str,
        amount: u128,
    ) -> Vec<claim_types::SignedClaim> {
        let mut claims = Vec::new();
        for chain in [Chain::Evm, Chain::Xrp, Chain::Aptos] {
            let Some(channel_state) = self.registry.find_channel(peer_id, chain) else {
                continue;
            };
            let channel_key = channel_state.channel_key();
            let Ok(updated) = self.registry.debit(peer_id, chain, amount) else {
                continue;
            };
            let new_total = updated.transferred().unwrap_or(0);
            if let Some(claim) = self
                .claim_manager
                .generate_claim(peer_id, chain, &channel_key, new_total, None)
                .await
            {
                claims.push(claim);
            }
            self.settlement.check_and_trigger(peer_id, chain, new_total);
        }
        claims
    }
}

/// Subtracts a 1% connector fee, rounded up, from `amount`.
fn connector_fee(amount: &str) -> Option<u128> {
    let amount: u128 = amount.parse().ok()?;
    let fee = amount.saturating_add(99) / 100;
    Some(amount.saturating_sub(fee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_handler::LoggingEventHandler;
    use claim_store::ClaimStore;
    use claim_types::{ChainAdapter, ChannelState, EvmChannelStatus};

    struct NoopAdapter;

    #[async_trait::async_trait]
    impl ChainAdapter for NoopAdapter {
        async fn sign(
            &self,
            _channel: &claim_types::ChannelKey,
            amount: u128,
            nonce: Option<u64>,
        ) -> Result<claim_types::SignedClaim, claim_types::AdapterError> {
            Ok(claim_types::SignedClaim::Evm {
                channel_id: [1; 32],
                nonce: nonce.unwrap_or(1),
                transferred_amount: amount.to_string(),
                locked_amount: "0".into(),
                locks_root: [0; 32],
                signature: [0; 65],
                signer: [7; 20],
            })
        }

        async fn verify(
            &self,
            _claim: &claim_types::SignedClaim,
            _expected_signer: &str,
        ) -> Result<bool, claim_types::AdapterError> {
            Ok(true)
        }

        async fn cooperative_settle(
            &self,
            _channel: &claim_types::ChannelKey,
            _our_claim: &claim_types::SignedClaim,
            _peer_claim: &claim_types::SignedClaim,
        ) -> Result<claim_types::SettlementReceipt, claim_types::AdapterError> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn bridge() -> WireBridge<LoggingEventHandler> {
        let registry = Arc::new(ChannelRegistry::new());
        registry.insert(
            "peer-b",
            ChannelState::Evm {
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
        adapters.insert(Chain::Evm, Arc::new(NoopAdapter));
        let claim_manager = Arc::new(ClaimManager::new(registry.clone(), store.clone(), adapters.clone()));
        let settlement = Arc::new(SettlementTrigger::new(registry.clone(), store, adapters, 1_000_000_000));
        WireBridge::new(
            "local-node",
            true,
            claim_manager,
            registry,
            settlement,
            Arc::new(LoggingEventHandler),
        )
    }

    #[tokio::test]
    async fn malformed_amount_is_rejected_f01() {
        let bridge = bridge();
        let prepare = Prepare {
            amount: "not-a-number".into(),
            destination: "local-node".into(),
            execution_condition: [0; 32],
            expires_at: Expiry::now_plus_millis(10_000),
            data: vec![],
        };
        let response = bridge.handle_prepare("peer-b", prepare).await;
        match response {
            Packet::Reject(reject) => assert_eq!(reject.code, RejectCode::F01),
            other => panic!("expected REJECT F01, got {other:?}"),
        }
    }

    /// A locally-terminating prepare carrying a plain (non-claim) inner
    /// event is delivered unchanged and fulfilled.
    #[tokio::test]
    async fn local_plain_event_is_fulfilled() {
        let bridge = bridge();
        let prepare = Prepare {
            amount: "100".into(),
            destination: "local-node".into(),
            execution_condition: [3; 32],
            expires_at: Expiry::now_plus_millis(10_000),
            data: br#"{"kind":1,"content":"hi"}"#.to_vec(),
        };
        let response = bridge.handle_prepare("peer-b", prepare).await;
        assert!(matches!(response, Packet::Fulfill(_)));
    }

    /// Forwarding with fee: amount 10_000 becomes 9_900 and expiry shrinks
    /// by one second.
    #[tokio::test]
    async fn forwarding_deducts_fee_and_shrinks_expiry() {
        struct RecordingUpstream {
            seen: std::sync::Mutex<Option<Prepare>>,
        }

        #[async_trait::async_trait]
        impl UpstreamClient for RecordingUpstream {
            async fn forward_prepare(&self, prepare: &Prepare) -> Result<Packet, WireError> {
                *self.seen.lock().unwrap() = Some(prepare.clone());
                Ok(Packet::Fulfill(Fulfill {
                    fulfillment: [9; 32],
                    data: vec![],
                }))
            }
        }

        let upstream = Arc::new(RecordingUpstream {
            seen: std::sync::Mutex::new(None),
        });
        let bridge = bridge().with_upstream(upstream.clone());
        let expires_at = Expiry::now_plus_millis(60_000);
        let prepare = Prepare {
            amount: "10000".into(),
            destination: "someone-else".into(),
            execution_condition: [1; 32],
            expires_at,
            data: vec![],
        };
        let response = bridge.handle_prepare("peer-b", prepare).await;
        assert!(matches!(response, Packet::Fulfill(_)));

        let forwarded = upstream.seen.lock().unwrap().clone().unwrap();
        assert_eq!(forwarded.amount, "9900");
        assert_eq!(forwarded.expires_at, expires_at.shrink_by_one_second());
    }

    #[tokio::test]
    async fn outbound_construction_debits_and_registers_correlation() {
        let bridge = bridge();
        let (packet_id, packet) = bridge
            .construct_outbound_prepare("peer-b", "peer-b", 400, "hi".into(), [2; 32], 30_000)
            .await;
        assert!(matches!(packet, Packet::Prepare(_)));
        assert_eq!(bridge.correlation().len(), 1);
        let resolved = bridge.correlation().resolve(&packet_id).unwrap();
        assert_eq!(resolved.amount, "400");

        let state = bridge.registry.find_channel("peer-b", Chain::Evm).unwrap();
        assert_eq!(state.transferred().unwrap(), 400);
    }
}
