//! Threshold watcher driving cooperative on-chain settlement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use claim_store::ClaimStore;
use claim_types::{Chain, ChainAdapter};

use crate::channel_registry::ChannelRegistry;

#[derive(Debug, thiserror::Error)]
enum SettlementError {
    #[error("no channel state for peer {peer_id} on chain {chain}")]
    NoChannel { peer_id: String, chain: Chain },
    #[error("no chain adapter configured for {chain}")]
    NoAdapter { chain: Chain },
    #[error("no stored inbound claim to settle against for {chain}")]
    NoInboundClaim { chain: Chain },
    #[error("chain adapter rejected the settlement: {0}")]
    Adapter(#[from] claim_types::AdapterError),
}

/// Settlement state for a `(peerId, chain)` pair, reported by the HTTP
/// management surface's `GET /settlement/status/:peerId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SettlementStatus {
    /// Cumulative amount is below the configured threshold.
    Idle,
    /// Threshold crossed but no settlement task is running yet.
    Pending,
    /// A cooperative-settle call is in flight.
    InProgress,
}

/// Watches outbound debits and drives cooperative settlement once a
/// channel's cumulative amount crosses the configured threshold. One
/// in-flight flag per `(peerId, chain)` guarantees settlement never runs
/// twice concurrently for the same channel.
pub struct SettlementTrigger {
    registry: Arc<ChannelRegistry>,
    store: ClaimStore,
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
    threshold: RwLock<u128>,
    in_flight: DashMap<(String, Chain), Arc<AtomicBool>>,
}

impl SettlementTrigger {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        store: ClaimStore,
        adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
        threshold: u128,
    ) -> Self {
        Self {
            registry,
            store,
            adapters,
            threshold: RwLock::new(threshold),
            in_flight: DashMap::new(),
        }
    }

    /// Called by the Wire Bridge immediately after an outbound debit posts
    /// `new_cumulative` for `(peer_id, chain)`. No-op below threshold, or if
    /// a settlement for this channel is already running.
    pub fn check_and_trigger(self: &Arc<Self>, peer_id: &str, chain: Chain, new_cumulative: u128) {
        if new_cumulative < self.threshold() {
            return;
        }
        let flag = self
            .in_flight
            .entry((peer_id.to_string(), chain))
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        if flag.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = self.clone();
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            this.run(&peer_id, chain, flag).await;
        });
    }

    /// The currently configured threshold.
    pub fn threshold(&self) -> u128 {
        *self.threshold.read().expect("threshold lock poisoned")
    }

    /// Updates the threshold at runtime. Takes effect on the next debit.
    pub fn set_threshold(&self, new_threshold: u128) {
        *self.threshold.write().expect("threshold lock poisoned") = new_threshold;
    }

    /// Current settlement state for `(peer_id, chain)`, derived from the
    /// in-flight flag and the channel's cumulative amount against the
    /// configured threshold.
    pub fn status(&self, peer_id: &str, chain: Chain) -> SettlementStatus {
        let in_flight = self
            .in_flight
            .get(&(peer_id.to_string(), chain))
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false);
        if in_flight {
            return SettlementStatus::InProgress;
        }
        let cumulative = self
            .registry
            .find_channel(peer_id, chain)
            .and_then(|state| state.transferred())
            .unwrap_or(0);
        if cumulative >= self.threshold() {
            SettlementStatus::Pending
        } else {
            SettlementStatus::Idle
        }
    }

    async fn run(&self, peer_id: &str, chain: Chain, flag: Arc<AtomicBool>) {
        if let Err(error) = self.attempt_settlement(peer_id, chain).await {
            tracing::error!(
                peer_id,
                %chain,
                %error,
                "cooperative settlement failed; channel state left unchanged, next debit will re-trigger"
            );
        }
        flag.store(false, Ordering::SeqCst);
    }

    async fn attempt_settlement(&self, peer_id: &str, chain: Chain) -> Result<(), SettlementError> {
        let channel_state = self
            .registry
            .find_channel(peer_id, chain)
            .ok_or_else(|| SettlementError::NoChannel {
                peer_id: peer_id.to_string(),
                chain,
            })?;
        let channel_key = channel_state.channel_key();

        let peer_claim = self
            .store
            .latest(peer_id, chain, &channel_key)
            .ok_or(SettlementError::NoInboundClaim { chain })?;

        let adapter = self
            .adapters
            .get(&chain)
            .ok_or(SettlementError::NoAdapter { chain })?;

        let our_amount = channel_state.transferred().unwrap_or(0);
        let our_claim = adapter.sign(&channel_key, our_amount, None).await?;

        let receipt = adapter
            .cooperative_settle(&channel_key, &our_claim, &peer_claim)
            .await?;

        self.registry
            .mark_settled(peer_id, chain, receipt.final_amount)
            .map_err(|_| SettlementError::NoChannel {
                peer_id: peer_id.to_string(),
                chain,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_types::{ChannelKey, ChannelState, OpenCloseStatus, SignedClaim};

    struct StubAdapter {
        settled: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ChainAdapter for StubAdapter {
        async fn sign(
            &self,
            _channel: &ChannelKey,
            amount: u128,
            _nonce: Option<u64>,
        ) -> Result<SignedClaim, claim_types::AdapterError> {
            Ok(SignedClaim::Xrp {
                channel_id: "AB".repeat(32),
                amount: amount as u64,
                signature: [0; 64],
                signer: [0; 33],
            })
        }

        async fn verify(
            &self,
            _claim: &SignedClaim,
            _expected_signer: &str,
        ) -> Result<bool, claim_types::AdapterError> {
            Ok(true)
        }

        async fn cooperative_settle(
            &self,
            _channel: &ChannelKey,
            _our_claim: &SignedClaim,
            _peer_claim: &SignedClaim,
        ) -> Result<claim_types::SettlementReceipt, claim_types::AdapterError> {
            self.settled.store(true, Ordering::SeqCst);
            Ok(claim_types::SettlementReceipt {
                tx_hash: "deadbeef".into(),
                final_amount: 1_200,
            })
        }
    }

    fn xrp_state() -> ChannelState {
        ChannelState::Xrp {
            channel_id: "AB".repeat(32),
            destination: "rDest".into(),
            amount: 10_000_000,
            balance: 1_200,
            status: OpenCloseStatus::Open,
            settle_delay: 60,
            public_key: [0; 33],
        }
    }

    /// Three packets of 400 on an XRP channel starting at balance 0 cross
    /// a threshold of 1000 on the third, firing settlement exactly once.
    #[tokio::test]
    async fn settlement_fires_once_above_threshold() {
        let registry = Arc::new(ChannelRegistry::new());
        registry.insert("peer-1", xrp_state());
        let store = ClaimStore::temporary().unwrap();
        store.store(
            "peer-1",
            SignedClaim::Xrp {
                channel_id: "AB".repeat(32),
                amount: 500,
                signature: [0; 64],
                signer: [0; 33],
            },
        );
        let settled_flag = Arc::new(AtomicBool::new(false));
        let mut adapters: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();
        adapters.insert(
            Chain::Xrp,
            Arc::new(StubAdapter {
                settled: settled_flag.clone(),
            }),
        );

        let trigger = Arc::new(SettlementTrigger::new(
            registry.clone(),
            store.clone(),
            adapters,
            1_000,
        ));

        trigger.check_and_trigger("peer-1", Chain::Xrp, 800);
        trigger.check_and_trigger("peer-1", Chain::Xrp, 1_200);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(settled_flag.load(Ordering::SeqCst));
        let state = registry.find_channel("peer-1", Chain::Xrp).unwrap();
        if let ChannelState::Xrp { status, balance, .. } = state {
            assert_eq!(status, OpenCloseStatus::Closed);
            assert_eq!(balance, 1_200);
        } else {
            panic!("expected XRP channel state");
        }
    }

    #[test]
    fn below_threshold_does_not_trigger() {
        let registry = Arc::new(ChannelRegistry::new());
        registry.insert("peer-1", xrp_state());
        let store = ClaimStore::temporary().unwrap();
        let trigger = Arc::new(SettlementTrigger::new(
            registry,
            store,
            HashMap::new(),
            1_000,
        ));
        // No adapter registered at all; if this tried to settle it would
        // panic when looking one up inside the spawned task.
        trigger.check_and_trigger("peer-1", Chain::Xrp, 400);
    }
}
