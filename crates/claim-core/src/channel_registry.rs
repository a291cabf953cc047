//! In-memory authoritative cache of channel state.

use dashmap::DashMap;

use claim_types::{Chain, ChannelState, EvmChannelStatus, OpenCloseStatus};

/// Error returned when a debit is attempted on a channel the registry does
/// not know about.
#[derive(Debug, thiserror::Error)]
#[error("no channel state for peer {peer_id} on chain {chain}")]
pub struct ChannelNotFound {
    pub peer_id: String,
    pub chain: Chain,
}

/// In-memory mirror of on-chain channel state, keyed by `(peerId, chain)`.
///
/// Each entry is independently locked by `DashMap`'s per-bucket sharding, so
/// concurrent debits on different peers/chains proceed without contention
/// while a single channel's updates are serialized.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<(String, Chain), ChannelState>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the channel state held for `peer_id`.
    pub fn insert(&self, peer_id: impl Into<String>, state: ChannelState) {
        let chain = state.chain();
        self.channels.insert((peer_id.into(), chain), state);
    }

    /// The uniform lookup the Wire Bridge uses when it already knows both
    /// peer and chain.
    pub fn find_channel(&self, peer_id: &str, chain: Chain) -> Option<ChannelState> {
        self.channels
            .get(&(peer_id.to_string(), chain))
            .map(|entry| entry.value().clone())
    }

    pub fn find_evm_channel_by_peer(&self, peer_id: &str) -> Option<ChannelState> {
        self.find_channel(peer_id, Chain::Evm)
    }

    pub fn find_xrp_channel_by_dest(&self, destination: &str) -> Option<ChannelState> {
        self.channels.iter().find_map(|entry| match entry.value() {
            ChannelState::Xrp { destination: d, .. } if d == destination => {
                Some(entry.value().clone())
            }
            _ => None,
        })
    }

    pub fn find_aptos_channel_by_dest(&self, destination: &str) -> Option<ChannelState> {
        self.channels.iter().find_map(|entry| match entry.value() {
            ChannelState::Aptos { destination: d, .. } if d == destination => {
                Some(entry.value().clone())
            }
            _ => None,
        })
    }

    /// Debits `amount` from the channel held for `(peer_id, chain)`: bumps
    /// the nonce (EVM/Aptos) and adds `amount` to the running
    /// transferred/claimed/balance field. This is the only place Channel
    /// State is mutated by the core.
    pub fn debit(
        &self,
        peer_id: &str,
        chain: Chain,
        amount: u128,
    ) -> Result<ChannelState, ChannelNotFound> {
        let mut entry = self
            .channels
            .get_mut(&(peer_id.to_string(), chain))
            .ok_or_else(|| ChannelNotFound {
                peer_id: peer_id.to_string(),
                chain,
            })?;
        match entry.value_mut() {
            ChannelState::Evm {
                nonce,
                transferred_amount,
                ..
            } => {
                let current: u128 = transferred_amount.parse().unwrap_or(0);
                *nonce += 1;
                *transferred_amount = (current + amount).to_string();
            }
            ChannelState::Xrp { balance, .. } => {
                *balance = balance.saturating_add(amount as u64);
            }
            ChannelState::Aptos { claimed, nonce, .. } => {
                *claimed = claimed.saturating_add(amount as u64);
                *nonce += 1;
            }
        }
        Ok(entry.value().clone())
    }

    /// Marks a channel settled/closed and reconciles its balance field to
    /// `final_amount` from a [`claim_types::SettlementReceipt`].
    pub fn mark_settled(
        &self,
        peer_id: &str,
        chain: Chain,
        final_amount: u128,
    ) -> Result<ChannelState, ChannelNotFound> {
        let mut entry = self
            .channels
            .get_mut(&(peer_id.to_string(), chain))
            .ok_or_else(|| ChannelNotFound {
                peer_id: peer_id.to_string(),
                chain,
            })?;
        match entry.value_mut() {
            ChannelState::Evm {
                status,
                transferred_amount,
                ..
            } => {
                *status = EvmChannelStatus::Settled;
                *transferred_amount = final_amount.to_string();
            }
            ChannelState::Xrp { status, balance, .. } => {
                *status = OpenCloseStatus::Closed;
                *balance = final_amount as u64;
            }
            ChannelState::Aptos { status, claimed, .. } => {
                *status = OpenCloseStatus::Closed;
                *claimed = final_amount as u64;
            }
        }
        Ok(entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_types::{EvmChannelStatus, OpenCloseStatus};

    fn evm_state() -> ChannelState {
        ChannelState::Evm {
            channel_id: [1; 32],
            peer_address: [2; 20],
            deposit: "1000000".into(),
            status: EvmChannelStatus::Opened,
            nonce: 0,
            transferred_amount: "0".into(),
        }
    }

    #[test]
    fn debit_increments_nonce_and_transferred_amount_exactly_once() {
        let registry = ChannelRegistry::new();
        registry.insert("peer-1", evm_state());
        let updated = registry.debit("peer-1", Chain::Evm, 400).unwrap();
        assert_eq!(updated.transferred().unwrap(), 400);

        let updated = registry.debit("peer-1", Chain::Evm, 400).unwrap();
        assert_eq!(updated.transferred().unwrap(), 800);
        if let ChannelState::Evm { nonce, .. } = updated {
            assert_eq!(nonce, 2);
        } else {
            panic!("expected EVM channel state");
        }
    }

    #[test]
    fn debit_on_unknown_channel_errors() {
        let registry = ChannelRegistry::new();
        let err = registry.debit("peer-x", Chain::Evm, 100);
        assert!(err.is_err());
    }

    #[test]
    fn mark_settled_sets_status_and_balance() {
        let registry = ChannelRegistry::new();
        registry.insert("peer-1", evm_state());
        registry.debit("peer-1", Chain::Evm, 400).unwrap();
        let settled = registry.mark_settled("peer-1", Chain::Evm, 400).unwrap();
        if let ChannelState::Evm {
            status,
            transferred_amount,
            ..
        } = settled
        {
            assert_eq!(status, EvmChannelStatus::Settled);
            assert_eq!(transferred_amount, "400");
        } else {
            panic!("expected EVM channel state");
        }
    }

    #[test]
    fn find_xrp_channel_by_dest_scans_all_entries() {
        let registry = ChannelRegistry::new();
        registry.insert(
            "peer-2",
            ChannelState::Xrp {
                channel_id: "AB".repeat(32),
                destination: "rDestination".into(),
                amount: 10_000_000,
                balance: 0,
                status: OpenCloseStatus::Open,
                settle_delay: 60,
                public_key: [0; 33],
            },
        );
        let found = registry.find_xrp_channel_by_dest("rDestination");
        assert!(found.is_some());
        assert!(registry.find_xrp_channel_by_dest("rSomeoneElse").is_none());
    }
}
