//! Durable per-(peer, chain, channel) latest-claim storage.
//!
//! Backed by `sled`, the pure-Rust embedded KV engine. One row per unique
//! key; admission is governed by a strict monotonic predicate enforced with
//! a compare-and-swap retry loop so the read-then-write is atomic per key
//! even under concurrent writers.

use std::collections::HashMap;
use std::path::Path;

use claim_types::{Chain, ChannelKey, SignedClaim};

mod key;

use key::row_key;

/// A durable, monotonic-admission store of the single latest claim per
/// `(peerId, chain, channelKey)`.
#[derive(Clone)]
pub struct ClaimStore {
    tree: sled::Tree,
}

impl ClaimStore {
    /// Opens (creating if absent) a sled database at `path` and returns a
    /// store backed by its default tree.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        let tree = db.open_tree("claims")?;
        Ok(Self { tree })
    }

    /// An in-memory store useful for tests and ephemeral deployments.
    pub fn temporary() -> Result<Self, sled::Error> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree("claims")?;
        Ok(Self { tree })
    }

    /// Admits `claim` for `peer_id` iff it is strictly greater (by nonce for
    /// EVM/Aptos, by amount for XRP) than whatever is currently stored for
    /// the same `(peerId, chain, channelKey)`. Returns `true` on store,
    /// `false` on a stale or equal update. Storage-engine errors are logged
    /// and treated as a rejection — this method never propagates an error
    /// across its public API.
    pub fn store(&self, peer_id: &str, claim: SignedClaim) -> bool {
        let channel = match channel_key_of(&claim) {
            Ok(k) => k,
            Err(e) => {
                tracing::error!(error = %e, "could not derive channel key from claim");
                return false;
            }
        };
        let key = row_key(peer_id, claim.chain(), &channel);
        let encoded = match serde_json::to_vec(&claim) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode claim for storage");
                return false;
            }
        };
        loop {
            let current = match self.tree.get(&key) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = %e, "claim store read failed");
                    return false;
                }
            };
            let accept = match &current {
                None => true,
                Some(bytes) => match serde_json::from_slice::<SignedClaim>(bytes) {
                    Ok(existing) => claim.sequence() > existing.sequence(),
                    Err(e) => {
                        tracing::error!(error = %e, "stored claim row is corrupt");
                        false
                    }
                },
            };
            if !accept {
                return false;
            }
            match self
                .tree
                .compare_and_swap(&key, current.clone(), Some(encoded.clone()))
            {
                Ok(Ok(())) => return true,
                Ok(Err(_)) => continue, // lost the race, re-read and retry
                Err(e) => {
                    tracing::error!(error = %e, "claim store write failed");
                    return false;
                }
            }
        }
    }

    /// The single latest claim stored for this key, if any.
    pub fn latest(&self, peer_id: &str, chain: Chain, channel: &ChannelKey) -> Option<SignedClaim> {
        let key = row_key(peer_id, chain, channel);
        let bytes = self.tree.get(key).ok().flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Every claim stored for `peer_id` on `chain`, across all channels.
    pub fn claims_for_peer_chain(&self, peer_id: &str, chain: Chain) -> Vec<SignedClaim> {
        let prefix = key::prefix(peer_id, chain);
        self.tree
            .scan_prefix(prefix)
            .values()
            .filter_map(|v| v.ok())
            .filter_map(|bytes| serde_json::from_slice(&bytes).ok())
            .collect()
    }

    /// Every claim stored for `peer_id`, grouped by chain.
    pub fn claims_for_peer(&self, peer_id: &str) -> HashMap<Chain, Vec<SignedClaim>> {
        let mut out: HashMap<Chain, Vec<SignedClaim>> = HashMap::new();
        for chain in [Chain::Evm, Chain::Xrp, Chain::Aptos] {
            let claims = self.claims_for_peer_chain(peer_id, chain);
            if !claims.is_empty() {
                out.insert(chain, claims);
            }
        }
        out
    }

    /// Deletes every row for `peer_id` across all chains. Returns the number
    /// of rows removed. No garbage collection happens automatically
    /// — this is the operator-triggered path.
    pub fn delete_all(&self, peer_id: &str) -> u32 {
        let prefix = key::peer_prefix(peer_id);
        let keys: Vec<_> = self
            .tree
            .scan_prefix(prefix)
            .keys()
            .filter_map(|k| k.ok())
            .collect();
        let mut removed = 0u32;
        for key in keys {
            match self.tree.remove(key) {
                Ok(Some(_)) => removed += 1,
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "claim store delete failed"),
            }
        }
        removed
    }

    /// Row counts, overall and per chain, across the whole store.
    pub fn stats(&self) -> StoreStats {
        let mut by_chain: HashMap<Chain, u64> = HashMap::new();
        let mut total = 0u64;
        for item in self.tree.iter() {
            let Ok((key, _)) = item else { continue };
            if let Some(chain) = key::chain_of(&key) {
                *by_chain.entry(chain).or_insert(0) += 1;
                total += 1;
            }
        }
        StoreStats { total, by_chain }
    }
}

/// Summary counts returned by [`ClaimStore::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub by_chain: HashMap<Chain, u64>,
}

/// The optional per-chain local signing-state mapping `channelKey → highest
/// signed nonce`, used by EVM/Aptos chain adapters to carry their outbound
/// nonce guard across restarts.
#[derive(Clone)]
pub struct NonceStore {
    tree: sled::Tree,
}

impl NonceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        let tree = db.open_tree("nonces")?;
        Ok(Self { tree })
    }

    pub fn temporary() -> Result<Self, sled::Error> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree("nonces")?;
        Ok(Self { tree })
    }

    /// The highest nonce ever recorded for `channel_key`, if any.
    pub fn highest(&self, channel_key: &str) -> Option<u64> {
        let bytes = self.tree.get(channel_key).ok().flatten()?;
        let arr: [u8; 8] = bytes.as_ref().try_into().ok()?;
        Some(u64::from_be_bytes(arr))
    }

    /// Records `nonce` for `channel_key`, unconditionally overwriting
    /// whatever was stored. Callers are expected to have already checked
    /// monotonicity in memory; this is a durability write, not a guard.
    pub fn record(&self, channel_key: &str, nonce: u64) {
        if let Err(e) = self.tree.insert(channel_key, &nonce.to_be_bytes()) {
            tracing::error!(error = %e, channel_key, "failed to persist outbound nonce");
        }
    }
}

#[cfg(test)]
mod nonce_store_tests {
    use super::NonceStore;

    #[test]
    fn records_and_reads_back_highest_nonce() {
        let store = NonceStore::temporary().unwrap();
        assert_eq!(store.highest("chan-1"), None);
        store.record("chan-1", 4);
        assert_eq!(store.highest("chan-1"), Some(4));
        store.record("chan-1", 9);
        assert_eq!(store.highest("chan-1"), Some(9));
    }
}

fn channel_key_of(claim: &SignedClaim) -> Result<ChannelKey, String> {
    match claim {
        SignedClaim::Evm { channel_id, .. } => Ok(ChannelKey::Evm {
            channel_id: *channel_id,
        }),
        SignedClaim::Xrp { channel_id, .. } => Ok(ChannelKey::Xrp {
            channel_id: channel_id.clone(),
        }),
        SignedClaim::Aptos { channel_owner, .. } => Ok(ChannelKey::Aptos {
            channel_owner: channel_owner.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evm_claim(nonce: u64, transferred: &str) -> SignedClaim {
        SignedClaim::Evm {
            channel_id: [1; 32],
            nonce,
            transferred_amount: transferred.into(),
            locked_amount: "0".into(),
            locks_root: [0; 32],
            signature: [0; 65],
            signer: [0; 20],
        }
    }

    fn xrp_claim(amount: u64) -> SignedClaim {
        SignedClaim::Xrp {
            channel_id: "AB".repeat(32),
            amount,
            signature: [0; 64],
            signer: [0; 33],
        }
    }

    /// A higher EVM nonce replaces a lower one; a lower nonce is rejected
    /// and the stored claim is unchanged.
    #[test]
    fn s1_evm_monotonic_admit() {
        let store = ClaimStore::temporary().unwrap();
        let peer = "peer-1";
        assert!(store.store(peer, evm_claim(5, "1000000")));

        assert!(!store.store(peer, evm_claim(3, "2000000")));
        let channel = ChannelKey::Evm {
            channel_id: [1; 32],
        };
        let stored = store.latest(peer, Chain::Evm, &channel).unwrap();
        assert_eq!(stored, evm_claim(5, "1000000"));

        assert!(store.store(peer, evm_claim(6, "1100000")));
        let stored = store.latest(peer, Chain::Evm, &channel).unwrap();
        assert_eq!(stored, evm_claim(6, "1100000"));
    }

    /// A higher cumulative XRP amount replaces a lower one; a lower or
    /// equal amount is rejected.
    #[test]
    fn s2_xrp_amount_monotonicity() {
        let store = ClaimStore::temporary().unwrap();
        let peer = "peer-2";
        assert!(store.store(peer, xrp_claim(5_000_000)));
        assert!(!store.store(peer, xrp_claim(5_000_000)));
        assert!(store.store(peer, xrp_claim(6_000_000)));
    }

    #[test]
    fn claims_for_peer_groups_by_chain() {
        let store = ClaimStore::temporary().unwrap();
        let peer = "peer-3";
        store.store(peer, evm_claim(1, "10"));
        store.store(peer, xrp_claim(10));
        let grouped = store.claims_for_peer(peer);
        assert_eq!(grouped.len(), 2);
        assert!(grouped.contains_key(&Chain::Evm));
        assert!(grouped.contains_key(&Chain::Xrp));
    }

    #[test]
    fn delete_all_removes_every_row_for_peer_only() {
        let store = ClaimStore::temporary().unwrap();
        store.store("peer-a", evm_claim(1, "10"));
        store.store("peer-b", evm_claim(1, "10"));
        let removed = store.delete_all("peer-a");
        assert_eq!(removed, 1);
        assert!(store.claims_for_peer("peer-a").is_empty());
        assert!(!store.claims_for_peer("peer-b").is_empty());
    }

    #[test]
    fn stats_counts_total_and_by_chain() {
        let store = ClaimStore::temporary().unwrap();
        store.store("peer-x", evm_claim(1, "10"));
        store.store("peer-y", xrp_claim(10));
        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_chain.get(&Chain::Evm), Some(&1));
        assert_eq!(stats.by_chain.get(&Chain::Xrp), Some(&1));
    }
}
