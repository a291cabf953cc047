//! Outbound prepare/fulfill correlation.

use dashmap::DashMap;

use crate::timestamp::Expiry;

/// What the Wire Bridge remembers about an outbound prepare until its
/// terminal response (or expiry) arrives.
#[derive(Debug, Clone)]
pub struct PendingPrepare {
    pub destination: String,
    pub amount: String,
    pub chain: Option<claim_types::Chain>,
    pub expires_at: Expiry,
}

/// A table of in-flight outbound prepares keyed by locally-unique packet id
/// (the inner event id, when present). `DashMap` gives per-key locking
/// matching the adapters' nonce-guard idiom.
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<String, PendingPrepare>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, packet_id: impl Into<String>, entry: PendingPrepare) {
        self.pending.insert(packet_id.into(), entry);
    }

    /// Removes and returns the pending entry for `packet_id`, if any — called
    /// once a terminal fulfill/reject or a timeout resolves it.
    pub fn resolve(&self, packet_id: &str) -> Option<PendingPrepare> {
        self.pending.remove(packet_id).map(|(_, entry)| entry)
    }

    /// Packet ids whose `expiresAt` has already passed; the caller resolves
    /// each with a synthetic REJECT T01 and removes it.
    pub fn expired_ids(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter(|entry| entry.value().expires_at.has_passed())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve_round_trips() {
        let table = CorrelationTable::new();
        table.register(
            "pkt-1",
            PendingPrepare {
                destination: "peer-b".into(),
                amount: "1000".into(),
                chain: Some(claim_types::Chain::Evm),
                expires_at: Expiry::now_plus_millis(60_000),
            },
        );
        assert_eq!(table.len(), 1);
        let resolved = table.resolve("pkt-1").unwrap();
        assert_eq!(resolved.destination, "peer-b");
        assert!(table.is_empty());
    }

    #[test]
    fn expired_ids_reports_only_passed_entries() {
        let table = CorrelationTable::new();
        table.register(
            "expired",
            PendingPrepare {
                destination: "peer-b".into(),
                amount: "1000".into(),
                chain: None,
                expires_at: Expiry(0),
            },
        );
        table.register(
            "fresh",
            PendingPrepare {
                destination: "peer-b".into(),
                amount: "1000".into(),
                chain: None,
                expires_at: Expiry::now_plus_millis(60_000),
            },
        );
        let expired = table.expired_ids();
        assert_eq!(expired, vec!["expired".to_string()]);
    }
}
