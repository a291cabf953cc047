//! Row key layout: `peerId \0 chain \0 channelKey`, so a prefix scan over
//! `peerId \0` (optionally `peerId \0 chain \0`) yields exactly that peer's
//! (optionally that chain's) rows in lexicographic order.

use claim_types::{Chain, ChannelKey};

const SEP: u8 = 0;

pub fn peer_prefix(peer_id: &str) -> Vec<u8> {
    let mut key = peer_id.as_bytes().to_vec();
    key.push(SEP);
    key
}

pub fn prefix(peer_id: &str, chain: Chain) -> Vec<u8> {
    let mut key = peer_prefix(peer_id);
    key.extend_from_slice(chain.to_string().as_bytes());
    key.push(SEP);
    key
}

pub fn row_key(peer_id: &str, chain: Chain, channel: &ChannelKey) -> Vec<u8> {
    let mut key = prefix(peer_id, chain);
    key.extend_from_slice(channel.as_store_key().as_bytes());
    key
}

/// Recovers the [`Chain`] encoded in a row key, for stats aggregation.
pub fn chain_of(key: &[u8]) -> Option<Chain> {
    let mut parts = key.split(|b| *b == SEP);
    let _peer = parts.next()?;
    let chain = parts.next()?;
    std::str::from_utf8(chain).ok()?.parse().ok()
}
