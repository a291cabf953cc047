//! The uniform chain adapter contract.

use serde::{Deserialize, Serialize};

use crate::chain::ChannelKey;
use crate::claim::SignedClaim;
use crate::error::AdapterError;

/// Receipt of a completed cooperative settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Chain-specific transaction/ledger hash, hex- or base58-encoded as
    /// appropriate to the chain.
    pub tx_hash: String,
    /// Final on-chain balance after settlement, in the chain's base unit.
    pub final_amount: u128,
}

/// One adapter per chain family, with the same contract regardless of chain.
///
/// Implementors additionally enforce, internally:
/// - an outbound nonce guard in `sign` (EVM/Aptos only — refuses to sign at
///   or below the highest nonce ever signed for the channel);
/// - an inbound replay guard in `verify` (all chains — rejects a claim that
///   does not strictly exceed the highest sequence previously verified from
///   that `(channel, signer)` pair).
///
/// Both guards are in-process and authoritative only for intra-process
/// ordering; [`claim-store`](../claim_store) provides the durable version
/// that survives restarts.
#[async_trait::async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Produces a signed claim for `amount` (and `nonce` where applicable).
    async fn sign(
        &self,
        channel: &ChannelKey,
        amount: u128,
        nonce: Option<u64>,
    ) -> Result<SignedClaim, AdapterError>;

    /// Checks `claim`'s signature over the canonical per-chain payload
    /// against `expected_signer` (hex-encoded, chain-native width), and
    /// enforces the inbound replay guard described above.
    async fn verify(
        &self,
        claim: &SignedClaim,
        expected_signer: &str,
    ) -> Result<bool, AdapterError>;

    /// Submits a cooperative settlement transaction closing the channel
    /// using both parties' latest signed claims.
    async fn cooperative_settle(
        &self,
        channel: &ChannelKey,
        our_claim: &SignedClaim,
        peer_claim: &SignedClaim,
    ) -> Result<SettlementReceipt, AdapterError>;
}
