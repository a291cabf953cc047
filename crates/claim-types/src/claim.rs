//! Signed claim (balance proof) and claim request types.

use serde::{Deserialize, Serialize};

use crate::chain::Chain;

/// A cryptographically signed statement of a cumulative amount owed on a
/// specific payment channel, tagged by chain family.
///
/// EVM/Aptos carry a monotonic `nonce`; XRP has none — the cumulative
/// `amount` is itself the monotonic key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chain", rename_all = "lowercase")]
pub enum SignedClaim {
    Evm {
        channel_id: [u8; 32],
        nonce: u64,
        /// Decimal string preserving full `u256` precision.
        transferred_amount: String,
        /// Decimal string preserving full `u256` precision.
        locked_amount: String,
        locks_root: [u8; 32],
        /// 65-byte secp256k1 signature (r‖s‖v).
        signature: [u8; 65],
        /// 20-byte Ethereum address.
        signer: [u8; 20],
    },
    Xrp {
        channel_id: String,
        /// Cumulative amount in drops.
        amount: u64,
        /// 64-byte ed25519 signature.
        signature: [u8; 64],
        /// 33-byte ed25519 public key (including the `ED` leading byte).
        signer: [u8; 33],
    },
    Aptos {
        channel_owner: String,
        /// Cumulative amount in octas.
        amount: u64,
        nonce: u64,
        /// 64-byte ed25519 signature.
        signature: [u8; 64],
        /// 32-byte ed25519 public key.
        signer: [u8; 32],
    },
}

impl SignedClaim {
    pub fn chain(&self) -> Chain {
        match self {
            SignedClaim::Evm { .. } => Chain::Evm,
            SignedClaim::Xrp { .. } => Chain::Xrp,
            SignedClaim::Aptos { .. } => Chain::Aptos,
        }
    }

    /// The monotonic sequence value used for admission ordering: the nonce
    /// for EVM/Aptos, the cumulative amount (as a `u128`) for XRP.
    pub fn sequence(&self) -> Sequence {
        match self {
            SignedClaim::Evm { nonce, .. } => Sequence::Nonce(*nonce),
            SignedClaim::Xrp { amount, .. } => Sequence::Amount(*amount as u128),
            SignedClaim::Aptos { nonce, .. } => Sequence::Nonce(*nonce),
        }
    }

    /// The signer identity as it should be compared against a peer's
    /// registered wallet address.
    pub fn signer_hex(&self) -> String {
        match self {
            SignedClaim::Evm { signer, .. } => hex::encode(signer),
            SignedClaim::Xrp { signer, .. } => hex::encode(signer),
            SignedClaim::Aptos { signer, .. } => hex::encode(signer),
        }
    }
}

/// The monotonic admission key of a claim: a nonce for EVM/Aptos, a
/// cumulative amount for XRP. `Ord` is only meaningful between values of the
/// same variant; comparing across chains is a programmer error the caller
/// must not make (each store row is keyed per-chain already).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sequence {
    Nonce(u64),
    Amount(u128),
}

/// The unsigned fields the receiver must sign to produce a [`SignedClaim`]
/// for the opposite direction of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chain", rename_all = "lowercase")]
pub enum ClaimRequest {
    Evm {
        channel_id: [u8; 32],
        /// The amount the requester believes the peer owes — treated as
        /// "please tell me your current view", not authoritative.
        amount: String,
        nonce: u64,
    },
    Xrp {
        channel_id: String,
        amount: u64,
    },
    Aptos {
        channel_owner: String,
        amount: u64,
        nonce: u64,
    },
}

impl ClaimRequest {
    pub fn chain(&self) -> Chain {
        match self {
            ClaimRequest::Evm { .. } => Chain::Evm,
            ClaimRequest::Xrp { .. } => Chain::Xrp,
            ClaimRequest::Aptos { .. } => Chain::Aptos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_claim_round_trips_through_json() {
        let claim = SignedClaim::Evm {
            channel_id: [1; 32],
            nonce: 6,
            transferred_amount: "1100000".to_string(),
            locked_amount: "0".to_string(),
            locks_root: [0; 32],
            signature: [9; 65],
            signer: [7; 20],
        };
        let json = serde_json::to_string(&claim).unwrap();
        let back: SignedClaim = serde_json::from_str(&json).unwrap();
        assert_eq!(claim, back);
        assert_eq!(claim.sequence(), Sequence::Nonce(6));
    }

    #[test]
    fn xrp_sequence_is_amount_based() {
        let claim = SignedClaim::Xrp {
            channel_id: "AB".repeat(32),
            amount: 6_000_000,
            signature: [0; 64],
            signer: [2; 33],
        };
        assert_eq!(claim.sequence(), Sequence::Amount(6_000_000));
    }
}
