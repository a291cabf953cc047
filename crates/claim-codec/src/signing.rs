//! Canonical, bit-stable signing payloads for each chain.

use alloy_primitives::{Address, B256, U256, keccak256};
use alloy_sol_types::{SolStruct, eip712_domain};

use crate::error::CodecError;

alloy_sol_types::sol! {
    /// The EIP-712 typed-data struct signed over for an EVM balance proof.
    #[derive(Debug)]
    struct BalanceProof {
        bytes32 channelId;
        uint256 nonce;
        uint256 transferredAmount;
        uint256 lockedAmount;
        bytes32 locksRoot;
    }
}

/// The EIP-712 domain of the token-network contract a balance proof is
/// signed against.
#[derive(Debug, Clone)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

/// Computes the EIP-712 typed-data digest for an EVM balance proof.
///
/// This is the exact payload `sign`/`verify` operate over for the EVM chain
/// adapter; signature is a 65-byte secp256k1 signature (r‖s‖v) recovering to
/// `signer`.
pub fn evm_signing_digest(
    domain: &Eip712Domain,
    channel_id: [u8; 32],
    nonce: u64,
    transferred_amount: u128,
    locked_amount: u128,
    locks_root: [u8; 32],
) -> B256 {
    let sol_domain = eip712_domain! {
        name: domain.name.clone(),
        version: domain.version.clone(),
        chain_id: domain.chain_id,
        verifying_contract: domain.verifying_contract,
    };
    let proof = BalanceProof {
        channelId: B256::from(channel_id),
        nonce: U256::from(nonce),
        transferredAmount: U256::from(transferred_amount),
        lockedAmount: U256::from(locked_amount),
        locksRoot: B256::from(locks_root),
    };
    proof.eip712_signing_hash(&sol_domain)
}

/// XRPL's `PaymentChannelClaim` pre-image: `"CLM\0"` ‖ channelId (32 bytes)
/// ‖ amount (u64 big-endian). Signed with the channel owner's ed25519 key.
pub fn xrp_signing_payload(channel_id_hex: &str, amount: u64) -> Result<Vec<u8>, CodecError> {
    let channel_id = hex::decode(channel_id_hex.trim_start_matches("0x"))
        .map_err(|e| CodecError::MalformedSigningPayload(e.to_string()))?;
    if channel_id.len() != 32 {
        return Err(CodecError::MalformedSigningPayload(format!(
            "XRP channel id must be 32 bytes, got {}",
            channel_id.len()
        )));
    }
    let mut payload = Vec::with_capacity(4 + 32 + 8);
    payload.extend_from_slice(b"CLM\0");
    payload.extend_from_slice(&channel_id);
    payload.extend_from_slice(&amount.to_be_bytes());
    Ok(payload)
}

/// BCS-style Aptos claim message: `"CLAIM_APTOS"` (11 bytes) ‖ channel owner
/// address (32 bytes) ‖ amount (u64 little-endian) ‖ nonce (u64 little-endian).
pub fn aptos_signing_payload(
    channel_owner: &str,
    amount: u64,
    nonce: u64,
) -> Result<Vec<u8>, CodecError> {
    let owner = hex::decode(channel_owner.trim_start_matches("0x"))
        .map_err(|e| CodecError::MalformedSigningPayload(e.to_string()))?;
    if owner.len() != 32 {
        return Err(CodecError::MalformedSigningPayload(format!(
            "Aptos channel owner address must be 32 bytes, got {}",
            owner.len()
        )));
    }
    let mut payload = Vec::with_capacity(11 + 32 + 8 + 8);
    payload.extend_from_slice(b"CLAIM_APTOS");
    payload.extend_from_slice(&owner);
    payload.extend_from_slice(&amount.to_le_bytes());
    payload.extend_from_slice(&nonce.to_le_bytes());
    Ok(payload)
}

/// Keccak-256 hash helper used where an adapter needs to pre-hash a payload
/// before a non-EIP-712 secp256k1 recovery step.
pub fn keccak(payload: &[u8]) -> B256 {
    keccak256(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_digest_is_deterministic() {
        let domain = Eip712Domain {
            name: "TokenNetwork".into(),
            version: "1".into(),
            chain_id: 1,
            verifying_contract: Address::repeat_byte(0x11),
        };
        let a = evm_signing_digest(&domain, [1; 32], 5, 1_000_000, 0, [0; 32]);
        let b = evm_signing_digest(&domain, [1; 32], 5, 1_000_000, 0, [0; 32]);
        assert_eq!(a, b);
        let c = evm_signing_digest(&domain, [1; 32], 6, 1_000_000, 0, [0; 32]);
        assert_ne!(a, c);
    }

    #[test]
    fn xrp_payload_has_clm_prefix() {
        let payload = xrp_signing_payload(&"AB".repeat(32), 5_000_000).unwrap();
        assert_eq!(&payload[0..4], b"CLM\0");
        assert_eq!(payload.len(), 4 + 32 + 8);
    }

    #[test]
    fn aptos_payload_has_domain_prefix() {
        let owner = "11".repeat(32);
        let payload = aptos_signing_payload(&owner, 42, 1).unwrap();
        assert_eq!(&payload[0..11], b"CLAIM_APTOS");
        assert_eq!(payload.len(), 11 + 32 + 8 + 8);
    }
}
