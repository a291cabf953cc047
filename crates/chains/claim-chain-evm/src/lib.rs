//! EVM token-network chain adapter.
//!
//! Signs and verifies balance proofs over the EIP-712 `BalanceProof` typed
//! data, and submits cooperative settlements by calling the token network's
//! `cooperativeSettle(channelId, proof1, sig1, proof2, sig2)` function.

pub mod config;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_network::{Ethereum, EthereumWallet};
use alloy_primitives::{Address, B256, Bytes, Signature};
use alloy_provider::{DynProvider, ProviderBuilder};
use alloy_signer::{Signer, k256::ecdsa::SigningKey};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use dashmap::DashMap;

use claim_codec::{Eip712Domain, evm_signing_digest};
use claim_types::{AdapterError, ChainAdapter, ChannelKey, SettlementReceipt, SignedClaim};

use crate::config::Eip155ChainConfig;

sol! {
    #[sol(rpc)]
    interface ITokenNetwork {
        function cooperativeSettle(
            bytes32 channelId,
            bytes32 proof1,
            bytes proof1Signature,
            bytes32 proof2,
            bytes proof2Signature
        ) external;
    }
}

/// Maximum number of cooperative-settle retries on a nonce-collision error.
const MAX_SETTLE_RETRIES: u32 = 3;
/// Confirmation timeout for a settlement transaction.
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Chain adapter for EVM token-network cooperative-close channels.
pub struct Eip155ChainAdapter {
    chain_id: u64,
    token_network_address: Address,
    domain: Eip712Domain,
    signer: PrivateKeySigner,
    provider: DynProvider<Ethereum>,
    /// Highest nonce ever signed per channel, enforced regardless of caller
    /// order.
    outbound_nonces: DashMap<String, u64>,
    /// Highest nonce ever verified per `(channel, signer)` pair. Authoritative only in-process; the
    /// durable version lives in `claim-store`.
    inbound_seen: DashMap<(String, String), u64>,
    /// Optional durable backing for `outbound_nonces` so the guard survives
    /// restarts.
    nonce_store: Option<claim_store::NonceStore>,
}

impl Eip155ChainAdapter {
    pub fn from_config(config: &Eip155ChainConfig) -> Result<Self, AdapterError> {
        let key_bytes = hex::decode(config.private_key.trim_start_matches("0x"))
            .map_err(|e| AdapterError::Fatal(format!("invalid private key hex: {e}")))?;
        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| AdapterError::Fatal(format!("invalid private key: {e}")))?;
        let signer = PrivateKeySigner::from_signing_key(signing_key)
            .with_chain_id(Some(config.chain_id));
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(config.rpc_url.clone())
            .erased();

        Ok(Self {
            chain_id: config.chain_id,
            token_network_address: config.token_network_address,
            domain: Eip712Domain {
                name: config.domain_name.clone(),
                version: config.domain_version.clone(),
                chain_id: config.chain_id,
                verifying_contract: config.token_network_address,
            },
            signer,
            provider,
            outbound_nonces: DashMap::new(),
            inbound_seen: DashMap::new(),
            nonce_store: None,
        })
    }

    /// Backs the outbound nonce guard with durable storage, hydrating it
    /// with any nonces recorded before this process started.
    pub fn with_nonce_store(mut self, nonce_store: claim_store::NonceStore) -> Self {
        self.nonce_store = Some(nonce_store);
        self
    }

    /// The EVM chain id this adapter is configured for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The wallet address used to sign outbound claims and settlements.
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    fn channel_bytes(channel: &ChannelKey) -> Result<[u8; 32], AdapterError> {
        match channel {
            ChannelKey::Evm { channel_id } => Ok(*channel_id),
            _ => Err(AdapterError::Fatal(
                "EVM adapter received a non-EVM channel key".into(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl ChainAdapter for Eip155ChainAdapter {
    async fn sign(
        &self,
        channel: &ChannelKey,
        amount: u128,
        nonce: Option<u64>,
    ) -> Result<SignedClaim, AdapterError> {
        let channel_id = Self::channel_bytes(channel)?;
        let key = channel.as_store_key();

        let persisted = self
            .nonce_store
            .as_ref()
            .and_then(|store| store.highest(&key));
        let candidate_nonce = nonce.unwrap_or_else(|| {
            let in_memory = self.outbound_nonces.get(&key).map(|n| *n);
            in_memory.max(persisted).map(|n| n + 1).unwrap_or(1)
        });
        {
            let mut entry = self.outbound_nonces.entry(key.clone()).or_insert(0);
            let floor = (*entry).max(persisted.unwrap_or(0));
            if candidate_nonce <= floor {
                return Err(AdapterError::StaleSequence);
            }
            *entry = candidate_nonce;
        }
        if let Some(store) = &self.nonce_store {
            store.record(&key, candidate_nonce);
        }

        let digest = evm_signing_digest(&self.domain, channel_id, candidate_nonce, amount, 0, [0; 32]);
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| AdapterError::Fatal(e.to_string()))?;

        Ok(SignedClaim::Evm {
            channel_id,
            nonce: candidate_nonce,
            transferred_amount: amount.to_string(),
            locked_amount: "0".to_string(),
            locks_root: [0; 32],
            signature: signature.as_bytes(),
            signer: self.signer.address().into_array(),
        })
    }

    async fn verify(
        &self,
        claim: &SignedClaim,
        expected_signer: &str,
    ) -> Result<bool, AdapterError> {
        let SignedClaim::Evm {
            channel_id,
            nonce,
            transferred_amount,
            locked_amount,
            locks_root,
            signature,
            signer,
        } = claim
        else {
            return Err(AdapterError::Fatal(
                "EVM adapter received a non-EVM claim".into(),
            ));
        };

        let expected = Address::from_str(expected_signer)
            .map_err(|e| AdapterError::Fatal(format!("invalid expected signer address: {e}")))?;
        if Address::from(*signer) != expected {
            return Ok(false);
        }

        let transferred: u128 = transferred_amount
            .parse()
            .map_err(|_| AdapterError::Fatal("malformed transferredAmount".into()))?;
        let locked: u128 = locked_amount
            .parse()
            .map_err(|_| AdapterError::Fatal("malformed lockedAmount".into()))?;
        let digest = evm_signing_digest(&self.domain, *channel_id, *nonce, transferred, locked, *locks_root);

        let sig = Signature::from_raw(signature.as_slice())
            .map_err(|_| AdapterError::InvalidSignature)?;
        let recovered = sig
            .recover_address_from_prehash(&digest)
            .map_err(|_| AdapterError::InvalidSignature)?;
        if recovered != expected {
            return Ok(false);
        }

        let channel_key = ChannelKey::Evm {
            channel_id: *channel_id,
        };
        let seen_key = (channel_key.as_store_key(), hex::encode(signer));
        let mut entry = self.inbound_seen.entry(seen_key).or_insert(0);
        if *nonce <= *entry {
            return Err(AdapterError::StaleSequence);
        }
        *entry = *nonce;
        Ok(true)
    }

    async fn cooperative_settle(
        &self,
        channel: &ChannelKey,
        our_claim: &SignedClaim,
        peer_claim: &SignedClaim,
    ) -> Result<SettlementReceipt, AdapterError> {
        let channel_id = Self::channel_bytes(channel)?;
        let (proof1, sig1) = claim_digest_and_signature(our_claim)?;
        let (proof2, sig2) = claim_digest_and_signature(peer_claim)?;

        let contract = ITokenNetwork::new(self.token_network_address, self.provider.clone());
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let call = contract.cooperativeSettle(
                B256::from(channel_id),
                proof1,
                Bytes::copy_from_slice(&sig1),
                proof2,
                Bytes::copy_from_slice(&sig2),
            );
            let pending = match call.send().await {
                Ok(pending) => pending,
                Err(e) if is_nonce_collision(&e.to_string()) && attempt < MAX_SETTLE_RETRIES => {
                    tracing::warn!(attempt, "nonce collision on cooperativeSettle, retrying");
                    continue;
                }
                Err(e) => return Err(AdapterError::Transient(e.to_string())),
            };
            let receipt = pending
                .with_timeout(Some(CONFIRMATION_TIMEOUT))
                .get_receipt()
                .await
                .map_err(|e| AdapterError::Transient(e.to_string()))?;

            let final_amount = transferred_amount_of(our_claim)?;
            return Ok(SettlementReceipt {
                tx_hash: format!("{:#x}", receipt.transaction_hash),
                final_amount,
            });
        }
    }
}

fn is_nonce_collision(message: &str) -> bool {
    message.contains("nonce too low") || message.contains("replacement transaction underpriced")
}

fn transferred_amount_of(claim: &SignedClaim) -> Result<u128, AdapterError> {
    match claim {
        SignedClaim::Evm {
            transferred_amount, ..
        } => transferred_amount
            .parse()
            .map_err(|_| AdapterError::Fatal("malformed transferredAmount".into())),
        _ => Err(AdapterError::Fatal("expected an EVM claim".into())),
    }
}

/// Extracts the `(channelId, signature)` pair the contract needs to
/// reconstruct and check one side's balance proof on-chain.
fn claim_digest_and_signature(claim: &SignedClaim) -> Result<(B256, [u8; 65]), AdapterError> {
    match claim {
        SignedClaim::Evm {
            channel_id,
            signature,
            ..
        } => Ok((B256::from(*channel_id), *signature)),
        _ => Err(AdapterError::Fatal("expected an EVM claim".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> Eip155ChainAdapter {
        let config = Eip155ChainConfig {
            chain_id: 1337,
            rpc_url: "http://127.0.0.1:1".parse().unwrap(),
            private_key: "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318f".into(),
            token_network_address: Address::ZERO,
            domain_name: "TokenNetwork".into(),
            domain_version: "3".into(),
        };
        Eip155ChainAdapter::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let adapter = adapter();
        let channel = ChannelKey::Evm { channel_id: [7; 32] };
        let claim = adapter.sign(&channel, 1_000, None).await.unwrap();

        let signer_hex = format!("{:#x}", adapter.signer_address());
        assert!(adapter.verify(&claim, &signer_hex).await.unwrap());
    }

    #[tokio::test]
    async fn verify_rejects_replayed_nonce() {
        let adapter = adapter();
        let channel = ChannelKey::Evm { channel_id: [9; 32] };
        let claim = adapter.sign(&channel, 500, None).await.unwrap();
        let signer_hex = format!("{:#x}", adapter.signer_address());

        assert!(adapter.verify(&claim, &signer_hex).await.unwrap());
        let replayed = adapter.verify(&claim, &signer_hex).await;
        assert!(matches!(replayed, Err(AdapterError::StaleSequence)));
    }

    #[tokio::test]
    async fn sign_rejects_non_increasing_explicit_nonce() {
        let adapter = adapter();
        let channel = ChannelKey::Evm { channel_id: [3; 32] };
        adapter.sign(&channel, 10, Some(5)).await.unwrap();
        let retry = adapter.sign(&channel, 10, Some(5)).await;
        assert!(matches!(retry, Err(AdapterError::StaleSequence)));
    }

    #[test]
    fn recognizes_nonce_collision_messages() {
        assert!(is_nonce_collision("nonce too low"));
        assert!(is_nonce_collision("replacement transaction underpriced"));
        assert!(!is_nonce_collision("insufficient funds"));
    }
}
