//! XRP Ledger payment-channel chain adapter.
//!
//! Signs and verifies claims over XRPL's `PaymentChannelClaim` pre-image
//! (`"CLM\0"` ‖ channelId ‖ amount), and submits cooperative settlement as a
//! signed `PaymentChannelClaim` transaction via JSON-RPC.

pub mod config;

use std::time::Duration;

use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::{Value, json};

use claim_codec::xrp_signing_payload;
use claim_types::{AdapterError, ChainAdapter, ChannelKey, SettlementReceipt, SignedClaim};

use crate::config::XrplChainConfig;

/// XRPL public keys carry a one-byte type prefix; `0xED` marks ed25519.
const ED25519_PREFIX: u8 = 0xED;

/// How long to poll for a validated ledger after submitting a settlement
/// transaction.
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);
const VALIDATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Chain adapter for XRPL payment channels.
pub struct XrplChainAdapter {
    account: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    rpc_url: String,
    standalone: bool,
    http: reqwest::Client,
    /// Highest cumulative amount ever signed per channel. XRP has no nonce; amount is the monotonic key.
    outbound_amounts: DashMap<String, u64>,
    /// Highest cumulative amount ever verified per `(channel, signer)` pair.
    inbound_seen: DashMap<(String, String), u64>,
}

impl XrplChainAdapter {
    pub fn from_config(config: &XrplChainConfig) -> Result<Self, AdapterError> {
        let seed_bytes = hex::decode(config.signing_key_hex.trim_start_matches("0x"))
            .map_err(|e| AdapterError::Fatal(format!("invalid XRPL signing key hex: {e}")))?;
        let seed: [u8; 32] = seed_bytes
            .try_into()
            .map_err(|_| AdapterError::Fatal("XRPL ed25519 seed must be 32 bytes".into()))?;
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            account: config.account.clone(),
            signing_key,
            verifying_key,
            rpc_url: config.rpc_url.clone(),
            standalone: config.standalone,
            http: reqwest::Client::new(),
            outbound_amounts: DashMap::new(),
            inbound_seen: DashMap::new(),
        })
    }

    /// The 33-byte (`0xED` ‖ public key) XRPL public key this adapter signs
    /// and settles with.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = ED25519_PREFIX;
        out[1..].copy_from_slice(self.verifying_key.as_bytes());
        out
    }

    fn channel_id_of(channel: &ChannelKey) -> Result<String, AdapterError> {
        match channel {
            ChannelKey::Xrp { channel_id } => Ok(channel_id.clone()),
            _ => Err(AdapterError::Fatal(
                "XRPL adapter received a non-XRP channel key".into(),
            )),
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let body = json!({ "method": method, "params": [params] });
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?;
        if response.status().as_u16() == 429 {
            return Err(AdapterError::RateLimited);
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if let Some(error) = value
            .get("result")
            .and_then(|r| r.get("error"))
            .and_then(|e| e.as_str())
        {
            return Err(AdapterError::Transient(format!("rippled error: {error}")));
        }
        Ok(value)
    }
}

#[async_trait::async_trait]
impl ChainAdapter for XrplChainAdapter {
    async fn sign(
        &self,
        channel: &ChannelKey,
        amount: u128,
        _nonce: Option<u64>,
    ) -> Result<SignedClaim, AdapterError> {
        let channel_id = Self::channel_id_of(channel)?;
        let amount_drops: u64 = amount
            .try_into()
            .map_err(|_| AdapterError::Fatal("XRP amount exceeds u64 drops range".into()))?;

        {
            let mut entry = self.outbound_amounts.entry(channel_id.clone()).or_insert(0);
            if amount_drops <= *entry {
                return Err(AdapterError::StaleSequence);
            }
            *entry = amount_drops;
        }

        let payload = xrp_signing_payload(&channel_id, amount_drops)
            .map_err(|e| AdapterError::Fatal(e.to_string()))?;
        let signature = self.signing_key.sign(&payload);

        Ok(SignedClaim::Xrp {
            channel_id,
            amount: amount_drops,
            signature: signature.to_bytes(),
            signer: self.public_key_bytes(),
        })
    }

    async fn verify(
        &self,
        claim: &SignedClaim,
        expected_signer: &str,
    ) -> Result<bool, AdapterError> {
        let SignedClaim::Xrp {
            channel_id,
            amount,
            signature,
            signer,
        } = claim
        else {
            return Err(AdapterError::Fatal(
                "XRPL adapter received a non-XRP claim".into(),
            ));
        };

        let expected = hex::decode(expected_signer.trim_start_matches("0x"))
            .map_err(|e| AdapterError::Fatal(format!("invalid expected signer hex: {e}")))?;
        if signer.as_slice() != expected.as_slice() {
            return Ok(false);
        }
        if signer[0] != ED25519_PREFIX {
            return Err(AdapterError::Fatal(
                "only ed25519 (0xED) XRPL public keys are supported".into(),
            ));
        }
        let verifying_key_bytes: [u8; 32] = signer[1..]
            .try_into()
            .map_err(|_| AdapterError::Fatal("malformed XRPL public key".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&verifying_key_bytes)
            .map_err(|_| AdapterError::InvalidSignature)?;

        let payload = xrp_signing_payload(channel_id, *amount)
            .map_err(|e| AdapterError::Fatal(e.to_string()))?;
        let sig = Signature::from_bytes(signature);
        if verifying_key.verify(&payload, &sig).is_err() {
            return Err(AdapterError::InvalidSignature);
        }

        let seen_key = (channel_id.clone(), hex::encode(signer));
        let mut entry = self.inbound_seen.entry(seen_key).or_insert(0);
        if *amount <= *entry {
            return Err(AdapterError::StaleSequence);
        }
        *entry = *amount;
        Ok(true)
    }

    async fn cooperative_settle(
        &self,
        channel: &ChannelKey,
        our_claim: &SignedClaim,
        _peer_claim: &SignedClaim,
    ) -> Result<SettlementReceipt, AdapterError> {
        let channel_id = Self::channel_id_of(channel)?;
        let SignedClaim::Xrp {
            amount,
            signature,
            signer,
            ..
        } = our_claim
        else {
            return Err(AdapterError::Fatal("expected an XRP claim".into()));
        };

        let tx_json = json!({
            "TransactionType": "PaymentChannelClaim",
            "Account": self.account,
            "Channel": channel_id,
            "Balance": amount.to_string(),
            "Amount": amount.to_string(),
            "Signature": hex::encode_upper(signature),
            "PublicKey": hex::encode_upper(signer),
        });

        let submit_result = self
            .rpc_call(
                "submit",
                json!({
                    "tx_json": tx_json,
                    "secret": hex::encode(self.signing_key.to_bytes()),
                }),
            )
            .await?;

        let tx_hash = submit_result
            .get("result")
            .and_then(|r| r.get("tx_json"))
            .and_then(|t| t.get("hash"))
            .and_then(|h| h.as_str())
            .ok_or_else(|| AdapterError::Transient("submit response missing tx hash".into()))?
            .to_string();

        if self.standalone {
            self.rpc_call("ledger_accept", json!({})).await?;
        } else {
            self.wait_for_validation(&tx_hash).await?;
        }

        Ok(SettlementReceipt {
            tx_hash,
            final_amount: *amount as u128,
        })
    }
}

impl XrplChainAdapter {
    async fn wait_for_validation(&self, tx_hash: &str) -> Result<(), AdapterError> {
        let deadline = tokio::time::Instant::now() + VALIDATION_TIMEOUT;
        loop {
            let response = self
                .rpc_call("tx", json!({ "transaction": tx_hash }))
                .await?;
            let validated = response
                .get("result")
                .and_then(|r| r.get("validated"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if validated {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AdapterError::Timeout);
            }
            tokio::time::sleep(VALIDATION_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> XrplChainAdapter {
        let config = XrplChainConfig {
            rpc_url: "http://127.0.0.1:1".into(),
            signing_key_hex: "11".repeat(32),
            account: "rPeerAccount".into(),
            standalone: true,
        };
        XrplChainAdapter::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let adapter = adapter();
        let channel = ChannelKey::Xrp {
            channel_id: "AB".repeat(32),
        };
        let claim = adapter.sign(&channel, 5_000_000, None).await.unwrap();
        let signer_hex = hex::encode(adapter.public_key_bytes());
        assert!(adapter.verify(&claim, &signer_hex).await.unwrap());
    }

    #[tokio::test]
    async fn verify_rejects_non_increasing_amount() {
        let adapter = adapter();
        let channel = ChannelKey::Xrp {
            channel_id: "CD".repeat(32),
        };
        let claim = adapter.sign(&channel, 5_000_000, None).await.unwrap();
        let signer_hex = hex::encode(adapter.public_key_bytes());
        assert!(adapter.verify(&claim, &signer_hex).await.unwrap());
        let replay = adapter.verify(&claim, &signer_hex).await;
        assert!(matches!(replay, Err(AdapterError::StaleSequence)));
    }

    #[tokio::test]
    async fn sign_rejects_non_increasing_outbound_amount() {
        let adapter = adapter();
        let channel = ChannelKey::Xrp {
            channel_id: "EF".repeat(32),
        };
        adapter.sign(&channel, 1_000_000, None).await.unwrap();
        let retry = adapter.sign(&channel, 1_000_000, None).await;
        assert!(matches!(retry, Err(AdapterError::StaleSequence)));
    }

    #[tokio::test]
    async fn verify_rejects_tampered_signature() {
        let adapter = adapter();
        let channel = ChannelKey::Xrp {
            channel_id: "10".repeat(32),
        };
        let mut claim = adapter.sign(&channel, 2_000_000, None).await.unwrap();
        if let SignedClaim::Xrp { signature, .. } = &mut claim {
            signature[0] ^= 0xFF;
        }
        let signer_hex = hex::encode(adapter.public_key_bytes());
        let result = adapter.verify(&claim, &signer_hex).await;
        assert!(matches!(result, Err(AdapterError::InvalidSignature)));
    }
}
