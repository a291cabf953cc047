//! Aptos Move channel chain adapter.
//!
//! Signs and verifies claims over the BCS-style domain-prefixed claim
//! message, and submits cooperative settlement by calling the channel
//! module's `submit_claim` entry function.

use std::str::FromStr;
use std::time::Duration;

use aptos_crypto::ed25519::{Ed25519PrivateKey, Ed25519PublicKey, Ed25519Signature};
use aptos_crypto::{PrivateKey, SigningKey, ValidCryptoMaterial};
use aptos_rest_client::Client as AptosClient;
use aptos_rest_client::error::RestError;
use aptos_types::chain_id::ChainId;
use aptos_types::transaction::{
    EntryFunction, RawTransaction, SignedTransaction, TransactionPayload,
};
use dashmap::DashMap;
use move_core_types::account_address::AccountAddress;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::{ModuleId, TypeTag};

use claim_codec::aptos_signing_payload;
use claim_types::{AdapterError, ChainAdapter, ChannelKey, SettlementReceipt, SignedClaim};

use crate::config::AptosChainConfig;

/// Entry function name on the configured module.
const SUBMIT_CLAIM_FUNCTION: &str = "submit_claim";
const MODULE_NAME: &str = "channel";
/// Backoff schedule for transient settlement errors.
const BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];
const DEFAULT_MAX_GAS_AMOUNT: u64 = 10_000;
const DEFAULT_GAS_UNIT_PRICE: u64 = 100;
const TRANSACTION_EXPIRATION: Duration = Duration::from_secs(60);

/// Chain adapter for Aptos Move payment channels.
pub struct AptosChainAdapter {
    account: AccountAddress,
    private_key: Ed25519PrivateKey,
    public_key: Ed25519PublicKey,
    module_address: AccountAddress,
    coin_type: TypeTag,
    client: AptosClient,
    fallback_client: Option<AptosClient>,
    /// Highest nonce ever signed per channel.
    outbound_nonces: DashMap<String, u64>,
    /// Highest nonce ever verified per `(channel, signer)` pair.
    inbound_seen: DashMap<(String, String), u64>,
    /// Optional durable backing for `outbound_nonces` so the guard survives
    /// restarts.
    nonce_store: Option<claim_store::NonceStore>,
}

impl AptosChainAdapter {
    pub fn from_config(config: &AptosChainConfig) -> Result<Self, AdapterError> {
        let key_bytes = hex::decode(config.private_key_hex.trim_start_matches("0x"))
            .map_err(|e| AdapterError::Fatal(format!("invalid Aptos private key hex: {e}")))?;
        let private_key = Ed25519PrivateKey::try_from(key_bytes.as_slice())
            .map_err(|e| AdapterError::Fatal(format!("invalid Aptos private key: {e}")))?;
        let public_key = private_key.public_key();
        let account = AccountAddress::from_bytes(
            aptos_types::transaction::authenticator::AuthenticationKey::ed25519(&public_key)
                .account_address()
                .into_bytes(),
        )
        .map_err(|e| AdapterError::Fatal(format!("failed to derive account address: {e}")))?;

        let module_address = AccountAddress::from_hex_literal(&config.module_address)
            .map_err(|e| AdapterError::Fatal(format!("invalid module address: {e}")))?;
        let coin_type = TypeTag::from_str(&config.coin_type)
            .map_err(|e| AdapterError::Fatal(format!("invalid coin type: {e}")))?;

        let rpc_url = config
            .rpc_url
            .parse()
            .map_err(|e| AdapterError::Fatal(format!("invalid Aptos RPC URL: {e}")))?;
        let client = AptosClient::new(rpc_url);
        let fallback_client = match &config.fallback_rpc_url {
            Some(url) => Some(AptosClient::new(
                url.parse()
                    .map_err(|e| AdapterError::Fatal(format!("invalid fallback RPC URL: {e}")))?,
            )),
            None => None,
        };

        Ok(Self {
            account,
            private_key,
            public_key,
            module_address,
            coin_type,
            client,
            fallback_client,
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

    pub fn account_address(&self) -> AccountAddress {
        self.account
    }

    fn channel_owner_of(channel: &ChannelKey) -> Result<String, AdapterError> {
        match channel {
            ChannelKey::Aptos { channel_owner } => Ok(channel_owner.clone()),
            _ => Err(AdapterError::Fatal(
                "Aptos adapter received a non-Aptos channel key".into(),
            )),
        }
    }

    async fn submit_with_fallback(
        &self,
        signed_txn: &SignedTransaction,
    ) -> Result<aptos_rest_client::Response<aptos_rest_client::types::Transaction>, AdapterError>
    {
        let mut last_err = None;
        for attempt in 0..BACKOFF_SCHEDULE.len() + 1 {
            let client = if attempt == 0 {
                &self.client
            } else {
                self.fallback_client.as_ref().unwrap_or(&self.client)
            };
            match client.submit_and_wait(signed_txn).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < BACKOFF_SCHEDULE.len() && is_transient(&e) => {
                    tracing::warn!(attempt, error = %e, "transient Aptos submit error, retrying");
                    tokio::time::sleep(BACKOFF_SCHEDULE[attempt]).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(map_rest_error(e)),
            }
        }
        Err(map_rest_error(last_err.expect("at least one attempt runs")))
    }
}

#[async_trait::async_trait]
impl ChainAdapter for AptosChainAdapter {
    async fn sign(
        &self,
        channel: &ChannelKey,
        amount: u128,
        nonce: Option<u64>,
    ) -> Result<SignedClaim, AdapterError> {
        let channel_owner = Self::channel_owner_of(channel)?;
        let amount_octas: u64 = amount
            .try_into()
            .map_err(|_| AdapterError::Fatal("Aptos amount exceeds u64 octas range".into()))?;

        let persisted = self
            .nonce_store
            .as_ref()
            .and_then(|store| store.highest(&channel_owner));
        let candidate_nonce = nonce.unwrap_or_else(|| {
            let in_memory = self.outbound_nonces.get(&channel_owner).map(|n| *n);
            in_memory.max(persisted).map(|n| n + 1).unwrap_or(1)
        });
        {
            let mut entry = self
                .outbound_nonces
                .entry(channel_owner.clone())
                .or_insert(0);
            let floor = (*entry).max(persisted.unwrap_or(0));
            if candidate_nonce <= floor {
                return Err(AdapterError::StaleSequence);
            }
            *entry = candidate_nonce;
        }
        if let Some(store) = &self.nonce_store {
            store.record(&channel_owner, candidate_nonce);
        }

        let payload = aptos_signing_payload(&channel_owner, amount_octas, candidate_nonce)
            .map_err(|e| AdapterError::Fatal(e.to_string()))?;
        let signature = self.private_key.sign_arbitrary_message(&payload);

        Ok(SignedClaim::Aptos {
            channel_owner,
            amount: amount_octas,
            nonce: candidate_nonce,
            signature: signature.to_bytes(),
            signer: self.public_key.to_bytes(),
        })
    }

    async fn verify(
        &self,
        claim: &SignedClaim,
        expected_signer: &str,
    ) -> Result<bool, AdapterError> {
        let SignedClaim::Aptos {
            channel_owner,
            amount,
            nonce,
            signature,
            signer,
        } = claim
        else {
            return Err(AdapterError::Fatal(
                "Aptos adapter received a non-Aptos claim".into(),
            ));
        };

        let expected = hex::decode(expected_signer.trim_start_matches("0x"))
            .map_err(|e| AdapterError::Fatal(format!("invalid expected signer hex: {e}")))?;
        if signer.as_slice() != expected.as_slice() {
            return Ok(false);
        }

        let public_key = Ed25519PublicKey::try_from(signer.as_slice())
            .map_err(|_| AdapterError::InvalidSignature)?;
        let signature = Ed25519Signature::try_from(signature.as_slice())
            .map_err(|_| AdapterError::InvalidSignature)?;
        let payload = aptos_signing_payload(channel_owner, *amount, *nonce)
            .map_err(|e| AdapterError::Fatal(e.to_string()))?;
        if signature.verify_arbitrary_msg(&payload, &public_key).is_err() {
            return Err(AdapterError::InvalidSignature);
        }

        let seen_key = (channel_owner.clone(), hex::encode(signer));
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
        let channel_owner = Self::channel_owner_of(channel)?;
        let (amount, nonce, signature, signer) = match peer_claim {
            SignedClaim::Aptos {
                amount,
                nonce,
                signature,
                signer,
                ..
            } => (*amount, *nonce, *signature, *signer),
            _ => return Err(AdapterError::Fatal("expected an Aptos claim".into())),
        };

        let account_info = self
            .client
            .get_account(self.account)
            .await
            .map_err(map_rest_error)?
            .into_inner();

        let entry_function = EntryFunction::new(
            ModuleId::new(
                self.module_address,
                Identifier::new(MODULE_NAME)
                    .map_err(|e| AdapterError::Fatal(format!("bad module name: {e}")))?,
            ),
            Identifier::new(SUBMIT_CLAIM_FUNCTION)
                .map_err(|e| AdapterError::Fatal(format!("bad function name: {e}")))?,
            vec![self.coin_type.clone()],
            vec![
                bcs::to_bytes(&channel_owner).map_err(|e| AdapterError::Fatal(e.to_string()))?,
                bcs::to_bytes(&amount).map_err(|e| AdapterError::Fatal(e.to_string()))?,
                bcs::to_bytes(&nonce).map_err(|e| AdapterError::Fatal(e.to_string()))?,
                bcs::to_bytes(&signature.to_vec()).map_err(|e| AdapterError::Fatal(e.to_string()))?,
                bcs::to_bytes(&signer.to_vec()).map_err(|e| AdapterError::Fatal(e.to_string()))?,
            ],
        );

        let ledger_info = self.client.get_index().await.map_err(map_rest_error)?.into_inner();
        let expiration = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is after the epoch")
            + TRANSACTION_EXPIRATION;

        let raw_txn = RawTransaction::new(
            self.account,
            account_info.sequence_number,
            TransactionPayload::EntryFunction(entry_function),
            DEFAULT_MAX_GAS_AMOUNT,
            DEFAULT_GAS_UNIT_PRICE,
            expiration.as_secs(),
            ChainId::new(ledger_info.chain_id),
        );
        let signed_txn = raw_txn
            .sign(&self.private_key, self.public_key.clone())
            .map_err(|e| AdapterError::Fatal(format!("failed to sign transaction: {e}")))?
            .into_inner();

        let response = self.submit_with_fallback(&signed_txn).await?;
        let transaction = response.into_inner();

        Ok(SettlementReceipt {
            tx_hash: transaction.transaction_info().map(|i| i.hash.to_string()).unwrap_or_default(),
            final_amount: amount as u128,
        })
    }
}

/// Classifies a REST error as transient (worth retrying with backoff) by
/// inspecting the HTTP status it carries or, for connection-level failures,
/// treating them as transient outright.
fn is_transient(error: &RestError) -> bool {
    let message = error.to_string();
    message.contains("429")
        || message.contains("timed out")
        || message.contains("connection")
        || ["500", "502", "503", "504"]
            .iter()
            .any(|code| message.contains(code))
}

fn map_rest_error(error: RestError) -> AdapterError {
    if is_transient(&error) {
        AdapterError::Transient(error.to_string())
    } else {
        AdapterError::Fatal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> AptosChainAdapter {
        let config = AptosChainConfig {
            rpc_url: "http://127.0.0.1:1".into(),
            fallback_rpc_url: None,
            private_key_hex: "22".repeat(32),
            module_address: "0x1".into(),
            coin_type: "0x1::aptos_coin::AptosCoin".into(),
        };
        AptosChainAdapter::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let adapter = adapter();
        let channel = ChannelKey::Aptos {
            channel_owner: "11".repeat(32),
        };
        let claim = adapter.sign(&channel, 10_000, None).await.unwrap();
        let signer_hex = hex::encode(adapter.public_key.to_bytes());
        assert!(adapter.verify(&claim, &signer_hex).await.unwrap());
    }

    #[tokio::test]
    async fn verify_rejects_replayed_nonce() {
        let adapter = adapter();
        let channel = ChannelKey::Aptos {
            channel_owner: "33".repeat(32),
        };
        let claim = adapter.sign(&channel, 500, None).await.unwrap();
        let signer_hex = hex::encode(adapter.public_key.to_bytes());
        assert!(adapter.verify(&claim, &signer_hex).await.unwrap());
        let replay = adapter.verify(&claim, &signer_hex).await;
        assert!(matches!(replay, Err(AdapterError::StaleSequence)));
    }
}
