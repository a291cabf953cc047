//! Configuration for the EVM token-network chain adapter.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for one EVM chain's token-network deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eip155ChainConfig {
    /// The EVM chain id (distinct from our [`Chain`](claim_types::Chain)
    /// discriminator, which is fixed to `Evm`).
    pub chain_id: u64,
    /// JSON-RPC endpoint used both for reads and for submitting settlement
    /// transactions.
    pub rpc_url: Url,
    /// Hex-encoded secp256k1 private key used to sign outbound claims and
    /// settlement transactions.
    pub private_key: String,
    /// Address of the token-network contract that exposes
    /// `cooperativeSettle`.
    pub token_network_address: Address,
    /// EIP-712 domain name of the token-network contract.
    pub domain_name: String,
    /// EIP-712 domain version of the token-network contract.
    pub domain_version: String,
}
