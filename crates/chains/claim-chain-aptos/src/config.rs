//! Configuration for the Aptos Move channel chain adapter.

use serde::{Deserialize, Serialize};

/// Configuration for one Aptos fullnode's channel-contract adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AptosChainConfig {
    /// Primary REST fullnode URL.
    pub rpc_url: String,
    /// Fallback REST fullnode URL used when the primary is unreachable.
    #[serde(default)]
    pub fallback_rpc_url: Option<String>,
    /// Hex-encoded ed25519 private key for the channel owner's account.
    pub private_key_hex: String,
    /// Address of the module exposing `submit_claim`.
    pub module_address: String,
    /// Move generic coin type parameter for `submit_claim`, e.g.
    /// `0x1::aptos_coin::AptosCoin`: fixed
    /// per adapter instance, not per peer).
    pub coin_type: String,
}
