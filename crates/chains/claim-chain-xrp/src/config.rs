//! Configuration for the XRP Ledger payment-channel chain adapter.

use serde::{Deserialize, Serialize};

/// Configuration for one XRPL node's payment-channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrplChainConfig {
    /// JSON-RPC endpoint (`/` method dispatch, not websocket).
    pub rpc_url: String,
    /// Hex-encoded ed25519 seed (without the leading `ED` type prefix) used
    /// to sign outbound claims and `PaymentChannelClaim` transactions.
    pub signing_key_hex: String,
    /// The channel owner's classic account address, used as the `Account`
    /// field of submitted transactions.
    pub account: String,
    /// When `true`, the adapter advances the ledger manually after submit
    /// (standalone `rippled` test nodes) instead of waiting for the next
    /// validated ledger.
    pub standalone: bool,
}
