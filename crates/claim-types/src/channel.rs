//! In-memory channel state mirrored from on-chain channel contracts.

use serde::{Deserialize, Serialize};

use crate::chain::{Chain, ChannelKey};

/// Lifecycle status of an EVM token-network channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmChannelStatus {
    Opened,
    Closed,
    Settled,
}

/// Lifecycle status of an XRP or Aptos channel (both share the same shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenCloseStatus {
    Open,
    Closing,
    Closed,
}

/// Per-chain channel state cached by the Channel Registry.
///
/// Amounts are kept as decimal strings for EVM (to preserve `u256`
/// precision) and as native integers for XRP/Aptos (drops/octas fit in
/// `u64`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chain", rename_all = "lowercase")]
pub enum ChannelState {
    Evm {
        channel_id: [u8; 32],
        peer_address: [u8; 20],
        deposit: String,
        status: EvmChannelStatus,
        nonce: u64,
        transferred_amount: String,
    },
    Xrp {
        channel_id: String,
        destination: String,
        /// Deposit in drops.
        amount: u64,
        /// Claimed (settled) drops.
        balance: u64,
        status: OpenCloseStatus,
        settle_delay: u32,
        public_key: [u8; 33],
    },
    Aptos {
        channel_owner: String,
        destination: String,
        destination_pubkey: [u8; 32],
        deposited: u64,
        claimed: u64,
        status: OpenCloseStatus,
        settle_delay: u32,
        nonce: u64,
    },
}

impl ChannelState {
    pub fn chain(&self) -> Chain {
        match self {
            ChannelState::Evm { .. } => Chain::Evm,
            ChannelState::Xrp { .. } => Chain::Xrp,
            ChannelState::Aptos { .. } => Chain::Aptos,
        }
    }

    pub fn channel_key(&self) -> ChannelKey {
        match self {
            ChannelState::Evm { channel_id, .. } => ChannelKey::Evm {
                channel_id: *channel_id,
            },
            ChannelState::Xrp { channel_id, .. } => ChannelKey::Xrp {
                channel_id: channel_id.clone(),
            },
            ChannelState::Aptos { channel_owner, .. } => ChannelKey::Aptos {
                channel_owner: channel_owner.clone(),
            },
        }
    }

    /// The cumulative amount already transferred/claimed on this channel, as
    /// a `u128` where representable. EVM deposits/transfers are `u256` in
    /// principle but in this subsystem (claim piggybacking on social events)
    /// realistic balances fit comfortably in `u128`; larger values are a
    /// configuration error the adapter layer rejects before it reaches here.
    pub fn transferred(&self) -> Result<u128, std::num::ParseIntError> {
        match self {
            ChannelState::Evm {
                transferred_amount, ..
            } => transferred_amount.parse(),
            ChannelState::Xrp { balance, .. } => Ok(*balance as u128),
            ChannelState::Aptos { claimed, .. } => Ok(*claimed as u128),
        }
    }

    pub fn deposit(&self) -> Result<u128, std::num::ParseIntError> {
        match self {
            ChannelState::Evm { deposit, .. } => deposit.parse(),
            ChannelState::Xrp { amount, .. } => Ok(*amount as u128),
            ChannelState::Aptos { deposited, .. } => Ok(*deposited as u128),
        }
    }
}
