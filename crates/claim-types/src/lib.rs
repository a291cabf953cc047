//! Shared data model for the payment-channel claim exchange subsystem.
//!
//! This crate has no chain-client dependencies; it defines only the wire
//! and storage types every other crate in the workspace agrees on:
//!
//! - [`chain`] — the [`Chain`](chain::Chain) discriminator and chain-specific
//!   [`ChannelKey`](chain::ChannelKey).
//! - [`claim`] — [`SignedClaim`](claim::SignedClaim) and
//!   [`ClaimRequest`](claim::ClaimRequest).
//! - [`channel`] — [`ChannelState`](channel::ChannelState), the Channel
//!   Registry's row type.
//! - [`adapter`] — the [`ChainAdapter`](adapter::ChainAdapter) trait every
//!   chain-specific crate implements.
//! - [`error`] — the [`AdapterError`](error::AdapterError) taxonomy.

pub mod adapter;
pub mod chain;
pub mod channel;
pub mod claim;
pub mod error;

pub use adapter::{ChainAdapter, SettlementReceipt};
pub use chain::{Chain, ChannelKey, UnknownChainError};
pub use channel::{ChannelState, EvmChannelStatus, OpenCloseStatus};
pub use claim::{ClaimRequest, Sequence, SignedClaim};
pub use error::AdapterError;
