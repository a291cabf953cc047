//! Canonical per-chain signing payloads and the claim-wrapped wire event
//! codec.
//!
//! - [`signing`] — EIP-712 (EVM), XRPL claim pre-image (XRP), and BCS-style
//!   domain-separated (Aptos) signing payload construction.
//! - [`event`] — [`ClaimEvent`](event::ClaimEvent) wrap/unwrap and
//!   [`is_claim_event`](event::is_claim_event).
//! - [`error`] — [`CodecError`](error::CodecError), always a soft failure.

pub mod error;
pub mod event;
pub mod signing;

pub use error::CodecError;
pub use event::{CLAIM_EVENT_KIND, ClaimEvent, decode, encode, is_claim_event};
pub use signing::{Eip712Domain, aptos_signing_payload, evm_signing_digest, xrp_signing_payload};
