//! Orchestration layer: Channel Registry, Claim Manager, Settlement Trigger.

pub mod channel_registry;
pub mod claim_manager;
pub mod settlement_trigger;

pub use channel_registry::{ChannelNotFound, ChannelRegistry};
pub use claim_manager::{ClaimManager, ClaimProcessError, ProcessResult};
pub use settlement_trigger::{SettlementStatus, SettlementTrigger};
