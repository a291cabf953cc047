//! Packet framing, connection lifecycle, and prepare/fulfill correlation for
//! the claim-exchange wire protocol.

pub mod bridge;
pub mod codec;
pub mod connection;
pub mod correlation;
pub mod event_handler;
pub mod packet;
pub mod timestamp;

pub use bridge::{SideChannelGateway, UpstreamClient, WireBridge, WireError};
pub use connection::serve;
pub use correlation::{CorrelationTable, PendingPrepare};
pub use event_handler::{EventHandler, LoggingEventHandler};
pub use packet::{Fulfill, Packet, Prepare, Reject, RejectCode};
pub use timestamp::Expiry;
