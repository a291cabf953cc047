//! The seam to the out-of-scope application layer.

/// Delivers inbound inner events to, and requests outbound ones from, the
/// application layer this bridge is embedded in.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Delivers the inner event's content to the application layer,
    /// unmodified whether or not it arrived wrapped in a claim event.
    async fn handle_inbound(&self, peer_id: &str, content: &str);

    /// Called when a locally-terminating prepare cannot be decoded into an
    /// application event the handler understands but framing otherwise
    /// succeeded; returning `false` causes a REJECT F99.
    async fn accepts(&self, content: &str) -> bool {
        let _ = content;
        true
    }
}

/// A minimal pass-through implementation so the workspace is runnable end to
/// end without the real event database wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_inbound(&self, peer_id: &str, content: &str) {
        tracing::info!(peer_id, content, "delivered inner event to application layer");
    }
}
