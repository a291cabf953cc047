//! Shared error taxonomy for chain adapters and settlement.

use thiserror::Error;

/// Error taxonomy common to all three chain adapters.
///
/// `Transient` errors are retried by `cooperative_settle`; `Fatal` errors
/// abort immediately. Adapters map their chain-client-specific failures onto
/// this taxonomy at the boundary so the Settlement Trigger and Claim Manager
/// never need chain-specific match arms.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connection to chain client failed: {0}")]
    ConnectionFailed(String),
    #[error("chain client call timed out")]
    Timeout,
    #[error("rate limited by chain client")]
    RateLimited,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("claim sequence is not strictly greater than the last seen value")]
    StaleSequence,
    #[error("insufficient balance for requested amount")]
    InsufficientBalance,
    #[error("transient chain error: {0}")]
    Transient(String),
    #[error("fatal chain error: {0}")]
    Fatal(String),
}

impl AdapterError {
    /// Whether this error class is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Transient(_)
                | AdapterError::RateLimited
                | AdapterError::Timeout
                | AdapterError::ConnectionFailed(_)
        )
    }
}
