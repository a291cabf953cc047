//! Codec error taxonomy. These bubble as soft errors: the caller treats a
//! codec failure as "not a claim event" and continues processing the
//! payload unwrapped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown chain discriminator: {0}")]
    UnknownChain(String),
    #[error("malformed signing payload: {0}")]
    MalformedSigningPayload(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
