//! The three wire packet types.

use serde::{Deserialize, Serialize};

use crate::timestamp::Expiry;

/// The fixed REJECT error-code taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum RejectCode {
    /// Malformed frame, decode failure, schema mismatch.
    F01,
    /// Destination unreachable from this node.
    F02,
    /// Amount below what the destination requires.
    F03,
    /// The local application handler refused the packet.
    F99,
    /// Internal error (database unavailable, uninitialized subsystem).
    T00,
    /// Peer/upstream connection unreachable.
    T01,
}

impl RejectCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectCode::F01 => "F01",
            RejectCode::F02 => "F02",
            RejectCode::F03 => "F03",
            RejectCode::F99 => "F99",
            RejectCode::T00 => "T00",
            RejectCode::T01 => "T01",
        }
    }
}

/// A request to transfer `amount` to `destination`, conditioned on producing
/// a preimage of `execution_condition` before `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prepare {
    /// Decimal string, base units.
    pub amount: String,
    pub destination: String,
    pub execution_condition: [u8; 32],
    pub expires_at: Expiry,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// The successful terminal response to a [`Prepare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fulfill {
    pub fulfillment: [u8; 32],
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// The failure terminal response to a [`Prepare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reject {
    pub code: RejectCode,
    pub message: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Reject {
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Vec::new(),
        }
    }
}

/// One BTP-shaped envelope carrying one ILP-shaped packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    #[serde(rename = "PREPARE")]
    Prepare(Prepare),
    #[serde(rename = "FULFILL")]
    Fulfill(Fulfill),
    #[serde(rename = "REJECT")]
    Reject(Reject),
}

impl Packet {
    pub fn is_prepare(&self) -> bool {
        matches!(self, Packet::Prepare(_))
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_round_trips_through_json() {
        let packet = Packet::Prepare(Prepare {
            amount: "10000".into(),
            destination: "peer-b".into(),
            execution_condition: [7; 32],
            expires_at: Expiry::now_plus_millis(60_000),
            data: vec![1, 2, 3],
        });
        let json = serde_json::to_string(&packet).unwrap();
        let back: Packet = serde_json::from_str(&json).unwrap();
        assert_eq!(packet, back);
    }

    #[test]
    fn reject_carries_fixed_code_taxonomy() {
        let reject = Reject::new(RejectCode::F01, "malformed frame");
        assert_eq!(reject.code.as_str(), "F01");
    }
}
