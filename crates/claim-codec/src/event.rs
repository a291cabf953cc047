//! The claim-wrapped wire event.

use serde::{Deserialize, Serialize};

use claim_types::{ClaimRequest, SignedClaim};

use crate::error::CodecError;

/// The discriminator distinguishing a claim-wrapped event from a plain
/// application event on the wire. Any event lacking this exact kind is
/// passed through unchanged.
pub const CLAIM_EVENT_KIND: u16 = 9735;

/// A structured wire message carrying an opaque inner application event
/// alongside the sender's signed claims and unsigned requests.
///
/// `decode(encode(e)) == e` for any `ClaimEvent` this codec produces,
/// regardless of the order `claims`/`requests` were populated in. Unknown fields are ignored rather than rejected,
/// so peers that add fields in the future remain forward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEvent {
    /// Always [`CLAIM_EVENT_KIND`]; present so `is_claim_event` can
    /// distinguish this from a plain application event without attempting a
    /// full deserialize.
    pub kind: u16,
    /// The original application event, serialized as a string exactly as
    /// the Event Handler produced it.
    pub content: String,
    #[serde(default)]
    pub claims: Vec<SignedClaim>,
    #[serde(default)]
    pub requests: Vec<ClaimRequest>,
    /// Forward-compatibility bucket: fields this version of the codec does
    /// not understand are preserved here rather than rejected.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClaimEvent {
    pub fn new(content: String, claims: Vec<SignedClaim>, requests: Vec<ClaimRequest>) -> Self {
        Self {
            kind: CLAIM_EVENT_KIND,
            content,
            claims,
            requests,
            extra: serde_json::Map::new(),
        }
    }
}

/// Serializes a [`ClaimEvent`] to its wire JSON form.
pub fn encode(event: &ClaimEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Parses wire JSON into a [`ClaimEvent`], if and only if it carries the
/// claim-event discriminator. Any other well-formed JSON, or anything that
/// fails to parse at all, yields `Ok(None)` rather than an error, since a
/// plain event is a normal, expected input, not a malformed one; see
/// [`is_claim_event`] for the cheap pre-check used on the hot path.
pub fn decode(raw: &str) -> Result<Option<ClaimEvent>, CodecError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !is_claim_event(&value) {
        return Ok(None);
    }
    let event: ClaimEvent = serde_json::from_value(value)?;
    Ok(Some(event))
}

/// `true` iff `value` carries the claim-event discriminator. This is the
/// only place outside the Claim Manager that inspects the wrapper kind.
pub fn is_claim_event(value: &serde_json::Value) -> bool {
    value
        .get("kind")
        .and_then(serde_json::Value::as_u64)
        .is_some_and(|k| k == CLAIM_EVENT_KIND as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_requests() -> Vec<ClaimRequest> {
        vec![ClaimRequest::Evm {
            channel_id: [9; 32],
            amount: "0".into(),
            nonce: 0,
        }]
    }

    #[test]
    fn round_trips_byte_for_byte_on_decode() {
        let claims = vec![
            SignedClaim::Evm {
                channel_id: [1; 32],
                nonce: 1,
                transferred_amount: "100".into(),
                locked_amount: "0".into(),
                locks_root: [0; 32],
                signature: [2; 65],
                signer: [3; 20],
            },
            SignedClaim::Xrp {
                channel_id: "AB".repeat(32),
                amount: 5_000_000,
                signature: [4; 64],
                signer: [5; 33],
            },
        ];
        let event = ClaimEvent::new("hi".into(), claims, sample_requests());
        let encoded = encode(&event).unwrap();
        let decoded = decode(&encoded).unwrap().unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn plain_event_is_not_a_claim_event() {
        let plain = r#"{"id":"abc","kind":1,"content":"hi"}"#;
        // kind == 1, not CLAIM_EVENT_KIND, so this is a plain event.
        assert!(decode(plain).unwrap().is_none());
    }

    #[test]
    fn unknown_fields_are_ignored_not_rejected() {
        let event = ClaimEvent::new("hi".into(), vec![], vec![]);
        let mut value = serde_json::to_value(&event).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("futureField".into(), serde_json::json!(42));
        let raw = serde_json::to_string(&value).unwrap();
        let decoded = decode(&raw).unwrap().unwrap();
        assert_eq!(decoded.content, "hi");
    }

    #[test]
    fn malformed_payload_is_a_soft_codec_error() {
        let err = decode("not json").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }
}
