//! Binary envelope framing plus the simplified JSON interop encoding.
//! Both read paths are implemented; only the binary envelope is written —
//! peers are expected to read both formats and may write either.

use bytes::{Buf, BufMut, BytesMut};

use crate::packet::Packet;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short to contain a length prefix")]
    Truncated,
    #[error("declared frame length {0} exceeds the maximum of {MAX_FRAME_LEN}")]
    TooLarge(u32),
    #[error("malformed packet payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Generous upper bound guarding against a hostile or corrupt length prefix.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Encodes `packet` as a 4-byte big-endian length prefix followed by its JSON
/// encoding. The length-prefixed envelope is the only format this bridge
/// writes; JSON is used as the payload encoding since it doubles as the
/// interop format in [`decode_frame`].
pub fn encode_frame(packet: &Packet) -> Result<BytesMut, FrameError> {
    let payload = serde_json::to_vec(packet)?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Attempts to take one complete length-prefixed frame off the front of
/// `buf`, decoding it into a [`Packet`]. Returns `Ok(None)` if `buf` does not
/// yet contain a full frame; the caller should read more bytes and retry.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes(buf[..4].try_into().expect("checked length above"));
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    if buf.len() < 4 + len as usize {
        return Ok(None);
    }
    buf.advance(4);
    let payload = buf.split_to(len as usize);
    let packet = serde_json::from_slice(&payload)?;
    Ok(Some(packet))
}

/// Parses the simplified JSON interop encoding directly (no length prefix)
/// — the shape read from peers that do not frame with the binary envelope.
pub fn decode_json_interop(raw: &[u8]) -> Result<Packet, FrameError> {
    Ok(serde_json::from_slice(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Fulfill, Prepare, Reject, RejectCode};
    use crate::timestamp::Expiry;

    #[test]
    fn frame_round_trips_and_leaves_trailing_bytes_untouched() {
        let packet = Packet::Fulfill(Fulfill {
            fulfillment: [9; 32],
            data: vec![4, 5, 6],
        });
        let mut buf = encode_frame(&packet).unwrap();
        buf.extend_from_slice(b"trailing");
        let decoded = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(&buf[..], b"trailing");
    }

    #[test]
    fn partial_frame_returns_none_without_consuming() {
        let packet = Packet::Reject(Reject::new(RejectCode::T00, "internal"));
        let full = encode_frame(&packet).unwrap();
        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        let original_len = partial.len();
        assert!(decode_frame(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), original_len);
    }

    #[test]
    fn json_interop_prepare_decodes_without_length_prefix() {
        let packet = Packet::Prepare(Prepare {
            amount: "10000".into(),
            destination: "peer-b".into(),
            execution_condition: [1; 32],
            expires_at: Expiry::now_plus_millis(30_000),
            data: vec![],
        });
        let json = serde_json::to_vec(&packet).unwrap();
        let decoded = decode_json_interop(&json).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_LEN + 1);
        assert!(matches!(
            decode_frame(&mut buf),
            Err(FrameError::TooLarge(_))
        ));
    }
}
