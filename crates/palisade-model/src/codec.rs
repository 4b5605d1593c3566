//! Binary frame codec for cached authorization requests.
//!
//! In-flight authorization requests are parked in the request cache as a
//! versioned frame: a version octet, a little-endian `u32` parameter count,
//! then that many pairs of length-prefixed UTF-8 strings. Decoding is strict:
//! unknown versions and truncated frames are errors, never best-effort.

use thiserror::Error;

use crate::message::{MessageKind, ProtocolMessage};

const FRAME_VERSION: u8 = 1;

/// Errors raised while decoding a cached request frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame advertises a version this build does not understand.
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// The frame ended before the advertised content.
    #[error("truncated frame")]
    Truncated,

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in frame")]
    InvalidUtf8,
}

/// Encodes a message into the cache frame format.
#[must_use]
pub fn encode_message(message: &ProtocolMessage) -> Vec<u8> {
    let params = message.params();
    let mut frame = Vec::with_capacity(16 + params.len() * 32);
    frame.push(FRAME_VERSION);
    frame.extend_from_slice(&u32::try_from(params.len()).unwrap_or(u32::MAX).to_le_bytes());
    for (name, value) in params {
        write_string(&mut frame, name);
        write_string(&mut frame, value);
    }
    frame
}

/// Decodes a cache frame back into a message of the given kind.
///
/// # Errors
///
/// Returns an error if the frame is of an unknown version, truncated, or
/// carries invalid UTF-8.
pub fn decode_message(kind: MessageKind, frame: &[u8]) -> Result<ProtocolMessage, CodecError> {
    let (&version, mut rest) = frame.split_first().ok_or(CodecError::Truncated)?;
    if version != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let count = read_u32(&mut rest)?;
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_string(&mut rest)?;
        let value = read_string(&mut rest)?;
        pairs.push((name, value));
    }

    Ok(ProtocolMessage::from_pairs(kind, pairs))
}

fn write_string(frame: &mut Vec<u8>, value: &str) {
    frame.extend_from_slice(&u32::try_from(value.len()).unwrap_or(u32::MAX).to_le_bytes());
    frame.extend_from_slice(value.as_bytes());
}

fn read_u32(rest: &mut &[u8]) -> Result<u32, CodecError> {
    let (bytes, remainder) = rest
        .split_at_checked(4)
        .ok_or(CodecError::Truncated)?;
    *rest = remainder;
    Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
}

fn read_string(rest: &mut &[u8]) -> Result<String, CodecError> {
    let len = read_u32(rest)? as usize;
    let (bytes, remainder) = rest
        .split_at_checked(len)
        .ok_or(CodecError::Truncated)?;
    *rest = remainder;
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_order_and_values() {
        let message = ProtocolMessage::from_pairs(
            MessageKind::AuthenticationRequest,
            [
                ("client_id", "app1"),
                ("scope", "openid profile"),
                ("state", "a&b=c \u{00e9}"),
            ],
        );

        let frame = encode_message(&message);
        assert_eq!(frame[0], 1);

        let decoded = decode_message(MessageKind::AuthenticationRequest, &frame).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let message = ProtocolMessage::new(MessageKind::AuthenticationRequest);
        let mut frame = encode_message(&message);
        frame[0] = 2;
        assert!(matches!(
            decode_message(MessageKind::AuthenticationRequest, &frame),
            Err(CodecError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let message =
            ProtocolMessage::from_pairs(MessageKind::AuthenticationRequest, [("a", "b")]);
        let frame = encode_message(&message);
        for cut in 1..frame.len() {
            assert!(
                decode_message(MessageKind::AuthenticationRequest, &frame[..cut]).is_err(),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn empty_message_round_trips() {
        let message = ProtocolMessage::new(MessageKind::AuthenticationRequest);
        let frame = encode_message(&message);
        let decoded = decode_message(MessageKind::AuthenticationRequest, &frame).unwrap();
        assert!(decoded.params().is_empty());
    }
}
