//! Binary codec for the DwarfLink frame envelope.
//!
//! Wire format:
//! ```text
//! [major:1][minor:1][device_class:1][reserved:1]
//! [module:4][cmd:4][msg_type:4]
//! [session_len:2][payload_len:4]
//! [session:session_len][payload:payload_len]
//! ```
//! Fixed header size: 22 bytes.  All multi-byte integers are big-endian.
//!
//! The envelope is deliberately dumb: it never inspects the payload, and it
//! forwards module/cmd values it does not recognise.  Forward compatibility
//! lives here — a firmware update that introduces a new subsystem must not
//! break frame decoding.

use thiserror::Error;

/// Protocol major version carried in every frame.
pub const PROTOCOL_MAJOR: u8 = 2;

/// Protocol minor version carried in every frame.
pub const PROTOCOL_MINOR: u8 = 0;

/// Device class identifier for the supported instrument generation.
pub const DEVICE_CLASS: u8 = 1;

/// Size of the fixed portion of the envelope header in bytes.
pub const HEADER_SIZE: usize = 22;

/// Message type flag for a normal command/telemetry frame.
pub const MSG_TYPE_NORMAL: u32 = 0;

/// Errors that can occur while decoding a frame envelope.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    /// The byte slice is shorter than the declared frame length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The protocol major version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The session id bytes are not valid UTF-8.
    #[error("malformed session id: {0}")]
    MalformedSession(String),

    /// A command payload could not be parsed (wrong length, bad field value).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// A decoded frame envelope.
///
/// `module` and `cmd` are plain integers rather than enums: unknown values
/// must survive decoding so the dispatcher can route them to its
/// unrecognized channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Subsystem (module) identifier.
    pub module: u32,
    /// Command identifier within the subsystem.
    pub cmd: u32,
    /// Message type flag; 0 for normal frames.
    pub msg_type: u32,
    /// Session id of the client that produced the frame.
    pub session_id: String,
    /// Opaque command/telemetry payload.
    pub payload: Vec<u8>,
}

/// Encodes a command frame with the fixed protocol version and device class.
///
/// Encoding is deterministic: the same inputs always produce the same bytes.
/// The session id is truncated at `u16::MAX` bytes (it is a UUID string in
/// practice, far below the limit).
pub fn encode_frame(module: u32, cmd: u32, payload: &[u8], session_id: &str) -> Vec<u8> {
    let session = session_id.as_bytes();
    let session_len = session.len().min(u16::MAX as usize);

    let mut buf = Vec::with_capacity(HEADER_SIZE + session_len + payload.len());
    buf.push(PROTOCOL_MAJOR);
    buf.push(PROTOCOL_MINOR);
    buf.push(DEVICE_CLASS);
    buf.push(0x00); // reserved
    buf.extend_from_slice(&module.to_be_bytes());
    buf.extend_from_slice(&cmd.to_be_bytes());
    buf.extend_from_slice(&MSG_TYPE_NORMAL.to_be_bytes());
    buf.extend_from_slice(&(session_len as u16).to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&session[..session_len]);
    buf.extend_from_slice(payload);
    buf
}

/// Decodes one [`Frame`] from the beginning of `bytes`.
///
/// Returns the decoded frame and the total number of bytes consumed so a
/// streaming caller can advance its read cursor.
///
/// # Errors
///
/// Returns [`FrameError::InsufficientData`] for truncated input (the caller
/// should wait for more bytes), [`FrameError::UnsupportedVersion`] for a
/// major-version mismatch, and [`FrameError::MalformedSession`] for invalid
/// UTF-8 in the session field.  Unknown module/cmd/msg_type values decode
/// successfully.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let major = bytes[0];
    if major != PROTOCOL_MAJOR {
        return Err(FrameError::UnsupportedVersion(major));
    }
    // bytes[1] (minor), bytes[2] (device class), and bytes[3] (reserved) are
    // tolerated on decode: minor bumps and other device classes stay readable.

    let module = read_u32(bytes, 4);
    let cmd = read_u32(bytes, 8);
    let msg_type = read_u32(bytes, 12);
    let session_len = u16::from_be_bytes([bytes[16], bytes[17]]) as usize;
    let payload_len = read_u32(bytes, 18) as usize;

    let total = HEADER_SIZE + session_len + payload_len;
    if bytes.len() < total {
        return Err(FrameError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let session_start = HEADER_SIZE;
    let payload_start = session_start + session_len;

    let session_id = std::str::from_utf8(&bytes[session_start..payload_start])
        .map_err(|e| FrameError::MalformedSession(e.to_string()))?
        .to_string();
    let payload = bytes[payload_start..total].to_vec();

    Ok((
        Frame {
            module,
            cmd,
            msg_type,
            session_id,
            payload,
        },
        total,
    ))
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(module: u32, cmd: u32, payload: &[u8], session: &str) -> Frame {
        let encoded = encode_frame(module, cmd, payload, session);
        let (frame, consumed) = decode_frame(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed must equal encoded size");
        frame
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let frame = round_trip(6, 14000, &[1, 2, 3, 4], "session-abc");
        assert_eq!(frame.module, 6);
        assert_eq!(frame.cmd, 14000);
        assert_eq!(frame.msg_type, MSG_TYPE_NORMAL);
        assert_eq!(frame.session_id, "session-abc");
        assert_eq!(frame.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let frame = round_trip(0, 0, &[], "keepalive-client");
        assert!(frame.payload.is_empty());
        assert_eq!(frame.module, 0);
        assert_eq!(frame.cmd, 0);
    }

    #[test]
    fn test_round_trip_empty_session_id() {
        let frame = round_trip(1, 10000, &[0xFF], "");
        assert_eq!(frame.session_id, "");
        assert_eq!(frame.payload, vec![0xFF]);
    }

    #[test]
    fn test_unknown_module_and_cmd_decode_successfully() {
        // Forward compatibility: module 999 is not a known subsystem, but the
        // envelope must still decode so the dispatcher can bucket it.
        let frame = round_trip(999, 0xDEAD_BEEF, &[9], "fw-next");
        assert_eq!(frame.module, 999);
        assert_eq!(frame.cmd, 0xDEAD_BEEF);
    }

    #[test]
    fn test_header_carries_version_and_device_class() {
        let bytes = encode_frame(1, 10000, &[], "s");
        assert_eq!(bytes[0], PROTOCOL_MAJOR);
        assert_eq!(bytes[1], PROTOCOL_MINOR);
        assert_eq!(bytes[2], DEVICE_CLASS);
    }

    #[test]
    fn test_decode_empty_input_returns_insufficient_data() {
        let result = decode_frame(&[]);
        assert!(matches!(result, Err(FrameError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_truncated_header_returns_insufficient_data() {
        let bytes = encode_frame(1, 10000, &[1, 2, 3], "session");
        let result = decode_frame(&bytes[..HEADER_SIZE - 1]);
        assert!(matches!(result, Err(FrameError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_truncated_payload_returns_insufficient_data() {
        let bytes = encode_frame(1, 10000, &[1, 2, 3, 4, 5], "session");
        let result = decode_frame(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(FrameError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_wrong_major_version_is_rejected() {
        let mut bytes = encode_frame(1, 10000, &[], "s");
        bytes[0] = 0x7F;
        let result = decode_frame(&bytes);
        assert_eq!(result, Err(FrameError::UnsupportedVersion(0x7F)));
    }

    #[test]
    fn test_decode_tolerates_other_minor_version_and_device_class() {
        let mut bytes = encode_frame(3, 11000, &[7], "s");
        bytes[1] = 9; // future minor version
        bytes[2] = 2; // different device class
        let (frame, _) = decode_frame(&bytes).expect("must decode");
        assert_eq!(frame.module, 3);
        assert_eq!(frame.payload, vec![7]);
    }

    #[test]
    fn test_decode_invalid_utf8_session_is_malformed() {
        let mut bytes = encode_frame(1, 10000, &[], "ab");
        // Overwrite the two session bytes with an invalid UTF-8 sequence.
        let start = HEADER_SIZE;
        bytes[start] = 0xC3;
        bytes[start + 1] = 0x28;
        let result = decode_frame(&bytes);
        assert!(matches!(result, Err(FrameError::MalformedSession(_))));
    }

    #[test]
    fn test_two_frames_in_one_buffer_decode_independently() {
        let mut buf = encode_frame(1, 10000, &[1], "s1");
        buf.extend_from_slice(&encode_frame(2, 12000, &[2, 2], "s2"));

        let (first, consumed) = decode_frame(&buf).unwrap();
        let (second, consumed2) = decode_frame(&buf[consumed..]).unwrap();

        assert_eq!(first.module, 1);
        assert_eq!(second.module, 2);
        assert_eq!(second.payload, vec![2, 2]);
        assert_eq!(consumed + consumed2, buf.len());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = encode_frame(8, 15001, &[1], "same-session");
        let b = encode_frame(8, 15001, &[1], "same-session");
        assert_eq!(a, b);
    }
}
