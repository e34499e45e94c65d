//! Framing for the worker → controller channel.
//!
//! A channel carries exactly one frame:
//!
//! ```text
//! +------------------+-------------------+---------------------------+
//! | header (16 B)    | payload (L bytes) | captured output (to EOF)  |
//! | L as %016x ASCII | CBOR envelope     | raw stdout of the task    |
//! +------------------+-------------------+---------------------------+
//! ```
//!
//! The output tail has no length; it ends when the worker closes the channel.

use std::io::{self, Write};
use thiserror::Error;

/// Width of the length header in bytes.
pub const HEADER_LEN: usize = 16;

/// Largest payload a header may declare (1 GiB).
pub const MAX_PAYLOAD_LEN: usize = 1 << 30;

/// Ways a received byte stream can fail to be a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("channel closed after {got} of 16 header bytes")]
    TruncatedHeader { got: usize },

    #[error("malformed length header {0:?}")]
    InvalidHeader(String),

    #[error("declared payload of {0} bytes exceeds the 1 GiB limit")]
    PayloadTooLarge(u64),

    #[error("channel closed after {got} of {expected} payload bytes")]
    TruncatedPayload { expected: usize, got: usize },
}

/// Encode a payload length as a fixed-width header.
pub fn encode_header(payload_len: usize) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    let text = format!("{:0width$x}", payload_len, width = HEADER_LEN);
    header.copy_from_slice(text.as_bytes());
    header
}

/// Parse a fixed-width header into the payload length it declares.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize, FrameError> {
    let invalid = || FrameError::InvalidHeader(String::from_utf8_lossy(header).into_owned());
    if !header.iter().all(u8::is_ascii_hexdigit) {
        return Err(invalid());
    }
    let text = std::str::from_utf8(header).map_err(|_| invalid())?;
    let declared = u64::from_str_radix(text, 16).map_err(|_| invalid())?;
    match usize::try_from(declared) {
        Ok(len) if len <= MAX_PAYLOAD_LEN => Ok(len),
        _ => Err(FrameError::PayloadTooLarge(declared)),
    }
}

/// Write one complete frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8], output: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            FrameError::PayloadTooLarge(payload.len() as u64),
        ));
    }
    writer.write_all(&encode_header(payload.len()))?;
    writer.write_all(payload)?;
    writer.write_all(output)?;
    writer.flush()
}

/// A decoded frame borrowing from the received bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Serialized envelope.
    pub payload: &'a [u8],
    /// Output captured while the task ran.
    pub output: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Split everything read from a closed channel into a frame.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, FrameError> {
        let Some((header, rest)) = bytes.split_first_chunk::<HEADER_LEN>() else {
            return Err(FrameError::TruncatedHeader { got: bytes.len() });
        };
        let len = decode_header(header)?;
        if rest.len() < len {
            return Err(FrameError::TruncatedPayload {
                expected: len,
                got: rest.len(),
            });
        }
        let (payload, output) = rest.split_at(len);
        Ok(Self { payload, output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &[u8], output: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_frame(&mut bytes, payload, output).unwrap();
        bytes
    }

    #[test]
    fn test_header_is_fixed_width_hex() {
        assert_eq!(&encode_header(0), b"0000000000000000");
        assert_eq!(&encode_header(255), b"00000000000000ff");
        assert_eq!(decode_header(&encode_header(123_456)).unwrap(), 123_456);
    }

    #[test]
    fn test_decode_splits_payload_and_output() {
        let bytes = framed(br#"{"status":"ok","value":3}"#, b"3: S=0.33\n");
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload, br#"{"status":"ok","value":3}"#);
        assert_eq!(frame.output, b"3: S=0.33\n");
    }

    #[test]
    fn test_decode_empty_output_tail() {
        let bytes = framed(b"null", b"");
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload, b"null");
        assert!(frame.output.is_empty());
    }

    #[test]
    fn test_output_tail_may_look_like_a_header() {
        let tail = encode_header(99);
        let bytes = framed(b"1", &tail);
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload, b"1");
        assert_eq!(frame.output, &tail);
    }

    #[test]
    fn test_empty_stream_is_truncated_header() {
        assert_eq!(
            Frame::decode(b""),
            Err(FrameError::TruncatedHeader { got: 0 })
        );
        assert_eq!(
            Frame::decode(b"00000"),
            Err(FrameError::TruncatedHeader { got: 5 })
        );
    }

    #[test]
    fn test_short_payload_is_truncated() {
        let mut bytes = encode_header(10).to_vec();
        bytes.extend_from_slice(b"abc");
        assert_eq!(
            Frame::decode(&bytes),
            Err(FrameError::TruncatedPayload {
                expected: 10,
                got: 3
            })
        );
    }

    #[test]
    fn test_non_hex_header_rejected() {
        let bytes = b"      0000000004abcd";
        assert!(matches!(
            Frame::decode(bytes),
            Err(FrameError::InvalidHeader(_))
        ));
        let bytes = b"+000000000000004abcd";
        assert!(matches!(
            Frame::decode(bytes),
            Err(FrameError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_oversized_declaration_rejected() {
        assert!(matches!(
            decode_header(b"ffffffffffffffff"),
            Err(FrameError::PayloadTooLarge(_))
        ));
    }
}
