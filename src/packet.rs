//! Wire-format definitions for framed packets.
//!
//! Every message exchanged between the three roles is one UTF-8 line of
//! three `|`-separated fields:
//!
//! ```text
//! <data> | <algorithm-name> | <control-value>
//! ```
//!
//! sent as a single write on a byte-stream connection and read as a single
//! bounded receive.  There is no length prefix and no terminator beyond the
//! connection close.
//!
//! No I/O happens here — this is pure data transformation.

use thiserror::Error;

use crate::codec::{Algorithm, CodecError};

/// Field separator on the wire.
///
/// Known limitation, kept for compatibility with the original wire format:
/// the delimiter is not escaped, so a payload containing `|` splits into
/// more than three fields and is rejected as malformed by the peer.
pub const DELIMITER: char = '|';

/// Maximum frame size accepted in one read by the relay and the receiver.
pub const MAX_FRAME: usize = 4096;

/// Maximum acknowledgment size read back by the sender.
pub const MAX_REPLY: usize = 1024;

/// Errors that can arise when parsing a raw frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Splitting on the delimiter did not yield exactly 3 fields.
    #[error("malformed packet: expected 3 '|'-separated fields, found {fields}")]
    Malformed { fields: usize },

    /// The algorithm field named no recognised algorithm.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The frame bytes are not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// The unit of transfer: payload text, the algorithm that produced the
/// control value, and the control value itself.
///
/// A packet is constructed once by the sender and reconstructed (never
/// mutated in place) by the relay after corrupting the data field.  The
/// control field is only ever derived from the *original* data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: String,
    pub algorithm: Algorithm,
    pub control: String,
}

impl Packet {
    /// Build a packet for `data`, deriving the control value with `algorithm`.
    pub fn new(data: String, algorithm: Algorithm) -> Self {
        let control = algorithm.encode(&data);
        Self {
            data,
            algorithm,
            control,
        }
    }

    /// Serialise this packet into its single-line wire form.
    pub fn encode(&self) -> String {
        format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.data, self.algorithm, self.control
        )
    }

    /// Parse a [`Packet`] from raw frame bytes.
    ///
    /// Returns [`Err`] if the bytes are not UTF-8, if splitting on the
    /// delimiter yields anything but exactly 3 fields, or if the algorithm
    /// field is unrecognised.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let line = std::str::from_utf8(frame)?;
        let fields: Vec<&str> = line.split(DELIMITER).collect();
        if fields.len() != 3 {
            return Err(FrameError::Malformed {
                fields: fields.len(),
            });
        }
        let algorithm: Algorithm = fields[1].parse()?;
        Ok(Self {
            data: fields[0].to_string(),
            algorithm,
            control: fields[2].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_joins_three_fields() {
        let pkt = Packet::new("HELLO".to_string(), Algorithm::Crc16);
        let line = pkt.encode();
        assert!(line.starts_with("HELLO|CRC16|"));
        assert_eq!(line.split('|').count(), 3);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::new("round trip".to_string(), Algorithm::Checksum);
        let decoded = Packet::decode(pkt.encode().as_bytes()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn decode_rejects_missing_fields() {
        assert_eq!(
            Packet::decode(b"onlyonefield"),
            Err(FrameError::Malformed { fields: 1 })
        );
        assert_eq!(
            Packet::decode(b"two|fields"),
            Err(FrameError::Malformed { fields: 2 })
        );
    }

    #[test]
    fn decode_rejects_extra_fields() {
        assert_eq!(
            Packet::decode(b"a|CRC16|FFFF|extra"),
            Err(FrameError::Malformed { fields: 4 })
        );
    }

    #[test]
    fn delimiter_in_payload_is_rejected() {
        // The unescaped wire format cannot carry the delimiter in the
        // payload; the frame splits into four fields downstream.
        let pkt = Packet {
            data: "a|b".to_string(),
            algorithm: Algorithm::Parity,
            control: "0".to_string(),
        };
        assert_eq!(
            Packet::decode(pkt.encode().as_bytes()),
            Err(FrameError::Malformed { fields: 4 })
        );
    }

    #[test]
    fn decode_rejects_unknown_algorithm() {
        assert!(matches!(
            Packet::decode(b"data|NOPE|0000"),
            Err(FrameError::Codec(_))
        ));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert!(matches!(
            Packet::decode(&[0xFF, 0xFE, b'|', b'a', b'|', b'b']),
            Err(FrameError::Utf8(_))
        ));
    }

    #[test]
    fn control_is_rederivable_from_data() {
        let pkt = Packet::new("integrity".to_string(), Algorithm::Hamming);
        assert!(pkt.algorithm.verify(&pkt.data, &pkt.control));
    }
}
