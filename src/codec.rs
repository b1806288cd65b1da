//! Control-code algorithms: derive a fixed-format control value from text
//! and verify a received value against a recomputation.
//!
//! Five interchangeable algorithms are supported.  The parity family
//! (PARITY, 2DPARITY, HAMMING) operates on each character's low 8 code-point
//! bits, big-endian; CRC16 and CHECKSUM operate on the UTF-8 byte encoding.
//! Every algorithm is deterministic and total, including on empty input.
//!
//! No I/O happens here — this is pure data transformation.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// CRC-16/CCITT generator polynomial (x^16 + x^12 + x^5 + 1).
const CRC16_POLY: u16 = 0x1021;
/// CRC-16/CCITT initial register value.
const CRC16_INIT: u16 = 0xFFFF;

/// Errors produced by algorithm selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The name does not match any of the five recognised algorithms.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// A control-code algorithm carried in every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Single even-parity bit over the whole bit string.
    Parity,
    /// Row and column parities of the 8-column bit matrix, rendered as hex.
    Parity2d,
    /// CRC-16/CCITT-FALSE over the UTF-8 bytes.
    Crc16,
    /// Hamming (7,4)-style parity triples over 4-bit blocks, rendered as hex.
    Hamming,
    /// Internet checksum (RFC 1071) over the UTF-8 bytes.
    Checksum,
}

/// All algorithms, in menu order (`1`..`5`).
pub const ALGORITHMS: [Algorithm; 5] = [
    Algorithm::Parity,
    Algorithm::Parity2d,
    Algorithm::Crc16,
    Algorithm::Hamming,
    Algorithm::Checksum,
];

impl Algorithm {
    /// Compute the control value for `text`.
    pub fn encode(&self, text: &str) -> String {
        match self {
            Algorithm::Parity => parity(text),
            Algorithm::Parity2d => parity_2d(text),
            Algorithm::Crc16 => crc16(text),
            Algorithm::Hamming => hamming(text),
            Algorithm::Checksum => checksum(text),
        }
    }

    /// `true` when a recomputation of `text`'s control value matches `control`.
    pub fn verify(&self, text: &str, control: &str) -> bool {
        self.encode(text) == control
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Parity => "PARITY",
            Algorithm::Parity2d => "2DPARITY",
            Algorithm::Crc16 => "CRC16",
            Algorithm::Hamming => "HAMMING",
            Algorithm::Checksum => "CHECKSUM",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Algorithm {
    type Err = CodecError;

    /// Parse a case-insensitive algorithm name or its menu number (`1`..`5`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1" | "PARITY" => Ok(Algorithm::Parity),
            "2" | "2DPARITY" | "PARITY2D" => Ok(Algorithm::Parity2d),
            "3" | "CRC16" => Ok(Algorithm::Crc16),
            "4" | "HAMMING" => Ok(Algorithm::Hamming),
            "5" | "CHECKSUM" => Ok(Algorithm::Checksum),
            _ => Err(CodecError::UnknownAlgorithm(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Bit-string helpers (parity family)
// ---------------------------------------------------------------------------

/// The low 8 code-point bits of every character, one byte per character.
///
/// Characters above U+00FF are truncated to their low byte; the wire format
/// is only defined for single-byte-representable text.
fn low_bytes(text: &str) -> impl Iterator<Item = u8> + '_ {
    text.chars().map(|c| (c as u32 & 0xFF) as u8)
}

/// The full bit string: 8 big-endian bits per character.
fn char_bits(text: &str) -> Vec<bool> {
    let mut bits = Vec::with_capacity(text.len() * 8);
    for byte in low_bytes(text) {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1 == 1);
        }
    }
    bits
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// One uppercase hex digit per 4-bit group, most significant bit first.
fn nibbles_to_hex(bits: &[bool]) -> String {
    bits.chunks(4)
        .map(|nibble| {
            let mut value = 0usize;
            for &bit in nibble {
                value = (value << 1) | bit as usize;
            }
            // A short final group is padded with trailing zero bits.
            value <<= 4 - nibble.len();
            HEX_DIGITS[value] as char
        })
        .collect()
}

/// Render a bit string as an unsigned integer in uppercase hex, left-padded
/// with zeros to a minimum of 4 digits.
///
/// The bit string grows with the input, so the value can exceed any fixed
/// integer width; the conversion is done nibble-wise.  Wider values keep
/// their full width, shorter ones are padded, and an empty bit string is
/// the caller's special case.
fn bits_to_hex_min4(bits: &[bool]) -> String {
    // Left-pad to a nibble boundary so groups line up on the low end.
    let pad = (4 - bits.len() % 4) % 4;
    let mut padded = vec![false; pad];
    padded.extend_from_slice(bits);

    let hex = nibbles_to_hex(&padded);
    let trimmed = hex.trim_start_matches('0');
    let digits = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{digits:0>4}")
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Even-parity convention: `"1"` when the total number of set bits is odd.
fn parity(text: &str) -> String {
    let ones: u32 = low_bytes(text).map(|b| b.count_ones()).sum();
    let bit = if ones % 2 != 0 { "1" } else { "0" };
    bit.to_string()
}

/// Two-dimensional parity: lay the bit string into 8-column rows, compute
/// one parity bit per row followed by one per column, and render the
/// concatenated bit string as hex (minimum 4 digits).
fn parity_2d(text: &str) -> String {
    let rows: Vec<u8> = low_bytes(text).collect();
    if rows.is_empty() {
        return "0".to_string();
    }

    let mut bits = Vec::with_capacity(rows.len() + 8);
    for &row in &rows {
        bits.push(row.count_ones() % 2 != 0);
    }
    for col in 0..8 {
        let mask = 0x80u8 >> col;
        let ones = rows.iter().filter(|&&row| row & mask != 0).count();
        bits.push(ones % 2 != 0);
    }
    bits_to_hex_min4(&bits)
}

/// CRC-16/CCITT-FALSE, bit-by-bit, MSB first.
fn crc16(text: &str) -> String {
    let mut crc = CRC16_INIT;
    for &byte in text.as_bytes() {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    format!("{crc:04X}")
}

/// Hamming parity triples: for each 4-bit block `d0 d1 d2 d3` emit
/// `p1 = d0^d1^d3`, `p2 = d0^d2^d3`, `p4 = d1^d2^d3`, then pad the
/// concatenation to a nibble boundary and render one hex digit per nibble.
fn hamming(text: &str) -> String {
    let bits = char_bits(text);
    if bits.is_empty() {
        return "0".to_string();
    }

    let mut parity_bits = Vec::with_capacity(bits.len() / 4 * 3 + 3);
    for block in bits.chunks(4) {
        // A short final block is padded with trailing zero bits.
        let d = |i: usize| block.get(i).copied().unwrap_or(false);
        parity_bits.push(d(0) ^ d(1) ^ d(3));
        parity_bits.push(d(0) ^ d(2) ^ d(3));
        parity_bits.push(d(1) ^ d(2) ^ d(3));
    }
    while parity_bits.len() % 4 != 0 {
        parity_bits.push(false);
    }
    nibbles_to_hex(&parity_bits)
}

/// Internet checksum (RFC 1071): one's-complement sum of big-endian 16-bit
/// words with end-around carry, complemented.  An odd byte count is padded
/// with a single zero byte.
fn checksum(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut sum: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let hi = bytes[i] as u32;
        let lo = if i + 1 < bytes.len() { bytes[i + 1] as u32 } else { 0 };
        sum += (hi << 8) | lo;
        while sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        i += 2;
    }
    let folded = !sum & 0xFFFF;
    format!("{folded:04X}")
}
