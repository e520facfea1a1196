//! Wire-format error taxonomy.

use thiserror::Error;

/// Errors raised while parsing or serializing wire-format structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer shorter than the fixed 13-byte packet header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Minimum required length.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// The 7-bit type field in byte 0 is outside `0..=9`.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// CRC-32C trailer did not match the computed checksum.
    #[error("crc mismatch: header claims {expected:#010x}, computed {actual:#010x}")]
    CrcMismatch {
        /// CRC read from the trailer.
        expected: u32,
        /// CRC computed over header + body.
        actual: u32,
    },

    /// A frame claimed more fragments than were actually supplied.
    #[error("incomplete frame: expected {expected} fragments, got {actual}")]
    IncompleteFrame {
        /// Fragment count declared by the head packet.
        expected: usize,
        /// Fragments actually assembled.
        actual: usize,
    },

    /// A protobuf payload failed to decode.
    #[error("malformed protobuf payload for {context}: {source}")]
    MalformedPayload {
        /// What we were trying to decode (e.g. `"AuthenticationRequest"`).
        context: &'static str,
        /// Underlying decode error, stringified (prost's error isn't `Clone`).
        source: String,
    },

    /// A one-byte message-type tag did not match any known enum variant.
    #[error("unknown message type tag: {0:#04x}")]
    UnknownMessageType(u8),

    /// Body too short to contain a declared sub-header.
    #[error("sub-header truncated: expected {expected} bytes, got {actual}")]
    SubHeaderTruncated {
        /// Minimum required length.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },
}

/// Convenience alias for wire-format results.
pub type Result<T> = std::result::Result<T, ProtocolError>;
