//! Data-channel frame framing: `[1-byte EStreamDataMessage][optional
//! 12-byte sub-header][codec payload]`.
//!
//! Only `DataPacket` carries a payload; other message kinds are reserved by
//! the host-side protocol and are forwarded to callers unparsed.

use bytes::Bytes;

use crate::errors::{ProtocolError, Result};

/// The one-byte data-message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EStreamDataMessage {
    /// Carries codec payload, optionally prefixed by [`DataSubHeader`].
    DataPacket,
    /// Any other tag value; not interpreted by this crate.
    Other(u8),
}

impl EStreamDataMessage {
    const DATA_PACKET: u8 = 0;

    fn from_u8(value: u8) -> Self {
        if value == Self::DATA_PACKET { Self::DataPacket } else { Self::Other(value) }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::DataPacket => Self::DATA_PACKET,
            Self::Other(value) => value,
        }
    }
}

/// Optional 12-byte sub-header carried by a `DataPacket` body, present
/// whenever the body is larger than the sub-header itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSubHeader {
    /// Per-stream packet id, independent of the session-transport `packet_id`.
    pub id: u16,
    /// Presentation timestamp.
    pub timestamp: u32,
    /// Last input event sequence the host had observed when this was sent.
    pub input_mark: u16,
    /// Timestamp the host received that input event.
    pub input_recv_timestamp: u32,
}

impl DataSubHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 12;

    fn parse(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= Self::SIZE);
        Self {
            id: u16::from_le_bytes([bytes[0], bytes[1]]),
            timestamp: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            input_mark: u16::from_le_bytes([bytes[6], bytes[7]]),
            input_recv_timestamp: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    fn write_to(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.input_mark.to_le_bytes());
        out.extend_from_slice(&self.input_recv_timestamp.to_le_bytes());
    }
}

/// A decoded data-channel frame body: the tag, the optional sub-header, and
/// whatever bytes follow (the codec payload for `DataPacket`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    /// Message-type tag.
    pub message_type: EStreamDataMessage,
    /// Sub-header, present iff the body exceeded [`DataSubHeader::SIZE`]
    /// bytes beyond the tag.
    pub sub_header: Option<DataSubHeader>,
    /// Payload bytes following the tag and optional sub-header.
    pub payload: Bytes,
}

impl DataMessage {
    /// Parse `[1-byte tag][optional 12-byte sub-header][payload]`.
    pub fn parse(frame_body: &[u8]) -> Result<Self> {
        let [tag, rest @ ..] = frame_body else {
            return Err(ProtocolError::SubHeaderTruncated { expected: 1, actual: 0 });
        };
        let message_type = EStreamDataMessage::from_u8(*tag);
        if rest.len() > DataSubHeader::SIZE {
            let sub_header = DataSubHeader::parse(&rest[..DataSubHeader::SIZE]);
            let payload = Bytes::copy_from_slice(&rest[DataSubHeader::SIZE..]);
            Ok(Self { message_type, sub_header: Some(sub_header), payload })
        } else {
            Ok(Self { message_type, sub_header: None, payload: Bytes::copy_from_slice(rest) })
        }
    }

    /// Serialize back to wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(1 + DataSubHeader::SIZE + self.payload.len());
        out.push(self.message_type.to_u8());
        if let Some(sub_header) = self.sub_header {
            sub_header.write_to(&mut out);
        }
        out.extend_from_slice(&self.payload);
        Bytes::from(out)
    }
}

pub use crate::pb::data::{AudioConfig, FrameStatsListMsg};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_has_no_sub_header() {
        let mut body = vec![EStreamDataMessage::DataPacket.to_u8()];
        body.extend_from_slice(&[1, 2, 3]);
        let message = DataMessage::parse(&body).expect("should parse");
        assert!(message.sub_header.is_none());
        assert_eq!(&message.payload[..], &[1, 2, 3]);
    }

    #[test]
    fn long_body_parses_sub_header() {
        let sub_header =
            DataSubHeader { id: 7, timestamp: 1234, input_mark: 9, input_recv_timestamp: 5678 };
        let mut body = vec![EStreamDataMessage::DataPacket.to_u8()];
        sub_header.write_to(&mut body);
        body.extend_from_slice(b"payload-bytes");

        let message = DataMessage::parse(&body).expect("should parse");
        assert_eq!(message.sub_header, Some(sub_header));
        assert_eq!(&message.payload[..], b"payload-bytes");
    }

    #[test]
    fn exact_sub_header_length_body_has_no_payload_and_no_sub_header() {
        // Body of exactly SIZE bytes is NOT > SIZE, so spec.md's ">12 bytes"
        // rule treats it as payload-only (ambiguous upstream, preserved here).
        let body = vec![EStreamDataMessage::DataPacket.to_u8(); 1 + DataSubHeader::SIZE];
        let message = DataMessage::parse(&body).expect("should parse");
        assert!(message.sub_header.is_none());
        assert_eq!(message.payload.len(), DataSubHeader::SIZE);
    }

    #[test]
    fn round_trips() {
        let sub_header =
            DataSubHeader { id: 1, timestamp: 2, input_mark: 3, input_recv_timestamp: 4 };
        let message = DataMessage {
            message_type: EStreamDataMessage::DataPacket,
            sub_header: Some(sub_header),
            payload: Bytes::from_static(b"abc"),
        };
        let wire = message.to_bytes();
        let parsed = DataMessage::parse(&wire).expect("should parse");
        assert_eq!(parsed, message);
    }
}
