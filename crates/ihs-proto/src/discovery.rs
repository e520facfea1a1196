//! Discovery wire formats: the in-session `Unconnected`-packet framing used
//! by the discovery channel (§4.5), and the pre-session broadcast datagram
//! used by the external discovery client (§6, included here because it
//! shares the generated `BroadcastHeader`/`PingRequest`/`PingResponse` types).

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::errors::{ProtocolError, Result};

pub use crate::pb::discovery::{BroadcastHeader, HostInfo, PingRequest, PingResponse};

/// 8-byte magic prefixing every pre-session broadcast datagram.
pub const BROADCAST_MAGIC: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0x21, 0x4C, 0x5F, 0xA0];

/// UDP port the pre-session discovery broadcast is sent to.
pub const BROADCAST_PORT: u16 = 27036;

/// The one-byte message id prefixing an `Unconnected`-packet body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EUnconnectedMsg {
    /// Client -> host, requests a `PingResponse` padded to a given size.
    PingRequest,
    /// Host -> client, reply to `PingRequest`.
    PingResponse,
    /// Any other message id; not interpreted by this crate.
    Other(u8),
}

impl EUnconnectedMsg {
    const PING_REQUEST: u8 = 1;
    const PING_RESPONSE: u8 = 2;

    fn from_u8(value: u8) -> Self {
        match value {
            Self::PING_REQUEST => Self::PingRequest,
            Self::PING_RESPONSE => Self::PingResponse,
            other => Self::Other(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::PingRequest => Self::PING_REQUEST,
            Self::PingResponse => Self::PING_RESPONSE,
            Self::Other(value) => value,
        }
    }
}

/// A decoded `Unconnected`-packet body: `[1-byte msg id][LE32 length][protobuf body]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnconnectedMessage {
    /// Message id tag.
    pub message_id: EUnconnectedMsg,
    /// Encoded protobuf body, exactly `length` bytes.
    pub body: Bytes,
}

impl UnconnectedMessage {
    /// Build a message from an id and a `prost` message, encoding the body.
    #[must_use]
    pub fn encode(message_id: EUnconnectedMsg, body: &impl Message) -> Self {
        Self { message_id, body: body.encode_to_vec().into() }
    }

    /// Parse `[1-byte id][LE32 length][body]`.
    pub fn parse(packet_body: &[u8]) -> Result<Self> {
        if packet_body.len() < 5 {
            return Err(ProtocolError::SubHeaderTruncated { expected: 5, actual: packet_body.len() });
        }
        let message_id = EUnconnectedMsg::from_u8(packet_body[0]);
        let length = u32::from_le_bytes([
            packet_body[1],
            packet_body[2],
            packet_body[3],
            packet_body[4],
        ]) as usize;
        let available = packet_body.len() - 5;
        if length > available {
            return Err(ProtocolError::SubHeaderTruncated { expected: length, actual: available });
        }
        let body = Bytes::copy_from_slice(&packet_body[5..5 + length]);
        Ok(Self { message_id, body })
    }

    /// Serialize back to `[1-byte id][LE32 length][body]`.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(5 + self.body.len());
        out.extend_from_slice(&[self.message_id.to_u8()]);
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.body);
        out.freeze()
    }

    /// Decode the body as a specific `prost` message type.
    pub fn decode_as<T: Message + Default>(&self, context: &'static str) -> Result<T> {
        T::decode(&self.body[..])
            .map_err(|err| ProtocolError::MalformedPayload { context, source: err.to_string() })
    }
}

/// Pre-session broadcast datagram: `[8-byte magic][LE32 header len]
/// [BroadcastHeader][LE32 payload len][payload]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastDatagram {
    /// Client identity and message-type routing.
    pub header: BroadcastHeader,
    /// Encoded payload, e.g. a `PingRequest`.
    pub payload: Bytes,
}

impl BroadcastDatagram {
    /// Serialize the full broadcast datagram, magic included.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let header_bytes = self.header.encode_to_vec();
        let mut out = BytesMut::with_capacity(
            BROADCAST_MAGIC.len() + 4 + header_bytes.len() + 4 + self.payload.len(),
        );
        out.extend_from_slice(&BROADCAST_MAGIC);
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.freeze()
    }

    /// Parse a received broadcast datagram, validating the magic prefix.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BROADCAST_MAGIC.len() + 4 {
            return Err(ProtocolError::SubHeaderTruncated {
                expected: BROADCAST_MAGIC.len() + 4,
                actual: bytes.len(),
            });
        }
        if bytes[..BROADCAST_MAGIC.len()] != BROADCAST_MAGIC {
            return Err(ProtocolError::MalformedPayload {
                context: "BroadcastDatagram",
                source: "magic mismatch".to_string(),
            });
        }
        let mut cursor = BROADCAST_MAGIC.len();
        let header_len = read_le32(bytes, cursor)? as usize;
        cursor += 4;
        let header_bytes = slice(bytes, cursor, header_len)?;
        cursor += header_len;
        let header = BroadcastHeader::decode(header_bytes).map_err(|err| {
            ProtocolError::MalformedPayload { context: "BroadcastHeader", source: err.to_string() }
        })?;
        let payload_len = read_le32(bytes, cursor)? as usize;
        cursor += 4;
        let payload = Bytes::copy_from_slice(slice(bytes, cursor, payload_len)?);
        Ok(Self { header, payload })
    }
}

fn read_le32(bytes: &[u8], offset: usize) -> Result<u32> {
    let slice = slice(bytes, offset, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    bytes.get(offset..offset + len).ok_or(ProtocolError::SubHeaderTruncated {
        expected: offset + len,
        actual: bytes.len(),
    })
}
