//! Packet header: the fixed 13-byte little-endian prefix of every session
//! packet.
//!
//! A packed, zero-copy struct that can be cast directly from (and into)
//! the wire bytes, with typed accessors doing the endian conversion.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// The 7-bit packet-type enumeration (low bits of header byte 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Pre-connection / discovery-channel datagram.
    Unconnected = 0,
    /// Initial connect request.
    Connect = 1,
    /// Host's reply to `Connect`.
    ConnectAck = 2,
    /// Single-packet unreliable frame.
    Unreliable = 3,
    /// Non-head fragment of an unreliable frame.
    UnreliableFrag = 4,
    /// Single-packet reliable frame.
    Reliable = 5,
    /// Non-head fragment of a reliable frame.
    ReliableFrag = 6,
    /// Acknowledgement of a reliable packet.
    Ack = 7,
    /// Negative-acknowledgement / data-loss notification.
    Nack = 8,
    /// Session teardown notice.
    Disconnect = 9,
}

impl PacketType {
    /// Highest valid type value, exclusive (`ihslib`'s `IHS_SessionPacketTypeMax`).
    pub const MAX_EXCLUSIVE: u8 = 10;

    /// Decode a raw 7-bit type value.
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Unconnected,
            1 => Self::Connect,
            2 => Self::ConnectAck,
            3 => Self::Unreliable,
            4 => Self::UnreliableFrag,
            5 => Self::Reliable,
            6 => Self::ReliableFrag,
            7 => Self::Ack,
            8 => Self::Nack,
            9 => Self::Disconnect,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }

    /// True for the two types that head a frame (single or first fragment).
    #[must_use]
    pub fn is_frame_head(self) -> bool {
        matches!(self, Self::Reliable | Self::Unreliable)
    }

    /// True for non-head fragment continuations.
    #[must_use]
    pub fn is_fragment_continuation(self) -> bool {
        matches!(self, Self::ReliableFrag | Self::UnreliableFrag)
    }

    /// The reliable/unreliable pair this type belongs to.
    #[must_use]
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Reliable | Self::ReliableFrag)
    }
}

/// Fixed 13-byte little-endian packet header.
///
/// | Offset | Size | Field |
/// |---|---|---|
/// | 0 | 1 | bit7 = `has_crc`, bits0-6 = `type` |
/// | 1 | 1 | `retransmit_count` |
/// | 2 | 1 | `src_connection_id` |
/// | 3 | 1 | `dst_connection_id` |
/// | 4 | 1 | `channel_id` |
/// | 5 | 2 | signed `fragment_id` |
/// | 7 | 2 | `packet_id` |
/// | 9 | 4 | `send_timestamp` |
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    type_and_crc_flag: u8,
    retransmit_count: u8,
    src_connection_id: u8,
    dst_connection_id: u8,
    channel_id: u8,
    fragment_id: [u8; 2],
    packet_id: [u8; 2],
    send_timestamp: [u8; 4],
}

const HAS_CRC_BIT: u8 = 0x80;
const TYPE_MASK: u8 = 0x7F;

impl PacketHeader {
    /// Serialized size in bytes.
    pub const SIZE: usize = 13;

    /// Build a new header. `fragment_id` is signed: the head packet of a
    /// multi-packet frame carries the total fragment count, non-head
    /// fragments carry their 0-based index, and single-packet frames carry 0.
    #[must_use]
    pub fn new(
        packet_type: PacketType,
        has_crc: bool,
        src_connection_id: u8,
        dst_connection_id: u8,
        channel_id: u8,
        fragment_id: i16,
        packet_id: u16,
        send_timestamp: u32,
    ) -> Self {
        let mut type_and_crc_flag = packet_type as u8 & TYPE_MASK;
        if has_crc {
            type_and_crc_flag |= HAS_CRC_BIT;
        }
        Self {
            type_and_crc_flag,
            retransmit_count: 0,
            src_connection_id,
            dst_connection_id,
            channel_id,
            fragment_id: fragment_id.to_le_bytes(),
            packet_id: packet_id.to_le_bytes(),
            send_timestamp: send_timestamp.to_le_bytes(),
        }
    }

    /// Parse a header from the front of `bytes`. Does not consume trailing
    /// body bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes).map_err(|_err| {
            ProtocolError::PacketTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;
        let type_value = header.type_and_crc_flag & TYPE_MASK;
        if type_value >= PacketType::MAX_EXCLUSIVE {
            return Err(ProtocolError::UnknownPacketType(type_value));
        }
        Ok(*header)
    }

    /// Serialize to the fixed 13-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(&self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Whether a CRC-32C trailer follows the body.
    #[must_use]
    pub fn has_crc(&self) -> bool {
        self.type_and_crc_flag & HAS_CRC_BIT != 0
    }

    /// Set the CRC-present flag.
    pub fn set_has_crc(&mut self, has_crc: bool) {
        if has_crc {
            self.type_and_crc_flag |= HAS_CRC_BIT;
        } else {
            self.type_and_crc_flag &= !HAS_CRC_BIT;
        }
    }

    /// The packet type. Parsed headers are always within range, so this
    /// only panics on a header hand-built from raw fields, which `new`
    /// prevents.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        #[allow(clippy::expect_used)]
        PacketType::from_u8(self.type_and_crc_flag & TYPE_MASK)
            .expect("header type validated at construction or parse time")
    }

    /// Overwrite the packet type in place (used when re-tagging a fragment
    /// as `*Frag` after the head packet has been built).
    pub fn set_packet_type(&mut self, packet_type: PacketType) {
        let has_crc = self.type_and_crc_flag & HAS_CRC_BIT;
        self.type_and_crc_flag = has_crc | (packet_type as u8 & TYPE_MASK);
    }

    /// Number of times this packet has been retransmitted.
    #[must_use]
    pub fn retransmit_count(&self) -> u8 {
        self.retransmit_count
    }

    /// Set the retransmit counter.
    pub fn set_retransmit_count(&mut self, count: u8) {
        self.retransmit_count = count;
    }

    /// This session's connection id as seen by the peer.
    #[must_use]
    pub fn src_connection_id(&self) -> u8 {
        self.src_connection_id
    }

    /// The peer's connection id.
    #[must_use]
    pub fn dst_connection_id(&self) -> u8 {
        self.dst_connection_id
    }

    /// The channel this packet is addressed to.
    #[must_use]
    pub fn channel_id(&self) -> u8 {
        self.channel_id
    }

    /// Head-of-frame fragment count, or this fragment's 0-based index.
    #[must_use]
    pub fn fragment_id(&self) -> i16 {
        i16::from_le_bytes(self.fragment_id)
    }

    /// Set the fragment id field.
    pub fn set_fragment_id(&mut self, fragment_id: i16) {
        self.fragment_id = fragment_id.to_le_bytes();
    }

    /// 16-bit sequence number, unique (mod 2^16) within the channel.
    #[must_use]
    pub fn packet_id(&self) -> u16 {
        u16::from_le_bytes(self.packet_id)
    }

    /// Set the packet-id field.
    pub fn set_packet_id(&mut self, packet_id: u16) {
        self.packet_id = packet_id.to_le_bytes();
    }

    /// Monotonic send timestamp, units = seconds*65536 + nanos*65536/1e9.
    #[must_use]
    pub fn send_timestamp(&self) -> u32 {
        u32::from_le_bytes(self.send_timestamp)
    }

    /// Set the send-timestamp field.
    pub fn set_send_timestamp(&mut self, timestamp: u32) {
        self.send_timestamp = timestamp.to_le_bytes();
    }
}

// `#[repr(packed)]` forbids deriving Debug/PartialEq (references to
// misaligned fields); implement them by hand over the accessor values.
impl std::fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHeader")
            .field("has_crc", &self.has_crc())
            .field("type", &self.packet_type())
            .field("retransmit_count", &self.retransmit_count())
            .field("src_connection_id", &self.src_connection_id())
            .field("dst_connection_id", &self.dst_connection_id())
            .field("channel_id", &self.channel_id())
            .field("fragment_id", &self.fragment_id())
            .field("packet_id", &self.packet_id())
            .field("send_timestamp", &self.send_timestamp())
            .finish()
    }
}

impl PartialEq for PacketHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PacketHeader {}
