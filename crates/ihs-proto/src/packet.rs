//! Packet: a 13-byte header plus a body, with an optional CRC-32C trailer.

use bytes::{Bytes, BytesMut};

use crate::{
    crc::crc32c,
    errors::{ProtocolError, Result},
    header::PacketHeader,
};

/// Byte used to pad a packet body up to a requested total size
/// (`IHS_SessionPacketPadTo`'s filler byte).
pub const PAD_FILLER: u8 = 0xFE;

/// A single UDP-datagram-sized protocol unit: header plus body, with the
/// trailing CRC (if any) already verified and stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The 13-byte header.
    pub header: PacketHeader,
    /// Body bytes, excluding header and any CRC trailer.
    pub body: Bytes,
}

impl Packet {
    /// Parse a packet from a raw UDP datagram. Validates the CRC trailer
    /// when `has_crc` is set in the header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::from_bytes(bytes)?;
        let mut body_end = bytes.len();
        if header.has_crc() {
            if bytes.len() < PacketHeader::SIZE + 4 {
                return Err(ProtocolError::PacketTooShort {
                    expected: PacketHeader::SIZE + 4,
                    actual: bytes.len(),
                });
            }
            body_end -= 4;
            #[allow(clippy::expect_used)]
            let trailer_bytes: [u8; 4] =
                bytes[body_end..body_end + 4].try_into().expect("exactly 4 bytes sliced");
            let expected = u32::from_le_bytes(trailer_bytes);
            let actual = crc32c(&bytes[..body_end]);
            if expected != actual {
                return Err(ProtocolError::CrcMismatch { expected, actual });
            }
        }
        let body = Bytes::copy_from_slice(&bytes[PacketHeader::SIZE..body_end]);
        Ok(Self { header, body })
    }

    /// Serialize into `[header][body][crc32c, if has_crc]`.
    #[must_use]
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PacketHeader::SIZE + self.body.len() + 4);
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.body);
        if self.header.has_crc() {
            let crc = crc32c(&buf);
            buf.extend_from_slice(&crc.to_le_bytes());
        }
        buf.freeze()
    }

    /// Total size of this packet once serialized.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        PacketHeader::SIZE + self.body.len() + if self.header.has_crc() { 4 } else { 0 }
    }

    /// Pad the body with [`PAD_FILLER`] bytes until the serialized packet
    /// would be exactly `total_len` bytes. A no-op if already at or past
    /// that size.
    pub fn pad_to(&mut self, total_len: usize) {
        let overhead = PacketHeader::SIZE + if self.header.has_crc() { 4 } else { 0 };
        let Some(target_body_len) = total_len.checked_sub(overhead) else { return };
        if target_body_len <= self.body.len() {
            return;
        }
        let mut grown = BytesMut::from(&self.body[..]);
        grown.resize(target_body_len, PAD_FILLER);
        self.body = grown.freeze();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::header::PacketType;

    fn any_packet_type() -> impl Strategy<Value = PacketType> {
        (0u8..10).prop_map(|v| PacketType::from_u8(v).expect("in range"))
    }

    fn any_packet() -> impl Strategy<Value = Packet> {
        (
            any_packet_type(),
            any::<bool>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            any::<i16>(),
            any::<u16>(),
            any::<u32>(),
            prop::collection::vec(any::<u8>(), 0..1500),
        )
            .prop_map(|(ty, crc, src, dst, ch, frag, pid, ts, body)| Packet {
                header: PacketHeader::new(ty, crc, src, dst, ch, frag, pid, ts),
                body: Bytes::from(body),
            })
    }

    proptest! {
        #[test]
        fn packet_round_trip(packet in any_packet()) {
            let wire = packet.serialize();
            let parsed = Packet::parse(&wire).expect("should parse");
            prop_assert_eq!(parsed, packet);
        }

        #[test]
        fn crc_is_preserved_iff_has_crc(packet in any_packet()) {
            let wire = packet.serialize();
            prop_assert_eq!(wire.len(), packet.wire_len());
            let expected_trailer = packet.header.has_crc();
            prop_assert_eq!(wire.len() > PacketHeader::SIZE + packet.body.len(), expected_trailer);
        }
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let packet = Packet {
            header: PacketHeader::new(PacketType::Reliable, true, 1, 2, 0, 0, 5, 0),
            body: Bytes::from_static(b"hello"),
        };
        let mut wire = packet.serialize().to_vec();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        let result = Packet::parse(&wire);
        assert!(matches!(result, Err(ProtocolError::CrcMismatch { .. })));
    }

    #[test]
    fn pad_to_fills_with_0xfe() {
        let mut packet = Packet {
            header: PacketHeader::new(PacketType::Unconnected, true, 0, 0, 0, 0, 0, 0),
            body: Bytes::from_static(b"ab"),
        };
        packet.pad_to(1540);
        assert_eq!(packet.wire_len(), 1540);
        assert_eq!(&packet.body[2..], vec![PAD_FILLER; packet.body.len() - 2]);
    }

    #[test]
    fn pad_to_is_noop_when_already_large_enough() {
        let mut packet = Packet {
            header: PacketHeader::new(PacketType::Unconnected, false, 0, 0, 0, 0, 0, 0),
            body: Bytes::from(vec![1u8; 100]),
        };
        packet.pad_to(10);
        assert_eq!(packet.body.len(), 100);
    }
}
