//! Frame: a logical protocol message, possibly split across several
//! packets that share a contiguous run of packet-ids.

use bytes::{Bytes, BytesMut};

use crate::{
    header::{PacketHeader, PacketType},
    packet::Packet,
};

/// A frame is the unfragmented unit channels operate on: a header (taken
/// from what will become the head packet) plus the concatenated body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header template; `fragment_id` and `packet_id` are overwritten by
    /// [`Frame::into_packets`] for each resulting packet.
    pub header: PacketHeader,
    /// Full, unfragmented body.
    pub body: Bytes,
}

impl Frame {
    /// Construct a frame from a header template and a body.
    #[must_use]
    pub fn new(header: PacketHeader, body: impl Into<Bytes>) -> Self {
        Self { header, body: body.into() }
    }

    /// Split this frame into one or more packets that fit within
    /// `max_body_per_packet` bytes each.
    ///
    /// Every fragment is given a distinct, consecutive `packet_id` starting
    /// at the frame header's own id — this is the corrected behavior
    /// `spec.md` calls for (the head packet's `fragment_id` carries the
    /// total fragment count; later fragments carry 0-based indices and are
    /// retagged to the `*Frag` packet type).
    #[must_use]
    pub fn into_packets(self, max_body_per_packet: usize) -> Vec<Packet> {
        debug_assert!(max_body_per_packet > 0);

        if self.body.len() <= max_body_per_packet {
            let mut header = self.header;
            header.set_fragment_id(0);
            return vec![Packet { header, body: self.body }];
        }

        let head_packet_id = self.header.packet_id();
        let total_fragments = self.body.len().div_ceil(max_body_per_packet);
        let frag_type = if self.header.packet_type().is_reliable() {
            PacketType::ReliableFrag
        } else {
            PacketType::UnreliableFrag
        };

        let mut packets = Vec::with_capacity(total_fragments);
        for (index, chunk) in self.body.chunks(max_body_per_packet).enumerate() {
            let mut header = self.header;
            header.set_packet_id(head_packet_id.wrapping_add(u16::try_from(index).unwrap_or(u16::MAX)));
            if index == 0 {
                #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                header.set_fragment_id(total_fragments as i16);
            } else {
                header.set_packet_type(frag_type);
                #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                header.set_fragment_id((index - 1) as i16);
            }
            packets.push(Packet { header, body: Bytes::copy_from_slice(chunk) });
        }
        packets
    }

    /// Reassemble a frame from its fragments, in order. The head packet's
    /// header becomes the frame's header. Panics-free: assumes the caller
    /// (the reassembly window) has already validated ordering and
    /// completeness.
    #[must_use]
    pub fn reassemble(fragments: &[Packet]) -> Option<Self> {
        let head = fragments.first()?;
        let mut body = BytesMut::with_capacity(fragments.iter().map(|p| p.body.len()).sum());
        for fragment in fragments {
            body.extend_from_slice(&fragment.body);
        }
        Some(Self { header: head.header, body: body.freeze() })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn single_packet_frame_keeps_fragment_id_zero() {
        let header = PacketHeader::new(PacketType::Reliable, false, 1, 2, 1, 0, 100, 0);
        let frame = Frame::new(header, Bytes::from_static(b"small"));
        let packets = frame.into_packets(1400);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header.fragment_id(), 0);
        assert_eq!(packets[0].header.packet_type(), PacketType::Reliable);
    }

    #[test]
    fn fragmented_frame_uses_distinct_consecutive_packet_ids() {
        let header = PacketHeader::new(PacketType::Reliable, false, 1, 2, 1, 0, 100, 0);
        let body = vec![0xABu8; 250];
        let frame = Frame::new(header, body);
        let packets = frame.into_packets(100);

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].header.packet_id(), 100);
        assert_eq!(packets[1].header.packet_id(), 101);
        assert_eq!(packets[2].header.packet_id(), 102);

        assert_eq!(packets[0].header.fragment_id(), 3);
        assert_eq!(packets[0].header.packet_type(), PacketType::Reliable);
        assert_eq!(packets[1].header.fragment_id(), 0);
        assert_eq!(packets[1].header.packet_type(), PacketType::ReliableFrag);
        assert_eq!(packets[2].header.fragment_id(), 1);
        assert_eq!(packets[2].header.packet_type(), PacketType::ReliableFrag);
    }

    #[test]
    fn reassemble_concatenates_bodies_in_order() {
        let header = PacketHeader::new(PacketType::Reliable, false, 1, 2, 1, 3, 100, 0);
        let packets = vec![
            Packet { header, body: Bytes::from_static(b"AAA") },
            Packet {
                header: PacketHeader::new(PacketType::ReliableFrag, false, 1, 2, 1, 0, 101, 0),
                body: Bytes::from_static(b"BBB"),
            },
            Packet {
                header: PacketHeader::new(PacketType::ReliableFrag, false, 1, 2, 1, 1, 102, 0),
                body: Bytes::from_static(b"CCC"),
            },
        ];
        let frame = Frame::reassemble(&packets).expect("non-empty");
        assert_eq!(&frame.body[..], b"AAABBBCCC");
        assert_eq!(frame.header.packet_id(), 100);
    }

    proptest! {
        #[test]
        fn fragmentation_round_trips_through_reassembly(
            body in prop::collection::vec(any::<u8>(), 0..3000),
            max_body in 1usize..600,
        ) {
            let header = PacketHeader::new(PacketType::Reliable, false, 1, 2, 1, 0, 42, 0);
            let frame = Frame::new(header, body.clone());
            let packets = frame.into_packets(max_body);
            let reassembled = Frame::reassemble(&packets).expect("non-empty");
            prop_assert_eq!(&reassembled.body[..], &body[..]);
        }
    }
}
