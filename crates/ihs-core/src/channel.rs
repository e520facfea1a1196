//! Channel framework: the trait every channel implements, and the shared
//! outbound plumbing (`ChannelIo`) that turns a frame body into packets on
//! the send queue (spec.md §4.4).

use std::sync::{
    Arc,
    atomic::{AtomicU16, Ordering},
};

use bytes::Bytes;
use ihs_proto::{Frame, Packet, PacketHeader, PacketType};

use crate::{connection::ConnectionState, retransmission::RetransmissionQueue, send_queue::SendQueue};

/// Well-known channel ids (spec.md §3 "Channel"). Data channels are
/// assigned by the host starting at [`FIRST_DATA_CHANNEL`].
pub mod ids {
    /// The discovery channel: connect handshake, ping, disconnect.
    pub const DISCOVERY: u8 = 0;
    /// The control channel: handshake, negotiation, keep-alive, input, HID.
    pub const CONTROL: u8 = 1;
    /// Reserved for host-reported statistics; not driven by this crate.
    pub const STATS: u8 = 2;
    /// First id a host may assign to a `Start*Data` channel.
    pub const FIRST_DATA_CHANNEL: u8 = 3;
}

/// Shared outbound plumbing every channel owns one of: a private
/// packet-id counter, and handles to the connection state, send queue and
/// retransmission queue every channel shares with its siblings.
#[derive(Clone)]
pub struct ChannelIo {
    channel_id: u8,
    next_packet_id: Arc<AtomicU16>,
    connection: Arc<ConnectionState>,
    send_queue: Arc<SendQueue>,
    retransmission: Arc<RetransmissionQueue>,
}

impl ChannelIo {
    /// Build the outbound handle for `channel_id`, sharing the session's
    /// connection state, send queue and retransmission queue.
    #[must_use]
    pub fn new(
        channel_id: u8,
        connection: Arc<ConnectionState>,
        send_queue: Arc<SendQueue>,
        retransmission: Arc<RetransmissionQueue>,
    ) -> Self {
        Self { channel_id, next_packet_id: Arc::new(AtomicU16::new(0)), connection, send_queue, retransmission }
    }

    /// This channel's id.
    #[must_use]
    pub fn channel_id(&self) -> u8 {
        self.channel_id
    }

    /// Construct a frame header addressed by this channel and reserve
    /// `fragment_count` consecutive outbound packet ids for it, returning
    /// the id of the first.
    fn reserve_packet_ids(&self, fragment_count: u16) -> u16 {
        self.next_packet_id.fetch_add(fragment_count.max(1), Ordering::Relaxed)
    }

    /// Build and enqueue the packets for a complete frame, splitting into
    /// fragments if the body doesn't fit in one packet (spec.md §4.4).
    /// `has_crc` controls whether a CRC-32C trailer is appended to each
    /// resulting packet.
    pub fn send_frame(&self, packet_type: PacketType, has_crc: bool, body: impl Into<Bytes>) {
        let body = body.into();
        let mtu = self.connection.mtu();
        let overhead = PacketHeader::SIZE + usize::from(has_crc) * 4;
        let max_body_per_packet = usize::from(mtu).saturating_sub(overhead).max(1);
        let fragment_count = body.len().div_ceil(max_body_per_packet).max(1);
        #[allow(clippy::cast_possible_truncation)]
        let head_packet_id = self.reserve_packet_ids(fragment_count as u16);

        let header = PacketHeader::new(
            packet_type,
            has_crc,
            self.connection.src_connection_id(),
            self.connection.dst_connection_id(),
            self.channel_id,
            0,
            head_packet_id,
            self.connection.timestamp_now(),
        );
        let frame = Frame::new(header, body);
        let reliable = packet_type.is_reliable();
        for packet in frame.into_packets(max_body_per_packet) {
            if reliable {
                self.retransmission.register(packet.clone(), std::time::Instant::now());
            }
            let _ = self.send_queue.push(packet, reliable);
        }
    }

    /// Send a bare, bodyless packet (e.g. discovery's `Disconnect`).
    pub fn send_bare(&self, packet_type: PacketType, has_crc: bool) {
        self.send_frame(packet_type, has_crc, Bytes::new());
    }

    /// Send a single `Unconnected` packet, optionally padded to an exact
    /// wire size (spec.md §4.1 "Pad-to", used by the discovery ping
    /// response to honor a requester's `packet_size_requested`).
    /// `Unconnected` packets never participate in reassembly or
    /// retransmission, so they bypass the frame/fragmentation path.
    pub fn send_unconnected(&self, has_crc: bool, body: impl Into<Bytes>, pad_to: Option<usize>) {
        let packet_id = self.reserve_packet_ids(1);
        let header = PacketHeader::new(
            PacketType::Unconnected,
            has_crc,
            self.connection.src_connection_id(),
            self.connection.dst_connection_id(),
            self.channel_id,
            0,
            packet_id,
            self.connection.timestamp_now(),
        );
        let mut packet = Packet { header, body: body.into() };
        if let Some(total_len) = pad_to {
            packet.pad_to(total_len);
        }
        let _ = self.send_queue.push(packet, false);
    }

    /// Send an `ACK` or `NACK` acknowledging `packet_id` on this channel.
    /// Acknowledgements are always single, unreliable packets.
    pub fn send_ack(&self, ack_type: PacketType, packet_id: u16) {
        debug_assert!(matches!(ack_type, PacketType::Ack | PacketType::Nack));
        let header = PacketHeader::new(
            ack_type,
            false,
            self.connection.src_connection_id(),
            self.connection.dst_connection_id(),
            self.channel_id,
            0,
            packet_id,
            self.connection.timestamp_now(),
        );
        let _ = self.send_queue.push(Packet { header, body: Bytes::new() }, false);
    }

    /// Cancel any pending retransmissions and coalesced send-queue entries
    /// for an id this channel's peer just acknowledged.
    pub fn acknowledge(&self, packet_id: u16) {
        self.send_queue.remove(self.channel_id, packet_id);
        self.retransmission.cancel_packet(self.channel_id, packet_id);
    }
}

/// Every channel implements this to receive dispatched packets and an
/// optional notification of its own removal (spec.md §4.4).
pub trait Channel: Send {
    /// The channel's own id, for logging and dispatch-table bookkeeping.
    fn channel_id(&self) -> u8;

    /// An inbound packet addressed to this channel. ACK/NACK packets are
    /// still routed here (in addition to the session-level
    /// retransmission-queue notification) so a channel may react to them
    /// if it cares.
    fn received(&mut self, packet: Packet);

    /// The channel is being torn down (session disconnect or explicit
    /// `Stop*Data`). Default no-op.
    fn stopped(&mut self) {}
}

/// Cancel the retransmission entry a received `ACK`/`NACK` packet refers
/// to, and remove the matching send-queue item. Shared by every channel's
/// `received` dispatch since ACK/NACK handling is identical everywhere
/// (spec.md §4.4: "ACKs and NACKs on any channel additionally notify the
/// retransmission subsystem").
pub fn handle_ack_or_nack(io: &ChannelIo, packet: &Packet) -> bool {
    match packet.header.packet_type() {
        PacketType::Ack | PacketType::Nack => {
            io.acknowledge(packet.header.packet_id());
            true
        }
        _ => false,
    }
}
