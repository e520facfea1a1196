//! The discovery channel (id 0): the connect handshake's `ConnectAck`,
//! in-session ping/pong, and the `Disconnect` teardown signal
//! (spec.md §4.5).

use std::sync::Arc;

use ihs_proto::{
    PacketHeader, PacketType,
    discovery::{EUnconnectedMsg, PingRequest, PingResponse, UnconnectedMessage},
};
use tracing::{debug, warn};

use crate::{
    channel::{Channel, ChannelIo, handle_ack_or_nack, ids},
    connection::ConnectionState,
    events::{EventSink, SessionEvent},
};

/// CRC-32C of the literal ASCII `"Connect"`, the fixed body of the initial
/// `Connect` packet (spec.md §8 "Connect handshake").
pub const CONNECT_BODY: [u8; 4] = [0xC7, 0x3D, 0x8F, 0x3C];

/// Discovery channel: adopts the host's connection id on `ConnectAck`,
/// answers `PingRequest`s, and reacts to `Disconnect`.
pub struct DiscoveryChannel {
    io: ChannelIo,
    connection: Arc<ConnectionState>,
    events: Arc<EventSink>,
}

impl DiscoveryChannel {
    /// Build the discovery channel over shared outbound plumbing.
    #[must_use]
    pub fn new(io: ChannelIo, connection: Arc<ConnectionState>, events: Arc<EventSink>) -> Self {
        debug_assert_eq!(io.channel_id(), ids::DISCOVERY);
        Self { io, connection, events }
    }

    /// Send the initial `Connect` packet that opens the session
    /// (spec.md §3 "Lifecycle": "`connect` ... enqueues a connect packet").
    pub fn send_connect(&self) {
        self.io.send_frame(PacketType::Connect, true, &CONNECT_BODY[..]);
    }

    /// Send the `Disconnect` packet that starts session teardown
    /// (spec.md §3 "Lifecycle").
    pub fn send_disconnect(&self) {
        self.io.send_bare(PacketType::Disconnect, false);
    }

    fn handle_connect_ack(&self, packet: &ihs_proto::Packet) {
        let host_connection_id = packet.header.src_connection_id();
        self.connection.set_dst_connection_id(host_connection_id);
        debug!(host_connection_id, "adopted host connection id from ConnectAck");
        self.events.push(SessionEvent::ConnectAckReceived);
    }

    fn handle_unconnected(&self, packet: &ihs_proto::Packet) {
        let message = match UnconnectedMessage::parse(&packet.body) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "malformed Unconnected packet body; dropping");
                return;
            }
        };
        match message.message_id {
            EUnconnectedMsg::PingRequest => self.handle_ping_request(packet, &message),
            EUnconnectedMsg::PingResponse => {
                debug!("ignoring unsolicited PingResponse");
            }
            EUnconnectedMsg::Other(id) => {
                debug!(message_id = id, "ignoring unknown discovery message id");
            }
        }
    }

    fn handle_ping_request(
        &self,
        packet: &ihs_proto::Packet,
        message: &UnconnectedMessage,
    ) {
        let request: PingRequest = match message.decode_as("PingRequest") {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "malformed PingRequest; dropping");
                return;
            }
        };
        #[allow(clippy::cast_possible_truncation)]
        let packet_size_received = (PacketHeader::SIZE + packet.body.len()) as u32;
        let response = PingResponse { sequence: request.sequence, packet_size_received };
        let response_message = UnconnectedMessage::encode(EUnconnectedMsg::PingResponse, &response);
        let requested_size = request.packet_size_requested as usize;
        self.io.send_unconnected(true, response_message.to_bytes(), Some(requested_size));
    }

    fn handle_disconnect(&self) {
        debug!("peer disconnected");
        self.events.push(SessionEvent::Disconnected);
    }
}

impl Channel for DiscoveryChannel {
    fn channel_id(&self) -> u8 {
        ids::DISCOVERY
    }

    fn received(&mut self, packet: ihs_proto::Packet) {
        if handle_ack_or_nack(&self.io, &packet) {
            return;
        }
        match packet.header.packet_type() {
            PacketType::ConnectAck => self.handle_connect_ack(&packet),
            PacketType::Unconnected => self.handle_unconnected(&packet),
            PacketType::Disconnect => self.handle_disconnect(),
            other => warn!(?other, "unexpected packet type on discovery channel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ihs_proto::{Packet, discovery::BROADCAST_PORT};

    use super::*;
    use crate::{retransmission::RetransmissionQueue, send_queue::SendQueue};

    fn channel() -> (DiscoveryChannel, Arc<SendQueue>, Arc<EventSink>) {
        let connection = Arc::new(ConnectionState::new());
        let send_queue = Arc::new(SendQueue::new(64));
        let retransmission = Arc::new(RetransmissionQueue::new());
        let events = Arc::new(EventSink::new());
        let io = ChannelIo::new(ids::DISCOVERY, connection.clone(), send_queue.clone(), retransmission);
        (DiscoveryChannel::new(io, connection, events.clone()), send_queue, events)
    }

    #[test]
    fn connect_ack_adopts_host_connection_id_and_emits_event() {
        let (mut channel, _send_queue, events) = channel();
        let ack = Packet {
            header: PacketHeader::new(PacketType::ConnectAck, false, 9, 0, ids::DISCOVERY, 0, 0, 0),
            body: Default::default(),
        };
        channel.received(ack);
        assert_eq!(channel.connection.dst_connection_id(), 9);
        let drained = events.drain();
        assert!(matches!(drained[0], SessionEvent::ConnectAckReceived));
    }

    #[test]
    fn ping_request_produces_padded_response() {
        let (mut channel, send_queue, _events) = channel();
        let request = PingRequest { sequence: 12_345_678, packet_size_requested: 1540 };
        let message = UnconnectedMessage::encode(EUnconnectedMsg::PingRequest, &request);
        let body = message.to_bytes();
        let incoming = Packet {
            header: PacketHeader::new(PacketType::Unconnected, true, 0, 0, ids::DISCOVERY, 0, 0, 0),
            body: body.clone(),
        };
        let expected_received = (PacketHeader::SIZE + body.len()) as u32;
        channel.received(incoming);

        assert_eq!(send_queue.len(), 1);
        let mut wire_len = 0usize;
        let mut sequence = 0u32;
        let mut received = 0u32;
        send_queue.flush(std::time::Instant::now(), 0, |packet| {
            wire_len = packet.wire_len();
            let parsed = UnconnectedMessage::parse(&packet.body).expect("parses");
            let response: PingResponse = parsed.decode_as("PingResponse").expect("decodes");
            sequence = response.sequence;
            received = response.packet_size_received;
        });
        assert_eq!(wire_len, 1540);
        assert_eq!(sequence, 12_345_678);
        assert_eq!(received, expected_received);
    }

    #[test]
    fn disconnect_emits_event() {
        let (mut channel, _send_queue, events) = channel();
        let disconnect = Packet {
            header: PacketHeader::new(PacketType::Disconnect, false, 0, 0, ids::DISCOVERY, 0, 0, 0),
            body: Default::default(),
        };
        channel.received(disconnect);
        assert!(matches!(events.drain()[0], SessionEvent::Disconnected));
    }

    #[test]
    fn broadcast_port_constant_matches_spec() {
        assert_eq!(BROADCAST_PORT, 27036);
    }
}
