//! Pre-session discovery broadcast client (spec.md §6, "external
//! collaborator... described at interface level only").
//!
//! Broadcasts a `PingRequest`-carrying [`BroadcastDatagram`] to
//! [`ihs_proto::discovery::BROADCAST_PORT`] and turns replies into
//! [`HostInfo`] handed to a [`DiscoveryCallbacks::discovered`] sink. This is
//! deliberately thin: spec.md's Non-goals exclude the full
//! discovery/authorization/streaming-request exchange (multi-round
//! ping/pong with backoff, device authorization, session-key negotiation);
//! only the broadcast framing that feeds the in-session discovery channel's
//! own wire types is implemented here.

use std::{
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use ihs_proto::discovery::{BROADCAST_PORT, BroadcastDatagram, BroadcastHeader, HostInfo, PingRequest};
use prost::Message as _;
use tracing::{debug, warn};

/// Sink for hosts discovered on the local network (spec.md §6
/// `discovery: discovered(host_info)`).
pub trait DiscoveryCallbacks: Send {
    /// A host answered a broadcast ping.
    fn discovered(&mut self, from: SocketAddr, host: &HostInfo) {
        let _ = (from, host);
    }
}

/// A no-op sink, used when a caller only wants to drive [`DiscoveryClient`]
/// manually via [`DiscoveryClient::recv_once`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiscoveryCallbacks;

impl DiscoveryCallbacks for NullDiscoveryCallbacks {}

/// Broadcasts discovery pings and parses host replies on a dedicated UDP
/// socket, independent of the in-session socket a connected [`crate::IhsClient`]
/// uses.
pub struct DiscoveryClient {
    socket: UdpSocket,
    client_id: u32,
    instance_id: u32,
    sequence: u32,
}

impl DiscoveryClient {
    /// Bind an ephemeral broadcast-capable socket. `client_id`/`instance_id`
    /// are echoed in every [`BroadcastHeader`] this client sends, letting a
    /// host distinguish multiple client instances on the same machine.
    pub fn bind(client_id: u32, instance_id: u32) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(Duration::from_millis(500)))?;
        Ok(Self { socket, client_id, instance_id, sequence: 0 })
    }

    /// Send one discovery broadcast to `broadcast_addr:`[`BROADCAST_PORT`].
    /// `seq_num` is incremented per request but, per spec.md §9, its value
    /// is not validated on replies.
    pub fn broadcast(&mut self, broadcast_addr: std::net::IpAddr) -> std::io::Result<()> {
        let header = BroadcastHeader { client_id: self.client_id, instance_id: self.instance_id, msg_type: 0 };
        let payload = PingRequest { sequence: self.sequence, packet_size_requested: 0 };
        self.sequence = self.sequence.wrapping_add(1);
        let datagram = BroadcastDatagram { header, payload: payload.encode_to_vec().into() };
        let wire = datagram.encode();
        self.socket.send_to(&wire, SocketAddr::new(broadcast_addr, BROADCAST_PORT))
    }

    /// Block for up to this socket's read timeout for one reply, decode it
    /// as a [`HostInfo`] and hand it to `callbacks`. Returns `true` if a
    /// host answered, `false` on a plain timeout.
    ///
    /// # Errors
    ///
    /// Propagates any socket error other than a timeout.
    pub fn recv_once(&self, callbacks: &mut dyn DiscoveryCallbacks) -> std::io::Result<bool> {
        let mut buf = [0u8; 2048];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                self.handle_datagram(&buf[..len], from, callbacks);
                Ok(true)
            }
            Err(err) if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn handle_datagram(&self, bytes: &[u8], from: SocketAddr, callbacks: &mut dyn DiscoveryCallbacks) {
        let datagram = match BroadcastDatagram::parse(bytes) {
            Ok(datagram) => datagram,
            Err(err) => {
                debug!(%err, "malformed discovery reply; dropping");
                return;
            }
        };
        match HostInfo::decode(&datagram.payload[..]) {
            Ok(host) => callbacks.discovered(from, &host),
            Err(err) => warn!(%err, "discovery reply did not decode as HostInfo"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Recording {
        hosts: Arc<Mutex<Vec<HostInfo>>>,
    }

    impl DiscoveryCallbacks for Recording {
        fn discovered(&mut self, _from: SocketAddr, host: &HostInfo) {
            #[allow(clippy::unwrap_used)]
            self.hosts.lock().unwrap().push(host.clone());
        }
    }

    #[test]
    fn broadcast_then_reply_round_trips_host_info() {
        let mut client = DiscoveryClient::bind(1, 2).expect("bind");
        let host_socket = UdpSocket::bind(("127.0.0.1", 0)).expect("bind host");
        host_socket.set_read_timeout(Some(Duration::from_secs(1))).expect("timeout");

        let client_addr = client.socket.local_addr().expect("local addr");
        let header = BroadcastHeader { client_id: 9, instance_id: 1, msg_type: 0 };
        let request = PingRequest { sequence: 0, packet_size_requested: 0 };
        let datagram = BroadcastDatagram { header, payload: request.encode_to_vec().into() };
        host_socket.send_to(&datagram.encode(), client_addr).expect("send request");

        let mut buf = [0u8; 1024];
        let (len, from) = client.socket.recv_from(&mut buf).expect("recv request");
        assert_eq!(from, host_socket.local_addr().expect("host addr"));
        let _ = &buf[..len];

        let reply_header = BroadcastHeader { client_id: 9, instance_id: 1, msg_type: 0 };
        let host_info = HostInfo { hostname: "steam-box".into(), steam_id: 42, is_streaming: false };
        let reply = BroadcastDatagram { header: reply_header, payload: host_info.encode_to_vec().into() };
        host_socket.send_to(&reply.encode(), client_addr).expect("send reply");

        let mut recorded = Recording::default();
        let hosts = recorded.hosts.clone();
        let got_one = client.recv_once(&mut recorded).expect("recv_once");
        assert!(got_one);
        #[allow(clippy::unwrap_used)]
        let hosts = hosts.lock().unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].hostname, "steam-box");
        assert_eq!(hosts[0].steam_id, 42);
    }

    #[test]
    fn recv_once_times_out_cleanly_with_no_traffic() {
        let client = DiscoveryClient::bind(1, 1).expect("bind");
        let mut callbacks = NullDiscoveryCallbacks;
        let got_one = client.recv_once(&mut callbacks).expect("recv_once");
        assert!(!got_one);
    }
}
