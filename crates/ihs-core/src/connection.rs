//! Shared connection-identity state: the connection ids and MTU every
//! channel needs in order to address an outbound frame (spec.md §3
//! "Session": "run state (`connection_id`, `host_connection_id`, `mtu`)").

use std::{
    sync::atomic::{AtomicU16, AtomicU8, Ordering},
    time::Instant,
};

/// Default MTU assumed before the server handshake reports one
/// (`ServerHandshake.mtu`), chosen to fit comfortably under a standard
/// Ethernet frame.
pub const DEFAULT_MTU: u16 = 1400;

/// Connection ids and MTU, shared by every channel via `Arc`. Updated once
/// by the discovery channel (on `ConnectAck`) and the control channel (on
/// `ServerHandshake`), read by every channel on every outbound frame.
pub struct ConnectionState {
    src_connection_id: AtomicU8,
    dst_connection_id: AtomicU8,
    mtu: AtomicU16,
    started_at: Instant,
}

impl ConnectionState {
    /// Construct state with connection ids not yet assigned (`0`) and the
    /// default MTU.
    #[must_use]
    pub fn new() -> Self {
        Self {
            src_connection_id: AtomicU8::new(0),
            dst_connection_id: AtomicU8::new(0),
            mtu: AtomicU16::new(DEFAULT_MTU),
            started_at: Instant::now(),
        }
    }

    /// This session's own connection id, as assigned by the host in its
    /// `ConnectAck`'s `dst_connection_id`.
    #[must_use]
    pub fn src_connection_id(&self) -> u8 {
        self.src_connection_id.load(Ordering::Relaxed)
    }

    /// Set this session's connection id.
    pub fn set_src_connection_id(&self, id: u8) {
        self.src_connection_id.store(id, Ordering::Relaxed);
    }

    /// The host's connection id, adopted from `ConnectAck.src_connection_id`.
    #[must_use]
    pub fn dst_connection_id(&self) -> u8 {
        self.dst_connection_id.load(Ordering::Relaxed)
    }

    /// Set the host's connection id.
    pub fn set_dst_connection_id(&self, id: u8) {
        self.dst_connection_id.store(id, Ordering::Relaxed);
    }

    /// Negotiated MTU (`ServerHandshake.mtu`), or [`DEFAULT_MTU`] before
    /// the handshake completes.
    #[must_use]
    pub fn mtu(&self) -> u16 {
        self.mtu.load(Ordering::Relaxed)
    }

    /// Set the negotiated MTU.
    pub fn set_mtu(&self, mtu: u16) {
        self.mtu.store(mtu, Ordering::Relaxed);
    }

    /// 32-bit monotonic send timestamp: `seconds*65536 + nanos*65536/1e9`,
    /// measured from when this `ConnectionState` was constructed
    /// (spec.md §3 "Packet": `send_timestamp`).
    #[must_use]
    pub fn timestamp_now(&self) -> u32 {
        let elapsed = self.started_at.elapsed();
        #[allow(clippy::cast_possible_truncation)]
        let seconds_part = (elapsed.as_secs() as u32).wrapping_mul(65536);
        #[allow(clippy::cast_possible_truncation)]
        let nanos_part = ((u64::from(elapsed.subsec_nanos()) * 65536) / 1_000_000_000) as u32;
        seconds_part.wrapping_add(nanos_part)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
