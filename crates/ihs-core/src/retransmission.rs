//! The retransmission manager: a bounded FIFO of reliable packets, each
//! resubmitted to the [`crate::send_queue::SendQueue`] at a fixed interval
//! until acknowledged or exhausted (spec.md §4.9).
//!
//! This is distinct from (and layered on top of) the send queue's own
//! 100-unit resend cadence: the send queue keeps resending a still-present
//! item on every flush, while this manager is the bound on how long a
//! packet stays eligible for that at all — once `MAX_ATTEMPTS` timed
//! retransmissions have fired, the packet is evicted here *and* from the
//! send queue, and reliable delivery is no longer guaranteed for it
//! (spec.md §7, "Retransmit exhaustion").

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use ihs_proto::Packet;
use tracing::{trace, warn};

use crate::send_queue::SendQueue;

/// Interval between timed retransmission attempts.
const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum number of timed retransmission attempts before a packet is
/// dropped from the queue (spec.md §4.9: "Limit: 20 attempts").
pub const MAX_ATTEMPTS: u8 = 20;

/// Identifies a pending retransmission: channel, packet id and fragment id
/// together uniquely key a single outstanding packet (spec.md §3
/// "Retransmission item").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetransmitKey {
    /// Channel the packet was sent on.
    pub channel_id: u8,
    /// The packet's sequence number.
    pub packet_id: u16,
    /// The packet's fragment index (or total-fragment-count, for a head).
    pub fragment_id: i16,
}

struct PendingRetransmission {
    key: RetransmitKey,
    packet: Packet,
    attempts: u8,
    next_fire: Instant,
}

/// Timed resend queue, independent of the send queue's own item list.
pub struct RetransmissionQueue {
    items: Mutex<Vec<PendingRetransmission>>,
}

impl RetransmissionQueue {
    /// Construct an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Mutex::new(Vec::new()) }
    }

    /// Register `packet` for timed retransmission, starting one interval
    /// from `now`.
    pub fn register(&self, packet: Packet, now: Instant) {
        let key = RetransmitKey {
            channel_id: packet.header.channel_id(),
            packet_id: packet.header.packet_id(),
            fragment_id: packet.header.fragment_id(),
        };
        #[allow(clippy::unwrap_used)]
        let mut items = self.items.lock().unwrap();
        items.retain(|item| item.key != key);
        items.push(PendingRetransmission { key, packet, attempts: 0, next_fire: now + RETRANSMIT_INTERVAL });
    }

    /// Cancel a pending retransmission, matching by channel/packet/fragment
    /// id. Called when the corresponding ACK/NACK arrives (spec.md §4.9).
    pub fn cancel(&self, key: RetransmitKey) {
        #[allow(clippy::unwrap_used)]
        let mut items = self.items.lock().unwrap();
        items.retain(|item| item.key != key);
    }

    /// Cancel every pending retransmission on `channel_id` whose packet id
    /// matches, regardless of fragment id (ACK/NACK only name a packet id).
    pub fn cancel_packet(&self, channel_id: u8, packet_id: u16) {
        #[allow(clippy::unwrap_used)]
        let mut items = self.items.lock().unwrap();
        items.retain(|item| !(item.key.channel_id == channel_id && item.key.packet_id == packet_id));
    }

    /// Resubmit every item due at `now` to `send_queue`, advancing its
    /// schedule or evicting it once [`MAX_ATTEMPTS`] is exceeded.
    pub fn tick(&self, now: Instant, send_queue: &SendQueue) {
        #[allow(clippy::unwrap_used)]
        let mut items = self.items.lock().unwrap();
        items.retain_mut(|item| {
            if item.next_fire > now {
                return true;
            }
            item.attempts += 1;
            if item.attempts > MAX_ATTEMPTS {
                warn!(
                    channel_id = item.key.channel_id,
                    packet_id = item.key.packet_id,
                    "retransmission exhausted; reliable delivery not guaranteed"
                );
                return false;
            }
            trace!(
                channel_id = item.key.channel_id,
                packet_id = item.key.packet_id,
                attempts = item.attempts,
                "timed retransmission"
            );
            if send_queue.push(item.packet.clone(), true).is_err() {
                warn!(
                    channel_id = item.key.channel_id,
                    packet_id = item.key.packet_id,
                    "send queue full; dropping scheduled retransmission"
                );
            }
            item.next_fire = now + RETRANSMIT_INTERVAL;
            true
        });
    }

    /// Number of packets currently pending retransmission.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        self.items.lock().unwrap().len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RetransmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}
