//! The outbound send queue: a bounded, mutex-guarded collection of packets
//! awaiting transmission, coalesced by (channel id, packet id) and resent on
//! a fixed cadence until acknowledged or capped (spec.md §4.9).
//!
//! This module has no knowledge of sockets; [`SendQueue::flush`] hands each
//! ready packet's serialized bytes to a caller-supplied closure so
//! `ihs-client` can drive it from its send thread.

use std::{
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use ihs_proto::Packet;
use tracing::trace;

/// How long a sent item waits before it's eligible to be resent
/// (`IHS_SessionSendQueuePopBackoff`-equivalent in spec.md §4.9).
const RESEND_INTERVAL: Duration = Duration::from_millis(100);

/// Attempts beyond which a still-unacknowledged, retransmit-marked item is
/// dropped from the queue (spec.md §4.9: "its `retransmit_count > 10`").
const MAX_SEND_QUEUE_ATTEMPTS: u8 = 10;

/// One packet awaiting (re)transmission.
struct SendQueueItem {
    channel_id: u8,
    packet_id: u16,
    packet: Packet,
    /// `None` until the item has been sent at least once.
    next_send: Option<Instant>,
    retransmit: bool,
    attempts: u8,
}

/// Bounded, coalescing outbound packet queue shared between whichever
/// channel produced a frame and the send thread that drains it.
pub struct SendQueue {
    capacity: usize,
    state: Mutex<Vec<SendQueueItem>>,
    ready: Condvar,
}

/// The queue is at capacity and the new item doesn't match an existing one
/// to coalesce into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendQueueFull {
    /// Configured capacity.
    pub capacity: usize,
}

impl SendQueue {
    /// Build an empty queue bounded to `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity, state: Mutex::new(Vec::with_capacity(capacity)), ready: Condvar::new() }
    }

    /// Append a packet for transmission. `retransmit` marks it for
    /// automatic resend until acked or capped; packets for unreliable
    /// frame types should pass `false`.
    ///
    /// Duplicates (same channel id + packet id) silently replace the
    /// existing entry rather than growing the queue, matching spec.md's
    /// "duplicates... are silently coalesced".
    ///
    /// # Errors
    ///
    /// Returns [`SendQueueFull`] if the queue is already at capacity and
    /// this isn't a coalescing update.
    pub fn push(&self, packet: Packet, retransmit: bool) -> Result<(), SendQueueFull> {
        let channel_id = packet.header.channel_id();
        let packet_id = packet.header.packet_id();
        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();

        if let Some(existing) =
            state.iter_mut().find(|item| item.channel_id == channel_id && item.packet_id == packet_id)
        {
            existing.packet = packet;
            existing.retransmit = retransmit;
            existing.next_send = None;
            existing.attempts = 0;
        } else {
            if state.len() >= self.capacity {
                return Err(SendQueueFull { capacity: self.capacity });
            }
            state.push(SendQueueItem {
                channel_id,
                packet_id,
                packet,
                next_send: None,
                retransmit,
                attempts: 0,
            });
        }
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Remove the item matching `channel_id`/`packet_id`, if any — used when
    /// an ACK or NACK arrives for it (spec.md §4.9: "ACK / NACK reception
    /// removes the matching send-queue item... immediately").
    pub fn remove(&self, channel_id: u8, packet_id: u16) {
        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();
        state.retain(|item| !(item.channel_id == channel_id && item.packet_id == packet_id));
    }

    /// Block until at least one item has been pushed, or `timeout` elapses.
    pub fn wait_for_work(&self, timeout: Duration) {
        #[allow(clippy::unwrap_used)]
        let state = self.state.lock().unwrap();
        if state.is_empty() {
            #[allow(clippy::unwrap_used)]
            let _state = self.ready.wait_timeout(state, timeout).unwrap();
        }
    }

    /// Serialize and hand off every item due for (re)transmission to
    /// `send`, then reschedule or evict it per spec.md §4.9.
    ///
    /// `send` is called with the fully serialized wire bytes and the
    /// packet's destination-agnostic header (the caller supplies the
    /// destination address, since the queue doesn't know it).
    pub fn flush(&self, now: Instant, timestamp: u32, mut send: impl FnMut(&Packet)) {
        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();
        let mut index = 0;
        while index < state.len() {
            let due = state[index].next_send.is_none_or(|next| next <= now);
            if due {
                let item = &mut state[index];
                item.packet.header.set_send_timestamp(timestamp);
                item.packet.header.set_retransmit_count(item.attempts);
                send(&item.packet);
                item.next_send = Some(now + RESEND_INTERVAL);
                item.attempts = item.attempts.saturating_add(1);
                trace!(
                    channel_id = item.channel_id,
                    packet_id = item.packet_id,
                    attempts = item.attempts,
                    "flushed send-queue item"
                );
                if !item.retransmit || item.attempts > MAX_SEND_QUEUE_ATTEMPTS {
                    state.remove(index);
                    continue;
                }
            }
            index += 1;
        }
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        self.state.lock().unwrap().len()
    }

    /// True if the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use ihs_proto::{PacketHeader, PacketType};

    use super::*;

    fn packet(channel_id: u8, packet_id: u16) -> Packet {
        Packet {
            header: PacketHeader::new(PacketType::Reliable, false, 1, 2, channel_id, 0, packet_id, 0),
            body: b"body".to_vec().into(),
        }
    }

    #[test]
    fn push_then_flush_sends_once() {
        let queue = SendQueue::new(16);
        queue.push(packet(1, 5), false).expect("push");
        let mut sent = Vec::new();
        queue.flush(Instant::now(), 0, |packet| sent.push(packet.header.packet_id()));
        assert_eq!(sent, vec![5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn retransmit_marked_items_survive_a_flush() {
        let queue = SendQueue::new(16);
        queue.push(packet(1, 5), true).expect("push");
        let mut sent = 0;
        queue.flush(Instant::now(), 0, |_| sent += 1);
        assert_eq!(sent, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn duplicate_push_coalesces_rather_than_growing() {
        let queue = SendQueue::new(2);
        queue.push(packet(1, 5), true).expect("push");
        queue.push(packet(1, 5), true).expect("push coalesces");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn capacity_is_enforced_for_distinct_items() {
        let queue = SendQueue::new(1);
        queue.push(packet(1, 5), true).expect("first fits");
        let result = queue.push(packet(1, 6), true);
        assert_eq!(result, Err(SendQueueFull { capacity: 1 }));
    }

    #[test]
    fn remove_drops_the_matching_item() {
        let queue = SendQueue::new(16);
        queue.push(packet(1, 5), true).expect("push");
        queue.remove(1, 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn exceeding_max_attempts_evicts_the_item() {
        let queue = SendQueue::new(16);
        queue.push(packet(1, 5), true).expect("push");
        let mut now = Instant::now();
        for _ in 0..=MAX_SEND_QUEUE_ATTEMPTS {
            queue.flush(now, 0, |_| {});
            now += RESEND_INTERVAL;
        }
        assert!(queue.is_empty());
    }
}
