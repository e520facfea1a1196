//! The reassembly window: a fixed-capacity ring buffer of packets, keyed by
//! a tail position and 16-bit packet-id, that accumulates fragments until a
//! complete frame can be polled off the head.
//!
//! Ported from `IHS_SessionPacketsWindow` (`session/frame_window.c`). The
//! packet-id arithmetic is signed-16-bit and wraps exactly as the reference
//! does; the `head`/`tail` bookkeeping below uses unbounded `i64` counters
//! instead of replicating the reference's periodic `% capacity` folding of
//! `head` — the fold there exists only to keep a C `int` from growing
//! forever, and dropping it changes no observable behavior since `head` and
//! `tail` are only ever used via `% capacity` or via their difference.

use ihs_proto::{Frame, Packet, PacketType};

/// A packet arrived with an offset from the window's tail that exceeds the
/// available capacity. The session must treat this as fatal (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOverflow {
    /// The packet id that overflowed the window.
    pub packet_id: u16,
    /// The window's capacity.
    pub capacity: usize,
}

/// Result of [`ReassemblyWindow::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The packet was stored.
    Added,
    /// This exact packet (by id) is already the window's tail; a harmless
    /// duplicate of the most recent insert.
    AlreadyTail,
    /// The packet's offset places it behind the window's current size: it
    /// was already reassembled and polled out. Drop.
    Late,
    /// The packet's slot is already occupied by an earlier delivery of the
    /// same id. Drop.
    Duplicate,
}

/// Fixed-capacity packet reassembly window for one channel's reliable or
/// unreliable packet stream.
#[derive(Debug)]
pub struct ReassemblyWindow {
    capacity: usize,
    slots: Vec<Option<Packet>>,
    /// Logical head index; always `% capacity` before indexing `slots`.
    head: i64,
    /// Ring-buffer slot currently holding the most recent packet, or `-1`
    /// before the first packet ever arrives.
    tail: i64,
    /// 16-bit id of the packet stored at `tail`.
    tail_id: u16,
}

impl ReassemblyWindow {
    /// Construct an empty window. `capacity` is 128 for control/stats/
    /// discovery-adjacent channels, 1024 for data channels (spec.md §4.2).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self { capacity, slots: vec![None; capacity], head: 0, tail: -1, tail_id: 0 }
    }

    /// Number of packets currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.tail < 0 {
            return 0;
        }
        #[allow(clippy::cast_sign_loss)]
        let tail = self.tail as usize;
        let head_slot = self.head_slot();
        if tail + 1 >= head_slot {
            tail + 1 - head_slot
        } else {
            self.capacity - head_slot + tail + 1
        }
    }

    /// Free capacity remaining.
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity - self.size()
    }

    fn head_slot(&self) -> usize {
        #[allow(clippy::cast_sign_loss)]
        let head = self.head.rem_euclid(self.capacity as i64) as usize;
        head
    }

    /// Insert a packet. The offset of `packet`'s id from the window's
    /// current tail determines whether it lands ahead of the tail (and
    /// becomes the new tail), behind it but still in-window (a reordered
    /// packet for a slot not yet polled), or outside the window entirely.
    ///
    /// # Errors
    ///
    /// Returns [`WindowOverflow`] when the offset exceeds the window's free
    /// capacity; the caller must treat this as a fatal session error.
    pub fn add(&mut self, packet: Packet) -> Result<AddOutcome, WindowOverflow> {
        let packet_id = packet.header.packet_id();

        let tail_offset: i32 = if self.tail < 0 {
            1
        } else {
            i32::from(packet_id.wrapping_sub(self.tail_id) as i16)
        };

        if tail_offset == 0 {
            return Ok(AddOutcome::AlreadyTail);
        }

        let size = self.size();
        #[allow(clippy::cast_possible_wrap)]
        if tail_offset < 0 && -tail_offset > size as i32 {
            return Ok(AddOutcome::Late);
        }

        #[allow(clippy::cast_possible_wrap)]
        let available = self.available() as i32;
        if tail_offset > available {
            return Err(WindowOverflow { packet_id, capacity: self.capacity });
        }

        let base_tail = if self.tail < 0 { -1 } else { self.tail };
        let new_slot = (base_tail + i64::from(tail_offset)).rem_euclid(self.capacity as i64);
        #[allow(clippy::cast_sign_loss)]
        let new_slot_index = new_slot as usize;

        self.tail = new_slot;
        if self.slots[new_slot_index].is_some() {
            return Ok(AddOutcome::Duplicate);
        }
        self.slots[new_slot_index] = Some(packet);
        if tail_offset > 0 {
            self.tail_id = packet_id;
        }
        Ok(AddOutcome::Added)
    }

    /// If a complete frame is at the head of the window, remove its
    /// fragments and return the reassembled frame, advancing the head past
    /// it. Returns `None` if the head slot is empty or the frame isn't
    /// fully present yet.
    pub fn poll(&mut self) -> Option<Frame> {
        let size = self.size();
        if size == 0 {
            return None;
        }
        let head_slot = self.head_slot();
        let head_packet = self.slots[head_slot].as_ref()?;
        if !head_packet.header.packet_type().is_frame_head() {
            return None;
        }
        let total_fragments = head_packet.header.fragment_id();
        #[allow(clippy::cast_sign_loss)]
        let packets_count = if total_fragments <= 0 { 1 } else { total_fragments as usize };
        if size < packets_count {
            return None;
        }

        for offset in 0..packets_count {
            let idx = self.slot_at(offset);
            if self.slots[idx].is_none() {
                return None;
            }
        }

        let mut fragments = Vec::with_capacity(packets_count);
        for offset in 0..packets_count {
            let idx = self.slot_at(offset);
            #[allow(clippy::expect_used)]
            fragments.push(self.slots[idx].take().expect("presence checked above"));
        }

        let frame = Frame::reassemble(&fragments);
        self.head += i64::try_from(packets_count).unwrap_or(i64::MAX);
        frame
    }

    fn slot_at(&self, offset_from_head: usize) -> usize {
        let offset = i64::try_from(offset_from_head).unwrap_or(i64::MAX);
        #[allow(clippy::cast_sign_loss)]
        let idx = (self.head + offset).rem_euclid(self.capacity as i64) as usize;
        idx
    }

    /// Drop any head-of-frame packets older than `max_age` relative to the
    /// tail's send-timestamp, along with every fragment preceding the
    /// first retained frame. Returns the number of packets discarded.
    ///
    /// Used by the control channel to bound reassembly latency: a stalled
    /// fragment that will never complete must not block newer frames
    /// forever.
    #[must_use]
    pub fn discard_older_than(&mut self, max_age: u32) -> usize {
        let size = self.size();
        if size == 0 {
            return 0;
        }
        #[allow(clippy::cast_sign_loss)]
        let tail_idx = self.tail as usize;
        let Some(tail_packet) = self.slots[tail_idx].as_ref() else { return 0 };
        let tail_ts = tail_packet.header.send_timestamp();
        let Some(discard_before) = tail_ts.checked_sub(max_age) else { return 0 };

        let mut first_retained: Option<i64> = None;
        for offset in 0..size {
            let idx = self.slot_at(offset);
            let Some(packet) = self.slots[idx].as_ref() else { continue };
            if !packet.header.packet_type().is_frame_head() {
                continue;
            }
            if packet.header.send_timestamp() >= discard_before {
                first_retained = Some(self.head + i64::try_from(offset).unwrap_or(i64::MAX));
                break;
            }
        }

        let Some(first_retained) = first_retained else { return 0 };
        let mut discarded = 0usize;
        let mut cursor = self.head;
        while cursor < first_retained {
            #[allow(clippy::cast_sign_loss)]
            let idx = cursor.rem_euclid(self.capacity as i64) as usize;
            if self.slots[idx].take().is_some() {
                discarded += 1;
            }
            cursor += 1;
        }
        self.head = first_retained;
        discarded
    }
}

#[cfg(test)]
mod tests {
    use ihs_proto::PacketHeader;
    use proptest::prelude::*;

    use super::*;

    fn packet(packet_type: PacketType, fragment_id: i16, packet_id: u16, body: &[u8]) -> Packet {
        Packet {
            header: PacketHeader::new(packet_type, false, 1, 2, 1, fragment_id, packet_id, 0),
            body: body.to_vec().into(),
        }
    }

    #[test]
    fn reassembles_three_fragments_in_arrival_order() {
        let mut window = ReassemblyWindow::new(128);
        assert_eq!(
            window.add(packet(PacketType::Reliable, 3, 100, b"AAA")).expect("added"),
            AddOutcome::Added
        );
        assert_eq!(
            window.add(packet(PacketType::ReliableFrag, 1, 102, b"CCC")).expect("added"),
            AddOutcome::Added
        );
        assert_eq!(
            window.add(packet(PacketType::ReliableFrag, 0, 101, b"BBB")).expect("added"),
            AddOutcome::Added
        );

        let frame = window.poll().expect("complete frame");
        assert_eq!(&frame.body[..], b"AAABBBCCC");
        assert_eq!(window.size(), 0);
    }

    #[test]
    fn poll_returns_none_until_all_fragments_present() {
        let mut window = ReassemblyWindow::new(128);
        window.add(packet(PacketType::Reliable, 2, 10, b"AA")).expect("added");
        assert!(window.poll().is_none());
        window.add(packet(PacketType::ReliableFrag, 0, 11, b"BB")).expect("added");
        assert!(window.poll().is_some());
    }

    #[test]
    fn single_packet_frame_needs_no_further_fragments() {
        let mut window = ReassemblyWindow::new(128);
        window.add(packet(PacketType::Reliable, 0, 5, b"hello")).expect("added");
        let frame = window.poll().expect("complete");
        assert_eq!(&frame.body[..], b"hello");
    }

    #[test]
    fn late_packet_far_behind_the_tail_is_dropped() {
        let mut window = ReassemblyWindow::new(128);
        window.add(packet(PacketType::Reliable, 0, 0, b"a")).expect("added");
        window.poll().expect("complete");
        // Jump the tail far ahead in one step; the window now holds only
        // the packets from id 1..=50 as "present" (size 50).
        window.add(packet(PacketType::Reliable, 0, 50, b"b")).expect("added");
        // An id 51 ids behind the tail (wrapping u16 id 65535) is further
        // back than the window's current size and must be dropped as late.
        let outcome = window.add(packet(PacketType::Reliable, 0, 65535, b"ancient")).expect("ok");
        assert_eq!(outcome, AddOutcome::Late);
    }

    #[test]
    fn duplicate_of_the_tail_itself_is_reported_distinctly() {
        let mut window = ReassemblyWindow::new(128);
        let first = packet(PacketType::Reliable, 0, 5, b"a");
        window.add(first.clone()).expect("added");
        let outcome = window.add(first).expect("ok");
        assert_eq!(outcome, AddOutcome::AlreadyTail);
    }

    #[test]
    fn overflow_when_offset_exceeds_available_capacity() {
        let mut window = ReassemblyWindow::new(4);
        window.add(packet(PacketType::Reliable, 0, 0, b"a")).expect("added");
        // id jumps 5 ahead of the tail while the window only has 3 free
        // slots (capacity 4, one occupied): offset 5 > available 3.
        let result = window.add(packet(PacketType::Reliable, 0, 5, b"b"));
        assert_eq!(result, Err(WindowOverflow { packet_id: 5, capacity: 4 }));
    }

    #[test]
    fn reordered_fragment_still_within_window_is_stored_not_dropped() {
        let mut window = ReassemblyWindow::new(128);
        window.add(packet(PacketType::Reliable, 0, 0, b"z")).expect("added");
        window.poll().expect("complete");
        // Advance the tail far ahead...
        window.add(packet(PacketType::Reliable, 0, 10, b"later")).expect("added");
        // ...then deliver an older, still-unpolled id behind the tail.
        let outcome =
            window.add(packet(PacketType::Reliable, 0, 8, b"reordered")).expect("ok");
        assert_eq!(outcome, AddOutcome::Added);
    }

    #[test]
    fn discard_older_than_drops_stale_leading_frame() {
        let mut window = ReassemblyWindow::new(128);
        let mut stale = packet(PacketType::Reliable, 0, 0, b"stale");
        stale.header.set_send_timestamp(0);
        window.add(stale).expect("added");

        let mut fresh = packet(PacketType::Reliable, 0, 1, b"fresh");
        fresh.header.set_send_timestamp(1000);
        window.add(fresh).expect("added");

        let discarded = window.discard_older_than(100);
        assert_eq!(discarded, 1);
        let frame = window.poll().expect("fresh frame now at head");
        assert_eq!(&frame.body[..], b"fresh");
    }

    proptest! {
        #[test]
        fn monotonic_ids_always_reassemble_in_fifo_order(
            bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..8), 1..20),
        ) {
            let mut window = ReassemblyWindow::new(1024);
            let mut packet_id: u16 = 0;
            for body in &bodies {
                let pkt = packet(PacketType::Reliable, 0, packet_id, body);
                prop_assert_eq!(window.add(pkt).expect("within capacity"), AddOutcome::Added);
                packet_id = packet_id.wrapping_add(1);
            }
            for expected in &bodies {
                let frame = window.poll().expect("each frame complete");
                prop_assert_eq!(&frame.body[..], &expected[..]);
            }
            prop_assert_eq!(window.size(), 0);
        }
    }
}
