//! Cross-channel session events: channels push these onto a shared sink as
//! they process inbound packets, and the session drains the sink after
//! each dispatch to react (start the control handshake, spawn a data
//! channel, tear down on disconnect).
//!
//! This keeps channels from needing a back-reference to the session that
//! owns them — the alternative to the callback-context-with-void-pointer
//! pattern spec.md §9 calls out to redesign.

use std::{
    collections::VecDeque,
    sync::Mutex,
};

use ihs_proto::{
    control::{SetCursorImage, StartAudioData, StartVideoData},
    pb::hid::HidMessageToRemote,
};

/// Something a channel observed that the session (not the channel itself)
/// must act on.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The discovery channel adopted the host's connection id from
    /// `ConnectAck`; the control channel should start its handshake.
    ConnectAckReceived,
    /// The control channel received `ServerHandshake`; carries the
    /// negotiated MTU so the session can update shared connection state.
    ServerHandshakeReceived {
        /// Negotiated MTU.
        mtu: u16,
    },
    /// Negotiation completed; the session should start the keep-alive timer.
    NegotiationComplete,
    /// The host asked the client to spawn an audio data channel.
    StartAudioData(StartAudioData),
    /// The host asked the client to spawn a video data channel.
    StartVideoData(StartVideoData),
    /// The host asked the client to tear down the audio data channel.
    StopAudioData,
    /// The host asked the client to tear down the video data channel.
    StopVideoData,
    /// The host selected a cursor by id; the session asks the input
    /// callback whether it's already known.
    SetCursor {
        /// The selected cursor's id.
        cursor_id: u64,
    },
    /// The host says a cursor id is no longer valid.
    DeleteCursor {
        /// The forgotten cursor's id.
        cursor_id: u64,
    },
    /// Cursor pixel data for a previously unknown cursor.
    CursorImage(SetCursorImage),
    /// Reveal the cursor at a normalized position.
    ShowCursor {
        /// Normalized x in `0.0..=1.0`.
        x: f32,
        /// Normalized y in `0.0..=1.0`.
        y: f32,
    },
    /// Hide the cursor.
    HideCursor,
    /// HID traffic from the host, to be handled by the HID manager.
    RemoteHidFromHost(HidMessageToRemote),
    /// Either peer's `Disconnect` was observed; the session should stop.
    Disconnected,
}

/// Shared, mutex-guarded FIFO of [`SessionEvent`]s.
#[derive(Default)]
pub struct EventSink {
    queue: Mutex<VecDeque<SessionEvent>>,
}

impl EventSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }

    /// Push an event for the session to drain.
    pub fn push(&self, event: SessionEvent) {
        #[allow(clippy::unwrap_used)]
        self.queue.lock().unwrap().push_back(event);
    }

    /// Drain every pending event, in arrival order.
    pub fn drain(&self) -> Vec<SessionEvent> {
        #[allow(clippy::unwrap_used)]
        self.queue.lock().unwrap().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_events_in_push_order() {
        let sink = EventSink::new();
        sink.push(SessionEvent::ConnectAckReceived);
        sink.push(SessionEvent::NegotiationComplete);
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], SessionEvent::ConnectAckReceived));
        assert!(sink.drain().is_empty());
    }
}
