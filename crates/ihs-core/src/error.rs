//! Session-layer error taxonomy (spec.md §7).
//!
//! Most of these are never surfaced to a caller: malformed packets and
//! crypto failures are silently dropped at the point they're detected
//! (logged via `tracing`, not propagated). `IhsError` exists for the
//! handful of cases that need an explicit `Result` — window overflow
//! (fatal, must disconnect) and the control-channel's own state-transition
//! checks.

use thiserror::Error;

/// Errors produced by session-state operations: reassembly, channel
/// dispatch, control-channel transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IhsError {
    /// A packet's offset from the reassembly window's tail exceeded its
    /// capacity. Fatal: the session must disconnect (spec.md §7).
    #[error(
        "reassembly window overflow on channel {channel_id}: packet {packet_id} exceeds capacity {capacity}"
    )]
    WindowOverflow {
        /// Channel the overflow occurred on.
        channel_id: u8,
        /// Packet id that overflowed the window.
        packet_id: u16,
        /// Window capacity.
        capacity: usize,
    },

    /// Wire-format decode failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ihs_proto::ProtocolError),

    /// AES/HMAC failure unrelated to the frame-decrypt sequence policy
    /// (which reports `HashMismatch`/`OldSequence` as data, not an error).
    #[error("crypto error: {0}")]
    Crypto(#[from] ihs_crypto::CryptoError),

    /// A control-channel message arrived in a state that doesn't expect it.
    #[error("unexpected control message in state {state}: {message}")]
    UnexpectedMessage {
        /// Current control-channel state, formatted for diagnostics.
        state: String,
        /// Description of the message that was rejected.
        message: String,
    },

    /// No channel is registered for the addressed id.
    #[error("unknown channel id: {0}")]
    UnknownChannel(u8),
}

impl IhsError {
    /// Whether this error is fatal to the session. Per spec.md §7, window
    /// overflow is the only fatal kind; everything else is locally
    /// recoverable (log and drop, or reject a single message).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WindowOverflow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_window_overflow_is_fatal() {
        assert!(
            IhsError::WindowOverflow { channel_id: 1, packet_id: 5, capacity: 128 }.is_fatal()
        );
        assert!(!IhsError::UnknownChannel(9).is_fatal());
        assert!(
            !IhsError::UnexpectedMessage { state: "Idle".into(), message: "KeepAlive".into() }
                .is_fatal()
        );
    }
}
