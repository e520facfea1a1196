//! User-facing callback contracts (spec.md §6).
//!
//! Modeled as traits with default no-op method bodies, the way a caller
//! would implement only the handlers it cares about. The session holds one
//! `Box<dyn Trait + Send>` per concern and invokes methods directly with
//! borrowed references — there's no intervening event enum, since the
//! session is both the one place that drives the protocol state machine and
//! the one place that owns these boxes. Audio and video are the exception:
//! each is handed off to its data channel's own worker thread (spec.md §5),
//! so those two are additionally wrapped in `Arc<Mutex<_>>`.

use std::sync::{Arc, Mutex};

use crate::config::SessionConfig;

/// Severity for [`LoggingCallbacks::log`], mirroring `tracing`'s levels so
/// a caller can forward straight into their own logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Fine-grained diagnostic detail (dropped packets, retries).
    Debug,
    /// Notable but expected (sequence jump, key-frame loss).
    Warn,
    /// Session-fatal or otherwise unexpected.
    Error,
}

/// Session lifecycle notifications.
pub trait SessionCallbacks: Send {
    /// The session object has been constructed.
    fn initialized(&mut self) {}
    /// The connect handshake has started.
    fn connecting(&mut self) {}
    /// Negotiation is about to start; the callback may adjust `config`
    /// (enable/disable audio, allow HEVC) before `NegotiationSetConfig` is
    /// sent.
    fn configuring(&mut self, config: &mut SessionConfig) {
        let _ = config;
    }
    /// Negotiation completed; the session is in steady state.
    fn connected(&mut self) {}
    /// The session has torn down, gracefully or otherwise.
    fn disconnected(&mut self) {}
    /// All worker threads have joined; the session object may be dropped.
    fn finalized(&mut self) {}
}

/// Audio data-channel sink.
pub trait AudioCallbacks: Send {
    /// The audio channel started; `config` carries the negotiated codec,
    /// channel count, sample rate and any codec-specific header bytes.
    fn start(&mut self, config: &ihs_proto::pb::data::AudioConfig) {
        let _ = config;
    }
    /// One decoded (still codec-framed) audio payload arrived.
    fn received(&mut self, payload: &[u8]) {
        let _ = payload;
    }
    /// The audio channel stopped.
    fn stop(&mut self) {}
}

/// Video data-channel sink.
pub trait VideoCallbacks: Send {
    /// The video channel started with the negotiated codec and dimensions.
    /// A non-zero return is treated as a user-callback failure: it's
    /// reported to the host as a negative `VideoDecoderInfo` and the
    /// session stops this channel (spec.md §7).
    fn start(&mut self, config: &ihs_proto::control::StartVideoData) -> i32 {
        let _ = config;
        0
    }
    /// A complete, reassembled frame is ready for decode. `flags` carries
    /// whether this was a key frame.
    fn submit(&mut self, payload: &[u8], flags: ihs_proto::video::VideoFrameFlags) -> i32 {
        let _ = (payload, flags);
        0
    }
    /// The video channel stopped.
    fn stop(&mut self) {}
}

/// Cursor and input-adjacent host-to-client callbacks (spec.md §4.6
/// "Cursor").
pub trait InputCallbacks: Send {
    /// The host selected cursor `cursor_id`. Return `true` if this cursor
    /// is already known locally; returning `false` causes the control
    /// channel to request the cursor image.
    fn set_cursor(&mut self, cursor_id: u64) -> bool {
        let _ = cursor_id;
        false
    }
    /// The host says `cursor_id` is no longer valid. Return `true` if it
    /// was known and has been forgotten.
    fn delete_cursor(&mut self, cursor_id: u64) -> bool {
        let _ = cursor_id;
        false
    }
    /// Cursor pixel data for a previously unknown cursor.
    fn cursor_image(&mut self, image: &ihs_proto::control::SetCursorImage) {
        let _ = image;
    }
    /// Reveal the current cursor at `(x, y)` (normalized 0.0-1.0).
    fn show_cursor(&mut self, x: f32, y: f32) {
        let _ = (x, y);
    }
    /// Hide the cursor.
    fn hide_cursor(&mut self) {}
}

/// Structured logging sink (spec.md's `log(level, message)`).
pub trait LoggingCallbacks: Send {
    /// A session-internal event worth surfacing to the caller's logger.
    fn log(&mut self, level: LogLevel, message: &str) {
        let _ = (level, message);
    }
}

/// A no-op implementation of every callback trait, used as the default
/// when a caller doesn't supply one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallbacks;

impl SessionCallbacks for NullCallbacks {}
impl AudioCallbacks for NullCallbacks {}
impl VideoCallbacks for NullCallbacks {}
impl InputCallbacks for NullCallbacks {}

impl LoggingCallbacks for NullCallbacks {
    fn log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "ihs_core::session", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "ihs_core::session", "{message}"),
            LogLevel::Error => tracing::error!(target: "ihs_core::session", "{message}"),
        }
    }
}

/// The full set of callback boxes a [`crate::session::Session`] invokes.
/// Any field left unset (via [`CallbackSet::new`]) falls back to
/// [`NullCallbacks`].
pub struct CallbackSet {
    /// Session lifecycle sink.
    pub session: Box<dyn SessionCallbacks>,
    /// Audio sink, shared with the audio data channel's worker thread.
    pub audio: Arc<Mutex<Box<dyn AudioCallbacks>>>,
    /// Video sink, shared with the video data channel's worker thread.
    pub video: Arc<Mutex<Box<dyn VideoCallbacks>>>,
    /// Cursor/input sink.
    pub input: Box<dyn InputCallbacks>,
    /// Logging sink.
    pub logging: Box<dyn LoggingCallbacks>,
}

impl CallbackSet {
    /// Build a set where every concern is the no-op default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: Box::new(NullCallbacks),
            audio: Arc::new(Mutex::new(Box::new(NullCallbacks))),
            video: Arc::new(Mutex::new(Box::new(NullCallbacks))),
            input: Box::new(NullCallbacks),
            logging: Box::new(NullCallbacks),
        }
    }
}

impl Default for CallbackSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_callback_set_has_null_handlers() {
        let mut set = CallbackSet::new();
        set.session.connected();
        set.logging.log(LogLevel::Debug, "noop");
        #[allow(clippy::unwrap_used)]
        set.audio.lock().unwrap().stop();
    }
}
