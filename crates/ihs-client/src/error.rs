//! Error types for the client-facing transport layer.
//!
//! Wraps [`std::io::Error`] (socket failures) and [`ihs_core::IhsError`]
//! (fatal session errors, i.e. reassembly window overflow) behind one type
//! so [`crate::client::IhsClient`] has a single `Result` to return from its
//! public entry points.

use thiserror::Error;

/// Errors surfaced by `ihs-client`'s public API.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The UDP socket failed to bind, send or receive.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// A fatal session error (spec.md §7 "Window overflow"); the session
    /// thread tears itself down on this and the caller observes
    /// `disconnected`/`finalized`.
    #[error("session error: {0}")]
    Session(#[from] ihs_core::IhsError),

    /// A worker thread panicked rather than returning, so it couldn't be
    /// joined cleanly.
    #[error("worker thread {0} panicked")]
    ThreadPanicked(&'static str),
}

/// Result alias for `ihs-client`'s public API.
pub type Result<T> = std::result::Result<T, ClientError>;
