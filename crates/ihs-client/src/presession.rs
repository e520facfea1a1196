//! Authorization and streaming-request contracts (spec.md §6).
//!
//! spec.md treats the device-authorization exchange (pairing a client
//! device id against a Steam account) and the streaming-request exchange
//! (negotiating the host address and session key a [`crate::IhsClient`]
//! then connects with) as external collaborators: "simple request/response
//! over a separate UDP socket... described at interface level only". No
//! concrete wire implementation is specified, so this module only carries
//! the callback contracts spec.md names plus the plain result types they
//! report — a caller's own authorization/streaming-request client (or a
//! future crate) drives the actual exchange and reports into these traits.

use std::net::SocketAddr;

use ihs_crypto::SessionKey;

/// Terminal outcome of a device-authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationResult {
    /// The host denied or timed out the pairing request.
    Denied,
    /// The client device id is not recognized by this account.
    UnknownDevice,
    /// Any other host-reported failure.
    Other,
}

/// Terminal outcome of a streaming-request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingRequestResult {
    /// The host is already streaming to another client.
    Busy,
    /// The host rejected the request outright.
    Rejected,
    /// Any other host-reported failure.
    Other,
}

/// Device-authorization progress sink (spec.md §6 "authorization:
/// `progress`, `success(steam_id)`, `failed(result)`").
pub trait AuthorizationCallbacks: Send {
    /// Periodic progress update (e.g. "waiting for user confirmation").
    fn progress(&mut self, message: &str) {
        let _ = message;
    }
    /// Authorization succeeded; `steam_id` is now paired with this device.
    fn success(&mut self, steam_id: u64) {
        let _ = steam_id;
    }
    /// Authorization failed terminally.
    fn failed(&mut self, result: AuthorizationResult) {
        let _ = result;
    }
}

/// Streaming-request progress sink (spec.md §6 "streaming-request:
/// `progress`, `success(address, session_key)`, `failed(result)`"). A
/// successful report carries exactly the [`SessionInfo`](ihs_core::SessionInfo)
/// fields `ihs-client` needs to open a session.
pub trait StreamingRequestCallbacks: Send {
    /// Periodic progress update.
    fn progress(&mut self, message: &str) {
        let _ = message;
    }
    /// The host accepted the request; `address` is where the session
    /// transport should connect and `session_key` is the AES/HMAC key for
    /// the whole session.
    fn success(&mut self, address: SocketAddr, session_key: &SessionKey) {
        let _ = (address, session_key);
    }
    /// The request failed terminally.
    fn failed(&mut self, result: StreamingRequestResult) {
        let _ = result;
    }
}

/// A no-op implementation of both pre-session contracts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresessionCallbacks;

impl AuthorizationCallbacks for NullPresessionCallbacks {}
impl StreamingRequestCallbacks for NullPresessionCallbacks {}
