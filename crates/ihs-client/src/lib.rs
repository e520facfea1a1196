//! Public client library for the Steam In-Home Streaming session protocol.
//!
//! `ihs-core` is transport-agnostic: it decodes packets and drives channel
//! state machines but never touches a socket or spawns a thread. This crate
//! supplies that I/O layer — a blocking `UdpSocket` plus the multi-thread
//! model spec.md §5 describes (a receive thread, a send thread, and one
//! worker per data channel) — behind the single [`IhsClient`] entry point,
//! alongside the pre-session discovery broadcast client and the
//! authorization/streaming-request contracts spec.md treats as external
//! collaborators (spec.md §6).
//!
//! # Example
//!
//! ```no_run
//! use ihs_client::IhsClient;
//! use ihs_core::{CallbackSet, ClientConfig, SessionConfig, SessionInfo, hid::NullProvider};
//! use ihs_crypto::SessionKey;
//!
//! # fn main() -> ihs_client::error::Result<()> {
//! let client_config = ClientConfig {
//!     device_id: 1,
//!     secret_key: [0u8; 32],
//!     device_name: "my-device".into(),
//! };
//! let info = SessionInfo {
//!     address: "192.0.2.1:27031".parse().expect("valid host address"),
//!     session_key: SessionKey::new(vec![0u8; 16]).expect("valid key"),
//!     steam_id: 0,
//! };
//! let mut client = IhsClient::new(
//!     client_config,
//!     info,
//!     SessionConfig::default(),
//!     CallbackSet::new(),
//!     vec![Box::new(NullProvider)],
//! )?;
//! client.connect();
//! client.disconnect();
//! client.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod discovery;
pub mod error;
pub mod presession;
pub mod transport;

pub use client::IhsClient;
pub use discovery::{DiscoveryCallbacks, DiscoveryClient, NullDiscoveryCallbacks};
pub use error::ClientError;
pub use presession::{
    AuthorizationCallbacks, AuthorizationResult, NullPresessionCallbacks, StreamingRequestCallbacks,
    StreamingRequestResult,
};
pub use transport::{UdpTransport, Workers};

pub use ihs_core::{
    AudioCallbacks, CallbackSet, Channel, ClientConfig, InputCallbacks, LogLevel, LoggingCallbacks,
    NullCallbacks, Session, SessionCallbacks, SessionConfig, SessionEvent, SessionInfo, VideoCallbacks,
};
