//! Session state for the Steam In-Home Streaming session-transport
//! protocol: the reassembly window, the channel framework and its concrete
//! channels (discovery, control, audio, video), the HID subsystem, the send
//! queue and retransmission manager, and the session lifecycle that ties
//! them together.
//!
//! This crate knows nothing about sockets or threads — it hands serialized
//! packets to a caller-supplied closure and expects to be fed inbound
//! packets in turn. `ihs-client` supplies the I/O.

pub mod callbacks;
pub mod channel;
pub mod channels;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod hid;
pub mod retransmission;
pub mod send_queue;
pub mod session;
pub mod timer;
pub mod window;

pub use callbacks::{AudioCallbacks, CallbackSet, InputCallbacks, LogLevel, LoggingCallbacks, NullCallbacks, SessionCallbacks, VideoCallbacks};
pub use channel::{Channel, ChannelIo};
pub use config::{ClientConfig, SessionConfig, SessionInfo};
pub use error::IhsError;
pub use events::{EventSink, SessionEvent};
pub use session::Session;
