//! Wire format for the Steam In-Home Streaming session-transport protocol:
//! the 13-byte packet header, frame fragmentation/reassembly helpers,
//! CRC-32C, and the control/data/HID/discovery protobuf message catalogs.
//!
//! This crate is pure codec: it has no I/O, no threads, and no session
//! state. `ihs-core` drives it.

pub mod control;
pub mod crc;
pub mod data;
pub mod discovery;
pub mod errors;
pub mod frame;
pub mod header;
pub mod hid;
pub mod packet;
pub mod video;

pub use crc::crc32c;
pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{PacketHeader, PacketType};
pub use packet::Packet;

/// Generated protobuf message types, one module per `.proto` package.
///
/// Kept behind a `pb` module (rather than re-exported flat) because several
/// packages define same-named messages (e.g. both `control` and `hid` are
/// plausible homes for device-report types); callers reach them via
/// `ihs_proto::pb::control::NegotiationInit` etc.
pub mod pb {
    #![allow(missing_docs)]

    /// Control-channel message catalog (`ihs.control`).
    pub mod control {
        include!(concat!(env!("OUT_DIR"), "/ihs.control.rs"));
    }

    /// Data-channel message catalog (`ihs.data`).
    pub mod data {
        include!(concat!(env!("OUT_DIR"), "/ihs.data.rs"));
    }

    /// HID relay message catalog (`ihs.hid`).
    pub mod hid {
        include!(concat!(env!("OUT_DIR"), "/ihs.hid.rs"));
    }

    /// Pre-session discovery broadcast message catalog (`ihs.discovery`).
    pub mod discovery {
        include!(concat!(env!("OUT_DIR"), "/ihs.discovery.rs"));
    }
}
