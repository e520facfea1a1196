//! Video-frame wire format: the 7-byte partial-frame sub-header and the
//! H.264/HEVC NAL-unit byte transforms applied to partials before they are
//! concatenated into an output frame.
//!
//! Reassembly itself (ordering partials, key-frame resynchronization) is
//! session state and lives in `ihs-core`; this module only knows about
//! individual partials.

use bytes::{Bytes, BytesMut};

/// A partial video frame carries `NeedStartSequence=0x01` to prepend
/// `00 00 00 01` to its output, `NeedEscape=0x02` to request
/// emulation-prevention byte insertion, `Reserved1Increment=0x04` to bump the
/// reassembler's high-water mark, `FrameFinish=0x08` to close the output
/// frame, `KeyFrame=0x10` to mark it as a key frame, and `Encrypted=0x20` to
/// request zero-IV AES-128-CBC decryption before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoFrameFlags(pub u8);

impl VideoFrameFlags {
    /// Prepend a `00 00 00 01` NAL start code to this partial's payload.
    pub const NEED_START_SEQUENCE: u8 = 0x01;
    /// Apply H.264-style emulation-prevention escaping to the payload.
    pub const NEED_ESCAPE: u8 = 0x02;
    /// Advance the reassembler's `reserved1` high-water mark after this partial.
    pub const RESERVED1_INCREMENT: u8 = 0x04;
    /// This partial is the last one contributing to the current output frame.
    pub const FRAME_FINISH: u8 = 0x08;
    /// The assembled frame should be marked as a key frame.
    pub const KEY_FRAME: u8 = 0x10;
    /// The payload is AES-128-CBC-encrypted with an all-zero IV.
    pub const ENCRYPTED: u8 = 0x20;

    /// Test whether `bit` is set.
    #[must_use]
    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// 7-byte little-endian partial-frame header preceding a video `DataPacket`
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrameHeader {
    /// Monotonic partial sequence, used to detect drops and reorderings.
    pub sequence: u16,
    /// See [`VideoFrameFlags`].
    pub flags: VideoFrameFlags,
    /// First ordering key beyond `sequence`: a per-key-frame generation counter.
    pub reserved1: u16,
    /// Second ordering key: orders partials sharing the same `reserved1`.
    pub reserved2: u16,
}

impl VideoFrameHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 7;

    /// Parse the 7-byte header from the front of a video `DataPacket` payload.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            sequence: u16::from_le_bytes([bytes[0], bytes[1]]),
            flags: VideoFrameFlags(bytes[2]),
            reserved1: u16::from_le_bytes([bytes[3], bytes[4]]),
            reserved2: u16::from_le_bytes([bytes[5], bytes[6]]),
        })
    }

    /// Serialize to the 7-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.sequence.to_le_bytes());
        out[2] = self.flags.0;
        out[3..5].copy_from_slice(&self.reserved1.to_le_bytes());
        out[5..7].copy_from_slice(&self.reserved2.to_le_bytes());
        out
    }
}

/// `00 00 00 01` Annex-B start code prepended when `NeedStartSequence` is set.
pub const NAL_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Insert `0x03` emulation-prevention bytes: whenever two consecutive zero
/// bytes in `data` would otherwise be followed by a byte `<= 0x03`.
#[must_use]
pub fn escape_emulation_prevention(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + data.len() / 32);
    let mut zero_run = 0u32;
    for &byte in data {
        if zero_run >= 2 && byte <= 0x03 {
            out.extend_from_slice(&[0x03]);
            zero_run = 0;
        }
        out.extend_from_slice(&[byte]);
        if byte == 0x00 {
            zero_run += 1;
        } else {
            zero_run = 0;
        }
    }
    out.freeze()
}

/// Apply the transforms a partial's flags request (start code, escaping) to
/// its decoded (already-decrypted) body, in the order the bitstream expects:
/// start code first, then escaping over the raw payload.
#[must_use]
pub fn apply_partial_transforms(flags: VideoFrameFlags, payload: &[u8]) -> Bytes {
    let body = if flags.has(VideoFrameFlags::NEED_ESCAPE) {
        escape_emulation_prevention(payload)
    } else {
        Bytes::copy_from_slice(payload)
    };
    if flags.has(VideoFrameFlags::NEED_START_SEQUENCE) {
        let mut out = BytesMut::with_capacity(NAL_START_CODE.len() + body.len());
        out.extend_from_slice(&NAL_START_CODE);
        out.extend_from_slice(&body);
        out.freeze()
    } else {
        body
    }
}
