//! HID input-report delta encoding: the CDC-style diff format carried inside
//! a `DeviceInputReport.delta_report` field (§4.8).
//!
//! Pure wire-format functions; the previous/current state bookkeeping lives
//! in `ihs-core`'s report holder.

use bytes::{Bytes, BytesMut};

use crate::{crc::crc32c, errors::ProtocolError};

pub use crate::pb::hid::{
    CloseAllDevices, CloseDevice, CloseDeviceResult, DeltaReport, DeviceInfo, DeviceInputReport,
    DeviceInputReports, DeviceListUpdate, GetFeatureReport, HidMessageFromRemote,
    HidMessageToRemote, OpenDevice, ReadReport, RequestDisconnect, RequestResponse,
    SendFeatureReport, StartInputReports, WriteReport,
};

/// A delta report: a change bitmap plus the changed bytes in ascending
/// index order, tagged with the CRC-32C of the full current state
/// (`IHS_HIDReportHolderUpdateDelta`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// `ceil(length/8)`-byte bitmap; bit `i` set iff byte `i` changed.
    pub bitmap: Bytes,
    /// The changed bytes, in ascending index order.
    pub changed_bytes: Bytes,
    /// CRC-32C of the full current report.
    pub crc: u32,
    /// Length of the full report the bitmap describes.
    pub full_length: usize,
}

/// Compute the delta between `previous` and `current`, which must be the
/// same length. The CRC tags `current`, not the delta payload.
///
/// # Panics
///
/// Panics if `previous.len() != current.len()`, mirroring the upstream
/// report holder's fixed-length invariant.
#[must_use]
pub fn compute_delta(previous: &[u8], current: &[u8]) -> Delta {
    assert_eq!(previous.len(), current.len(), "report holder requires equal-length buffers");

    let bitmap_len = current.len().div_ceil(8);
    let mut bitmap = BytesMut::zeroed(bitmap_len);
    let mut changed_bytes = BytesMut::new();

    for (index, (&prev, &cur)) in previous.iter().zip(current.iter()).enumerate() {
        if prev != cur {
            bitmap[index / 8] |= 1 << (index % 8);
            changed_bytes.extend_from_slice(&[cur]);
        }
    }

    Delta {
        bitmap: bitmap.freeze(),
        changed_bytes: changed_bytes.freeze(),
        crc: crc32c(current),
        full_length: current.len(),
    }
}

/// Apply a delta to `previous`, reproducing the buffer `compute_delta`
/// diffed it against.
///
/// # Errors
///
/// Returns [`ProtocolError::SubHeaderTruncated`] if `delta.full_length`
/// doesn't match `previous.len()`, or if the bitmap claims more changed
/// bytes than `delta.changed_bytes` actually supplies.
pub fn apply_delta(previous: &[u8], delta: &Delta) -> crate::errors::Result<Vec<u8>> {
    if previous.len() != delta.full_length {
        return Err(ProtocolError::SubHeaderTruncated {
            expected: delta.full_length,
            actual: previous.len(),
        });
    }
    let mut current = previous.to_vec();
    let mut changed_iter = delta.changed_bytes.iter();
    for index in 0..current.len() {
        let bit_set = delta.bitmap.get(index / 8).is_some_and(|byte| byte & (1 << (index % 8)) != 0);
        if bit_set {
            let &byte = changed_iter.next().ok_or(ProtocolError::SubHeaderTruncated {
                expected: delta.changed_bytes.len() + 1,
                actual: delta.changed_bytes.len(),
            })?;
            current[index] = byte;
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn delta_from_spec_example() {
        let previous = vec![0u8; 48];
        let mut current = previous.clone();
        current[16] = 0x40;
        current[27] = 0x01;

        let delta = compute_delta(&previous, &current);
        assert_eq!(delta.bitmap.len(), 48usize.div_ceil(8));
        assert!(delta.bitmap[2] & (1 << 0) != 0); // bit 16 -> byte 2, bit 0
        assert!(delta.bitmap[3] & (1 << 3) != 0); // bit 27 -> byte 3, bit 3
        assert_eq!(&delta.changed_bytes[..], &[0x40, 0x01]);
        assert_eq!(delta.crc, crc32c(&current));
    }

    #[test]
    fn apply_delta_reproduces_current() {
        let previous = vec![0u8; 48];
        let mut current = previous.clone();
        current[16] = 0x40;
        current[27] = 0x01;

        let delta = compute_delta(&previous, &current);
        let reconstructed = apply_delta(&previous, &delta).expect("should apply");
        assert_eq!(reconstructed, current);
    }

    proptest! {
        #[test]
        fn delta_round_trips(
            previous in prop::collection::vec(any::<u8>(), 48),
            current in prop::collection::vec(any::<u8>(), 48),
        ) {
            let delta = compute_delta(&previous, &current);
            let reconstructed = apply_delta(&previous, &delta).expect("should apply");
            prop_assert_eq!(reconstructed, current.clone());
            prop_assert_eq!(delta.crc, crc32c(&current));
        }
    }
}
