//! CRC-32C (Castagnoli) checksum used by the packet trailer and the HID
//! delta-report tag.

/// Compute the CRC-32C of `data`.
#[must_use]
pub fn crc32c(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}
