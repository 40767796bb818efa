//! Typed field accessors for register and image bytes
//!
//! RMI4 mixes byte orders: image header words are assembled low byte first,
//! while configuration identifiers are compared high byte first. Both
//! orderings are kept explicit instead of overlaying structs on the buffer.

/// Assemble 4 bytes low byte first (little-endian word)
///
/// Returns `None` if fewer than 4 bytes are available at `offset`.
pub fn low_first_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Assemble 4 bytes high byte first (big-endian word)
///
/// Returns `None` if fewer than 4 bytes are available at `offset`.
pub fn high_first_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Assemble 2 bytes low byte first
pub fn low_first_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Test a single bit of a byte
#[inline]
pub const fn bit(byte: u8, index: u8) -> bool {
    (byte >> index) & 1 != 0
}

/// Extract `width` bits starting at `shift`
#[inline]
pub const fn bits(byte: u8, shift: u8, width: u8) -> u8 {
    (byte >> shift) & ((1u16 << width) - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_orders() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05];
        assert_eq!(low_first_u32(&buf, 0), Some(0x0403_0201));
        assert_eq!(high_first_u32(&buf, 0), Some(0x0102_0304));
        assert_eq!(high_first_u32(&buf, 1), Some(0x0203_0405));
        assert_eq!(low_first_u16(&buf, 3), Some(0x0504));
    }

    #[test]
    fn test_short_buffers() {
        let buf = [0xAA, 0xBB, 0xCC];
        assert_eq!(low_first_u32(&buf, 0), None);
        assert_eq!(high_first_u32(&buf, 0), None);
        assert_eq!(low_first_u16(&buf, 2), None);
        assert_eq!(low_first_u32(&buf, usize::MAX), None);
    }

    #[test]
    fn test_bits() {
        assert!(bit(0x40, 6));
        assert!(!bit(0x40, 7));
        assert_eq!(bits(0xB5, 0, 4), 0x5);
        assert_eq!(bits(0xB5, 4, 3), 0x3);
        assert_eq!(bits(0xFF, 5, 2), 0x3);
    }
}
