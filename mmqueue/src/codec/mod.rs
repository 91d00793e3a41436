//! Little-endian fixed-width integer access at byte offsets.
//!
//! Every header field and control-block word in a queue file is a
//! little-endian integer at a fixed position; these helpers are the single
//! place that encoding lives. Out-of-range offsets are programmer errors
//! and panic.

use byteorder::{ByteOrder, LittleEndian};

#[inline]
fn check(buf: &[u8], pos: usize, width: usize) {
    assert!(
        pos.checked_add(width).map_or(false, |end| end <= buf.len()),
        "{width}-byte access at offset {pos} outside buffer of {} bytes",
        buf.len()
    );
}

#[inline]
pub fn read_i16(buf: &[u8], pos: usize) -> i16 {
    check(buf, pos, 2);
    LittleEndian::read_i16(&buf[pos..pos + 2])
}

#[inline]
pub fn write_i16(buf: &mut [u8], pos: usize, v: i16) {
    check(buf, pos, 2);
    LittleEndian::write_i16(&mut buf[pos..pos + 2], v);
}

#[inline]
pub fn read_i32(buf: &[u8], pos: usize) -> i32 {
    check(buf, pos, 4);
    LittleEndian::read_i32(&buf[pos..pos + 4])
}

#[inline]
pub fn write_i32(buf: &mut [u8], pos: usize, v: i32) {
    check(buf, pos, 4);
    LittleEndian::write_i32(&mut buf[pos..pos + 4], v);
}

#[inline]
pub fn read_i64(buf: &[u8], pos: usize) -> i64 {
    check(buf, pos, 8);
    LittleEndian::read_i64(&buf[pos..pos + 8])
}

#[inline]
pub fn write_i64(buf: &mut [u8], pos: usize, v: i64) {
    check(buf, pos, 8);
    LittleEndian::write_i64(&mut buf[pos..pos + 8], v);
}

#[inline]
pub fn read_u16(buf: &[u8], pos: usize) -> u16 {
    check(buf, pos, 2);
    LittleEndian::read_u16(&buf[pos..pos + 2])
}

#[inline]
pub fn write_u16(buf: &mut [u8], pos: usize, v: u16) {
    check(buf, pos, 2);
    LittleEndian::write_u16(&mut buf[pos..pos + 2], v);
}

#[inline]
pub fn read_u32(buf: &[u8], pos: usize) -> u32 {
    check(buf, pos, 4);
    LittleEndian::read_u32(&buf[pos..pos + 4])
}

#[inline]
pub fn write_u32(buf: &mut [u8], pos: usize, v: u32) {
    check(buf, pos, 4);
    LittleEndian::write_u32(&mut buf[pos..pos + 4], v);
}

#[inline]
pub fn read_u64(buf: &[u8], pos: usize) -> u64 {
    check(buf, pos, 8);
    LittleEndian::read_u64(&buf[pos..pos + 8])
}

#[inline]
pub fn write_u64(buf: &mut [u8], pos: usize, v: u64) {
    check(buf, pos, 8);
    LittleEndian::write_u64(&mut buf[pos..pos + 8], v);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_at_offset() {
        let mut buf = [0u8; 16];
        write_u64(&mut buf, 3, 0x1122_3344_5566_7788);
        assert_eq!(read_u64(&buf, 3), 0x1122_3344_5566_7788);
        // Only the targeted bytes change.
        assert_eq!(buf[0..3], [0, 0, 0]);
        assert_eq!(buf[11..16], [0, 0, 0, 0, 0]);
    }

    #[test]
    fn little_endian_layout() {
        let mut buf = [0u8; 4];
        write_i32(&mut buf, 0, 0x0A0B_0C0D);
        assert_eq!(buf, [0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn signed_values_roundtrip() {
        let mut buf = [0u8; 8];
        write_i16(&mut buf, 0, -2);
        assert_eq!(read_i16(&buf, 0), -2);
        write_i64(&mut buf, 0, i64::MIN);
        assert_eq!(read_i64(&buf, 0), i64::MIN);
    }

    #[test]
    #[should_panic(expected = "outside buffer")]
    fn out_of_range_write_panics() {
        let mut buf = [0u8; 8];
        write_u32(&mut buf, 6, 1);
    }

    #[test]
    #[should_panic(expected = "outside buffer")]
    fn overflowing_offset_panics() {
        let buf = [0u8; 8];
        read_u16(&buf, usize::MAX);
    }
}
