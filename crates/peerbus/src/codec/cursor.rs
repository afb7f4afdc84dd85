// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounds-checked read/write cursors in network byte order.

use super::{DecodeError, DecodeResult, EncodeError, EncodeResult};

/// Generate big-endian write methods for primitive types.
///
/// Each generated method checks the remaining capacity, writes
/// `to_be_bytes()` and advances the offset.
macro_rules! impl_write_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> EncodeResult<()> {
            self.reserve($size)?;
            self.buffer[self.offset..self.offset + $size].copy_from_slice(&value.to_be_bytes());
            self.offset += $size;
            Ok(())
        }
    };
}

/// Generate big-endian read methods for primitive types.
macro_rules! impl_read_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> DecodeResult<$type> {
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(<$type>::from_be_bytes(bytes))
        }
    };
}

/// Write cursor over a caller-provided buffer.
pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn reserve(&self, len: usize) -> EncodeResult<()> {
        if len > self.remaining() {
            return Err(EncodeError::BufferTooSmall {
                offset: self.offset,
                needed: len - self.remaining(),
            });
        }
        Ok(())
    }

    impl_write_be!(write_u8, u8, 1);
    impl_write_be!(write_i8, i8, 1);
    impl_write_be!(write_u16, u16, 2);
    impl_write_be!(write_i16, i16, 2);
    impl_write_be!(write_u32, u32, 4);
    impl_write_be!(write_i32, i32, 4);
    impl_write_be!(write_u64, u64, 8);
    impl_write_be!(write_i64, i64, 8);

    pub fn write_f32(&mut self, value: f32) -> EncodeResult<()> {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> EncodeResult<()> {
        self.write_u64(value.to_bits())
    }

    pub fn write_bool(&mut self, value: bool) -> EncodeResult<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> EncodeResult<()> {
        self.reserve(data.len())?;
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    /// Zero-fill up to the next multiple of `alignment`.
    pub fn pad_to(&mut self, alignment: usize) -> EncodeResult<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let target = self.offset.next_multiple_of(alignment);
        let pad = target - self.offset;
        self.reserve(pad)?;
        self.buffer[self.offset..target].fill(0);
        self.offset = target;
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

/// Read cursor over a borrowed buffer.
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_be!(read_u8, u8, 1);
    impl_read_be!(read_i8, i8, 1);
    impl_read_be!(read_u16, u16, 2);
    impl_read_be!(read_i16, i16, 2);
    impl_read_be!(read_u32, u32, 4);
    impl_read_be!(read_i32, i32, 4);
    impl_read_be!(read_u64, u64, 8);
    impl_read_be!(read_i64, i64, 8);

    pub fn read_f32(&mut self) -> DecodeResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> DecodeResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bool(&mut self) -> DecodeResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidData {
                reason: format!("bool byte {:#04x}", other),
            }),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeError::TruncatedBuffer {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Skip padding up to the next multiple of `alignment`.
    pub fn skip_to(&mut self, alignment: usize) -> DecodeResult<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let pad = self.offset.next_multiple_of(alignment) - self.offset;
        self.read_bytes(pad).map(|_| ())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_U16: u16 = 0xCDEF;
    const TEST_U32: u32 = 0x1234_5678;
    const TEST_U64: u64 = 0x1122_3344_5566_7788;

    #[test]
    fn test_write_is_network_order() {
        let mut buffer = [0u8; 14];
        let mut cursor = CursorMut::new(&mut buffer);
        cursor.write_u16(TEST_U16).expect("Write u16 should succeed");
        cursor.write_u32(TEST_U32).expect("Write u32 should succeed");
        cursor.write_u64(TEST_U64).expect("Write u64 should succeed");
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(&buffer[0..2], &[0xCD, 0xEF]);
        assert_eq!(&buffer[2..6], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(buffer[6], 0x11);
        assert_eq!(buffer[13], 0x88);
    }

    #[test]
    fn test_write_overflow_reports_offset() {
        let mut buffer = [0u8; 6];
        let mut cursor = CursorMut::new(&mut buffer);
        cursor.write_u32(1).expect("Write u32 should succeed");
        let err = cursor.write_u32(2).unwrap_err();
        assert_eq!(
            err,
            EncodeError::BufferTooSmall {
                offset: 4,
                needed: 2
            }
        );
        // Failed write leaves the cursor where it was.
        assert_eq!(cursor.offset(), 4);
    }

    #[test]
    fn test_read_overflow_reports_offset() {
        let buffer = [0u8; 5];
        let mut cursor = Cursor::new(&buffer);
        cursor.read_i32().expect("Read i32 should succeed");
        match cursor.read_u16() {
            Err(DecodeError::TruncatedBuffer {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 4);
                assert_eq!(needed, 2);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_across_numeric_types() {
        let mut buffer = [0u8; 64];
        let written = {
            let mut w = CursorMut::new(&mut buffer);
            w.write_i8(-3).expect("Write i8 should succeed");
            w.write_i16(-300).expect("Write i16 should succeed");
            w.write_i64(-1 << 40).expect("Write i64 should succeed");
            w.write_f32(1.5).expect("Write f32 should succeed");
            w.write_f64(-6.25).expect("Write f64 should succeed");
            w.write_bool(true).expect("Write bool should succeed");
            w.pad_to(8).expect("Pad should succeed");
            w.write_bytes(&[1, 2, 3]).expect("Write bytes should succeed");
            w.offset()
        };

        let mut r = Cursor::new(&buffer[..written]);
        assert_eq!(r.read_i8().expect("Read i8 should succeed"), -3);
        assert_eq!(r.read_i16().expect("Read i16 should succeed"), -300);
        assert_eq!(r.read_i64().expect("Read i64 should succeed"), -1 << 40);
        assert_eq!(r.read_f32().expect("Read f32 should succeed"), 1.5);
        assert_eq!(r.read_f64().expect("Read f64 should succeed"), -6.25);
        assert!(r.read_bool().expect("Read bool should succeed"));
        r.skip_to(8).expect("Skip should succeed");
        assert_eq!(r.read_bytes(3).expect("Read bytes should succeed"), &[1, 2, 3]);
        assert!(r.is_eof());
    }

    #[test]
    fn test_read_bool_rejects_garbage() {
        let buffer = [7u8];
        let mut r = Cursor::new(&buffer);
        assert!(matches!(r.read_bool(), Err(DecodeError::InvalidData { .. })));
    }

    #[test]
    fn test_pad_to_noop_when_aligned() {
        let mut buffer = [0xFFu8; 8];
        let mut w = CursorMut::new(&mut buffer);
        w.pad_to(8).expect("Pad should succeed");
        assert_eq!(w.offset(), 0);
        w.write_u8(1).expect("Write u8 should succeed");
        w.pad_to(8).expect("Pad should succeed");
        assert_eq!(w.offset(), 8);
        assert_eq!(&buffer[1..], &[0u8; 7]);
    }
}
