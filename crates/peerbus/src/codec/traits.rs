// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field-level encode/decode traits.
//!
//! Implementations exist for the primitive field types, [`Timestamp`], fixed
//! arrays, counted vectors and counted UTF-8 strings. Counts are `u32`.

use super::{Cursor, CursorMut, DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::time::Timestamp;

/// A value with a known encoded size that can be written to a cursor.
pub trait WireEncode {
    /// Exact number of bytes [`WireEncode::encode`] writes.
    fn wire_len(&self) -> usize;

    fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()>;
}

/// A value that can be read back from a cursor.
pub trait WireDecode: Sized {
    fn decode(cursor: &mut Cursor<'_>) -> DecodeResult<Self>;
}

/// Encode into a buffer allocated at exactly the encoded length.
pub fn encode_exact<T: WireEncode + ?Sized>(value: &T) -> EncodeResult<Vec<u8>> {
    let mut buf = vec![0u8; value.wire_len()];
    let mut cursor = CursorMut::new(&mut buf);
    value.encode(&mut cursor)?;
    if cursor.remaining() != 0 {
        // wire_len over-reported; trimming would hide the bug from the peer.
        return Err(EncodeError::BufferTooSmall {
            offset: cursor.offset(),
            needed: 0,
        });
    }
    Ok(buf)
}

/// Decode a value that must consume the whole buffer.
pub fn decode_exact<T: WireDecode>(buf: &[u8]) -> DecodeResult<T> {
    let mut cursor = Cursor::new(buf);
    let value = T::decode(&mut cursor)?;
    if !cursor.is_eof() {
        return Err(DecodeError::PayloadLengthMismatch {
            expected: cursor.offset(),
            actual: buf.len(),
        });
    }
    Ok(value)
}

macro_rules! impl_wire_primitive {
    ($type:ty, $size:expr, $write:ident, $read:ident) => {
        impl WireEncode for $type {
            fn wire_len(&self) -> usize {
                $size
            }

            fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
                cursor.$write(*self)
            }
        }

        impl WireDecode for $type {
            fn decode(cursor: &mut Cursor<'_>) -> DecodeResult<Self> {
                cursor.$read()
            }
        }
    };
}

impl_wire_primitive!(u8, 1, write_u8, read_u8);
impl_wire_primitive!(i8, 1, write_i8, read_i8);
impl_wire_primitive!(u16, 2, write_u16, read_u16);
impl_wire_primitive!(i16, 2, write_i16, read_i16);
impl_wire_primitive!(u32, 4, write_u32, read_u32);
impl_wire_primitive!(i32, 4, write_i32, read_i32);
impl_wire_primitive!(u64, 8, write_u64, read_u64);
impl_wire_primitive!(i64, 8, write_i64, read_i64);
impl_wire_primitive!(f32, 4, write_f32, read_f32);
impl_wire_primitive!(f64, 8, write_f64, read_f64);
impl_wire_primitive!(bool, 1, write_bool, read_bool);

impl WireEncode for Timestamp {
    fn wire_len(&self) -> usize {
        Timestamp::WIRE_SIZE
    }

    fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        cursor.write_i64(self.sec())?;
        cursor.write_i32(self.usec())
    }
}

impl WireDecode for Timestamp {
    fn decode(cursor: &mut Cursor<'_>) -> DecodeResult<Self> {
        let sec = cursor.read_i64()?;
        let usec = cursor.read_i32()?;
        if !(0..1_000_000).contains(&usec) {
            return Err(DecodeError::InvalidData {
                reason: format!("timestamp microseconds {} out of range", usec),
            });
        }
        Ok(Timestamp::new(sec, i64::from(usec)))
    }
}

impl<T: WireEncode, const N: usize> WireEncode for [T; N] {
    fn wire_len(&self) -> usize {
        self.iter().map(WireEncode::wire_len).sum()
    }

    fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        self.iter().try_for_each(|v| v.encode(cursor))
    }
}

impl<T: WireDecode + Copy + Default, const N: usize> WireDecode for [T; N] {
    fn decode(cursor: &mut Cursor<'_>) -> DecodeResult<Self> {
        let mut out = [T::default(); N];
        for slot in &mut out {
            *slot = T::decode(cursor)?;
        }
        Ok(out)
    }
}

fn encode_count(len: usize, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
    let count = u32::try_from(len).map_err(|_| EncodeError::BufferTooSmall {
        offset: cursor.offset(),
        needed: len,
    })?;
    cursor.write_u32(count)
}

impl<T: WireEncode> WireEncode for [T] {
    fn wire_len(&self) -> usize {
        4 + self.iter().map(WireEncode::wire_len).sum::<usize>()
    }

    fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        encode_count(self.len(), cursor)?;
        self.iter().try_for_each(|v| v.encode(cursor))
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn wire_len(&self) -> usize {
        self.as_slice().wire_len()
    }

    fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        self.as_slice().encode(cursor)
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(cursor: &mut Cursor<'_>) -> DecodeResult<Self> {
        let count = cursor.read_u32()? as usize;
        // Every element takes at least one byte; refuse counts the buffer cannot hold
        // before allocating for them.
        if count > cursor.remaining() {
            return Err(DecodeError::TruncatedBuffer {
                offset: cursor.offset(),
                needed: count,
                available: cursor.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(T::decode(cursor)?);
        }
        Ok(out)
    }
}

impl WireEncode for str {
    fn wire_len(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        encode_count(self.len(), cursor)?;
        cursor.write_bytes(self.as_bytes())
    }
}

impl WireEncode for String {
    fn wire_len(&self) -> usize {
        self.as_str().wire_len()
    }

    fn encode(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        self.as_str().encode(cursor)
    }
}

impl WireDecode for String {
    fn decode(cursor: &mut Cursor<'_>) -> DecodeResult<Self> {
        let len = cursor.read_u32()? as usize;
        let bytes = cursor.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError::InvalidData {
            reason: format!("name is not UTF-8: {}", e),
        })
    }
}
