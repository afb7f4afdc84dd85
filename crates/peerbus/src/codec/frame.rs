// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame header codec.
//!
//! Layout (all big-endian):
//!
//! ```text
//! 0        4        8        12       16               24
//! +--------+--------+--------+--------+----------------+-----------+-----+
//! | length | sender |  type  |  usec  |      sec       |  payload  | pad |
//! +--------+--------+--------+--------+----------------+-----------+-----+
//! ```
//!
//! `length` counts header + payload but not the zero padding that rounds the
//! frame up to [`FRAME_ALIGN`](crate::config::FRAME_ALIGN) bytes.

use super::{Cursor, CursorMut, DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::config::FRAME_ALIGN;
use crate::time::Timestamp;

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 24;

/// Control frame: the header sender field is one of the describing side's
/// sender ids and the payload is its counted name.
pub const SENDER_DESCRIPTION: i32 = -1;
/// Control frame: as [`SENDER_DESCRIPTION`], for a type id.
pub const TYPE_DESCRIPTION: i32 = -2;
/// Control frame: the peer is closing the link. Empty payload.
pub const DISCONNECT: i32 = -3;

/// True for type ids that carry link control rather than messages.
pub fn is_control_type(type_id: i32) -> bool {
    type_id < 0
}

/// Frame length rounded up to the alignment boundary.
pub fn padded_len(len: usize) -> usize {
    len.next_multiple_of(FRAME_ALIGN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Header + payload, unpadded.
    pub length: u32,
    pub sender_id: i32,
    pub type_id: i32,
    pub timestamp: Timestamp,
}

impl FrameHeader {
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_LEN)
    }

    pub fn padded_len(&self) -> usize {
        padded_len(self.length as usize)
    }

    pub fn read(cursor: &mut Cursor<'_>) -> DecodeResult<Self> {
        let length = cursor.read_u32()?;
        let sender_id = cursor.read_i32()?;
        let type_id = cursor.read_i32()?;
        let usec = cursor.read_i32()?;
        let sec = cursor.read_i64()?;
        if (length as usize) < HEADER_LEN {
            return Err(DecodeError::PayloadLengthMismatch {
                expected: HEADER_LEN,
                actual: length as usize,
            });
        }
        if !(0..1_000_000).contains(&usec) {
            return Err(DecodeError::InvalidData {
                reason: format!("frame timestamp microseconds {} out of range", usec),
            });
        }
        Ok(Self {
            length,
            sender_id,
            type_id,
            timestamp: Timestamp::new(sec, i64::from(usec)),
        })
    }

    fn write(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        cursor.write_u32(self.length)?;
        cursor.write_i32(self.sender_id)?;
        cursor.write_i32(self.type_id)?;
        cursor.write_i32(self.timestamp.usec())?;
        cursor.write_i64(self.timestamp.sec())
    }
}

/// Read only the declared length from the first four bytes of a frame.
pub fn peek_length(prefix: [u8; 4]) -> usize {
    u32::from_be_bytes(prefix) as usize
}

/// Build one padded frame, allocating exactly its padded size.
pub fn encode_frame(
    type_id: i32,
    sender_id: i32,
    timestamp: Timestamp,
    payload: &[u8],
) -> EncodeResult<Vec<u8>> {
    let length = HEADER_LEN + payload.len();
    let length_u32 = u32::try_from(length).map_err(|_| EncodeError::BufferTooSmall {
        offset: 0,
        needed: length,
    })?;
    let header = FrameHeader {
        length: length_u32,
        sender_id,
        type_id,
        timestamp,
    };

    let mut buf = vec![0u8; padded_len(length)];
    let mut cursor = CursorMut::new(&mut buf);
    header.write(&mut cursor)?;
    cursor.write_bytes(payload)?;
    cursor.pad_to(FRAME_ALIGN)?;
    Ok(buf)
}

/// One frame borrowed out of a receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

/// Iterates the frames packed back to back in a buffer.
///
/// After the first error the iterator is exhausted: a malformed length makes
/// every following offset meaningless.
pub struct FrameReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn next_frame(&mut self) -> DecodeResult<FrameView<'a>> {
        let rest = &self.buffer[self.offset..];
        let mut cursor = Cursor::new(rest);
        let header = FrameHeader::read(&mut cursor).map_err(|e| match e {
            DecodeError::TruncatedBuffer {
                offset,
                needed,
                available,
            } => DecodeError::TruncatedBuffer {
                offset: self.offset + offset,
                needed,
                available,
            },
            other => other,
        })?;
        let length = header.length as usize;
        if length > rest.len() {
            return Err(DecodeError::PayloadLengthMismatch {
                expected: length,
                actual: rest.len(),
            });
        }
        let payload = &rest[HEADER_LEN..length];
        // The last frame in a datagram may omit its padding.
        self.offset += header.padded_len().min(rest.len());
        Ok(FrameView { header, payload })
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = DecodeResult<FrameView<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buffer.len() {
            return None;
        }
        let result = self.next_frame();
        if result.is_err() {
            self.offset = self.buffer.len();
        }
        Some(result)
    }
}
