// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codec: typed fields to/from flat, network-order byte buffers.
//!
//! All multi-byte values (integers and IEEE-754 bit patterns) are written
//! big-endian so peers agree regardless of host byte order. Decoders never
//! read past the buffer: cursor reads fail with
//! [`DecodeError::TruncatedBuffer`], and message decoders compare the whole
//! payload length with what they expect before touching any field
//! ([`DecodeError::PayloadLengthMismatch`]).

pub mod cursor;
pub mod frame;
pub mod traits;

pub use cursor::{Cursor, CursorMut};
pub use frame::{
    encode_frame, is_control_type, padded_len, FrameHeader, FrameReader, FrameView, DISCONNECT,
    HEADER_LEN, SENDER_DESCRIPTION, TYPE_DESCRIPTION,
};
pub use traits::{decode_exact, encode_exact, WireDecode, WireEncode};

use std::fmt;

/// Failure to turn bytes back into typed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A read needed more bytes than the buffer holds.
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// The payload is not the size the decoder requires.
    PayloadLengthMismatch { expected: usize, actual: usize },
    /// Bytes are present but do not form a valid value.
    InvalidData { reason: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TruncatedBuffer {
                offset,
                needed,
                available,
            } => write!(
                f,
                "truncated buffer at offset {}: needed {} bytes, {} available",
                offset, needed, available
            ),
            DecodeError::PayloadLengthMismatch { expected, actual } => write!(
                f,
                "payload length mismatch: expected {} bytes, got {}",
                expected, actual
            ),
            DecodeError::InvalidData { reason } => write!(f, "invalid data: {}", reason),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Failure to write typed values into a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    BufferTooSmall { offset: usize, needed: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::BufferTooSmall { offset, needed } => write!(
                f,
                "buffer too small at offset {}: {} more bytes needed",
                offset, needed
            ),
        }
    }
}

impl std::error::Error for EncodeError {}

pub type DecodeResult<T> = core::result::Result<T, DecodeError>;
pub type EncodeResult<T> = core::result::Result<T, EncodeError>;

/// Reject a payload whose length differs from `expected` before reading it.
pub fn check_len(actual: usize, expected: usize) -> DecodeResult<()> {
    if actual != expected {
        return Err(DecodeError::PayloadLengthMismatch { expected, actual });
    }
    Ok(())
}

/// Reject a payload shorter than its fixed prefix before reading the prefix.
pub fn check_min_len(actual: usize, min: usize) -> DecodeResult<()> {
    if actual < min {
        return Err(DecodeError::PayloadLengthMismatch {
            expected: min,
            actual,
        });
    }
    Ok(())
}

/// Exact length of a payload made of a fixed prefix and `count` elements.
///
/// Counts large enough to overflow are reported as a length mismatch against
/// the actual buffer so callers need only one error path.
pub fn counted_len(prefix: usize, count: usize, elem: usize, actual: usize) -> DecodeResult<usize> {
    count
        .checked_mul(elem)
        .and_then(|body| body.checked_add(prefix))
        .ok_or(DecodeError::PayloadLengthMismatch {
            expected: usize::MAX,
            actual,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display_variants() {
        let err = DecodeError::TruncatedBuffer {
            offset: 4,
            needed: 8,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "truncated buffer at offset 4: needed 8 bytes, 2 available"
        );

        let err = DecodeError::PayloadLengthMismatch {
            expected: 24,
            actual: 20,
        };
        assert_eq!(
            err.to_string(),
            "payload length mismatch: expected 24 bytes, got 20"
        );
    }

    #[test]
    fn test_check_len() {
        assert!(check_len(8, 8).is_ok());
        assert_eq!(
            check_len(7, 8),
            Err(DecodeError::PayloadLengthMismatch {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn test_check_min_len() {
        assert!(check_min_len(8, 8).is_ok());
        assert!(check_min_len(12, 8).is_ok());
        assert_eq!(
            check_min_len(3, 4),
            Err(DecodeError::PayloadLengthMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_counted_len_overflow_is_mismatch() {
        assert_eq!(counted_len(4, 3, 8, 28), Ok(28));
        match counted_len(4, usize::MAX, 8, 12) {
            Err(DecodeError::PayloadLengthMismatch { actual, .. }) => assert_eq!(actual, 12),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
