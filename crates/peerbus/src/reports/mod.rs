// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed device reports carried as message payloads.
//!
//! Every report knows its exact encoded size, so [`Report::to_payload`]
//! allocates once. Decoders check the payload length against what the
//! fields (or the count field) imply before reading any value.

pub mod analog;
pub mod button;
pub mod force;
pub mod tracker;

pub use analog::AnalogChannels;
pub use button::ButtonChange;
pub use force::CustomEffect;
pub use tracker::TrackerPose;

use crate::codec::{CursorMut, DecodeResult, EncodeError, EncodeResult};

/// A payload with a registered message type name.
pub trait Report: Sized {
    /// Name under which the message type is registered on both peers.
    const TYPE_NAME: &'static str;

    fn encoded_len(&self) -> usize;

    fn encode_into(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()>;

    fn decode(payload: &[u8]) -> DecodeResult<Self>;

    /// Encode into a buffer of exactly [`encoded_len`](Report::encoded_len)
    /// bytes.
    fn to_payload(&self) -> EncodeResult<Vec<u8>> {
        let mut buf = vec![0u8; self.encoded_len()];
        let mut cursor = CursorMut::new(&mut buf);
        self.encode_into(&mut cursor)?;
        if cursor.remaining() != 0 {
            return Err(EncodeError::BufferTooSmall {
                offset: cursor.offset(),
                needed: 0,
            });
        }
        Ok(buf)
    }
}
