// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Report;
use crate::codec::{
    check_len, check_min_len, counted_len, Cursor, CursorMut, DecodeResult, EncodeError, EncodeResult,
};

/// Current values of all analog channels. Wire layout: `u32 count`, then
/// `count` `f64`s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalogChannels {
    pub channels: Vec<f64>,
}

impl Report for AnalogChannels {
    const TYPE_NAME: &'static str = "peerbus Analog Channel";

    fn encoded_len(&self) -> usize {
        4 + self.channels.len() * 8
    }

    fn encode_into(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        let count = u32::try_from(self.channels.len()).map_err(|_| EncodeError::BufferTooSmall {
            offset: cursor.offset(),
            needed: self.channels.len(),
        })?;
        cursor.write_u32(count)?;
        self.channels.iter().try_for_each(|v| cursor.write_f64(*v))
    }

    fn decode(payload: &[u8]) -> DecodeResult<Self> {
        check_min_len(payload.len(), 4)?;
        let mut cursor = Cursor::new(payload);
        let count = cursor.read_u32()? as usize;
        check_len(payload.len(), counted_len(4, count, 8, payload.len())?)?;
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            channels.push(cursor.read_f64()?);
        }
        Ok(Self { channels })
    }
}
