// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Report;
use crate::codec::{
    check_len, check_min_len, counted_len, Cursor, CursorMut, DecodeResult, EncodeError, EncodeResult,
};

/// Force-feedback effect with a free-form parameter list.
///
/// Wire layout: `u32 effect_id`, `u32 count`, then `count` `f32`s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomEffect {
    pub effect_id: u32,
    pub params: Vec<f32>,
}

impl Report for CustomEffect {
    const TYPE_NAME: &'static str = "peerbus ForceDevice Custom Effect";

    fn encoded_len(&self) -> usize {
        8 + self.params.len() * 4
    }

    fn encode_into(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        let count = u32::try_from(self.params.len()).map_err(|_| EncodeError::BufferTooSmall {
            offset: cursor.offset(),
            needed: self.params.len(),
        })?;
        cursor.write_u32(self.effect_id)?;
        cursor.write_u32(count)?;
        self.params.iter().try_for_each(|v| cursor.write_f32(*v))
    }

    fn decode(payload: &[u8]) -> DecodeResult<Self> {
        check_min_len(payload.len(), 8)?;
        let mut cursor = Cursor::new(payload);
        let effect_id = cursor.read_u32()?;
        let count = cursor.read_u32()? as usize;
        check_len(payload.len(), counted_len(8, count, 4, payload.len())?)?;
        let mut params = Vec::with_capacity(count);
        for _ in 0..count {
            params.push(cursor.read_f32()?);
        }
        Ok(Self { effect_id, params })
    }
}
