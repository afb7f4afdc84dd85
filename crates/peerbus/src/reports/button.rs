// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Report;
use crate::codec::{check_len, Cursor, CursorMut, DecodeError, DecodeResult, EncodeResult};

/// One button changed state. Wire layout: `i32 button`, `i32 state` (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonChange {
    pub button: i32,
    pub pressed: bool,
}

impl ButtonChange {
    pub const WIRE_SIZE: usize = 8;
}

impl Report for ButtonChange {
    const TYPE_NAME: &'static str = "peerbus Button Change";

    fn encoded_len(&self) -> usize {
        Self::WIRE_SIZE
    }

    fn encode_into(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        cursor.write_i32(self.button)?;
        cursor.write_i32(i32::from(self.pressed))
    }

    fn decode(payload: &[u8]) -> DecodeResult<Self> {
        check_len(payload.len(), Self::WIRE_SIZE)?;
        let mut cursor = Cursor::new(payload);
        let button = cursor.read_i32()?;
        let pressed = match cursor.read_i32()? {
            0 => false,
            1 => true,
            other => {
                return Err(DecodeError::InvalidData {
                    reason: format!("button state {} is neither 0 nor 1", other),
                })
            }
        };
        Ok(Self { button, pressed })
    }
}
