// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Report;
use crate::codec::{check_len, Cursor, CursorMut, DecodeResult, EncodeResult};

/// Position and orientation of one tracker sensor.
///
/// Wire layout: `i32 sensor`, 4 zero bytes, `f64 position[3]`,
/// `f64 orientation[4]` (quaternion x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerPose {
    pub sensor: i32,
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

impl TrackerPose {
    pub const WIRE_SIZE: usize = 8 + 3 * 8 + 4 * 8;

    /// Pose at the origin with the identity rotation.
    pub fn identity(sensor: i32) -> Self {
        Self {
            sensor,
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Report for TrackerPose {
    const TYPE_NAME: &'static str = "peerbus Tracker Pos_Quat";

    fn encoded_len(&self) -> usize {
        Self::WIRE_SIZE
    }

    fn encode_into(&self, cursor: &mut CursorMut<'_>) -> EncodeResult<()> {
        cursor.write_i32(self.sensor)?;
        cursor.write_i32(0)?;
        for v in self.position.iter().chain(self.orientation.iter()) {
            cursor.write_f64(*v)?;
        }
        Ok(())
    }

    fn decode(payload: &[u8]) -> DecodeResult<Self> {
        check_len(payload.len(), Self::WIRE_SIZE)?;
        let mut cursor = Cursor::new(payload);
        let sensor = cursor.read_i32()?;
        let _pad = cursor.read_i32()?;
        let mut position = [0.0; 3];
        for v in &mut position {
            *v = cursor.read_f64()?;
        }
        let mut orientation = [0.0; 4];
        for v in &mut orientation {
            *v = cursor.read_f64()?;
        }
        Ok(Self {
            sensor,
            position,
            orientation,
        })
    }
}
