// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoded message as handed to handlers.

use crate::registry::{SenderId, TypeId};
use crate::time::Timestamp;

/// Delivery class of a message. Only the lane differs; the frame is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reliability {
    /// In order, no loss.
    #[default]
    Reliable,
    /// Best effort; dropped rather than delayed, order kept among delivered.
    LowLatency,
}

/// One message with ids already translated into the receiver's registries.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub type_id: TypeId,
    pub sender_id: SenderId,
    pub timestamp: Timestamp,
    pub payload: &'a [u8],
    pub reliability: Reliability,
}

impl<'a> Message<'a> {
    pub fn new(type_id: TypeId, sender_id: SenderId, timestamp: Timestamp, payload: &'a [u8]) -> Self {
        Self {
            type_id,
            sender_id,
            timestamp,
            payload,
            reliability: Reliability::Reliable,
        }
    }

    pub fn with_reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }
}
