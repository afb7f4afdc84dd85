// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timestamps and injectable clocks.
//!
//! Every message carries a [`Timestamp`] (seconds + microseconds since the
//! Unix epoch). Components that need "now" take a [`SharedClock`] so tests can
//! drive time by hand with [`ManualClock`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MICROS_PER_SEC: i64 = 1_000_000;

/// Seconds + microseconds, normalized so that `0 <= usec < 1_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    sec: i64,
    usec: i32,
}

impl Timestamp {
    /// The epoch.
    pub const ZERO: Timestamp = Timestamp { sec: 0, usec: 0 };

    /// Encoded size on the wire (i64 seconds + i32 microseconds).
    pub const WIRE_SIZE: usize = 12;

    /// Build a timestamp, carrying excess or negative microseconds into seconds.
    pub fn new(sec: i64, usec: i64) -> Self {
        let total = sec
            .saturating_mul(MICROS_PER_SEC)
            .saturating_add(usec);
        Self::from_micros(total)
    }

    pub fn from_micros(micros: i64) -> Self {
        Self {
            sec: micros.div_euclid(MICROS_PER_SEC),
            usec: micros.rem_euclid(MICROS_PER_SEC) as i32,
        }
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self::from_micros((secs * 1e6).round() as i64)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self::from_micros(d.as_micros() as i64),
            Err(e) => Self::from_micros(-(e.duration().as_micros() as i64)),
        }
    }

    pub fn sec(&self) -> i64 {
        self.sec
    }

    pub fn usec(&self) -> i32 {
        self.usec
    }

    pub fn as_micros(&self) -> i64 {
        self.sec
            .saturating_mul(MICROS_PER_SEC)
            .saturating_add(i64::from(self.usec))
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + f64::from(self.usec) / 1e6
    }

    /// Signed difference `self - earlier` in microseconds.
    pub fn micros_since(&self, earlier: Timestamp) -> i64 {
        self.as_micros().saturating_sub(earlier.as_micros())
    }

    /// Signed difference `self - earlier` in seconds.
    pub fn secs_since(&self, earlier: Timestamp) -> f64 {
        self.micros_since(earlier) as f64 / 1e6
    }

    pub fn add_micros(&self, micros: i64) -> Self {
        Self::from_micros(self.as_micros().saturating_add(micros))
    }

    pub fn add_duration(&self, d: Duration) -> Self {
        self.add_micros(duration_micros(d))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

pub(crate) fn duration_micros(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}

/// Source of "now" for components that schedule work.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock handle shared between an endpoint and the components attached to it.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Clones share the same base time. [`ManualClock::skewed`] returns a view of
/// the same base shifted by a fixed offset, which is how two peers with
/// disagreeing clocks are simulated in one process.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Arc<Mutex<Timestamp>>,
    offset_micros: i64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            base: Arc::new(Mutex::new(start)),
            offset_micros: 0,
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut base = self.base.lock();
        *base = base.add_duration(d);
    }

    pub fn advance_micros(&self, micros: i64) {
        let mut base = self.base.lock();
        *base = base.add_micros(micros);
    }

    /// Set the shared base time (the offset of this view still applies).
    pub fn set(&self, t: Timestamp) {
        *self.base.lock() = t;
    }

    pub fn skewed(&self, offset_micros: i64) -> Self {
        Self {
            base: Arc::clone(&self.base),
            offset_micros: self.offset_micros + offset_micros,
        }
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.base.lock().add_micros(self.offset_micros)
    }
}
