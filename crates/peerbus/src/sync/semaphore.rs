// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Counting semaphore.
//!
//! One implementation for every platform, on `parking_lot` primitives. The
//! count always stays in `[0, max_resources]`.

use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Largest resource count a semaphore accepts.
pub const SEM_VALUE_MAX: usize = i32::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemaphoreError {
    /// The semaphore could not be (re)built and is unusable until a
    /// successful [`Semaphore::reset`].
    PlatformFailure { reason: String },
    /// `v()` on a semaphore already holding all its resources.
    Overflow { max_resources: usize },
}

impl fmt::Display for SemaphoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemaphoreError::PlatformFailure { reason } => {
                write!(f, "semaphore unusable: {}", reason)
            }
            SemaphoreError::Overflow { max_resources } => {
                write!(f, "semaphore released past its {} resources", max_resources)
            }
        }
    }
}

impl std::error::Error for SemaphoreError {}

/// Outcome of a non-blocking acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryAcquire {
    Acquired,
    Unavailable,
    Error(SemaphoreError),
}

#[derive(Debug)]
struct State {
    count: usize,
    max: usize,
    broken: Option<String>,
}

impl State {
    fn check(&self) -> Result<(), SemaphoreError> {
        match &self.broken {
            Some(reason) => Err(SemaphoreError::PlatformFailure {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Counting semaphore; `p` acquires, `v` releases.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<State>,
    available: Condvar,
}

impl Semaphore {
    /// Semaphore with `max_resources` resources, all available.
    ///
    /// An unsupported count yields a broken semaphore (every operation
    /// fails); use [`try_new`](Self::try_new) to get the error instead.
    pub fn new(max_resources: usize) -> Self {
        let sem = Self {
            state: Mutex::new(State {
                count: 0,
                max: 0,
                broken: None,
            }),
            available: Condvar::new(),
        };
        if let Err(e) = sem.reset(max_resources) {
            log::warn!("[Semaphore::new] {}", e);
        }
        sem
    }

    pub fn try_new(max_resources: usize) -> Result<Self, SemaphoreError> {
        let sem = Self::new(max_resources);
        sem.state.lock().check()?;
        Ok(sem)
    }

    /// Block until a resource is available, then take it.
    pub fn p(&self) -> Result<(), SemaphoreError> {
        let mut state = self.state.lock();
        state.check()?;
        while state.count == 0 {
            self.available.wait(&mut state);
            state.check()?;
        }
        state.count -= 1;
        Ok(())
    }

    /// Return a resource.
    pub fn v(&self) -> Result<(), SemaphoreError> {
        let mut state = self.state.lock();
        state.check()?;
        if state.count >= state.max {
            return Err(SemaphoreError::Overflow {
                max_resources: state.max,
            });
        }
        state.count += 1;
        self.available.notify_one();
        Ok(())
    }

    /// Take a resource if one is available, without blocking.
    pub fn try_p(&self) -> TryAcquire {
        let mut state = self.state.lock();
        if let Err(e) = state.check() {
            return TryAcquire::Error(e);
        }
        if state.count == 0 {
            return TryAcquire::Unavailable;
        }
        state.count -= 1;
        TryAcquire::Acquired
    }

    /// Rebuild with `max_resources` resources, all available.
    ///
    /// Callers must ensure no thread is inside `p`/`v`. Blocked waiters are
    /// woken; on failure they see the broken state.
    pub fn reset(&self, max_resources: usize) -> Result<(), SemaphoreError> {
        let mut state = self.state.lock();
        let result = if max_resources > SEM_VALUE_MAX {
            let reason = format!(
                "resource count {} exceeds {}",
                max_resources, SEM_VALUE_MAX
            );
            state.count = 0;
            state.max = 0;
            state.broken = Some(reason.clone());
            Err(SemaphoreError::PlatformFailure { reason })
        } else {
            state.count = max_resources;
            state.max = max_resources;
            state.broken = None;
            Ok(())
        };
        self.available.notify_all();
        result
    }

    /// Resources currently available.
    pub fn available(&self) -> usize {
        self.state.lock().count
    }

    pub fn max_resources(&self) -> usize {
        self.state.lock().max
    }

    pub fn is_broken(&self) -> bool {
        self.state.lock().broken.is_some()
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(1)
    }
}
