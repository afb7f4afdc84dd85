// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scoped semaphore acquisition.

use super::semaphore::{Semaphore, SemaphoreError, TryAcquire};

/// Holds one resource of a [`Semaphore`] and returns it on drop, if held.
///
/// ```
/// use peerbus::sync::{Semaphore, SemaphoreGuard};
///
/// let sem = Semaphore::new(1);
/// {
///     let guard = SemaphoreGuard::new(&sem).expect("acquire");
///     assert!(guard.locked());
///     assert!(!SemaphoreGuard::try_new(&sem).locked());
/// }
/// assert_eq!(sem.available(), 1);
/// ```
#[must_use = "the resource is released as soon as the guard is dropped"]
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
    held: bool,
}

impl<'a> SemaphoreGuard<'a> {
    /// Block until a resource is acquired.
    pub fn new(sem: &'a Semaphore) -> Result<Self, SemaphoreError> {
        sem.p()?;
        Ok(Self { sem, held: true })
    }

    /// Attempt to acquire without blocking; check [`locked`](Self::locked).
    pub fn try_new(sem: &'a Semaphore) -> Self {
        let mut guard = Self { sem, held: false };
        if let TryAcquire::Error(e) = guard.try_lock() {
            log::debug!("[SemaphoreGuard::try_new] {}", e);
        }
        guard
    }

    /// Block until held. No-op when already held.
    pub fn lock(&mut self) -> Result<(), SemaphoreError> {
        if !self.held {
            self.sem.p()?;
            self.held = true;
        }
        Ok(())
    }

    /// Acquire if possible. Reports `Acquired` when already held.
    pub fn try_lock(&mut self) -> TryAcquire {
        if self.held {
            return TryAcquire::Acquired;
        }
        let outcome = self.sem.try_p();
        self.held = outcome == TryAcquire::Acquired;
        outcome
    }

    /// Release early. No-op when not held.
    pub fn unlock(&mut self) -> Result<(), SemaphoreError> {
        if self.held {
            self.held = false;
            self.sem.v()?;
        }
        Ok(())
    }

    pub fn locked(&self) -> bool {
        self.held
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            log::warn!("[SemaphoreGuard::drop] release failed: {}", e);
        }
    }
}
