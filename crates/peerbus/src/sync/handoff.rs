// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Semaphore-guarded buffer between device threads and the mainloop.
//!
//! Device threads [`push`](Handoff::push) samples (blocking briefly on the
//! semaphore); the mainloop calls [`try_drain`](Handoff::try_drain) once per
//! tick and skips the tick's drain if a producer holds the lock, so the
//! mainloop never blocks.

use super::guard::SemaphoreGuard;
use super::semaphore::{Semaphore, SemaphoreError};
use std::cell::UnsafeCell;
use std::collections::VecDeque;

pub struct Handoff<T> {
    lock: Semaphore,
    items: UnsafeCell<VecDeque<T>>,
}

// SAFETY: Handoff is Send + Sync because:
// - `items` is only touched while holding the single resource of `lock`
// - T: Send, and items only ever move between threads by value
unsafe impl<T: Send> Send for Handoff<T> {}
unsafe impl<T: Send> Sync for Handoff<T> {}

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Self {
            lock: Semaphore::new(1),
            items: UnsafeCell::new(VecDeque::new()),
        }
    }

    /// Append one item; blocks while another thread holds the buffer.
    pub fn push(&self, item: T) -> Result<(), SemaphoreError> {
        let _guard = SemaphoreGuard::new(&self.lock)?;
        // SAFETY: the guard holds the only resource of `lock`, so no other
        // reference to `items` exists until it is dropped.
        unsafe { (*self.items.get()).push_back(item) };
        Ok(())
    }

    /// Take everything queued so far, or `None` if the buffer is busy.
    pub fn try_drain(&self) -> Option<Vec<T>> {
        let guard = SemaphoreGuard::try_new(&self.lock);
        if !guard.locked() {
            return None;
        }
        // SAFETY: exclusive access while `guard` is held (see `push`).
        let drained = unsafe { (*self.items.get()).drain(..).collect() };
        drop(guard);
        Some(drained)
    }

    /// Take everything queued so far, waiting for the buffer if needed.
    pub fn drain(&self) -> Result<Vec<T>, SemaphoreError> {
        let _guard = SemaphoreGuard::new(&self.lock)?;
        // SAFETY: exclusive access while `_guard` is held (see `push`).
        Ok(unsafe { (*self.items.get()).drain(..).collect() })
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}
