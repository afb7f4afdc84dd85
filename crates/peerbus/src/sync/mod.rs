// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Concurrency primitives for handing data from device threads to the
//! single-threaded mainloop.

pub mod guard;
pub mod handoff;
pub mod semaphore;
pub mod thread;

pub use guard::SemaphoreGuard;
pub use handoff::Handoff;
pub use semaphore::{Semaphore, SemaphoreError, TryAcquire, SEM_VALUE_MAX};
pub use thread::{number_of_processors, Thread, ThreadData, ThreadError};
