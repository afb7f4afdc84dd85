// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Restartable worker thread with cooperative kill.
//!
//! [`Thread::kill`] returns immediately: the worker is detached and stops at
//! its next cancellation point ([`ThreadData::checkpoint`] or
//! [`ThreadData::sleep`]). It stops by parking forever, not by unwinding, so
//! nothing on its stack is dropped. A [`SemaphoreGuard`] held across a
//! cancellation point stays held for good; code that can be killed must
//! release shared resources before reaching one.
//!
//! [`SemaphoreGuard`]: super::SemaphoreGuard

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum ThreadError {
    AlreadyRunning,
    NotRunning,
    Spawn(io::Error),
    /// The worker panicked; reported by [`Thread::join`].
    Panicked,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::AlreadyRunning => write!(f, "thread already running"),
            ThreadError::NotRunning => write!(f, "thread not running"),
            ThreadError::Spawn(e) => write!(f, "failed to spawn thread: {}", e),
            ThreadError::Panicked => write!(f, "thread panicked"),
        }
    }
}

impl std::error::Error for ThreadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ThreadError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Control {
    running: AtomicBool,
    killed: Mutex<bool>,
    wake: Condvar,
}

impl Control {
    fn kill(&self) {
        *self.killed.lock() = true;
        self.wake.notify_all();
    }
}

fn park_forever() -> ! {
    loop {
        thread::park();
    }
}

/// What a worker sees: its user data and its cancellation points.
pub struct ThreadData<D> {
    user_data: D,
    control: Arc<Control>,
}

impl<D> ThreadData<D> {
    pub fn user_data(&self) -> &D {
        &self.user_data
    }

    pub fn killed(&self) -> bool {
        *self.control.killed.lock()
    }

    /// Cancellation point: never returns once the thread has been killed.
    pub fn checkpoint(&self) {
        if self.killed() {
            park_forever();
        }
    }

    /// Sleep for `d`; a cancellation point that also wakes early on kill.
    pub fn sleep(&self, d: Duration) {
        let deadline = Instant::now() + d;
        let mut killed = self.control.killed.lock();
        while !*killed {
            if self.control.wake.wait_until(&mut killed, deadline).timed_out() {
                break;
            }
        }
        let was_killed = *killed;
        drop(killed);
        if was_killed {
            park_forever();
        }
    }
}

type StartFn<D> = Arc<dyn Fn(&ThreadData<D>) + Send + Sync>;

struct Worker {
    control: Arc<Control>,
    handle: Option<JoinHandle<()>>,
    id: ThreadId,
}

/// Handle to a worker that runs `start(&ThreadData)` each time it is started.
pub struct Thread<D: Clone + Send + 'static> {
    start: StartFn<D>,
    user_data: D,
    name: String,
    worker: Option<Worker>,
}

impl<D: Clone + Send + 'static> Thread<D> {
    pub fn new<F>(start: F, user_data: D) -> Self
    where
        F: Fn(&ThreadData<D>) + Send + Sync + 'static,
    {
        Self {
            start: Arc::new(start),
            user_data,
            name: "peerbus-worker".to_string(),
            worker: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Start the worker with the current user data.
    pub fn go(&mut self) -> Result<(), ThreadError> {
        if self.running() {
            return Err(ThreadError::AlreadyRunning);
        }
        let control = Arc::new(Control::default());
        control.running.store(true, Ordering::Release);

        let data = ThreadData {
            user_data: self.user_data.clone(),
            control: Arc::clone(&control),
        };
        let start = Arc::clone(&self.start);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                start(&data);
                data.control.running.store(false, Ordering::Release);
            })
            .map_err(|e| {
                control.running.store(false, Ordering::Release);
                ThreadError::Spawn(e)
            })?;

        log::debug!("[Thread::go] started '{}' ({:?})", self.name, handle.thread().id());
        self.worker = Some(Worker {
            control,
            id: handle.thread().id(),
            handle: Some(handle),
        });
        Ok(())
    }

    /// Stop the worker at its next cancellation point and forget it.
    pub fn kill(&mut self) -> Result<(), ThreadError> {
        if !self.running() {
            return Err(ThreadError::NotRunning);
        }
        if let Some(mut worker) = self.worker.take() {
            worker.control.kill();
            worker.control.running.store(false, Ordering::Release);
            // Detach: a killed worker never finishes, so it is never joined.
            drop(worker.handle.take());
            log::debug!("[Thread::kill] killed '{}' ({:?})", self.name, worker.id);
        }
        Ok(())
    }

    pub fn running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.control.running.load(Ordering::Acquire))
    }

    /// Id of the current or last started worker.
    pub fn id(&self) -> Option<ThreadId> {
        self.worker.as_ref().map(|w| w.id)
    }

    /// Wait for a worker that returns on its own.
    pub fn join(&mut self) -> Result<(), ThreadError> {
        let handle = self
            .worker
            .as_mut()
            .and_then(|w| w.handle.take())
            .ok_or(ThreadError::NotRunning)?;
        handle.join().map_err(|_| ThreadError::Panicked)
    }

    /// Replace the user data passed on the next [`go`](Self::go).
    pub fn set_user_data(&mut self, user_data: D) {
        self.user_data = user_data;
    }

    pub fn user_data(&self) -> &D {
        &self.user_data
    }

    /// Threads are supported on every target this crate builds for.
    pub const fn available() -> bool {
        true
    }
}

/// Number of online processors.
#[cfg(unix)]
pub fn number_of_processors() -> usize {
    // SAFETY: sysconf has no preconditions and only reads system state.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n > 0 {
        return n as usize;
    }
    log::debug!("[number_of_processors] sysconf failed, using available_parallelism");
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Number of online processors.
#[cfg(not(unix))]
pub fn number_of_processors() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}
