// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport pair.
//!
//! Each direction is a [`Lane`]: an unbounded `SegQueue` for reliable frames
//! and a bounded `ArrayQueue` for low-latency frames, where a push into a
//! full queue displaces the oldest frame. The two ends may live on
//! different threads.

use super::{Inbound, LinkStatus, Transport};
use crate::message::Reliability;
use crossbeam::queue::{ArrayQueue, SegQueue};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct Lane {
    reliable: SegQueue<Vec<u8>>,
    low_latency: ArrayQueue<Vec<u8>>,
    closed: AtomicBool,
    displaced: AtomicU64,
}

impl Lane {
    fn new(low_latency_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            reliable: SegQueue::new(),
            low_latency: ArrayQueue::new(low_latency_depth.max(1)),
            closed: AtomicBool::new(false),
            displaced: AtomicU64::new(0),
        })
    }
}

pub struct LoopbackTransport {
    tx: Arc<Lane>,
    rx: Arc<Lane>,
    name: &'static str,
    closed: bool,
}

impl LoopbackTransport {
    /// Two connected ends, named `"loopback-a"` and `"loopback-b"`.
    pub fn pair(low_latency_depth: usize) -> (Self, Self) {
        let a_to_b = Lane::new(low_latency_depth);
        let b_to_a = Lane::new(low_latency_depth);
        (
            Self {
                tx: Arc::clone(&a_to_b),
                rx: Arc::clone(&b_to_a),
                name: "loopback-a",
                closed: false,
            },
            Self {
                tx: b_to_a,
                rx: a_to_b,
                name: "loopback-b",
                closed: false,
            },
        )
    }

    /// Low-latency frames this end sent that were displaced before the peer
    /// read them.
    pub fn displaced(&self) -> u64 {
        self.tx.displaced.load(Ordering::Relaxed)
    }
}

impl Transport for LoopbackTransport {
    fn poll(&mut self, inbox: &mut Vec<Inbound>) -> io::Result<LinkStatus> {
        if self.closed {
            return Ok(LinkStatus::Closed);
        }
        while let Some(bytes) = self.rx.reliable.pop() {
            inbox.push(Inbound {
                reliability: Reliability::Reliable,
                bytes,
            });
        }
        while let Some(bytes) = self.rx.low_latency.pop() {
            inbox.push(Inbound {
                reliability: Reliability::LowLatency,
                bytes,
            });
        }
        if self.rx.closed.load(Ordering::Acquire) {
            self.closed = true;
            return Ok(LinkStatus::Closed);
        }
        Ok(LinkStatus::Open)
    }

    fn send(&mut self, reliability: Reliability, frame: Vec<u8>) -> io::Result<()> {
        if self.closed || self.tx.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback closed"));
        }
        match reliability {
            Reliability::Reliable => self.tx.reliable.push(frame),
            Reliability::LowLatency => {
                if self.tx.low_latency.force_push(frame).is_some() {
                    self.tx.displaced.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            log::debug!("[LoopbackTransport::close] {}", self.name);
        }
        self.closed = true;
        self.tx.closed.store(true, Ordering::Release);
    }

    fn peer(&self) -> String {
        self.name.to_string()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.close();
    }
}
