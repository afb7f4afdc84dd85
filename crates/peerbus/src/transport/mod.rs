// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Links between two endpoints.
//!
//! A [`Transport`] moves already-encoded frames. It has a reliable lane
//! (ordered, lossless) and a low-latency lane (best effort). Transports
//! never block: [`Transport::poll`] does whatever I/O is possible right
//! now and reports the link state.
//!
//! | Transport | Reliable lane | Low-latency lane |
//! |-----------|---------------|------------------|
//! | [`LoopbackTransport`] | unbounded in-process queue | bounded queue, oldest displaced |
//! | [`TcpTransport`] | TCP stream | UDP datagrams, TCP fallback |

pub mod loopback;
pub mod tcp;
pub mod udp;

pub use loopback::LoopbackTransport;
pub use tcp::{TcpAcceptor, TcpTransport};

use crate::message::Reliability;
use std::io;

/// State of a link as seen from one end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Connected at the socket level, greeting not yet exchanged.
    Handshaking,
    Open,
    Closed,
}

/// Received bytes holding one or more whole frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub reliability: Reliability,
    pub bytes: Vec<u8>,
}

pub trait Transport {
    /// Perform pending I/O, append whatever arrived to `inbox`, and report
    /// the link state.
    fn poll(&mut self, inbox: &mut Vec<Inbound>) -> io::Result<LinkStatus>;

    /// Queue one encoded frame on the lane chosen by `reliability`.
    fn send(&mut self, reliability: Reliability, frame: Vec<u8>) -> io::Result<()>;

    /// Push queued reliable bytes to the wire, as far as possible without
    /// blocking.
    fn flush(&mut self) -> io::Result<()>;

    fn close(&mut self);

    /// Human-readable peer description for logs.
    fn peer(&self) -> String;
}
