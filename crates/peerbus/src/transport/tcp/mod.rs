// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP link with optional UDP low-latency lane.
//!
//! # Lifecycle
//!
//! ```text
//!  connect()/accept()
//!        |
//!        v
//!  +-------------+   cookie ok    +------+   EOF / error / close()  +--------+
//!  | Handshaking |--------------->| Open |------------------------->| Closed |
//!  +-------------+                +------+                          +--------+
//!        | bad cookie / EOF                                              ^
//!        +---------------------------------------------------------------+
//! ```
//!
//! The greeting ([`cookie`]) is queued first on the send side, so frames
//! queued while handshaking follow it on the wire.

pub mod acceptor;
pub mod cookie;
pub mod frame_codec;

pub use acceptor::TcpAcceptor;
pub use frame_codec::FrameCodec;

use super::udp::UdpLane;
use super::{Inbound, LinkStatus, Transport};
use crate::config::{BusConfig, COOKIE_LEN, MAX_UDP_FRAME};
use crate::message::Reliability;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

/// Counters for one TCP link.
#[derive(Clone, Debug, Default)]
pub struct TcpLinkStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    /// Writes that only partly went out.
    pub partial_sends: u64,
}

pub struct TcpTransport {
    stream: TcpStream,
    peer_addr: SocketAddr,
    status: LinkStatus,
    codec: FrameCodec,
    cookie_buf: [u8; COOKIE_LEN],
    cookie_read: usize,
    send_queue: VecDeque<Vec<u8>>,
    pending_send: Option<(Vec<u8>, usize)>,
    udp: Option<UdpLane>,
    stats: TcpLinkStats,
}

impl TcpTransport {
    /// Connect to `addr` (blocking up to the configured timeout), then
    /// switch to non-blocking mode.
    pub fn connect<A: ToSocketAddrs>(addr: A, config: &BusConfig) -> io::Result<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
                Ok(stream) => {
                    log::info!("[TcpTransport::connect] connected to {}", candidate);
                    return Self::from_stream(stream, config);
                }
                Err(e) => {
                    log::debug!("[TcpTransport::connect] {} failed: {}", candidate, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        }))
    }

    /// Wrap an established stream (client side or accepted).
    pub fn from_stream(stream: TcpStream, config: &BusConfig) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(config.tcp_nodelay)?;
        let peer_addr = stream.peer_addr()?;

        let udp = if config.udp_lane {
            match UdpLane::bind(stream.local_addr()?.ip()) {
                Ok(lane) => Some(lane),
                Err(e) => {
                    log::warn!(
                        "[TcpTransport::from_stream] no UDP lane to {}: {}; low-latency goes over TCP",
                        peer_addr,
                        e
                    );
                    None
                }
            }
        } else {
            None
        };
        let udp_port = match &udp {
            Some(lane) => lane.local_port()?,
            None => 0,
        };

        let mut send_queue = VecDeque::new();
        send_queue.push_back(cookie::encode_cookie(udp_port).to_vec());

        Ok(Self {
            stream,
            peer_addr,
            status: LinkStatus::Handshaking,
            codec: FrameCodec::new(config.max_frame_size),
            cookie_buf: [0u8; COOKIE_LEN],
            cookie_read: 0,
            send_queue,
            pending_send: None,
            udp,
            stats: TcpLinkStats::default(),
        })
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn stats(&self) -> &TcpLinkStats {
        &self.stats
    }

    /// True once the peer's greeting announced a UDP port we can use.
    pub fn has_udp_lane(&self) -> bool {
        self.udp.as_ref().is_some_and(UdpLane::is_ready)
    }

    fn fail(&mut self, why: &dyn std::fmt::Display) -> LinkStatus {
        log::info!("[TcpTransport] link to {} closed: {}", self.peer_addr, why);
        self.close();
        LinkStatus::Closed
    }

    /// Read the peer greeting; returns true once it is complete and valid.
    fn read_cookie(&mut self) -> io::Result<bool> {
        while self.cookie_read < COOKIE_LEN {
            match self.stream.read(&mut self.cookie_buf[self.cookie_read..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "closed during greeting",
                    ))
                }
                Ok(n) => self.cookie_read += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let cookie = cookie::parse_cookie(&self.cookie_buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let (Some(lane), port) = (self.udp.as_mut(), cookie.udp_port) {
            if port != 0 {
                lane.set_peer(SocketAddr::new(self.peer_addr.ip(), port));
            }
        }
        log::debug!(
            "[TcpTransport] greeting from {}: v{}.{} udp port {}",
            self.peer_addr,
            cookie.major,
            cookie.minor,
            cookie.udp_port
        );
        Ok(true)
    }

    fn write_queued(&mut self) -> io::Result<()> {
        if let Some((buf, mut offset)) = self.pending_send.take() {
            loop {
                match self.stream.write(&buf[offset..]) {
                    Ok(0) => {
                        return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed"))
                    }
                    Ok(n) => {
                        self.stats.bytes_sent += n as u64;
                        offset += n;
                        if offset >= buf.len() {
                            self.stats.frames_sent += 1;
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        self.pending_send = Some((buf, offset));
                        return Ok(());
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        while let Some(frame) = self.send_queue.pop_front() {
            match self.stream.write(&frame) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed")),
                Ok(n) if n == frame.len() => {
                    self.stats.bytes_sent += n as u64;
                    self.stats.frames_sent += 1;
                }
                Ok(n) => {
                    self.stats.bytes_sent += n as u64;
                    self.stats.partial_sends += 1;
                    self.pending_send = Some((frame, n));
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.send_queue.push_front(frame);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.send_queue.push_front(frame);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn poll(&mut self, inbox: &mut Vec<Inbound>) -> io::Result<LinkStatus> {
        if self.status == LinkStatus::Closed {
            return Ok(LinkStatus::Closed);
        }
        if let Err(e) = self.write_queued() {
            return Ok(self.fail(&e));
        }

        if self.status == LinkStatus::Handshaking {
            match self.read_cookie() {
                Ok(true) => {
                    self.status = LinkStatus::Open;
                    log::info!("[TcpTransport] link to {} open", self.peer_addr);
                }
                Ok(false) => return Ok(LinkStatus::Handshaking),
                Err(e) => return Ok(self.fail(&e)),
            }
        }

        loop {
            match self.codec.decode(&mut self.stream) {
                Ok(Some(frame)) => {
                    self.stats.frames_received += 1;
                    inbox.push(Inbound {
                        reliability: Reliability::Reliable,
                        bytes: frame,
                    });
                }
                Ok(None) => break,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(self.fail(&e));
                }
                Err(e) => {
                    // Garbage on the stream: nothing after it can be framed.
                    self.close();
                    return Err(e);
                }
            }
        }

        if let Some(lane) = self.udp.as_mut() {
            let before = inbox.len();
            if let Err(e) = lane.recv_into(inbox) {
                log::warn!("[TcpTransport] UDP lane to {} failed: {}", self.peer_addr, e);
                self.udp = None;
            }
            self.stats.datagrams_received += (inbox.len() - before) as u64;
        }

        Ok(self.status)
    }

    fn send(&mut self, reliability: Reliability, frame: Vec<u8>) -> io::Result<()> {
        if self.status == LinkStatus::Closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link closed"));
        }
        if reliability == Reliability::LowLatency && frame.len() <= MAX_UDP_FRAME {
            if let Some(lane) = self.udp.as_mut().filter(|l| l.is_ready()) {
                lane.send(&frame)?;
                self.stats.datagrams_sent += 1;
                return Ok(());
            }
        }
        self.send_queue.push_back(frame);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.status == LinkStatus::Closed {
            return Ok(());
        }
        if let Err(e) = self.write_queued() {
            self.fail(&e);
            return Err(e);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.status == LinkStatus::Closed {
            return;
        }
        // Best effort: hand whatever is queued to the kernel before shutdown.
        let _ = self.write_queued();
        let _ = self.stream.shutdown(Shutdown::Both);
        self.status = LinkStatus::Closed;
        self.send_queue.clear();
        self.pending_send = None;
        self.codec.reset();
    }

    fn peer(&self) -> String {
        self.peer_addr.to_string()
    }
}
