// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP low-latency lane of a TCP link.
//!
//! One datagram carries one frame. Sends that would block are dropped:
//! this lane prefers losing a sample to delaying the next one.

use super::Inbound;
use crate::config::MAX_UDP_FRAME;
use crate::message::Reliability;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};

#[derive(Debug)]
pub struct UdpLane {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    buf: Vec<u8>,
    dropped: u64,
}

impl UdpLane {
    /// Bind a non-blocking socket on `ip` with an ephemeral port.
    pub fn bind(ip: IpAddr) -> io::Result<Self> {
        let bind_addr = SocketAddr::new(ip, 0);
        let socket2 = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        socket2.bind(&bind_addr.into())?;
        socket2.set_nonblocking(true)?;
        let socket: UdpSocket = socket2.into();
        log::debug!("[UdpLane::bind] bound {}", socket.local_addr()?);
        Ok(Self {
            socket,
            peer: None,
            buf: vec![0u8; MAX_UDP_FRAME],
            dropped: 0,
        })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Fix the peer; datagrams from anyone else are discarded.
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    pub fn is_ready(&self) -> bool {
        self.peer.is_some()
    }

    /// Datagrams dropped on send because the socket would block.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let Some(peer) = self.peer else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "UDP lane has no peer"));
        };
        match self.socket.send_to(frame, peer) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.dropped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Read every pending datagram from the peer.
    pub fn recv_into(&mut self, inbox: &mut Vec<Inbound>) -> io::Result<()> {
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((n, from)) => {
                    if Some(from) != self.peer {
                        log::debug!("[UdpLane::recv_into] ignoring datagram from {}", from);
                        continue;
                    }
                    inbox.push(Inbound {
                        reliability: Reliability::LowLatency,
                        bytes: self.buf[..n].to_vec(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
