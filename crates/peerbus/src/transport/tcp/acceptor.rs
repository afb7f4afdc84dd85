// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Non-blocking TCP listener for the server role.

use super::TcpTransport;
use crate::config::BusConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

pub struct TcpAcceptor {
    listener: TcpListener,
    config: BusConfig,
}

impl TcpAcceptor {
    /// Listen on `config.bind_address:config.listen_port`.
    pub fn bind(config: &BusConfig) -> io::Result<Self> {
        let addr = config
            .listen_addr()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no listen address"))?;
        Self::bind_addr(addr, config)
    }

    pub fn bind_addr(addr: SocketAddr, config: &BusConfig) -> io::Result<Self> {
        let socket2 = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket2.set_reuse_address(true)?;
        socket2.bind(&addr.into())?;
        socket2.listen(config.backlog)?;
        socket2.set_nonblocking(true)?;
        let listener: TcpListener = socket2.into();
        log::info!("[TcpAcceptor::bind] listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Every connection waiting right now, wrapped as transports.
    ///
    /// A connection that fails set-up is logged and skipped.
    pub fn accept_pending(&mut self) -> io::Result<Vec<TcpTransport>> {
        let mut accepted = Vec::new();
        loop {
            match self.listener.accept() {
                Ok((stream, from)) => match TcpTransport::from_stream(stream, &self.config) {
                    Ok(t) => {
                        log::info!("[TcpAcceptor] accepted {}", from);
                        accepted.push(t);
                    }
                    Err(e) => log::warn!("[TcpAcceptor] dropping {}: {}", from, e),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(accepted),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
