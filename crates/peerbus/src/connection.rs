// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A set of endpoints driven by one mainloop.
//!
//! A server [`Connection`] listens for TCP peers and gives each one an
//! [`Endpoint`]; a client connection starts with a single endpoint. Either
//! way, [`Connection::mainloop`] is the only thing the application has to
//! call on its thread: it accepts, drives every endpoint, and removes the
//! ones that failed or were dropped.

use crate::config::BusConfig;
use crate::endpoint::{ContainerError, Endpoint, EndpointContainer, EndpointState};
use crate::error::{Error, Result};
use crate::message::Reliability;
use crate::registry::DROPPED_LAST_CONNECTION;
use crate::time::{SharedClock, SystemClock, Timestamp};
use crate::transport::{LoopbackTransport, TcpAcceptor, TcpTransport, Transport};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

type EndpointHook = Box<dyn FnMut(usize, &mut Endpoint)>;

pub struct Connection {
    endpoints: EndpointContainer<Endpoint>,
    acceptor: Option<TcpAcceptor>,
    config: BusConfig,
    clock: SharedClock,
    on_endpoint: Option<EndpointHook>,
    rejected_peers: u64,
}

impl Connection {
    /// Connection with no endpoints and no listener.
    pub fn new(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            endpoints: EndpointContainer::with_limits(
                config.max_endpoints,
                config.endpoint_headroom,
            ),
            acceptor: None,
            config,
            clock: SystemClock::shared(),
            on_endpoint: None,
            rejected_peers: 0,
        })
    }

    /// Listen on the configured address; every accepted peer gets an
    /// endpoint.
    pub fn server(config: BusConfig) -> Result<Self> {
        let mut conn = Self::new(config)?;
        conn.acceptor = Some(TcpAcceptor::bind(&conn.config)?);
        Ok(conn)
    }

    /// Connect to one server.
    pub fn client<A: ToSocketAddrs>(addr: A, config: BusConfig) -> Result<Self> {
        let mut conn = Self::new(config)?;
        let transport = TcpTransport::connect(addr, &conn.config)?;
        conn.add_transport(Box::new(transport))?;
        Ok(conn)
    }

    /// Connection with one endpoint over an existing transport.
    pub fn from_transport(transport: Box<dyn Transport>, config: BusConfig) -> Result<Self> {
        let mut conn = Self::new(config)?;
        conn.add_transport(transport)?;
        Ok(conn)
    }

    /// Two connections joined in-process.
    pub fn loopback_pair(config: BusConfig) -> Result<(Self, Self)> {
        let (a, b) = LoopbackTransport::pair(config.low_latency_depth);
        Ok((
            Self::from_transport(Box::new(a), config.clone())?,
            Self::from_transport(Box::new(b), config)?,
        ))
    }

    /// Clock for endpoints created from now on.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Run `hook` on every new endpoint before its first tick, and right
    /// away on the endpoints that already exist.
    pub fn on_endpoint<F>(&mut self, mut hook: F)
    where
        F: FnMut(usize, &mut Endpoint) + 'static,
    {
        for (index, ep) in self.endpoints.iter_mut() {
            hook(index, ep);
        }
        self.on_endpoint = Some(Box::new(hook));
    }

    /// Give `transport` an endpoint. Fails with `Full` near the ceiling.
    pub fn add_transport(&mut self, transport: Box<dyn Transport>) -> Result<usize> {
        let peer = transport.peer();
        let config = &self.config;
        let clock = &self.clock;
        let index = self
            .endpoints
            .allocate(|| {
                Ok::<_, ContainerError>(Endpoint::with_clock(
                    transport,
                    config,
                    Arc::clone(clock),
                ))
            })
            .map_err(|e| {
                log::warn!("[Connection::add_transport] rejecting {}: {}", peer, e);
                e
            })?;
        if let (Some(hook), Some(ep)) = (self.on_endpoint.as_mut(), self.endpoints.get_mut(index)) {
            hook(index, ep);
        }
        log::debug!("[Connection::add_transport] {} at slot {}", peer, index);
        Ok(index)
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.as_ref().and_then(|a| a.local_addr().ok())
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &EndpointContainer<Endpoint> {
        &self.endpoints
    }

    pub fn endpoint_mut(&mut self, index: usize) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(index)
    }

    /// Accepted peers turned away because the endpoint container was full.
    pub fn rejected_peers(&self) -> u64 {
        self.rejected_peers
    }

    /// Endpoints that are not dropped.
    pub fn live_endpoints(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|(_, ep)| ep.state() != EndpointState::Dropped)
            .count()
    }

    /// One tick: accept, drive every endpoint, remove the dead ones.
    ///
    /// Returns the number of messages dispatched across all endpoints. An
    /// endpoint that fails is logged and destroyed; it does not fail the tick.
    pub fn mainloop(&mut self) -> Result<usize> {
        self.accept_pending();

        let mut delivered = 0;
        let mut cursor = self.endpoints.begin();
        while let Some(index) = cursor.index() {
            let outcome = match self.endpoints.at_mut(cursor) {
                Some(ep) => ep.mainloop().map(|n| (n, ep.state())),
                None => Ok((0, EndpointState::Dropped)),
            };
            match outcome {
                Ok((n, EndpointState::Dropped)) => {
                    delivered += n;
                    self.destroy_endpoint(index, None);
                }
                Ok((n, _)) => delivered += n,
                Err(e) => self.destroy_endpoint(index, Some(&e)),
            }
            cursor = self.endpoints.next(cursor);
        }

        if self.endpoints.needs_compact() {
            self.endpoints.compact();
        }
        Ok(delivered)
    }

    /// Send one message to every endpoint, registering the names where
    /// needed. Returns how many endpoints accepted it.
    pub fn broadcast(
        &mut self,
        type_name: &str,
        sender_name: &str,
        timestamp: Timestamp,
        payload: &[u8],
        reliability: Reliability,
    ) -> Result<usize> {
        let mut sent = 0;
        for (index, ep) in self.endpoints.iter_mut() {
            if ep.state() == EndpointState::Dropped {
                continue;
            }
            let ids = ep
                .register_type(type_name)
                .and_then(|t| ep.register_sender(sender_name).map(|s| (t, s)));
            let (type_id, sender_id) = match ids {
                Ok(ids) => ids,
                Err(e) => {
                    log::debug!("[Connection::broadcast] slot {}: {}", index, e);
                    continue;
                }
            };
            match ep.send(type_id, sender_id, timestamp, payload, reliability) {
                Ok(()) => sent += 1,
                Err(e @ crate::endpoint::SendError::PayloadTooLarge { .. }) => {
                    return Err(Error::Send(e))
                }
                Err(e) => log::debug!("[Connection::broadcast] slot {}: {}", index, e),
            }
        }
        Ok(sent)
    }

    fn accept_pending(&mut self) {
        let Some(acceptor) = self.acceptor.as_mut() else {
            return;
        };
        let accepted = match acceptor.accept_pending() {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("[Connection::mainloop] accept failed: {}", e);
                return;
            }
        };
        let accepted = accepted
            .into_iter()
            .map(|t| Box::new(t) as Box<dyn Transport>);
        self.admit(accepted);
    }

    /// Give each transport an endpoint, counting the ones turned away.
    /// A rejected transport is dropped, which closes it.
    fn admit<I>(&mut self, transports: I) -> usize
    where
        I: IntoIterator<Item = Box<dyn Transport>>,
    {
        let mut rejected = 0;
        for transport in transports {
            if self.add_transport(transport).is_err() {
                rejected += 1;
            }
        }
        if rejected > 0 {
            self.rejected_peers += rejected as u64;
            log::warn!(
                "[Connection::mainloop] turned away {} peers ({} total)",
                rejected,
                self.rejected_peers
            );
        }
        rejected
    }

    fn destroy_endpoint(&mut self, index: usize, failure: Option<&Error>) {
        let last = self.endpoints.len() == 1;
        if let Some(ep) = self.endpoints.get_mut(index) {
            match failure {
                Some(e) => log::warn!("[Connection] dropping {}: {}", ep.peer(), e),
                None => log::info!("[Connection] removing {}", ep.peer()),
            }
            ep.drop_connection();
            // Only a connection that was ever up can be the last one lost.
            if last && ep.was_connected() {
                if let Err(fault) = ep.dispatch_system(DROPPED_LAST_CONNECTION) {
                    log::warn!("[Connection] {} on last connection drop", fault);
                }
            }
        }
        self.endpoints.destroy(index);
    }
}
