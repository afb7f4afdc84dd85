// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One link to one peer.
//!
//! An [`Endpoint`] owns a transport, its own type and sender registries, the
//! tables translating the peer's ids into local ones, a [`Dispatcher`] and
//! an [`Outbox`].
//!
//! # Lifecycle
//!
//! ```text
//!  Connecting --(link open)--> Connected --(peer gone / drop_connection)--> Dropped
//!      |                                                                       ^
//!      +-------------------------(link closed)----------------------------------+
//! ```
//!
//! When the link opens, every name registered so far is described to the
//! peer before any queued message, then a got-connection message is
//! dispatched locally. Names registered later are described before the next
//! message leaves.
//!
//! A link that closes while still connecting, with frames already received,
//! is opened first so those frames are dispatched, then dropped.
//!
//! # Clock offset
//!
//! Timestamps on the peer's data messages are moved onto the local clock by
//! subtracting the offset set with [`Endpoint::set_clock_offset`] (peer clock
//! minus local clock, zero until set). Pings and pongs keep the peer's
//! timestamps.

pub mod container;

pub use container::{ContainerEntry, ContainerError, EndpointContainer, EndpointCursor};

use crate::codec::{
    decode_exact, encode_exact, encode_frame, is_control_type, EncodeError, FrameReader,
    FrameView, DISCONNECT, HEADER_LEN, SENDER_DESCRIPTION, TYPE_DESCRIPTION,
};
use crate::config::BusConfig;
use crate::dispatch::{Dispatcher, HandlerFault, HandlerResult, SenderFilter, SubscriptionHandle};
use crate::error::Error;
use crate::message::{Message, Reliability};
use crate::registry::{
    is_system_type, RegistryError, SenderId, SenderRegistry, TranslationTable, TypeId,
    TypeRegistry, DROPPED_CONNECTION, GOT_CONNECTION, PING, PONG, SYSTEM_SENDER,
};
use crate::reports::Report;
use crate::time::{SharedClock, SystemClock, Timestamp};
use crate::transport::{Inbound, LinkStatus, Transport};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Why a message could not be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    UnknownType(TypeId),
    UnknownSender(SenderId),
    /// Header plus payload exceeds the configured frame limit.
    PayloadTooLarge { size: usize, max: usize },
    Closed,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::UnknownType(id) => write!(f, "{} is not registered", id),
            SendError::UnknownSender(id) => write!(f, "{} is not registered", id),
            SendError::PayloadTooLarge { size, max } => {
                write!(f, "frame of {} bytes exceeds limit of {}", size, max)
            }
            SendError::Closed => write!(f, "endpoint is closed"),
        }
    }
}

impl std::error::Error for SendError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Connecting,
    Connected,
    Dropped,
}

// ============================================================================
// Outbox
// ============================================================================

struct Queues {
    reliable: VecDeque<Vec<u8>>,
    low_latency: VecDeque<Vec<u8>>,
    low_latency_depth: usize,
    max_frame_size: usize,
    closed: bool,
    displaced: u64,
}

/// Outbound frame queues of one endpoint.
///
/// Clones share the queues, so a handler can capture one and reply while the
/// endpoint is dispatching. Frames leave on the next
/// [`Endpoint::mainloop`] once the link is open.
#[derive(Clone)]
pub struct Outbox {
    queues: Rc<RefCell<Queues>>,
}

impl Outbox {
    fn new(low_latency_depth: usize, max_frame_size: usize) -> Self {
        Self {
            queues: Rc::new(RefCell::new(Queues {
                reliable: VecDeque::new(),
                low_latency: VecDeque::new(),
                low_latency_depth: low_latency_depth.max(1),
                max_frame_size,
                closed: false,
                displaced: 0,
            })),
        }
    }

    /// Frame and queue one message. Ids are not checked against any
    /// registry; use [`Endpoint::send`] for that.
    ///
    /// A full low-latency queue drops its oldest frame.
    pub fn queue(
        &self,
        type_id: TypeId,
        sender_id: SenderId,
        timestamp: Timestamp,
        payload: &[u8],
        reliability: Reliability,
    ) -> Result<(), SendError> {
        let mut q = self.queues.borrow_mut();
        if q.closed {
            return Err(SendError::Closed);
        }
        let size = HEADER_LEN + payload.len();
        let max = q.max_frame_size;
        if size > max {
            return Err(SendError::PayloadTooLarge { size, max });
        }
        let frame = encode_frame(type_id.0, sender_id.0, timestamp, payload)
            .map_err(|_| SendError::PayloadTooLarge { size, max })?;
        match reliability {
            Reliability::Reliable => q.reliable.push_back(frame),
            Reliability::LowLatency => {
                if q.low_latency.len() >= q.low_latency_depth {
                    q.low_latency.pop_front();
                    q.displaced += 1;
                }
                q.low_latency.push_back(frame);
            }
        }
        Ok(())
    }

    /// Frames waiting on both lanes.
    pub fn pending(&self) -> usize {
        let q = self.queues.borrow();
        q.reliable.len() + q.low_latency.len()
    }

    /// Low-latency frames dropped because the queue was full.
    pub fn displaced(&self) -> u64 {
        self.queues.borrow().displaced
    }

    fn take(&self) -> (VecDeque<Vec<u8>>, VecDeque<Vec<u8>>) {
        let mut q = self.queues.borrow_mut();
        (
            std::mem::take(&mut q.reliable),
            std::mem::take(&mut q.low_latency),
        )
    }

    fn close(&self) {
        let mut q = self.queues.borrow_mut();
        q.closed = true;
        q.reliable.clear();
        q.low_latency.clear();
    }
}

// ============================================================================
// Endpoint
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct EndpointStats {
    pub frames_received: u64,
    pub messages_dispatched: u64,
    /// Frames whose type or sender the peer never described.
    pub unknown_ids_skipped: u64,
    pub descriptions_received: u64,
}

fn description_frame(
    kind: i32,
    id: i32,
    timestamp: Timestamp,
    name: &str,
) -> Result<Vec<u8>, EncodeError> {
    let payload = encode_exact(name)?;
    encode_frame(kind, id, timestamp, &payload)
}

pub struct Endpoint {
    transport: Box<dyn Transport>,
    state: EndpointState,
    types: TypeRegistry,
    senders: SenderRegistry,
    remote_types: TranslationTable<TypeId>,
    remote_senders: TranslationTable<SenderId>,
    // Registry entries already described to the peer.
    described_types: usize,
    described_senders: usize,
    dispatcher: Dispatcher,
    outbox: Outbox,
    clock: SharedClock,
    // Peer clock minus local clock, microseconds.
    clock_offset: Rc<Cell<i64>>,
    ever_connected: bool,
    inbox: Vec<Inbound>,
    stats: EndpointStats,
}

impl Endpoint {
    pub fn new(transport: Box<dyn Transport>, config: &BusConfig) -> Self {
        Self::with_clock(transport, config, SystemClock::shared())
    }

    /// Endpoint stamping its messages with `clock`.
    pub fn with_clock(transport: Box<dyn Transport>, config: &BusConfig, clock: SharedClock) -> Self {
        let outbox = Outbox::new(config.low_latency_depth, config.max_frame_size);
        let dispatcher = Dispatcher::new();

        if config.respond_to_ping {
            let replies = outbox.clone();
            let pong_clock = Arc::clone(&clock);
            dispatcher.subscribe(PING, SenderFilter::Any, true, move |msg| {
                if let Err(e) = replies.queue(
                    PONG,
                    msg.sender_id,
                    pong_clock.now(),
                    msg.payload,
                    Reliability::Reliable,
                ) {
                    log::debug!("[Endpoint] pong to {} not queued: {}", msg.sender_id, e);
                }
                HandlerResult::Ok
            });
        }

        log::debug!("[Endpoint::new] endpoint for {}", transport.peer());
        Self {
            transport,
            state: EndpointState::Connecting,
            types: TypeRegistry::with_capacity(config.max_types),
            senders: SenderRegistry::with_capacity(config.max_senders),
            remote_types: TranslationTable::new(),
            remote_senders: TranslationTable::new(),
            described_types: 0,
            described_senders: 0,
            dispatcher,
            outbox,
            clock,
            clock_offset: Rc::new(Cell::new(0)),
            ever_connected: false,
            inbox: Vec::new(),
            stats: EndpointStats::default(),
        }
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == EndpointState::Connected
    }

    /// Whether the link ever reached `Connected`, even if dropped since.
    pub fn was_connected(&self) -> bool {
        self.ever_connected
    }

    pub fn peer(&self) -> String {
        self.transport.peer()
    }

    pub fn stats(&self) -> &EndpointStats {
        &self.stats
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Set the peer clock minus local clock, in microseconds, used to
    /// correct the timestamps of incoming data messages.
    pub fn set_clock_offset(&self, micros: i64) {
        if self.clock_offset.replace(micros) != micros {
            log::debug!("[Endpoint::set_clock_offset] {} offset {}us", self.peer(), micros);
        }
    }

    pub fn clock_offset(&self) -> i64 {
        self.clock_offset.get()
    }

    pub(crate) fn clock_offset_cell(&self) -> Rc<Cell<i64>> {
        Rc::clone(&self.clock_offset)
    }

    // === Names ===

    /// Local id for a message type, describing it to the peer if new.
    ///
    /// Fails once the registry holds `max_types` names.
    pub fn register_type(&mut self, name: &str) -> Result<TypeId, RegistryError> {
        let (id, new) = self.types.register_new(name)?;
        if new {
            log::debug!("[Endpoint::register_type] {:?} -> {}", name, id);
            self.describe_if_connected();
        }
        Ok(id)
    }

    /// Local id for a sender, describing it to the peer if new.
    ///
    /// Fails once the registry holds `max_senders` names.
    pub fn register_sender(&mut self, name: &str) -> Result<SenderId, RegistryError> {
        let (id, new) = self.senders.register_new(name)?;
        if new {
            log::debug!("[Endpoint::register_sender] {:?} -> {}", name, id);
            self.describe_if_connected();
        }
        Ok(id)
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.types.lookup(name)
    }

    pub fn sender_id(&self, name: &str) -> Option<SenderId> {
        self.senders.lookup(name)
    }

    pub fn type_name(&self, id: TypeId) -> Option<&str> {
        self.types.name(id)
    }

    pub fn sender_name(&self, id: SenderId) -> Option<&str> {
        self.senders.name(id)
    }

    // === Handlers ===

    pub fn subscribe<F>(
        &self,
        type_id: TypeId,
        filter: SenderFilter,
        auto_delete: bool,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(&Message<'_>) -> HandlerResult + 'static,
    {
        self.dispatcher.subscribe(type_id, filter, auto_delete, callback)
    }

    /// Subscribe to every non-system message type. Such handlers run before
    /// the handlers subscribed to the message's own type.
    pub fn subscribe_any<F>(
        &self,
        filter: SenderFilter,
        auto_delete: bool,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(&Message<'_>) -> HandlerResult + 'static,
    {
        self.dispatcher.subscribe_any(filter, auto_delete, callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.dispatcher.unsubscribe(handle)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Queue handle that handlers can capture to send replies.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    // === Sending ===

    /// Queue a message for the peer.
    pub fn send(
        &mut self,
        type_id: TypeId,
        sender_id: SenderId,
        timestamp: Timestamp,
        payload: &[u8],
        reliability: Reliability,
    ) -> Result<(), SendError> {
        if self.state == EndpointState::Dropped {
            return Err(SendError::Closed);
        }
        if !self.types.contains(type_id) {
            return Err(SendError::UnknownType(type_id));
        }
        if !self.senders.contains(sender_id) {
            return Err(SendError::UnknownSender(sender_id));
        }
        self.outbox
            .queue(type_id, sender_id, timestamp, payload, reliability)
    }

    /// Register the report's type name if needed, encode it and queue it.
    pub fn send_report<R: Report>(
        &mut self,
        sender_id: SenderId,
        timestamp: Timestamp,
        report: &R,
        reliability: Reliability,
    ) -> Result<(), Error> {
        let type_id = self.register_type(R::TYPE_NAME)?;
        let payload = report.to_payload()?;
        self.send(type_id, sender_id, timestamp, &payload, reliability)?;
        Ok(())
    }

    // === Mainloop ===

    /// Do one round of link work: handshake progress, inbound frames,
    /// outbound queues.
    ///
    /// Returns how many messages were dispatched. An error (a fatal handler
    /// result, an undecodable frame, a broken link) means the endpoint can no
    /// longer be trusted; the caller is expected to drop it.
    pub fn mainloop(&mut self) -> Result<usize, Error> {
        if self.state == EndpointState::Dropped {
            return Ok(0);
        }

        let mut inbox = std::mem::take(&mut self.inbox);
        let status = match self.transport.poll(&mut inbox) {
            Ok(status) => status,
            Err(e) => {
                log::warn!("[Endpoint::mainloop] link to {} failed: {}", self.peer(), e);
                inbox.clear();
                self.inbox = inbox;
                return Err(e.into());
            }
        };

        // Frames only arrive after the peer finished its side of the
        // handshake, so a link that closed with some pending still opened.
        let opened = match status {
            LinkStatus::Open => true,
            LinkStatus::Closed => !inbox.is_empty(),
            LinkStatus::Handshaking => false,
        };
        if self.state == EndpointState::Connecting && opened {
            if let Err(e) = self.on_open(status == LinkStatus::Open) {
                inbox.clear();
                self.inbox = inbox;
                return Err(e);
            }
        }

        let drained = if self.state == EndpointState::Connected {
            self.drain_inbox(&inbox)
        } else {
            Ok(0)
        };
        inbox.clear();
        self.inbox = inbox;
        let delivered = drained?;

        if status == LinkStatus::Closed {
            self.mark_dropped("link closed");
        }
        if self.state == EndpointState::Connected {
            self.describe_new_names()?;
            self.flush_outbox()?;
        }
        Ok(delivered)
    }

    /// Tell the peer we are leaving, close the link and move to `Dropped`.
    pub fn drop_connection(&mut self) {
        if self.state == EndpointState::Dropped {
            return;
        }
        if self.state == EndpointState::Connected {
            if let Err(e) = self.send_disconnect() {
                log::debug!(
                    "[Endpoint::drop_connection] disconnect to {} not sent: {}",
                    self.peer(),
                    e
                );
            }
        }
        self.mark_dropped("dropped locally");
    }

    fn send_disconnect(&mut self) -> Result<(), Error> {
        let frame = encode_frame(DISCONNECT, SYSTEM_SENDER.0, self.clock.now(), &[])?;
        self.transport.send(Reliability::Reliable, frame)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Dispatch a lifecycle message raised on this side of the link.
    pub(crate) fn dispatch_system(&self, type_id: TypeId) -> Result<usize, HandlerFault> {
        let msg = Message::new(type_id, SYSTEM_SENDER, self.clock.now(), &[]);
        self.dispatcher.dispatch(&msg)
    }

    fn on_open(&mut self, link_open: bool) -> Result<(), Error> {
        self.state = EndpointState::Connected;
        self.ever_connected = true;
        log::info!("[Endpoint] connected to {}", self.peer());
        self.described_types = 0;
        self.described_senders = 0;
        if link_open {
            self.describe_new_names()?;
        }
        self.dispatch_system(GOT_CONNECTION)?;
        Ok(())
    }

    fn mark_dropped(&mut self, why: &str) {
        if self.state == EndpointState::Dropped {
            return;
        }
        let was_connected = self.state == EndpointState::Connected;
        self.state = EndpointState::Dropped;
        self.outbox.close();
        self.transport.close();
        log::info!("[Endpoint] {} dropped: {}", self.peer(), why);
        if was_connected {
            if let Err(fault) = self.dispatch_system(DROPPED_CONNECTION) {
                log::warn!("[Endpoint] {} while dropping {}", fault, self.peer());
            }
        }
    }

    fn describe_if_connected(&mut self) {
        if self.state != EndpointState::Connected {
            return;
        }
        if let Err(e) = self.describe_new_names() {
            log::warn!("[Endpoint] describing names to {} failed: {}", self.peer(), e);
        }
    }

    /// Send descriptions for every name registered since the last call,
    /// straight to the transport so they precede anything in the outbox.
    fn describe_new_names(&mut self) -> Result<(), Error> {
        if self.described_senders == self.senders.len() && self.described_types == self.types.len()
        {
            return Ok(());
        }
        let now = self.clock.now();
        let mut frames = Vec::new();
        for (id, name) in self.senders.iter().skip(self.described_senders) {
            frames.push(description_frame(SENDER_DESCRIPTION, id.0, now, name)?);
        }
        for (id, name) in self.types.iter().skip(self.described_types) {
            if !is_system_type(id) {
                frames.push(description_frame(TYPE_DESCRIPTION, id.0, now, name)?);
            }
        }
        self.described_senders = self.senders.len();
        self.described_types = self.types.len();
        for frame in frames {
            self.transport.send(Reliability::Reliable, frame)?;
        }
        Ok(())
    }

    fn flush_outbox(&mut self) -> Result<(), Error> {
        let (reliable, low_latency) = self.outbox.take();
        for frame in reliable {
            self.transport.send(Reliability::Reliable, frame)?;
        }
        for frame in low_latency {
            self.transport.send(Reliability::LowLatency, frame)?;
        }
        self.transport.flush()?;
        Ok(())
    }

    fn drain_inbox(&mut self, inbox: &[Inbound]) -> Result<usize, Error> {
        let mut delivered = 0;
        for inbound in inbox {
            for frame in FrameReader::new(&inbound.bytes) {
                let frame = frame?;
                self.stats.frames_received += 1;
                delivered += self.handle_frame(&frame, inbound.reliability)?;
                if self.state == EndpointState::Dropped {
                    return Ok(delivered);
                }
            }
        }
        Ok(delivered)
    }

    fn handle_frame(&mut self, frame: &FrameView<'_>, reliability: Reliability) -> Result<usize, Error> {
        let header = &frame.header;
        match header.type_id {
            SENDER_DESCRIPTION => {
                let name: String = decode_exact(frame.payload)?;
                let local = self.senders.register(&name)?;
                self.remote_senders.insert(header.sender_id, local);
                self.stats.descriptions_received += 1;
                log::debug!(
                    "[Endpoint] peer sender {} is {:?}, local {}",
                    header.sender_id,
                    name,
                    local
                );
                Ok(0)
            }
            TYPE_DESCRIPTION => {
                let name: String = decode_exact(frame.payload)?;
                let local = self.types.register(&name)?;
                // The sender field carries the described type id.
                self.remote_types.insert(header.sender_id, local);
                self.stats.descriptions_received += 1;
                log::debug!(
                    "[Endpoint] peer type {} is {:?}, local {}",
                    header.sender_id,
                    name,
                    local
                );
                Ok(0)
            }
            DISCONNECT => {
                self.mark_dropped("peer disconnected");
                Ok(0)
            }
            other if is_control_type(other) => {
                log::debug!("[Endpoint] ignoring control frame {}", other);
                Ok(0)
            }
            remote_type => {
                let Some(type_id) = self.remote_types.local_type(remote_type) else {
                    self.stats.unknown_ids_skipped += 1;
                    log::debug!("[Endpoint] skipping undescribed peer type {}", remote_type);
                    return Ok(0);
                };
                if is_system_type(type_id) && type_id != PING && type_id != PONG {
                    log::debug!("[Endpoint] ignoring peer lifecycle message {}", type_id);
                    return Ok(0);
                }
                let Some(sender_id) = self.remote_senders.to_local(header.sender_id) else {
                    self.stats.unknown_ids_skipped += 1;
                    log::debug!(
                        "[Endpoint] skipping frame from undescribed peer sender {}",
                        header.sender_id
                    );
                    return Ok(0);
                };
                let timestamp = match self.clock_offset.get() {
                    offset if offset != 0 && type_id != PING && type_id != PONG => {
                        header.timestamp.add_micros(-offset)
                    }
                    _ => header.timestamp,
                };
                let msg = Message::new(type_id, sender_id, timestamp, frame.payload)
                    .with_reliability(reliability);
                self.dispatcher.dispatch(&msg)?;
                self.stats.messages_dispatched += 1;
                Ok(1)
            }
        }
    }
}

impl ContainerEntry for Endpoint {
    fn drop_connection(&mut self) {
        Endpoint::drop_connection(self);
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.drop_connection();
        self.dispatcher.remove_auto_deleted();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_exact;
    use crate::registry::FIRST_USER_TYPE_ID;
    use crate::reports::ButtonChange;
    use crate::transport::LoopbackTransport;
    use std::cell::Cell;

    fn pair() -> (Endpoint, Endpoint) {
        let cfg = BusConfig::default();
        let (ta, tb) = LoopbackTransport::pair(cfg.low_latency_depth);
        (
            Endpoint::new(Box::new(ta), &cfg),
            Endpoint::new(Box::new(tb), &cfg),
        )
    }

    fn tick(a: &mut Endpoint, b: &mut Endpoint) {
        a.mainloop().expect("mainloop a should succeed");
        b.mainloop().expect("mainloop b should succeed");
    }

    #[test]
    fn test_message_ids_are_translated() {
        let (mut a, mut b) = pair();
        // Shift b's ids so translation is observable.
        b.register_type("filler").expect("room left");
        b.register_sender("filler").expect("room left");
        let b_button = b.register_type(ButtonChange::TYPE_NAME).expect("room left");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        b.subscribe(b_button, SenderFilter::Any, false, move |msg| {
            log.borrow_mut()
                .push((msg.sender_id, ButtonChange::decode(msg.payload)));
            HandlerResult::Ok
        });

        let a_sender = a.register_sender("Button0").expect("room left");
        let change = ButtonChange {
            button: 2,
            pressed: true,
        };
        a.send_report(a_sender, Timestamp::new(5, 0), &change, Reliability::Reliable)
            .expect("send should succeed");
        assert_ne!(a.type_id(ButtonChange::TYPE_NAME), Some(b_button));

        tick(&mut a, &mut b);

        let b_sender = b.sender_id("Button0").expect("sender should be described");
        assert_eq!(b_sender, SenderId(1));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, b_sender);
        assert_eq!(seen[0].1, Ok(change));
    }

    #[test]
    fn test_got_connection_fires_once() {
        let (mut a, mut b) = pair();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        a.subscribe(GOT_CONNECTION, SenderFilter::Any, false, move |_| {
            c.set(c.get() + 1);
            HandlerResult::Ok
        });
        assert_eq!(a.state(), EndpointState::Connecting);
        tick(&mut a, &mut b);
        tick(&mut a, &mut b);
        assert_eq!(count.get(), 1);
        assert!(a.is_connected());
    }

    #[test]
    fn test_undescribed_type_is_skipped() {
        let cfg = BusConfig::default();
        let (mut raw, tb) = LoopbackTransport::pair(4);
        let mut b = Endpoint::new(Box::new(tb), &cfg);
        let frame = encode_frame(42, 0, Timestamp::ZERO, b"x").expect("encode should succeed");
        raw.send(Reliability::Reliable, frame).expect("send should succeed");
        assert_eq!(b.mainloop().expect("mainloop should succeed"), 0);
        assert_eq!(b.stats().unknown_ids_skipped, 1);
    }

    #[test]
    fn test_garbage_frame_is_an_error() {
        let cfg = BusConfig::default();
        let (mut raw, tb) = LoopbackTransport::pair(4);
        let mut b = Endpoint::new(Box::new(tb), &cfg);
        raw.send(Reliability::Reliable, vec![0u8; 12]).expect("send should succeed");
        assert!(matches!(b.mainloop(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_fatal_handler_surfaces_from_mainloop() {
        let (mut a, mut b) = pair();
        let t = b.register_type("Alarm").expect("room left");
        b.subscribe(t, SenderFilter::Any, false, |_| HandlerResult::Fatal);
        let at = a.register_type("Alarm").expect("room left");
        let s = a.register_sender("Panel").expect("room left");
        a.send(at, s, Timestamp::ZERO, &[], Reliability::Reliable)
            .expect("send should succeed");
        a.mainloop().expect("mainloop a should succeed");
        assert!(matches!(b.mainloop(), Err(Error::Handler(_))));
    }

    #[test]
    fn test_send_checks_registrations() {
        let (mut a, _b) = pair();
        let s = a.register_sender("Tracker0").expect("room left");
        assert_eq!(
            a.send(TypeId(99), s, Timestamp::ZERO, &[], Reliability::Reliable),
            Err(SendError::UnknownType(TypeId(99)))
        );
        let t = a.register_type("Tracker Pos_Quat").expect("room left");
        assert_eq!(
            a.send(t, SenderId(7), Timestamp::ZERO, &[], Reliability::Reliable),
            Err(SendError::UnknownSender(SenderId(7)))
        );
        let big = vec![0u8; BusConfig::default().max_frame_size];
        assert!(matches!(
            a.send(t, s, Timestamp::ZERO, &big, Reliability::Reliable),
            Err(SendError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_drop_connection_reaches_peer() {
        let (mut a, mut b) = pair();
        let dropped = Rc::new(Cell::new(false));
        let d = Rc::clone(&dropped);
        b.subscribe(DROPPED_CONNECTION, SenderFilter::Any, false, move |_| {
            d.set(true);
            HandlerResult::Ok
        });
        tick(&mut a, &mut b);
        a.drop_connection();
        assert_eq!(a.state(), EndpointState::Dropped);
        b.mainloop().expect("mainloop should succeed");
        assert_eq!(b.state(), EndpointState::Dropped);
        assert!(dropped.get());

        let t = b.register_type("late").expect("room left");
        let s = b.register_sender("late").expect("room left");
        assert_eq!(
            b.send(t, s, Timestamp::ZERO, &[], Reliability::Reliable),
            Err(SendError::Closed)
        );
    }

    #[test]
    fn test_ping_is_answered_with_echoed_pong() {
        let (mut a, mut b) = pair();
        let s = a.register_sender("pinger").expect("room left");
        let echoed = Rc::new(RefCell::new(None));
        let e = Rc::clone(&echoed);
        a.subscribe(PONG, SenderFilter::Only(s), false, move |msg| {
            *e.borrow_mut() = decode_exact::<Timestamp>(msg.payload).ok();
            HandlerResult::Ok
        });
        let sent_at = Timestamp::new(77, 5);
        let payload = encode_exact(&sent_at).expect("encode should succeed");
        a.send(PING, s, sent_at, &payload, Reliability::Reliable)
            .expect("send should succeed");
        tick(&mut a, &mut b);
        a.mainloop().expect("mainloop should succeed");
        assert_eq!(*echoed.borrow(), Some(sent_at));
    }

    #[test]
    fn test_low_latency_queue_displaces_oldest() {
        let mut cfg = BusConfig::default();
        cfg.low_latency_depth = 2;
        let (ta, _tb) = LoopbackTransport::pair(2);
        let mut a = Endpoint::new(Box::new(ta), &cfg);
        let t = a.register_type("Analog").expect("room left");
        let s = a.register_sender("Knob").expect("room left");
        for i in 0..5u8 {
            a.send(t, s, Timestamp::ZERO, &[i], Reliability::LowLatency)
                .expect("send should succeed");
        }
        assert_eq!(a.outbox().pending(), 2);
        assert_eq!(a.outbox().displaced(), 3);
    }

    #[test]
    fn test_frames_behind_closed_link_are_dispatched() {
        let (mut a, mut b) = pair();
        let t = b.register_type("Text").expect("room left");
        let hits = Rc::new(Cell::new(0));
        let events = Rc::new(RefCell::new(Vec::new()));
        let h = Rc::clone(&hits);
        b.subscribe(t, SenderFilter::Any, false, move |_| {
            h.set(h.get() + 1);
            HandlerResult::Ok
        });
        for lifecycle in [GOT_CONNECTION, DROPPED_CONNECTION] {
            let ev = Rc::clone(&events);
            b.subscribe(lifecycle, SenderFilter::Any, false, move |msg| {
                ev.borrow_mut().push(msg.type_id);
                HandlerResult::Ok
            });
        }

        let at = a.register_type("Text").expect("room left");
        let s = a.register_sender("Console").expect("room left");
        a.send(at, s, Timestamp::ZERO, b"hi", Reliability::Reliable)
            .expect("send should succeed");
        a.mainloop().expect("mainloop a should succeed");
        a.drop_connection();

        // b sees the data and the close in the same poll.
        assert_eq!(b.mainloop().expect("mainloop b should succeed"), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(b.state(), EndpointState::Dropped);
        assert!(b.was_connected());
        assert_eq!(*events.borrow(), vec![GOT_CONNECTION, DROPPED_CONNECTION]);
    }

    #[test]
    fn test_subscribe_any_sees_user_messages_first() {
        let (mut a, mut b) = pair();
        let t = b.register_type("Alarm").expect("room left");
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&order);
        b.subscribe(t, SenderFilter::Any, false, move |_| {
            o.borrow_mut().push("typed");
            HandlerResult::Ok
        });
        let o = Rc::clone(&order);
        b.subscribe_any(SenderFilter::Any, false, move |msg| {
            assert!(!is_system_type(msg.type_id));
            o.borrow_mut().push("any");
            HandlerResult::Ok
        });
        let at = a.register_type("Alarm").expect("room left");
        let s = a.register_sender("Panel").expect("room left");
        a.send(at, s, Timestamp::ZERO, &[], Reliability::Reliable)
            .expect("send should succeed");
        tick(&mut a, &mut b);
        assert_eq!(*order.borrow(), vec!["any", "typed"]);
    }

    #[test]
    fn test_clock_offset_corrects_data_timestamps() {
        let (mut a, mut b) = pair();
        let t = b.register_type("Alarm").expect("room left");
        let seen = Rc::new(Cell::new(Timestamp::ZERO));
        let st = Rc::clone(&seen);
        b.subscribe(t, SenderFilter::Any, false, move |msg| {
            st.set(msg.timestamp);
            HandlerResult::Ok
        });
        b.set_clock_offset(2_500);
        assert_eq!(b.clock_offset(), 2_500);
        let at = a.register_type("Alarm").expect("room left");
        let s = a.register_sender("Panel").expect("room left");
        a.send(at, s, Timestamp::new(10, 0), &[], Reliability::Reliable)
            .expect("send should succeed");
        tick(&mut a, &mut b);
        assert_eq!(seen.get(), Timestamp::new(9, 997_500));
    }

    #[test]
    fn test_description_flood_fails_endpoint() {
        let mut cfg = BusConfig::default();
        cfg.max_senders = 3;
        let (mut raw, tb) = LoopbackTransport::pair(4);
        let mut b = Endpoint::new(Box::new(tb), &cfg);
        for i in 0..8 {
            let frame = description_frame(SENDER_DESCRIPTION, i, Timestamp::ZERO, &format!("s{}", i))
                .expect("encode should succeed");
            raw.send(Reliability::Reliable, frame).expect("send should succeed");
        }
        assert!(matches!(
            b.mainloop(),
            Err(Error::Registry(RegistryError::Full { limit: 3, .. }))
        ));
        assert_eq!(b.stats().descriptions_received, 3);
    }

    #[test]
    fn test_local_registration_is_capped() {
        let mut cfg = BusConfig::default();
        cfg.max_types = FIRST_USER_TYPE_ID as usize + 1;
        let (ta, _tb) = LoopbackTransport::pair(4);
        let mut a = Endpoint::new(Box::new(ta), &cfg);
        assert!(a.register_type("one").is_ok());
        assert!(a.register_type("two").is_err());
        assert_eq!(a.register_type("one"), Ok(TypeId(FIRST_USER_TYPE_ID)));
    }
}
