// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Round-trip and clock-offset estimation over one endpoint.
//!
//! The synchronizer pings the peer with its send time as payload. The peer
//! answers with a pong stamped by its own clock and echoing the payload.
//! With `sent` the ping time, `now` the pong arrival and `remote` the pong
//! timestamp:
//!
//! ```text
//! rtt    = now - sent
//! offset = remote - (sent + rtt / 2)
//! ```
//!
//! Samples are folded per interval and reported as mean/min/max when the
//! interval ends. With `apply_offset` set, each report's mean offset is
//! handed to the endpoint, which then reads the peer's timestamps on the
//! local clock.
//!
//! # State machine
//!
//! ```text
//!            ping sent                 matching pong
//!  Idle ---------------> AwaitingPong ---------------> Idle
//!   ^                        |   |
//!   |   ping_timeout (lost)  |   | interval ends
//!   +------------------------+   v
//!                         IntervalElapsed --(forced ping)--> AwaitingPong
//! ```

use crate::codec::{decode_exact, encode_exact};
use crate::config::ClockSyncConfig;
use crate::dispatch::{HandlerResult, SenderFilter, SubscriptionHandle, WeakDispatcher};
use crate::endpoint::{Endpoint, Outbox};
use crate::message::{Message, Reliability};
use crate::registry::{RegistryError, SenderId, PING, PONG};
use crate::time::{SharedClock, Timestamp};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    AwaitingPong,
    /// The interval just rolled over; a ping goes out on the next poll.
    IntervalElapsed,
}

/// Mean/min/max of one quantity over an interval, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockReport {
    pub samples: u32,
    pub round_trip: Stats,
    /// Peer clock minus local clock.
    pub offset: Stats,
    pub lost_pings: u32,
}

impl fmt::Display for ClockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples, rtt {:.6}s [{:.6}, {:.6}], offset {:.6}s [{:.6}, {:.6}], {} lost",
            self.samples,
            self.round_trip.mean,
            self.round_trip.min,
            self.round_trip.max,
            self.offset.mean,
            self.offset.min,
            self.offset.max,
            self.lost_pings
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u32,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Accumulator {
    fn fold(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    fn stats(&self) -> Stats {
        if self.count == 0 {
            return Stats::default();
        }
        Stats {
            mean: self.sum / f64::from(self.count),
            min: self.min,
            max: self.max,
        }
    }
}

struct Core {
    config: ClockSyncConfig,
    state: SyncState,
    next_interval: Timestamp,
    next_ping: Timestamp,
    outstanding: Option<Timestamp>,
    round_trip: Accumulator,
    offset: Accumulator,
    lost_pings: u32,
}

impl Core {
    fn on_pong(&mut self, msg: &Message<'_>, now: Timestamp) {
        if self.state != SyncState::AwaitingPong {
            return;
        }
        let Ok(echoed) = decode_exact::<Timestamp>(msg.payload) else {
            log::debug!("[ClockSynchronizer] pong with unreadable payload ignored");
            return;
        };
        let Some(sent) = self.outstanding.filter(|s| *s == echoed) else {
            return;
        };
        let rtt = now.micros_since(sent);
        let mid = sent.add_micros(rtt / 2);
        let offset = msg.timestamp.micros_since(mid);
        self.round_trip.fold(rtt as f64 / 1e6);
        self.offset.fold(offset as f64 / 1e6);
        self.outstanding = None;
        self.state = SyncState::Idle;
        self.next_ping = now.add_duration(self.config.min_repeat_wait);
    }

    fn take_report(&mut self) -> Option<ClockReport> {
        let report = (self.round_trip.count > 0).then(|| ClockReport {
            samples: self.round_trip.count,
            round_trip: self.round_trip.stats(),
            offset: self.offset.stats(),
            lost_pings: self.lost_pings,
        });
        self.round_trip = Accumulator::default();
        self.offset = Accumulator::default();
        self.lost_pings = 0;
        report
    }
}

/// Pings the peer of one endpoint and reports clock statistics.
pub struct ClockSynchronizer {
    core: Rc<RefCell<Core>>,
    outbox: Outbox,
    clock: SharedClock,
    sender: SenderId,
    subscription: SubscriptionHandle,
    dispatcher: WeakDispatcher,
    peer: String,
    // Set when the config asks for the offset to be applied.
    endpoint_offset: Option<Rc<Cell<i64>>>,
    on_report: Option<Box<dyn FnMut(&ClockReport)>>,
}

impl ClockSynchronizer {
    /// Register the sync sender on `endpoint` and listen for its pongs.
    ///
    /// The first interval starts `settle_delay` from now, with the first
    /// ping at the same instant. Fails if the endpoint's sender registry is
    /// full.
    pub fn attach(
        endpoint: &mut Endpoint,
        config: ClockSyncConfig,
    ) -> Result<Self, RegistryError> {
        let config = config.validated();
        let sender = endpoint.register_sender(&config.sender_name)?;
        let endpoint_offset = config.apply_offset.then(|| endpoint.clock_offset_cell());
        let clock = endpoint.clock();
        let start = clock.now().add_duration(config.settle_delay);

        let core = Rc::new(RefCell::new(Core {
            config,
            state: SyncState::Idle,
            next_interval: start,
            next_ping: start,
            outstanding: None,
            round_trip: Accumulator::default(),
            offset: Accumulator::default(),
            lost_pings: 0,
        }));

        let handler_core = Rc::clone(&core);
        let handler_clock = Arc::clone(&clock);
        let subscription =
            endpoint.subscribe(PONG, SenderFilter::Only(sender), true, move |msg| {
                let now = handler_clock.now();
                match handler_core.try_borrow_mut() {
                    Ok(mut core) => core.on_pong(msg, now),
                    Err(_) => log::warn!("[ClockSynchronizer] pong during poll ignored"),
                }
                HandlerResult::Ok
            });

        log::debug!(
            "[ClockSynchronizer::attach] syncing with {} as {}",
            endpoint.peer(),
            sender
        );
        Ok(Self {
            core,
            outbox: endpoint.outbox(),
            clock,
            sender,
            subscription,
            dispatcher: endpoint.dispatcher().downgrade(),
            peer: endpoint.peer(),
            endpoint_offset,
            on_report: None,
        })
    }

    /// Call `callback` with every report, before [`poll`](Self::poll)
    /// returns it.
    pub fn on_report<F>(&mut self, callback: F)
    where
        F: FnMut(&ClockReport) + 'static,
    {
        self.on_report = Some(Box::new(callback));
    }

    pub fn state(&self) -> SyncState {
        self.core.borrow().state
    }

    pub fn sender(&self) -> SenderId {
        self.sender
    }

    /// Advance the schedule: close the interval if it is over, send a ping
    /// if one is due. Returns the report of an interval that just ended with
    /// at least one sample.
    pub fn poll(&mut self) -> Option<ClockReport> {
        let now = self.clock.now();
        let mut core = self.core.borrow_mut();
        let mut report = None;

        if now >= core.next_interval {
            report = core.take_report();
            if let Some(r) = &report {
                log::info!("[ClockSynchronizer] {}: {}", self.peer, r);
            }
            let interval = core.config.interval;
            core.next_interval = now.add_duration(interval);
            core.outstanding = None;
            core.state = SyncState::IntervalElapsed;
        }
        if let (Some(r), Some(offset)) = (&report, &self.endpoint_offset) {
            let micros = (r.offset.mean * 1e6).round() as i64;
            log::debug!("[ClockSynchronizer] applying {}us offset for {}", micros, self.peer);
            offset.set(micros);
        }

        if core.state == SyncState::AwaitingPong && now >= core.next_ping {
            log::debug!("[ClockSynchronizer] ping to {} timed out", self.peer);
            core.lost_pings += 1;
            core.outstanding = None;
            core.state = SyncState::Idle;
        }

        let due = match core.state {
            SyncState::IntervalElapsed => true,
            SyncState::Idle => now >= core.next_ping,
            SyncState::AwaitingPong => false,
        };
        if due {
            match self.send_ping(now) {
                Ok(()) => {
                    core.outstanding = Some(now);
                    core.state = SyncState::AwaitingPong;
                    core.next_ping = now.add_duration(core.config.ping_timeout);
                }
                Err(e) => log::debug!("[ClockSynchronizer] ping to {} not sent: {}", self.peer, e),
            }
        }
        drop(core);

        if let (Some(r), Some(callback)) = (&report, self.on_report.as_mut()) {
            callback(r);
        }
        report
    }

    fn send_ping(&self, now: Timestamp) -> Result<(), crate::Error> {
        let payload = encode_exact(&now)?;
        self.outbox
            .queue(PING, self.sender, now, &payload, Reliability::Reliable)?;
        Ok(())
    }
}

impl Drop for ClockSynchronizer {
    fn drop(&mut self) {
        self.dispatcher.unsubscribe(self.subscription);
    }
}
