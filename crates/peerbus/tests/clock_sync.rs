// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Clock synchronization against a peer whose clock runs 5 ms ahead, over a
// link with a simulated 20 ms round trip.

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::float_cmp)]

use peerbus::clock_sync::{ClockSynchronizer, SyncState};
use peerbus::dispatch::{HandlerResult, SenderFilter};
use peerbus::message::Reliability;
use peerbus::time::{Clock, ManualClock};
use peerbus::transport::LoopbackTransport;
use peerbus::{BusConfig, ClockSyncConfig, Endpoint, Timestamp};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const EPSILON: f64 = 1e-6;

#[test]
fn reports_round_trip_and_offset_after_one_interval() {
    let local = ManualClock::new(Timestamp::new(1_000, 0));
    let remote = local.skewed(5_000);
    let cfg = BusConfig::default();
    let (ta, tb) = LoopbackTransport::pair(cfg.low_latency_depth);
    let mut a = Endpoint::with_clock(Box::new(ta), &cfg, local.shared());
    let mut b = Endpoint::with_clock(Box::new(tb), &cfg, remote.shared());

    let mut sync = ClockSynchronizer::attach(
        &mut a,
        ClockSyncConfig {
            settle_delay: Duration::from_millis(100),
            interval: Duration::from_secs(1),
            ..ClockSyncConfig::default()
        },
    )
    .expect("sender registry has room");

    // Open the link before the first ping goes out.
    a.mainloop().expect("mainloop a should succeed");
    b.mainloop().expect("mainloop b should succeed");
    local.advance(Duration::from_millis(100));

    let mut report = None;
    for _ in 0..60 {
        if let Some(r) = sync.poll() {
            report = Some(r);
            break;
        }
        // Ping out, 10 ms in flight, pong back, 10 ms in flight.
        a.mainloop().expect("mainloop a should succeed");
        local.advance(Duration::from_millis(10));
        b.mainloop().expect("mainloop b should succeed");
        local.advance(Duration::from_millis(10));
        a.mainloop().expect("mainloop a should succeed");
    }

    let report = report.expect("an interval should have ended with samples");
    assert!(report.samples > 1);
    assert_eq!(report.lost_pings, 0);
    assert!((report.round_trip.mean - 0.020).abs() < EPSILON, "{}", report);
    assert!((report.round_trip.min - 0.020).abs() < EPSILON);
    assert!((report.offset.mean - 0.005).abs() < EPSILON, "{}", report);
    assert!((report.offset.max - 0.005).abs() < EPSILON);
    assert_eq!(sync.state(), SyncState::AwaitingPong);
}

#[test]
fn no_report_without_samples() {
    let clock = ManualClock::new(Timestamp::new(50, 0));
    let cfg = BusConfig::default();
    let (ta, _silent) = LoopbackTransport::pair(4);
    let mut a = Endpoint::with_clock(Box::new(ta), &cfg, clock.shared());
    let mut sync = ClockSynchronizer::attach(
        &mut a,
        ClockSyncConfig {
            settle_delay: Duration::ZERO,
            interval: Duration::from_millis(200),
            ..ClockSyncConfig::default()
        },
    )
    .expect("sender registry has room");
    for _ in 0..5 {
        assert!(sync.poll().is_none());
        a.mainloop().expect("mainloop should succeed");
        clock.advance(Duration::from_millis(100));
    }
}

#[test]
fn applied_offset_moves_peer_timestamps_onto_local_clock() {
    let local = ManualClock::new(Timestamp::new(2_000, 0));
    let remote = local.skewed(5_000);
    let cfg = BusConfig::default();
    let (ta, tb) = LoopbackTransport::pair(cfg.low_latency_depth);
    let mut a = Endpoint::with_clock(Box::new(ta), &cfg, local.shared());
    let mut b = Endpoint::with_clock(Box::new(tb), &cfg, remote.shared());

    let reading = a.register_type("Thermometer").expect("room left");
    let seen = Rc::new(Cell::new(None));
    let s = Rc::clone(&seen);
    a.subscribe(reading, SenderFilter::Any, false, move |msg| {
        s.set(Some(msg.timestamp));
        HandlerResult::Ok
    });

    let mut sync = ClockSynchronizer::attach(
        &mut a,
        ClockSyncConfig {
            settle_delay: Duration::ZERO,
            interval: Duration::from_millis(500),
            apply_offset: true,
            ..ClockSyncConfig::default()
        },
    )
    .expect("sender registry has room");
    let reports = Rc::new(Cell::new(0));
    let r = Rc::clone(&reports);
    sync.on_report(move |_| r.set(r.get() + 1));

    a.mainloop().expect("mainloop a should succeed");
    b.mainloop().expect("mainloop b should succeed");
    assert_eq!(a.clock_offset(), 0);

    let mut reported = false;
    for _ in 0..60 {
        if sync.poll().is_some() {
            reported = true;
            break;
        }
        a.mainloop().expect("mainloop a should succeed");
        local.advance(Duration::from_millis(4));
        b.mainloop().expect("mainloop b should succeed");
        local.advance(Duration::from_millis(4));
        a.mainloop().expect("mainloop a should succeed");
    }
    assert!(reported, "an interval should have ended with samples");
    assert_eq!(reports.get(), 1);
    assert_eq!(a.clock_offset(), 5_000);

    // The peer stamps a reading with its own clock, 5 ms ahead.
    let b_type = b.register_type("Thermometer").expect("room left");
    let b_sender = b.register_sender("Sensor0").expect("room left");
    let stamped = b.now();
    b.send(b_type, b_sender, stamped, &[21], Reliability::Reliable)
        .expect("send should succeed");
    b.mainloop().expect("mainloop b should succeed");
    a.mainloop().expect("mainloop a should succeed");

    let received = seen.get().expect("reading should be delivered");
    assert_eq!(received.micros_since(local.now()), 0);
    assert_eq!(stamped.micros_since(received), 5_000);
}

#[test]
fn offset_is_left_alone_unless_asked() {
    let local = ManualClock::new(Timestamp::new(3_000, 0));
    let remote = local.skewed(-2_000);
    let cfg = BusConfig::default();
    let (ta, tb) = LoopbackTransport::pair(cfg.low_latency_depth);
    let mut a = Endpoint::with_clock(Box::new(ta), &cfg, local.shared());
    let mut b = Endpoint::with_clock(Box::new(tb), &cfg, remote.shared());
    let mut sync = ClockSynchronizer::attach(
        &mut a,
        ClockSyncConfig {
            settle_delay: Duration::ZERO,
            interval: Duration::from_millis(200),
            ..ClockSyncConfig::default()
        },
    )
    .expect("sender registry has room");

    let mut report = None;
    for _ in 0..60 {
        report = sync.poll();
        if report.is_some() {
            break;
        }
        a.mainloop().expect("mainloop a should succeed");
        local.advance(Duration::from_millis(5));
        b.mainloop().expect("mainloop b should succeed");
        local.advance(Duration::from_millis(5));
        a.mainloop().expect("mainloop a should succeed");
    }
    let report = report.expect("an interval should have ended with samples");
    assert!((report.offset.mean + 0.002).abs() < EPSILON, "{}", report);
    assert_eq!(a.clock_offset(), 0);
}
