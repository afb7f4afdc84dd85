// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Server and client connections over real sockets on 127.0.0.1.

#![allow(clippy::missing_panics_doc)]

use peerbus::dispatch::{HandlerResult, SenderFilter};
use peerbus::reports::{ButtonChange, Report, TrackerPose};
use peerbus::{BusConfig, Connection, Reliability, Timestamp};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn local_config(udp_lane: bool) -> BusConfig {
    BusConfig {
        bind_address: "127.0.0.1".to_string(),
        listen_port: 0,
        udp_lane,
        ..BusConfig::default()
    }
}

#[derive(Default)]
struct Received {
    buttons: Vec<ButtonChange>,
    poses: Vec<TrackerPose>,
}

fn serve(cfg: BusConfig) -> (Connection, Rc<RefCell<Received>>) {
    let mut server = Connection::server(cfg).expect("server should bind");
    let received = Rc::new(RefCell::new(Received::default()));
    let sink = Rc::clone(&received);
    server.on_endpoint(move |_, ep| {
        let button = ep.register_type(ButtonChange::TYPE_NAME).expect("room left");
        let pose = ep.register_type(TrackerPose::TYPE_NAME).expect("room left");
        let s = Rc::clone(&sink);
        ep.subscribe(button, SenderFilter::Any, false, move |msg| {
            match ButtonChange::decode(msg.payload) {
                Ok(b) => {
                    s.borrow_mut().buttons.push(b);
                    HandlerResult::Ok
                }
                Err(_) => HandlerResult::Fatal,
            }
        });
        let s = Rc::clone(&sink);
        ep.subscribe(pose, SenderFilter::Any, false, move |msg| {
            if let Ok(p) = TrackerPose::decode(msg.payload) {
                s.borrow_mut().poses.push(p);
            }
            HandlerResult::Ok
        });
    });
    (server, received)
}

/// Tick both sides until `done` holds or five seconds pass.
fn pump<F>(server: &mut Connection, client: &mut Connection, mut done: F) -> bool
where
    F: FnMut(&mut Connection) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        server.mainloop().expect("server mainloop should succeed");
        client.mainloop().expect("client mainloop should succeed");
        if done(client) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

fn exchange(udp_lane: bool) {
    let (mut server, received) = serve(local_config(udp_lane));
    let addr = server.local_addr().expect("server should be listening");
    let mut client =
        Connection::client(addr, local_config(udp_lane)).expect("client should connect");

    let press = ButtonChange {
        button: 2,
        pressed: true,
    };
    let payload = press.to_payload().expect("encode should succeed");
    client
        .broadcast(
            ButtonChange::TYPE_NAME,
            "Pad0",
            Timestamp::now(),
            &payload,
            Reliability::Reliable,
        )
        .expect("broadcast should succeed");
    let r = Rc::clone(&received);
    assert!(pump(&mut server, &mut client, |_| !r.borrow().buttons.is_empty()));
    assert_eq!(received.borrow().buttons, vec![press]);
    assert_eq!(server.live_endpoints(), 1);

    // Low-latency frames may take the UDP lane and overtake descriptions,
    // so keep streaming until one lands.
    let pose = TrackerPose::identity(3);
    let payload = pose.to_payload().expect("encode should succeed");
    let r = Rc::clone(&received);
    assert!(pump(&mut server, &mut client, |client| {
        client
            .broadcast(
                TrackerPose::TYPE_NAME,
                "Tracker0",
                Timestamp::now(),
                &payload,
                Reliability::LowLatency,
            )
            .expect("broadcast should succeed");
        !r.borrow().poses.is_empty()
    }));
    assert_eq!(received.borrow().poses[0], pose);

    drop(client);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !server.endpoints().is_empty() && Instant::now() < deadline {
        server.mainloop().expect("server mainloop should succeed");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(server.endpoints().is_empty());
}

#[test]
fn tcp_only_exchange() {
    exchange(false);
}

#[test]
fn tcp_with_udp_lane_exchange() {
    exchange(true);
}

#[test]
fn connect_to_closed_port_fails() {
    // Bind then drop to find a port nobody listens on.
    let addr = {
        let server = Connection::server(local_config(false)).expect("server should bind");
        server.local_addr().expect("server should be listening")
    };
    assert!(Connection::client(addr, local_config(false)).is_err());
}
