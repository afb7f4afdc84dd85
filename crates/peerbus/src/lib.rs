// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # peerbus - peer-to-peer message bus for device reports
//!
//! Components exchange small, timestamped, typed messages (tracker poses,
//! button presses, analog channels, force-feedback effects) over links that
//! are either in-process or TCP with an optional UDP lane.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerbus::dispatch::{HandlerResult, SenderFilter};
//! use peerbus::reports::{Report, TrackerPose};
//! use peerbus::{BusConfig, Connection, Result};
//!
//! fn main() -> Result<()> {
//!     let mut conn = Connection::client("127.0.0.1:4500", BusConfig::default())?;
//!     conn.on_endpoint(|_, ep| {
//!         let Ok(pose) = ep.register_type(TrackerPose::TYPE_NAME) else {
//!             return;
//!         };
//!         ep.subscribe(pose, SenderFilter::Any, false, |msg| {
//!             if let Ok(p) = TrackerPose::decode(msg.payload) {
//!                 println!("sensor {} at {:?}", p.sensor, p.position);
//!             }
//!             HandlerResult::Ok
//!         });
//!     });
//!     loop {
//!         conn.mainloop()?;
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                 Connection (mainloop, accept, broadcast)            |
//! +---------------------------------------------------------------------+
//! |  EndpointContainer<Endpoint>                                        |
//! |    Endpoint: registries | translation | Dispatcher | Outbox         |
//! +---------------------------------------------------------------------+
//! |  codec: cursors, field traits, frames  |  reports  |  clock_sync    |
//! +---------------------------------------------------------------------+
//! |  transport: Loopback | TCP + cookie + frame reassembly | UDP lane   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! Everything above the transports is single-threaded and `!Send`. Device
//! threads hand samples to the mainloop through [`sync::Handoff`], guarded
//! by the [`sync::Semaphore`] primitives.
//!
//! ## Modules Overview
//!
//! - [`codec`] - big-endian field codec and frame format
//! - [`registry`] - name to id registries and translation tables
//! - [`dispatch`] - handler subscription and delivery
//! - [`endpoint`] - one link, plus the [`endpoint::EndpointContainer`]
//! - [`connection`] - the mainloop over all endpoints
//! - [`clock_sync`] - ping/pong round-trip and clock offset estimation
//! - [`sync`] - semaphore, guard, killable thread, handoff buffer
//! - [`transport`] - loopback, TCP and UDP links
//! - [`reports`] - typed device payloads
//! - [`config`] - constants and [`BusConfig`]

pub mod clock_sync;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod registry;
pub mod reports;
pub mod sync;
pub mod time;
pub mod transport;

pub use clock_sync::{ClockReport, ClockSynchronizer};
pub use config::{BusConfig, ClockSyncConfig};
pub use connection::Connection;
pub use dispatch::{Dispatcher, HandlerResult, SenderFilter, SubscriptionHandle};
pub use endpoint::{Endpoint, EndpointState, SendError};
pub use error::{Error, Result};
pub use message::{Message, Reliability};
pub use registry::{RegistryError, SenderId, TypeId};
pub use time::Timestamp;
