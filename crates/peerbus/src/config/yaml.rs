// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration loader.
//!
//! Every field is optional; anything left out keeps its [`BusConfig`]
//! default.
//!
//! # Example YAML
//!
//! ```yaml
//! listen:
//!   bind_address: 127.0.0.1
//!   port: 4600
//! endpoints:
//!   max: 32
//!   headroom: 2
//!   max_types: 500
//!   max_senders: 200
//! links:
//!   low_latency_depth: 16
//!   udp_lane: false
//! clock_sync:
//!   interval_ms: 5000
//!   min_repeat_ms: 250
//!   apply_offset: true
//! ```

use super::{BusConfig, ConfigError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// YAML configuration loader.
pub struct YamlLoader;

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlBusDocument {
    pub listen: Option<YamlListen>,
    pub endpoints: Option<YamlEndpoints>,
    pub links: Option<YamlLinks>,
    pub clock_sync: Option<YamlClockSync>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlListen {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub backlog: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlEndpoints {
    pub max: Option<usize>,
    pub headroom: Option<usize>,
    pub max_types: Option<usize>,
    pub max_senders: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlLinks {
    pub max_frame_size: Option<usize>,
    pub low_latency_depth: Option<usize>,
    pub tcp_nodelay: Option<bool>,
    pub udp_lane: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub respond_to_ping: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlClockSync {
    pub settle_delay_ms: Option<u64>,
    pub interval_ms: Option<u64>,
    pub min_repeat_ms: Option<u64>,
    pub ping_timeout_ms: Option<u64>,
    pub sender_name: Option<String>,
    pub apply_offset: Option<bool>,
}

impl YamlLoader {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<BusConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse_yaml(&content)
    }

    /// Parse, apply over the defaults, and validate.
    pub fn parse_yaml(content: &str) -> Result<BusConfig, ConfigError> {
        let doc: YamlBusDocument =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let cfg = Self::apply(doc, BusConfig::default());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply(doc: YamlBusDocument, mut cfg: BusConfig) -> BusConfig {
        if let Some(listen) = doc.listen {
            if let Some(addr) = listen.bind_address {
                cfg.bind_address = addr;
            }
            if let Some(port) = listen.port {
                cfg.listen_port = port;
            }
            if let Some(backlog) = listen.backlog {
                cfg.backlog = backlog;
            }
        }

        if let Some(ep) = doc.endpoints {
            if let Some(max) = ep.max {
                cfg.max_endpoints = max;
            }
            if let Some(headroom) = ep.headroom {
                cfg.endpoint_headroom = headroom;
            }
            if let Some(v) = ep.max_types {
                cfg.max_types = v;
            }
            if let Some(v) = ep.max_senders {
                cfg.max_senders = v;
            }
        }

        if let Some(links) = doc.links {
            if let Some(v) = links.max_frame_size {
                cfg.max_frame_size = v;
            }
            if let Some(v) = links.low_latency_depth {
                cfg.low_latency_depth = v;
            }
            if let Some(v) = links.tcp_nodelay {
                cfg.tcp_nodelay = v;
            }
            if let Some(v) = links.udp_lane {
                cfg.udp_lane = v;
            }
            if let Some(ms) = links.connect_timeout_ms {
                cfg.connect_timeout = Duration::from_millis(ms);
            }
            if let Some(v) = links.respond_to_ping {
                cfg.respond_to_ping = v;
            }
        }

        if let Some(clock) = doc.clock_sync {
            let c = &mut cfg.clock_sync;
            if let Some(ms) = clock.settle_delay_ms {
                c.settle_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = clock.interval_ms {
                c.interval = Duration::from_millis(ms);
            }
            if let Some(ms) = clock.min_repeat_ms {
                c.min_repeat_wait = Duration::from_millis(ms);
            }
            if let Some(ms) = clock.ping_timeout_ms {
                c.ping_timeout = Duration::from_millis(ms);
            }
            if let Some(name) = clock.sender_name {
                c.sender_name = name;
            }
            if let Some(v) = clock.apply_offset {
                c.apply_offset = v;
            }
        }

        cfg
    }
}
