// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// BusConfig from YAML files and key/value overrides.

#![cfg(feature = "config-loaders")]
#![allow(clippy::missing_panics_doc)]

use peerbus::config::ConfigError;
use peerbus::{BusConfig, Connection};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

#[test]
fn yaml_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "listen:\n  bind_address: 127.0.0.1\n  port: 0\nendpoints:\n  max: 8\n  headroom: 2\nlinks:\n  udp_lane: false\n  connect_timeout_ms: 750\nclock_sync:\n  sender_name: lab clock\n  ping_timeout_ms: 300"
    )
    .expect("write config");

    let cfg = BusConfig::from_yaml_file(file.path()).expect("config should load");
    assert_eq!(cfg.listen_addr(), "127.0.0.1:0");
    assert_eq!(cfg.max_endpoints, 8);
    assert_eq!(cfg.endpoint_headroom, 2);
    assert!(!cfg.udp_lane);
    assert_eq!(cfg.connect_timeout, Duration::from_millis(750));
    assert_eq!(cfg.clock_sync.sender_name, "lab clock");
    assert_eq!(cfg.clock_sync.ping_timeout, Duration::from_millis(300));
    assert_eq!(cfg.low_latency_depth, BusConfig::default().low_latency_depth);

    // A loaded config is directly usable.
    let server = Connection::server(cfg).expect("server should bind");
    assert!(server.local_addr().is_some_and(|a| a.port() != 0));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = BusConfig::from_yaml_file(dir.path().join("absent.yaml"))
        .expect_err("missing file should fail");
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn yaml_errors_are_reported() {
    assert!(matches!(
        BusConfig::from_yaml_str("listen: [1, 2"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        BusConfig::from_yaml_str("links:\n  low_latency_depth: 0\n"),
        Err(ConfigError::Invalid {
            field: "low_latency_depth",
            ..
        })
    ));
    assert!(matches!(
        BusConfig::from_yaml_str("links:\n  max_frame_size: 8\n"),
        Err(ConfigError::Invalid {
            field: "max_frame_size",
            ..
        })
    ));
}

#[test]
fn overrides_skip_unparsable_values() {
    let vars: HashMap<&str, &str> = [
        ("PEERBUS_LISTEN_PORT", "4700"),
        ("PEERBUS_UDP_LANE", "false"),
        ("PEERBUS_MAX_ENDPOINTS", "lots"),
        ("PEERBUS_CLOCK_INTERVAL_MS", "2500"),
    ]
    .into_iter()
    .collect();
    let cfg = BusConfig::default()
        .with_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()));
    assert_eq!(cfg.listen_port, 4700);
    assert!(!cfg.udp_lane);
    assert_eq!(cfg.max_endpoints, BusConfig::default().max_endpoints);
    assert_eq!(cfg.clock_sync.interval, Duration::from_millis(2500));
}

#[test]
fn connection_rejects_invalid_config() {
    let cfg = BusConfig {
        max_endpoints: 4,
        endpoint_headroom: 4,
        ..BusConfig::default()
    };
    assert!(matches!(
        Connection::new(cfg),
        Err(peerbus::Error::Config(ConfigError::Invalid { .. }))
    ));
}
