// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol constants and runtime configuration.
//!
//! - **Static**: wire constants every peer must agree on ([`FRAME_ALIGN`],
//!   [`COOKIE_MAGIC`]) and defaults for the tunables.
//! - **Dynamic**: [`BusConfig`], built from [`Default`], then optionally
//!   overridden from `PEERBUS_*` environment variables
//!   ([`BusConfig::with_env_overrides`]) or a YAML file (feature
//!   `config-loaders`, see [`yaml`]).

#[cfg(feature = "config-loaders")]
pub mod yaml;

use std::fmt;
use std::time::Duration;

// =======================================================================
// Wire constants
// =======================================================================

/// Every frame is zero-padded to a multiple of this many bytes.
pub const FRAME_ALIGN: usize = 8;

/// Greeting both TCP peers send before any frame. The two digits after `v`
/// are the major version; a peer with a different major version is refused.
pub const COOKIE_MAGIC: &[u8; 16] = b"peerbus v01.00\0\0";

/// Cookie: magic + u32 UDP port (0 when the peer has no low-latency lane).
pub const COOKIE_LEN: usize = 20;

/// Largest frame carried on the UDP lane (Ethernet MTU minus IP/UDP headers).
/// Larger low-latency frames go over TCP.
pub const MAX_UDP_FRAME: usize = 1472;

// =======================================================================
// Defaults
// =======================================================================

/// Port a server listens on when none is configured.
pub const DEFAULT_LISTEN_PORT: u16 = 4500;

/// Default capacity ceiling of an endpoint container.
pub const DEFAULT_MAX_ENDPOINTS: usize = 256;

/// Slots kept free below the ceiling; `full()` trips this many slots early.
pub const DEFAULT_ENDPOINT_HEADROOM: usize = 1;

/// Default largest frame (header + payload) accepted or sent.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64_000;

/// Default depth of the outbound low-latency queue; the oldest frame is
/// displaced when a new one arrives at a full queue.
pub const DEFAULT_LOW_LATENCY_DEPTH: usize = 64;

/// Default ceiling on message type names per endpoint, system types included.
/// Peers describing more names than this lose their endpoint.
pub const DEFAULT_MAX_TYPES: usize = 2000;

/// Default ceiling on sender names per endpoint.
pub const DEFAULT_MAX_SENDERS: usize = 2000;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between endpoint start-up and the first clock estimation interval.
pub const DEFAULT_CLOCK_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub const DEFAULT_CLOCK_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_CLOCK_MIN_REPEAT: Duration = Duration::ZERO;

/// How long an unanswered ping is outstanding before another is sent.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10_000);

/// Sender name clock synchronizers register for their pings.
pub const DEFAULT_CLOCK_SENDER: &str = "peerbus clock sync";

// =======================================================================
// Runtime configuration
// =======================================================================

/// Ping/pong estimator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSyncConfig {
    /// Delay before the first estimation interval starts.
    pub settle_delay: Duration,
    /// Length of one estimation interval; stats are reported at its end.
    pub interval: Duration,
    /// Minimum wait between a pong and the next ping.
    pub min_repeat_wait: Duration,
    pub ping_timeout: Duration,
    pub sender_name: String,
    /// Push each interval's mean offset into the endpoint so incoming
    /// timestamps are read on the local clock.
    pub apply_offset: bool,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_CLOCK_SETTLE_DELAY,
            interval: DEFAULT_CLOCK_INTERVAL,
            min_repeat_wait: DEFAULT_CLOCK_MIN_REPEAT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            sender_name: DEFAULT_CLOCK_SENDER.to_string(),
            apply_offset: false,
        }
    }
}

impl ClockSyncConfig {
    /// Replace an unusable interval/repeat pair with the defaults.
    ///
    /// A zero interval, or a minimum repeat longer than the interval, would
    /// never produce a sample.
    pub fn validated(mut self) -> Self {
        if self.interval.is_zero() || self.min_repeat_wait > self.interval {
            log::warn!(
                "[ClockSyncConfig] invalid interval {:?} / min repeat {:?}, using defaults",
                self.interval,
                self.min_repeat_wait
            );
            self.interval = DEFAULT_CLOCK_INTERVAL;
            self.min_repeat_wait = DEFAULT_CLOCK_MIN_REPEAT;
        }
        self
    }
}

/// Configuration shared by a connection and its endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    // === Listening ===
    pub bind_address: String,
    pub listen_port: u16,
    /// Pending-connection backlog for the TCP acceptor.
    pub backlog: i32,

    // === Endpoint container ===
    pub max_endpoints: usize,
    pub endpoint_headroom: usize,

    // === Names ===
    /// Type names one endpoint may hold, system types included.
    pub max_types: usize,
    pub max_senders: usize,

    // === Links ===
    pub max_frame_size: usize,
    pub low_latency_depth: usize,
    pub tcp_nodelay: bool,
    /// Negotiate a UDP lane for low-latency traffic on TCP links.
    pub udp_lane: bool,
    pub connect_timeout: Duration,

    // === Services ===
    /// Answer pings with a pong stamped by the local clock.
    pub respond_to_ping: bool,
    pub clock_sync: ClockSyncConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            backlog: 128,
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
            endpoint_headroom: DEFAULT_ENDPOINT_HEADROOM,
            max_types: DEFAULT_MAX_TYPES,
            max_senders: DEFAULT_MAX_SENDERS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            low_latency_depth: DEFAULT_LOW_LATENCY_DEPTH,
            tcp_nodelay: true,
            udp_lane: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            respond_to_ping: true,
            clock_sync: ClockSyncConfig::default(),
        }
    }
}

impl BusConfig {
    /// Defaults with `PEERBUS_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a YAML document on top of the defaults.
    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        yaml::YamlLoader::parse_yaml(content)
    }

    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        yaml::YamlLoader::load_from_file(path)
    }

    /// Apply `PEERBUS_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unparsable values are logged and
    /// ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    log::warn!("[BusConfig] ignoring {}={:?}: not a valid value", key, raw);
                    None
                }
            }
        }

        if let Some(v) = lookup("PEERBUS_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = parsed("PEERBUS_LISTEN_PORT", lookup("PEERBUS_LISTEN_PORT")) {
            self.listen_port = v;
        }
        if let Some(v) = parsed("PEERBUS_MAX_ENDPOINTS", lookup("PEERBUS_MAX_ENDPOINTS")) {
            self.max_endpoints = v;
        }
        if let Some(v) = parsed(
            "PEERBUS_ENDPOINT_HEADROOM",
            lookup("PEERBUS_ENDPOINT_HEADROOM"),
        ) {
            self.endpoint_headroom = v;
        }
        if let Some(v) = parsed("PEERBUS_MAX_TYPES", lookup("PEERBUS_MAX_TYPES")) {
            self.max_types = v;
        }
        if let Some(v) = parsed("PEERBUS_MAX_SENDERS", lookup("PEERBUS_MAX_SENDERS")) {
            self.max_senders = v;
        }
        if let Some(v) = parsed(
            "PEERBUS_LOW_LATENCY_DEPTH",
            lookup("PEERBUS_LOW_LATENCY_DEPTH"),
        ) {
            self.low_latency_depth = v;
        }
        if let Some(v) = parsed("PEERBUS_TCP_NODELAY", lookup("PEERBUS_TCP_NODELAY")) {
            self.tcp_nodelay = v;
        }
        if let Some(v) = parsed("PEERBUS_UDP_LANE", lookup("PEERBUS_UDP_LANE")) {
            self.udp_lane = v;
        }
        if let Some(ms) = parsed::<u64>(
            "PEERBUS_CLOCK_INTERVAL_MS",
            lookup("PEERBUS_CLOCK_INTERVAL_MS"),
        ) {
            self.clock_sync.interval = Duration::from_millis(ms);
        }
        self
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_headroom >= self.max_endpoints {
            return Err(ConfigError::Invalid {
                field: "endpoint_headroom",
                reason: format!(
                    "headroom {} leaves no usable slot below ceiling {}",
                    self.endpoint_headroom, self.max_endpoints
                ),
            });
        }
        let system_types = crate::registry::FIRST_USER_TYPE_ID as usize;
        if self.max_types <= system_types {
            return Err(ConfigError::Invalid {
                field: "max_types",
                reason: format!(
                    "{} leaves no room beyond the {} system types",
                    self.max_types, system_types
                ),
            });
        }
        if self.max_senders == 0 {
            return Err(ConfigError::Invalid {
                field: "max_senders",
                reason: "at least one sender name is needed".into(),
            });
        }
        if self.max_frame_size < crate::codec::HEADER_LEN {
            return Err(ConfigError::Invalid {
                field: "max_frame_size",
                reason: format!("{} is smaller than a frame header", self.max_frame_size),
            });
        }
        if self.low_latency_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "low_latency_depth",
                reason: "queue depth must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// `bind_address:listen_port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.listen_port)
    }
}

/// Configuration loading or validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read configuration: {}", e),
            ConfigError::Parse(msg) => write!(f, "failed to parse configuration: {}", msg),
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid configuration field '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}
