// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection greeting.
//!
//! Both sides send [`COOKIE_LEN`] bytes right after the TCP connection is
//! up: the 16-byte [`COOKIE_MAGIC`] (`"peerbus vMM.mm"` NUL-padded) then the
//! UDP port of their low-latency lane as a big-endian u32, 0 for none.
//! Peers with a different major version are refused; a minor difference
//! is only logged.

use crate::config::{COOKIE_LEN, COOKIE_MAGIC};
use std::fmt;

const PREFIX: &[u8] = b"peerbus v";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie {
    pub major: u8,
    pub minor: u8,
    /// 0 when the peer offers no UDP lane.
    pub udp_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    BadMagic,
    VersionMismatch { ours: u8, theirs: u8 },
    BadPort(u32),
}

impl fmt::Display for CookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookieError::BadMagic => write!(f, "peer greeting is not a peerbus cookie"),
            CookieError::VersionMismatch { ours, theirs } => write!(
                f,
                "peer speaks major version {}, this side {}",
                theirs, ours
            ),
            CookieError::BadPort(p) => write!(f, "peer announced UDP port {}", p),
        }
    }
}

impl std::error::Error for CookieError {}

fn two_digits(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [a @ b'0'..=b'9', b @ b'0'..=b'9'] => Some((a - b'0') * 10 + (b - b'0')),
        _ => None,
    }
}

fn version(magic: &[u8]) -> Option<(u8, u8)> {
    let rest = magic.strip_prefix(PREFIX)?;
    if rest.get(2) != Some(&b'.') {
        return None;
    }
    Some((two_digits(rest.get(0..2)?)?, two_digits(rest.get(3..5)?)?))
}

/// Our own greeting.
pub fn encode_cookie(udp_port: u16) -> [u8; COOKIE_LEN] {
    let mut out = [0u8; COOKIE_LEN];
    out[..COOKIE_MAGIC.len()].copy_from_slice(COOKIE_MAGIC);
    out[COOKIE_MAGIC.len()..].copy_from_slice(&u32::from(udp_port).to_be_bytes());
    out
}

/// Validate a peer greeting.
pub fn parse_cookie(bytes: &[u8; COOKIE_LEN]) -> Result<Cookie, CookieError> {
    let (magic, port) = bytes.split_at(COOKIE_MAGIC.len());
    let (major, minor) = version(magic).ok_or(CookieError::BadMagic)?;
    let (ours, our_minor) = version(COOKIE_MAGIC).ok_or(CookieError::BadMagic)?;
    if major != ours {
        return Err(CookieError::VersionMismatch {
            ours,
            theirs: major,
        });
    }
    if minor != our_minor {
        log::debug!(
            "[parse_cookie] peer minor version {} differs from ours {}",
            minor,
            our_minor
        );
    }
    let raw = u32::from_be_bytes([port[0], port[1], port[2], port[3]]);
    let udp_port = u16::try_from(raw).map_err(|_| CookieError::BadPort(raw))?;
    Ok(Cookie {
        major,
        minor,
        udp_port,
    })
}
