// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerbus::config::COOKIE_LEN;
use peerbus::transport::tcp::cookie::parse_cookie;
use peerbus::transport::tcp::FrameCodec;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Fuzz the greeting
    if let Some(Ok(cookie)) = data.get(..COOKIE_LEN).map(<[u8; COOKIE_LEN]>::try_from) {
        let _ = parse_cookie(&cookie);
    }

    // Fuzz stream reassembly with a small frame limit
    let mut codec = FrameCodec::new(4096);
    let mut reader = Cursor::new(data);
    while let Ok(Some(_)) = codec.decode(&mut reader) {}
});
