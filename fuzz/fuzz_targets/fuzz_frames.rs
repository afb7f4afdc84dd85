// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerbus::codec::{decode_exact, FrameReader, TYPE_DESCRIPTION, SENDER_DESCRIPTION};

fuzz_target!(|data: &[u8]| {
    // Fuzz frame splitting, then the description payloads it yields
    for frame in FrameReader::new(data) {
        let Ok(frame) = frame else { break };
        if frame.header.type_id == TYPE_DESCRIPTION || frame.header.type_id == SENDER_DESCRIPTION {
            let _ = decode_exact::<String>(frame.payload);
        }
    }
});
