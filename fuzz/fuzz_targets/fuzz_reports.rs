// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerbus::reports::{AnalogChannels, ButtonChange, CustomEffect, Report, TrackerPose};

fuzz_target!(|data: &[u8]| {
    // Fixed-size reports
    let _ = TrackerPose::decode(data);
    let _ = ButtonChange::decode(data);

    // Counted reports (count field drives the length check)
    let _ = AnalogChannels::decode(data);
    let _ = CustomEffect::decode(data);
});
