// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Codec Benchmark
//!
//! Measures the wire codec without any link:
//! - Frame encoding for typical report sizes
//! - Parsing a buffer of back-to-back frames
//! - Stream reassembly through the TCP frame codec

#![allow(clippy::uninlined_format_args)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use peerbus::codec::{encode_frame, FrameReader};
use peerbus::reports::{Report, TrackerPose};
use peerbus::transport::tcp::FrameCodec;
use peerbus::Timestamp;
use std::hint::black_box as bb;
use std::io::Cursor;

fn bench_encode_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    let ts = Timestamp::new(1_700_000_000, 250_000);

    for size in [0usize, 64, 512, 4096] {
        let payload = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| encode_frame(bb(7), bb(1), ts, bb(payload)).expect("encode"));
        });
    }

    group.finish();
}

fn bench_tracker_report(c: &mut Criterion) {
    let pose = TrackerPose {
        sensor: 0,
        position: [0.25, 1.5, -0.75],
        orientation: [0.0, 0.0, 0.70710678, 0.70710678],
    };
    let bytes = pose.to_payload().expect("encode");

    c.bench_function("tracker_pose_encode", |b| {
        b.iter(|| bb(&pose).to_payload().expect("encode"));
    });
    c.bench_function("tracker_pose_decode", |b| {
        b.iter(|| TrackerPose::decode(bb(&bytes)).expect("decode"));
    });
}

fn packed_frames(count: usize, payload_len: usize) -> Vec<u8> {
    let payload = vec![0x11u8; payload_len];
    let mut buf = Vec::new();
    for i in 0..count {
        let frame = encode_frame(5, i as i32, Timestamp::ZERO, &payload).expect("encode");
        buf.extend_from_slice(&frame);
    }
    buf
}

fn bench_frame_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_reader");

    for count in [1usize, 16, 128] {
        let buf = packed_frames(count, 64);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &buf, |b, buf| {
            b.iter(|| {
                let mut total = 0usize;
                for frame in FrameReader::new(bb(buf)) {
                    total += frame.expect("frame").payload.len();
                }
                total
            });
        });
    }

    group.finish();
}

fn bench_stream_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("tcp_reassembly");

    for count in [16usize, 128] {
        let stream = packed_frames(count, 64);
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &stream, |b, stream| {
            let mut codec = FrameCodec::new(64 * 1024);
            b.iter(|| {
                codec.reset();
                let mut reader = Cursor::new(bb(stream.as_slice()));
                let mut frames = 0usize;
                while let Ok(Some(_)) = codec.decode(&mut reader) {
                    frames += 1;
                }
                frames
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_frame,
    bench_tracker_report,
    bench_frame_reader,
    bench_stream_reassembly
);
criterion_main!(benches);
