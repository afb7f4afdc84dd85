// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reassembles frames from a TCP byte stream.
//!
//! Frames carry their own length in the first four header bytes, so the
//! stream needs no extra prefix: the codec reads those four bytes, checks
//! them, then reads the rest of the padded frame.
//!
//! ```text
//! +----------------+----------------------------+-----+
//! | length (4B BE) | rest of header + payload   | pad |
//! +----------------+----------------------------+-----+
//! ```

use crate::codec::frame::{padded_len, peek_length};
use crate::codec::HEADER_LEN;
use std::io::{self, Read};

const PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
enum ReadState {
    ReadingLength { bytes_read: usize },
    ReadingBody { frame_len: usize, bytes_read: usize },
}

impl Default for ReadState {
    fn default() -> Self {
        ReadState::ReadingLength { bytes_read: 0 }
    }
}

#[derive(Debug)]
pub struct FrameCodec {
    state: ReadState,
    buffer: Vec<u8>,
    max_size: usize,
    frames_decoded: u64,
    bytes_decoded: u64,
    frames_rejected: u64,
}

impl FrameCodec {
    /// `max_size` bounds the declared (unpadded) frame length.
    pub fn new(max_size: usize) -> Self {
        Self {
            state: ReadState::default(),
            buffer: vec![0u8; PREFIX_LEN],
            max_size,
            frames_decoded: 0,
            bytes_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    pub fn reset(&mut self) {
        self.state = ReadState::default();
        self.buffer.resize(PREFIX_LEN, 0);
    }

    /// Try to read one complete padded frame.
    ///
    /// - `Ok(Some(frame))`: a whole frame, header included
    /// - `Ok(None)`: the reader would block; partial progress is kept
    /// - `Err(UnexpectedEof)`: the peer closed the stream
    /// - `Err(InvalidData)`: the declared length is out of bounds
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.state {
                ReadState::ReadingLength { bytes_read } => {
                    match reader.read(&mut self.buffer[bytes_read..PREFIX_LEN]) {
                        Ok(0) => {
                            let reason = if bytes_read == 0 {
                                "connection closed"
                            } else {
                                "incomplete frame header"
                            };
                            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, reason));
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < PREFIX_LEN {
                                self.state = ReadState::ReadingLength { bytes_read: total };
                                continue;
                            }
                            let len = peek_length([
                                self.buffer[0],
                                self.buffer[1],
                                self.buffer[2],
                                self.buffer[3],
                            ]);
                            if len < HEADER_LEN || len > self.max_size {
                                self.frames_rejected += 1;
                                self.reset();
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    format!(
                                        "frame length {} outside {}..={}",
                                        len, HEADER_LEN, self.max_size
                                    ),
                                ));
                            }
                            let frame_len = padded_len(len);
                            self.buffer.resize(frame_len, 0);
                            self.state = ReadState::ReadingBody {
                                frame_len,
                                bytes_read: PREFIX_LEN,
                            };
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            self.state = ReadState::ReadingLength { bytes_read };
                            return Ok(None);
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                ReadState::ReadingBody {
                    frame_len,
                    bytes_read,
                } => match reader.read(&mut self.buffer[bytes_read..frame_len]) {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "incomplete frame body",
                        ));
                    }
                    Ok(n) => {
                        let total = bytes_read + n;
                        if total < frame_len {
                            self.state = ReadState::ReadingBody {
                                frame_len,
                                bytes_read: total,
                            };
                            continue;
                        }
                        let frame = std::mem::replace(&mut self.buffer, vec![0u8; PREFIX_LEN]);
                        self.state = ReadState::default();
                        self.frames_decoded += 1;
                        self.bytes_decoded += frame.len() as u64;
                        return Ok(Some(frame));
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                },
            }
        }
    }
}
