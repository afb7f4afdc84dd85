// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Each module has its own error enum; they all convert into [`Error`] so
//! mainloop code can use `?` across layers.

use crate::codec::{DecodeError, EncodeError};
use crate::config::ConfigError;
use crate::dispatch::HandlerFault;
use crate::endpoint::container::ContainerError;
use crate::endpoint::SendError;
use crate::registry::RegistryError;
use crate::sync::{SemaphoreError, ThreadError};

#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Wire Errors
    // ========================================================================
    /// A received frame or payload could not be decoded.
    Decode(DecodeError),
    /// A value could not be encoded.
    Encode(EncodeError),

    // ========================================================================
    // Endpoint Errors
    // ========================================================================
    Container(ContainerError),
    Send(SendError),
    /// A name registry is full.
    Registry(RegistryError),
    /// A handler declared the endpoint untrustworthy.
    Handler(HandlerFault),

    // ========================================================================
    // Concurrency Errors
    // ========================================================================
    Semaphore(SemaphoreError),
    Thread(ThreadError),

    // ========================================================================
    // Environment Errors
    // ========================================================================
    Config(ConfigError),
    /// Socket or link failure.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Decode(e) => write!(f, "Decode failed: {}", e),
            Error::Encode(e) => write!(f, "Encode failed: {}", e),
            Error::Container(e) => write!(f, "Endpoint container: {}", e),
            Error::Send(e) => write!(f, "Send failed: {}", e),
            Error::Registry(e) => write!(f, "Registry: {}", e),
            Error::Handler(e) => write!(f, "Handler fault: {}", e),
            Error::Semaphore(e) => write!(f, "Semaphore: {}", e),
            Error::Thread(e) => write!(f, "Thread: {}", e),
            Error::Config(e) => write!(f, "Configuration: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            Error::Encode(e) => Some(e),
            Error::Container(e) => Some(e),
            Error::Send(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Handler(e) => Some(e),
            Error::Semaphore(e) => Some(e),
            Error::Thread(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

macro_rules! impl_from_error {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(e: $source) -> Self {
                    Error::$variant(e)
                }
            }
        )*
    };
}

impl_from_error! {
    DecodeError => Decode,
    EncodeError => Encode,
    ContainerError => Container,
    SendError => Send,
    RegistryError => Registry,
    HandlerFault => Handler,
    SemaphoreError => Semaphore,
    ThreadError => Thread,
    ConfigError => Config,
    std::io::Error => Io,
}

/// Convenient alias for results using the crate [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
