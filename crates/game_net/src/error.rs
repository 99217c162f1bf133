//! Error types and handling for the connection engine.
//!
//! This module defines the error types that can occur while running the
//! reactor pool, moving bytes over connections, and decoding the command
//! protocol. No error ever crosses a worker thread boundary as a panic; every
//! failure is reported as one of these values or logged where it happens.

use std::ops::Range;

/// Enumeration of possible engine errors.
///
/// Categorizes failures into setup errors (fatal for the process), per-call
/// status failures (returned to the caller), and wrapped I/O or protocol
/// errors.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// A worker thread or its event loop could not be created.
    /// The process should not continue when this is returned from startup.
    #[error("Worker setup failed: {0}")]
    WorkerSetup(String),

    /// The chosen worker no longer accepts work (it has shut down)
    #[error("Worker {0} is unavailable")]
    WorkerUnavailable(usize),

    /// The queue item pool could not grow
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// A write was attempted while the link is not in the Connected state
    #[error("Not connected")]
    NotConnected,

    /// The connection has closed and no longer accepts outbound bytes
    #[error("Connection closed")]
    Closed,

    /// `reconnect` was called on a connector that still has a live attempt
    #[error("Connector is already connecting or connected")]
    AlreadyConnected,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Wire protocol failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the framed command protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Fewer bytes than a full message header
    #[error("Message truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// Declared payload length exceeds the configured frame limit
    #[error("Frame of {length} bytes exceeds limit of {limit}")]
    Oversized { length: usize, limit: usize },

    /// Command code outside the role's declared range
    #[error("Command {command} outside range {range:?}")]
    OutOfRange { command: u16, range: Range<u16> },

    /// The range is empty or inverted
    #[error("Invalid command range {begin}..{end}")]
    InvalidRange { begin: u16, end: u16 },

    /// Payload could not be serialized
    #[error("Payload encode failed: {0}")]
    Encode(String),

    /// Payload could not be deserialized
    #[error("Payload decode failed: {0}")]
    Decode(String),
}

/// Convenience alias used across the crate.
pub type Result<T, E = NetError> = std::result::Result<T, E>;
