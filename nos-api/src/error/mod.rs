//! Error handling module for NOS operating system

use core::fmt;
use alloc::string::String;

/// Common error type used throughout NOS operating system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    InvalidArgument(String),
    /// Operation is not valid in the object's current state
    InvalidState(String),
    /// Resource not found
    NotFound(String),
    /// A named object already exists
    AlreadyExists(String),
    /// Resource busy
    Busy(String),
    /// Memory budget exhausted
    OutOfMemory {
        /// Bytes requested
        requested: usize,
        /// Bytes still available
        available: usize,
    },
    /// Bounded queue is at capacity
    QueueFull {
        /// Capacity of the queue
        capacity: usize,
    },
    /// Message exceeds the queue's per-message limit
    MessageTooLarge {
        /// Message size in bytes
        size: usize,
        /// Maximum accepted size
        max: usize,
    },
    /// Offset outside an object's bounds
    OutOfBounds {
        /// Requested offset
        offset: usize,
        /// Object size
        size: usize,
    },
    /// Write end closed
    BrokenPipe,
    /// Endpoint closed
    Closed(String),
    /// Timeout
    Timeout,
    /// Configuration error
    ConfigError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            Error::Busy(msg) => write!(f, "Resource busy: {}", msg),
            Error::OutOfMemory { requested, available } => write!(
                f,
                "Out of memory: requested {} bytes, {} available",
                requested, available
            ),
            Error::QueueFull { capacity } => write!(f, "Queue full ({} messages)", capacity),
            Error::MessageTooLarge { size, max } => {
                write!(f, "Message size {} exceeds maximum {}", size, max)
            }
            Error::OutOfBounds { offset, size } => {
                write!(f, "Offset {} out of bounds (size {})", offset, size)
            }
            Error::BrokenPipe => write!(f, "Write end of pipe is closed"),
            Error::Closed(msg) => write!(f, "Closed: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl core::error::Error for Error {}

impl Error {
    /// Whether retrying later can succeed
    ///
    /// Capacity and contention failures are transient; a closed, missing or
    /// misused object is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::QueueFull { .. } | Error::Timeout | Error::Busy(_))
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;
