//! Error types for the Tribody channel layer.

use thiserror::Error;

/// Errors that can occur on either end of the channel.
///
/// Every variant is fatal to the side that observes it; nothing in this
/// layer retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer dropped its end (worker stopped, process gone, etc.)
    #[error("Channel closed")]
    Closed,

    /// Underlying byte stream failed
    #[error("I/O error: {0}")]
    Io(String),

    /// A line on the byte stream could not be decoded/encoded
    #[error("Codec error: {0}")]
    Codec(String),
}

impl TransportError {
    /// Creates an I/O error.
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }

    /// Creates a codec error.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Failure of a non-blocking send. The rejected value is handed back.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SendError<T> {
    /// Bounded queue is full; retry later
    #[error("Queue full")]
    Full(T),

    /// The receiving side is gone
    #[error("Channel closed")]
    Closed(T),
}

impl<T> SendError<T> {
    /// Returns the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            SendError::Full(value) | SendError::Closed(value) => value,
        }
    }
}
