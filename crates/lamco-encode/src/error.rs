//! Error types for encoding and muxing
//!
//! Per-frame failures never cross a path boundary. [`classify_error`] splits
//! errors into the ones a path shrugs off for the current tick and the ones
//! that stop it.

use thiserror::Error;

/// Errors raised by encoders and encode paths
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Operation not valid in the current state
    ///
    /// Treated as "nothing to do this tick" by the encode path.
    #[error("Invalid encoder state: {0}")]
    InvalidState(String),

    /// Unrecoverable encoder failure
    ///
    /// Stops the affected path; the other path keeps running.
    #[error("Encoder failed: {0}")]
    Fatal(String),

    /// Parameters rejected at configuration time
    #[error("Invalid encoder parameter: {0}")]
    InvalidParameter(String),

    /// Container failure surfaced through the encode path
    #[error("Muxer error: {0}")]
    Muxer(#[from] MuxerError),
}

/// Errors raised by container writers
#[derive(Error, Debug)]
pub enum MuxerError {
    /// File or stream I/O failed
    #[error("Container I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Container call made out of order (e.g. sample before start)
    #[error("Invalid container state: {0}")]
    InvalidState(String),

    /// The container refused the track format
    #[error("Track rejected: {0}")]
    TrackRejected(String),
}

/// Result type for encode operations
pub type Result<T> = std::result::Result<T, EncodeError>;

impl EncodeError {
    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a fatal encoder error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

impl MuxerError {
    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// How an encode path reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Log and skip the current tick
    Transient,
    /// Container problem; logged, the segment is abandoned
    Container,
    /// Stop this path
    Fatal,
}

/// Classify an error for recovery decisions
#[must_use]
pub fn classify_error(error: &EncodeError) -> ErrorType {
    match error {
        EncodeError::InvalidState(_) => ErrorType::Transient,
        EncodeError::Muxer(_) => ErrorType::Container,
        EncodeError::Fatal(_) | EncodeError::InvalidParameter(_) => ErrorType::Fatal,
    }
}
