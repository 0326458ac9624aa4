//! Error types for recording control

use lamco_encode::{EncodeError, QualityTier};
use thiserror::Error;

use crate::source::SourceError;

/// Recorder errors
///
/// Only the control calls fail; per-frame problems stay inside their path.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Settings or configuration rejected
    #[error("Invalid settings: {}", .0.join(", "))]
    InvalidSettings(Vec<String>),

    /// `start_recording` while a session is active
    #[error("Already recording")]
    AlreadyRecording,

    /// `stop_recording` without a session
    #[error("Not recording")]
    NotRecording,

    /// The frame source failed to open
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    /// An encode path failed to configure or start
    #[error("{tier} path failed to start: {source}")]
    PathStart {
        /// Failed tier
        tier: QualityTier,
        /// Underlying error
        #[source]
        source: EncodeError,
    },

    /// A worker thread could not be spawned
    #[error("Failed to spawn encode worker: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// Result type for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

impl RecorderError {
    /// Wrap a path start error
    pub fn path_start(tier: QualityTier, source: EncodeError) -> Self {
        Self::PathStart { tier, source }
    }
}
