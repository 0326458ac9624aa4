//! Frame source interface
//!
//! The camera session lives outside this crate. It is opened at the target
//! format when recording starts, delivers frames through a [`FrameSink`]
//! and gets every frame back exactly once through [`FrameSource::release`].

use lamco_frame::Frame;
use thiserror::Error;

use crate::config::{RecordingSettings, Resolution};

/// Frame source errors
#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested format cannot be captured
    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),

    /// The device could not be opened
    #[error("Failed to open frame source: {0}")]
    OpenFailed(String),
}

/// Capture format requested from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Frame size
    pub resolution: Resolution,
    /// Frames per second
    pub frame_rate: u32,
}

impl From<&RecordingSettings> for CaptureFormat {
    fn from(settings: &RecordingSettings) -> Self {
        Self {
            resolution: settings.resolution(),
            frame_rate: settings.frame_rate,
        }
    }
}

/// A camera (or anything else) that lends out raw frames
pub trait FrameSource: Send + Sync {
    /// Start delivering frames at `format`
    fn open(&self, format: &CaptureFormat) -> Result<(), SourceError>;

    /// Stop delivering frames
    fn close(&self);

    /// Take back a frame handed out earlier
    fn release(&self, frame: Frame);
}

/// Receiver of captured frames
pub trait FrameSink: Send + Sync {
    /// Called on the capture thread for every frame
    fn on_frame(&self, frame: Frame);
}
