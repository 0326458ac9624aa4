//! Per-path encode session counters

use std::time::Duration;

use crate::encoder::EncoderParams;

/// Parameters and input counters of one encode path
///
/// Owned by exactly one [`EncodePath`](crate::EncodePath); segment state
/// lives next to it in the path's [`SegmentedMuxer`](crate::SegmentedMuxer).
#[derive(Debug, Clone)]
pub struct EncodeSession {
    params: EncoderParams,
    submitted_frames: u64,
    last_pts_us: Option<i64>,
}

impl EncodeSession {
    /// Start a session with fixed parameters
    #[must_use]
    pub fn new(params: EncoderParams) -> Self {
        Self {
            params,
            submitted_frames: 0,
            last_pts_us: None,
        }
    }

    /// Encoder parameters
    #[must_use]
    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    /// Frames queued to the encoder so far
    #[must_use]
    pub fn submitted_frames(&self) -> u64 {
        self.submitted_frames
    }

    /// Last submitted presentation timestamp
    #[must_use]
    pub fn last_pts_us(&self) -> Option<i64> {
        self.last_pts_us
    }

    /// Timestamp for the next submission
    ///
    /// Converts the capture time to microseconds and clamps it so that
    /// timestamps within the path never decrease.
    pub fn next_pts(&mut self, capture: Duration) -> i64 {
        let pts = i64::try_from(capture.as_micros()).unwrap_or(i64::MAX);
        let pts = match self.last_pts_us {
            Some(last) => pts.max(last),
            None => pts,
        };
        self.last_pts_us = Some(pts);
        pts
    }

    /// Timestamp for a buffer with no frame behind it (end of stream)
    pub fn current_pts(&self) -> i64 {
        self.last_pts_us.unwrap_or(0)
    }

    /// Count one submitted frame
    pub fn record_submission(&mut self) {
        self.submitted_frames += 1;
    }
}
