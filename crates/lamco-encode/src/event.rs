//! Recorder events
//!
//! Encode paths report lifecycle changes over an unbounded tokio channel so
//! that the control side can observe a degraded session without polling.

use tokio::sync::mpsc;

use crate::encoder::QualityTier;
use crate::muxer::ClosedSegment;
use crate::path::PathState;

/// Event emitted by an encode path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// The path moved to a new state
    PathStateChanged {
        /// Path tier
        tier: QualityTier,
        /// New state
        state: PathState,
    },

    /// A segment file was finalized
    SegmentClosed {
        /// Path tier
        tier: QualityTier,
        /// The closed segment
        segment: ClosedSegment,
    },

    /// The path stopped on a fatal error; the other path keeps recording
    PathDegraded {
        /// Failed tier
        tier: QualityTier,
        /// Error description
        reason: String,
    },
}

/// Sending half used by encode paths
pub type EventSender = mpsc::UnboundedSender<RecorderEvent>;

/// Receiving half handed to the application
pub type EventReceiver = mpsc::UnboundedReceiver<RecorderEvent>;

/// Create an event channel
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
