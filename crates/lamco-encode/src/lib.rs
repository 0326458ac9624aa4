//! # lamco-encode
//!
//! Encoder state machines, segmented muxing and per-path worker threads for
//! dual-quality camera recording.
//!
//! This crate is part of the [lamco-dualrec](https://github.com/lamco-admin/lamco-dualrec)
//! workspace. It consumes frames from [`lamco-frame`](lamco_frame) and is
//! driven by `lamco-recorder`.
//!
//! # Features
//!
//! - **Encoder Abstraction**: [`VideoEncoder`] mirrors a buffer-queue hardware encoder
//! - **Encode Paths**: one [`EncodePath`] per [`QualityTier`], isolated from the other
//! - **Segmented Output**: [`SegmentedMuxer`] rotates files every N samples, replaying the header
//! - **Worker Threads**: [`EncodePathWorker`] runs a path behind an overwrite-oldest [`FrameQueue`]
//! - **Events**: state changes, closed segments and degraded paths on a tokio channel
//! - **Elementary Streams**: [`ElementaryStreamWriter`] writes Annex-B files to disk
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lamco_encode::{EncodePath, EncodePathWorker, FrameQueue, PathConfig};
//! use std::sync::Arc;
//!
//! let mut path = EncodePath::new(config, containers, recording.clone());
//! path.configure(&*encoders)?;
//! path.start()?;
//!
//! let mut handle = EncodePathWorker::spawn(path, Arc::new(FrameQueue::new(4)))?;
//! handle.dispatch(permit);
//! handle.request_stop();
//! let report = handle.wait(std::time::Duration::from_secs(5)).await?;
//! ```
//!
//! # Architecture
//!
//! ```text
//!   FramePermit
//!        │
//!        ▼
//! ┌──────────────┐   pop    ┌──────────────┐  units  ┌────────────────┐
//! │  FrameQueue  │ ───────► │  EncodePath  │ ──────► │ SegmentedMuxer │
//! └──────────────┘          │ VideoEncoder │         │ ContainerWriter│
//!                           └──────┬───────┘         └────────────────┘
//!                                  │ RecorderEvent
//!                                  ▼
//!                            event channel
//! ```
//!
//! # Error Handling
//!
//! [`classify_error`] sorts every [`EncodeError`] into "skip this tick",
//! "log and continue" or "stop this path". Only the last one ends a path, and
//! never the other tier's.

#![cfg_attr(docsrs, feature(doc_cfg))]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod encoder;
pub mod error;
pub mod event;
pub mod file_sink;
pub mod muxer;
pub mod path;
pub mod queue;
pub mod session;
pub mod stats;
pub mod worker;

/// Simulated encoder and in-memory container
#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use encoder::{
    BufferFlag, BufferFlags, EncodedUnit, EncoderFactory, EncoderHandle, EncoderParams, InputSlot,
    QualityTier, TrackFormat, VideoEncoder, MIME_AVC,
};
pub use error::{classify_error, EncodeError, ErrorType, MuxerError, Result};
pub use event::{event_channel, EventReceiver, EventSender, RecorderEvent};
pub use file_sink::{ElementaryStreamFactory, ElementaryStreamWriter};
pub use muxer::{
    ClosedSegment, ContainerFactory, ContainerWriter, MuxResult, OutputSegment, SampleInfo,
    SampleOutcome, SegmentNaming, SegmentState, SegmentedMuxer,
};
pub use path::{EncodePath, PathConfig, PathReport, PathState, PathTimings};
pub use queue::{FrameQueue, PathMessage, PushOutcome};
pub use session::EncodeSession;
pub use stats::PathStats;
pub use worker::{EncodePathWorker, PathHandle, WaitError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_tier_labels_distinct() {
        assert_ne!(QualityTier::High.label(), QualityTier::Low.label());
    }
}
