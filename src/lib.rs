//! # lamco-dualrec
//!
//! Dual-quality segmented camera recording for Rust.
//!
//! This crate provides a unified interface to the lamco recording libraries:
//!
//! - **[`frame`]** - Frame model, YUV 4:2:0 format detection and conversion
//! - **[`encode`]** - Encoder/muxer abstractions, encode paths and segment writers
//! - **[`recorder`]** - Pipeline coordinator and recording control
//!
//! # Features
//!
//! All features except `full` are enabled by default. You can selectively enable only what you need:
//!
//! ```toml
//! # Use everything (default)
//! lamco-dualrec = "0.1"
//!
//! # Frame conversion only
//! lamco-dualrec = { version = "0.1", default-features = false, features = ["frame"] }
//!
//! # Including the simulated encoder for tests and demos
//! lamco-dualrec = { version = "0.1", features = ["full"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `frame` | Yes | Frame model and conversion |
//! | `encode` | Yes | Encode paths and segmented muxing |
//! | `recorder` | Yes | Recording control |
//! | `full` | No | Adds the simulated encoder and in-memory container |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lamco_dualrec::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RecorderConfig::builder().output_dir("/sdcard/DCIM").build();
//!     let mut recorder = PipelineCoordinator::new(
//!         config,
//!         camera.clone(),
//!         hardware_encoders,
//!         Arc::new(ElementaryStreamFactory),
//!     );
//!
//!     camera.set_sink(recorder.dispatcher());
//!     recorder.start_recording(RecordingSettings::default())?;
//!     // ... frames flow ...
//!     let report = recorder.stop_recording().await?;
//!     println!("HQ: {} segments, LQ: {} segments", report.high.segments.len(), report.low.segments.len());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        lamco-dualrec                            │
//! ├─────────────────┬─────────────────────┬─────────────────────────┤
//! │   lamco-frame   │    lamco-encode     │     lamco-recorder      │
//! │                 │                     │                         │
//! │  Frame          │  EncodePath         │  PipelineCoordinator    │
//! │  FormatConverter│  SegmentedMuxer     │  FrameDispatcher        │
//! │  FrameLease     │  FrameQueue         │  RecordingSettings      │
//! └────────┬────────┴──────────┬──────────┴────────────┬────────────┘
//!          │                   │                       │
//!          ▼                   ▼                       ▼
//!    camera buffers     hardware encoders        start / stop
//! ```
//!
//! # Related Crates
//!
//! You can also use the individual crates directly:
//!
//! - [`lamco-frame`](https://crates.io/crates/lamco-frame) - Frame conversion only
//! - [`lamco-encode`](https://crates.io/crates/lamco-encode) - Encode paths only
//! - [`lamco-recorder`](https://crates.io/crates/lamco-recorder) - Recording control

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Frame model, format detection and pixel conversion.
///
/// - Plane descriptors for planar and semi-planar 4:2:0 images
/// - I420/YV12/NV12/NV21 detection with a pluggable NV12/NV21 probe
/// - Stride-aware conversion with a byte-stream fallback
/// - Dual-permit frame leases with exactly-once release
///
/// See [`lamco_frame`] documentation for details.
#[cfg(feature = "frame")]
#[cfg_attr(docsrs, doc(cfg(feature = "frame")))]
pub use lamco_frame as frame;

/// Encoder state machines and segmented output.
///
/// - Encoder and container traits
/// - Per-tier encode paths on dedicated worker threads
/// - Segment rotation with header replay
/// - Recorder events and path statistics
///
/// See [`lamco_encode`] documentation for details.
#[cfg(feature = "encode")]
#[cfg_attr(docsrs, doc(cfg(feature = "encode")))]
pub use lamco_encode as encode;

/// Recording control.
///
/// See [`lamco_recorder`] documentation for details.
#[cfg(feature = "recorder")]
#[cfg_attr(docsrs, doc(cfg(feature = "recorder")))]
pub use lamco_recorder as recorder;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use lamco_dualrec::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "frame")]
    pub use lamco_frame::{Frame, FormatConverter, PixelFormat, PixelFormatDetector, PlaneLayout};

    #[cfg(feature = "encode")]
    pub use lamco_encode::{
        ContainerFactory, ElementaryStreamFactory, EncodeError, EncoderFactory, QualityTier,
        RecorderEvent, VideoEncoder,
    };

    #[cfg(feature = "recorder")]
    pub use lamco_recorder::{
        FrameSink, FrameSource, PipelineCoordinator, RecorderConfig, RecorderError,
        RecordingSettings, Resolution,
    };
}
