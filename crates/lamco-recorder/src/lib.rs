//! # lamco-recorder
//!
//! Dual-quality segmented recording: one camera frame stream, two
//! independently encoded and independently segmented outputs.
//!
//! This crate is part of the [lamco-dualrec](https://github.com/lamco-admin/lamco-dualrec)
//! workspace and ties [`lamco_frame`] and [`lamco_encode`] together behind a
//! start/stop API.
//!
//! # Features
//!
//! - **Frame Fan-Out**: every frame goes to both paths and is released exactly once
//! - **Non-Blocking Capture**: the capture callback never waits on an encoder
//! - **Tier Isolation**: a failing low-quality encoder never touches the high-quality output
//! - **Bounded Stop**: stop drains both paths within the configured timeout
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lamco_recorder::{PipelineCoordinator, RecorderConfig, RecordingSettings, Resolution};
//! use lamco_encode::ElementaryStreamFactory;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RecorderConfig::builder().output_dir("/tmp/rec").build();
//!     let mut recorder = PipelineCoordinator::new(
//!         config,
//!         camera.clone(),
//!         hardware_encoders,
//!         Arc::new(ElementaryStreamFactory),
//!     );
//!
//!     camera.set_sink(recorder.dispatcher());
//!     recorder.start_recording(RecordingSettings::builder().resolution(Resolution::HD_720).build())?;
//!     // ...
//!     let report = recorder.stop_recording().await?;
//!     println!("{} HQ segments", report.high.segments.len());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod source;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use config::{
    RecorderConfig, RecorderConfigBuilder, RecordingSettings, RecordingSettingsBuilder, Resolution,
};
pub use coordinator::{FrameDispatcher, PipelineCoordinator, RecordingReport};
pub use error::{RecorderError, Result};
pub use source::{CaptureFormat, FrameSink, FrameSource, SourceError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
