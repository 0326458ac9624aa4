//! # lamco-frame
//!
//! Raw camera frame model, YUV 4:2:0 layout detection and strided plane
//! conversion for the dual-quality recorder.
//!
//! This crate is part of the [lamco-dualrec](https://github.com/lamco-admin/lamco-dualrec)
//! workspace and supplies the frame types consumed by `lamco-encode`.
//!
//! # Features
//!
//! - **Frame Model**: one backing buffer described by three [`PlaneLayout`]s
//! - **Format Detection**: I420/YV12, NV12, NV21 recognised from descriptors only
//! - **Pluggable Probing**: NV12 vs NV21 decided by a [`SemiPlanarProbe`]
//! - **Conversion**: planar/semi-planar copies honoring both sides' strides
//! - **Frame Leases**: one frame, several readers, exactly one release
//!
//! # Quick Start
//!
//! ```rust
//! use lamco_frame::{Frame, FormatConverter, InputImage, PixelFormatDetector, PlaneLayout};
//! use std::time::Duration;
//!
//! let detector = PixelFormatDetector::default();
//! let mut converter = FormatConverter::new();
//!
//! // Camera delivers NV21, encoder wants planar input
//! let frame = Frame::new(8, 8, vec![0u8; 96], PlaneLayout::nv21(8, 8, 8), Duration::ZERO, 0);
//! let mut buffer = vec![0u8; 96];
//! let mut image = InputImage::new(8, 8, &mut buffer, PlaneLayout::i420(8, 8, 8));
//!
//! let src = detector.detect(frame.width, &frame.planes);
//! let dst = detector.detect(image.width, &image.planes);
//! converter.convert(&frame, src, &mut image, dst)?;
//! # Ok::<(), lamco_frame::ConvertError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │  Frame             │ ◄── Y/U/V plane descriptors
//! └─────────┬──────────┘
//!           │
//!           ▼
//! ┌────────────────────┐
//! │ PixelFormatDetector│ ◄── SemiPlanarProbe
//! └─────────┬──────────┘
//!           │
//!           ▼
//! ┌────────────────────┐
//! │  FormatConverter   │ ◄── ByteQueue fallback
//! └─────────┬──────────┘
//!           │
//!           ▼
//! ┌────────────────────┐
//! │  InputImage        │ ◄── encoder input buffer
//! └────────────────────┘
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod byte_queue;
pub mod convert;
pub mod format;
pub mod frame;
pub mod lease;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use byte_queue::ByteQueue;
pub use convert::{ConversionPath, ConversionStats, ConvertError, FormatConverter};
pub use format::{
    ChromaOrder, Detection, FixedOrderProbe, PixelFormat, PixelFormatDetector, PlaneOffsetProbe,
    SemiPlanarProbe,
};
pub use frame::{chroma_dim, Frame, InputImage, PlaneLayout, PLANE_U, PLANE_V, PLANE_Y};
pub use lease::{FrameLease, FramePermit};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Payload size of a tightly packed 4:2:0 image
#[must_use]
pub fn yuv420_frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize + 2 * chroma_dim(width) * chroma_dim(height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv420_frame_size() {
        assert_eq!(yuv420_frame_size(1920, 1080), 3_110_400);
        assert_eq!(yuv420_frame_size(5, 3), 27);
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
