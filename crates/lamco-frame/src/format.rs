//! Pixel Format Detection
//!
//! Camera HALs describe YUV 4:2:0 images only through plane descriptors, so
//! the format is recomputed for every frame from offsets and strides.
//!
//! - Chroma pixel stride 1 → planar. Plane order decides I420 vs YV12.
//! - Chroma pixel stride 2 with equal row strides → semi-planar. Whether the
//!   interleaved pairs are U/V (NV12) or V/U (NV21) is decided by a
//!   [`SemiPlanarProbe`].
//! - Anything else → [`PixelFormat::Unknown`].
//!
//! # Examples
//!
//! ```rust
//! use lamco_frame::{ChromaOrder, PixelFormat, PixelFormatDetector, PlaneLayout};
//!
//! let detector = PixelFormatDetector::default();
//!
//! let detection = detector.detect(640, &PlaneLayout::nv21(640, 480, 640));
//! assert_eq!(detection.format, PixelFormat::NV21);
//!
//! let detection = detector.detect(640, &PlaneLayout::yv12(640, 480, 640));
//! assert_eq!(detection.format, PixelFormat::I420);
//! assert_eq!(detection.chroma_order, ChromaOrder::Vu);
//! ```

use std::fmt;

use tracing::debug;

use crate::frame::{chroma_dim, PlaneLayout, PLANE_U, PLANE_V};

/// YUV 4:2:0 memory layouts handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Three separate planes (covers YV12 through [`ChromaOrder::Vu`])
    I420,
    /// Luma plane followed by interleaved U/V pairs
    NV12,
    /// Luma plane followed by interleaved V/U pairs
    NV21,
    /// Layout not recognised
    Unknown,
}

impl PixelFormat {
    /// Whether chroma samples are interleaved
    #[must_use]
    pub fn is_semi_planar(self) -> bool {
        matches!(self, Self::NV12 | Self::NV21)
    }

    /// Interleaved pair order for semi-planar formats
    #[must_use]
    pub fn chroma_order(self) -> Option<ChromaOrder> {
        match self {
            Self::NV12 => Some(ChromaOrder::Uv),
            Self::NV21 => Some(ChromaOrder::Vu),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I420 => "I420",
            Self::NV12 => "NV12",
            Self::NV21 => "NV21",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Order of the two chroma components in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChromaOrder {
    /// U (Cb) before V (Cr)
    #[default]
    Uv,
    /// V (Cr) before U (Cb)
    Vu,
}

/// Result of inspecting a plane triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Detected format
    pub format: PixelFormat,
    /// Chroma plane order (I420 vs YV12 for planar, NV12 vs NV21 otherwise)
    pub chroma_order: ChromaOrder,
}

impl Detection {
    /// Detection result for an unrecognised layout
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            format: PixelFormat::Unknown,
            chroma_order: ChromaOrder::Uv,
        }
    }
}

/// Strategy deciding the pair order of an interleaved chroma plane
///
/// Plane descriptors alone do not always settle NV12 vs NV21; implementations
/// may inspect offsets or consult a capability source. Returning `None` makes
/// the detector report [`PixelFormat::Unknown`].
pub trait SemiPlanarProbe: Send + Sync {
    /// Decide the chroma order for the given U and V descriptors
    fn probe(&self, u: &PlaneLayout, v: &PlaneLayout) -> Option<ChromaOrder>;
}

/// Decides the order from which chroma descriptor starts one byte earlier
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneOffsetProbe;

impl SemiPlanarProbe for PlaneOffsetProbe {
    fn probe(&self, u: &PlaneLayout, v: &PlaneLayout) -> Option<ChromaOrder> {
        if u.offset + 1 == v.offset {
            Some(ChromaOrder::Uv)
        } else if v.offset + 1 == u.offset {
            Some(ChromaOrder::Vu)
        } else {
            None
        }
    }
}

/// Always answers with a known order (e.g. from a device capability query)
#[derive(Debug, Clone, Copy)]
pub struct FixedOrderProbe(pub ChromaOrder);

impl SemiPlanarProbe for FixedOrderProbe {
    fn probe(&self, _u: &PlaneLayout, _v: &PlaneLayout) -> Option<ChromaOrder> {
        Some(self.0)
    }
}

/// Detects the pixel format of a plane triple
pub struct PixelFormatDetector {
    probe: Box<dyn SemiPlanarProbe>,
}

impl Default for PixelFormatDetector {
    fn default() -> Self {
        Self::new(Box::new(PlaneOffsetProbe))
    }
}

impl fmt::Debug for PixelFormatDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelFormatDetector").finish_non_exhaustive()
    }
}

impl PixelFormatDetector {
    /// Create a detector using the given semi-planar probe
    #[must_use]
    pub fn new(probe: Box<dyn SemiPlanarProbe>) -> Self {
        Self { probe }
    }

    /// Detect the layout of an image `width` pixels wide
    #[must_use]
    pub fn detect(&self, width: u32, planes: &[PlaneLayout; 3]) -> Detection {
        let u = &planes[PLANE_U];
        let v = &planes[PLANE_V];
        let chroma_width = chroma_dim(width);

        if u.pixel_stride == 1 && v.pixel_stride == 1 {
            if u.row_stride != v.row_stride || u.row_stride < chroma_width {
                return Detection::unknown();
            }
            let chroma_order = if v.offset < u.offset {
                ChromaOrder::Vu
            } else {
                ChromaOrder::Uv
            };
            return Detection {
                format: PixelFormat::I420,
                chroma_order,
            };
        }

        if u.pixel_stride == 2 && v.pixel_stride == 2 {
            if u.row_stride != v.row_stride || u.row_stride < chroma_width * 2 {
                return Detection::unknown();
            }
            return match self.probe.probe(u, v) {
                Some(ChromaOrder::Uv) => Detection {
                    format: PixelFormat::NV12,
                    chroma_order: ChromaOrder::Uv,
                },
                Some(ChromaOrder::Vu) => Detection {
                    format: PixelFormat::NV21,
                    chroma_order: ChromaOrder::Vu,
                },
                None => {
                    debug!(
                        "Semi-planar order undetermined (u offset {}, v offset {})",
                        u.offset, v.offset
                    );
                    Detection::unknown()
                }
            };
        }

        Detection::unknown()
    }
}
