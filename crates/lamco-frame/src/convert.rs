//! Frame to Encoder Input Conversion
//!
//! Copies a captured [`Frame`] into an encoder [`InputImage`], rearranging
//! chroma samples when source and destination layouts differ. The routine is
//! chosen solely from the detected source and destination formats:
//!
//! | Source      | Destination | Routine |
//! |-------------|-------------|---------|
//! | I420        | I420        | [`ConversionPath::PlanarCopy`] |
//! | NV12 / NV21 | I420        | [`ConversionPath::Deinterleave`] |
//! | I420        | NV12 / NV21 | [`ConversionPath::Interleave`] |
//! | NV12 / NV21 | NV12 / NV21 | [`ConversionPath::SemiPlanarCopy`] |
//! | Unknown     | any         | [`ConversionPath::ByteStream`] |
//!
//! The byte stream routine serializes every plane sample by sample through a
//! [`ByteQueue`] and drains it into the destination descriptors. It works for
//! any pair of valid descriptors but is considerably slower.
//!
//! # Examples
//!
//! ```rust
//! use lamco_frame::{
//!     ConversionPath, Detection, Frame, FormatConverter, InputImage, PixelFormatDetector,
//!     PlaneLayout,
//! };
//! use std::time::Duration;
//!
//! let detector = PixelFormatDetector::default();
//! let frame = Frame::new(4, 4, vec![7u8; 24], PlaneLayout::i420(4, 4, 4), Duration::ZERO, 0);
//!
//! let mut buffer = vec![0u8; 24];
//! let mut image = InputImage::new(4, 4, &mut buffer, PlaneLayout::nv12(4, 4, 4));
//!
//! let src = detector.detect(frame.width, &frame.planes);
//! let dst = detector.detect(image.width, &image.planes);
//!
//! let mut converter = FormatConverter::new();
//! let path = converter.convert(&frame, src, &mut image, dst).unwrap();
//! assert_eq!(path, ConversionPath::Interleave);
//! ```

use thiserror::Error;
use tracing::trace;

use crate::byte_queue::ByteQueue;
use crate::format::{ChromaOrder, Detection, PixelFormat};
use crate::frame::{chroma_dim, Frame, InputImage, PlaneLayout, PLANE_U, PLANE_V, PLANE_Y};

/// Conversion failures
///
/// Either failure leaves the destination untouched; the caller submits an
/// empty buffer for the frame instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Source and destination geometry differ
    #[error("Frame geometry mismatch: source {src_width}x{src_height}, destination {dst_width}x{dst_height}")]
    FormatMismatch {
        /// Source width
        src_width: u32,
        /// Source height
        src_height: u32,
        /// Destination width
        dst_width: u32,
        /// Destination height
        dst_height: u32,
    },

    /// Plane descriptors address bytes past the end of a buffer
    #[error("{side} planes need {needed} bytes, buffer holds {available}")]
    InsufficientCapacity {
        /// Which side failed ("source" or "destination")
        side: &'static str,
        /// Bytes addressed by the descriptors
        needed: usize,
        /// Bytes available
        available: usize,
    },
}

/// Result type for conversions
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Conversion routine used for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionPath {
    /// Planar to planar
    PlanarCopy,
    /// Semi-planar to planar
    Deinterleave,
    /// Planar to semi-planar
    Interleave,
    /// Semi-planar to semi-planar; `swapped` when pair order differs
    SemiPlanarCopy {
        /// NV12 to NV21 or the reverse
        swapped: bool,
    },
    /// Generic copy through the byte queue
    ByteStream,
}

impl ConversionPath {
    /// Select the routine for a format pair
    #[must_use]
    pub fn select(src: PixelFormat, dst: PixelFormat) -> Self {
        use PixelFormat::{Unknown, I420, NV12, NV21};

        match (src, dst) {
            (Unknown, _) | (_, Unknown) => Self::ByteStream,
            (I420, I420) => Self::PlanarCopy,
            (NV12 | NV21, I420) => Self::Deinterleave,
            (I420, NV12 | NV21) => Self::Interleave,
            (NV12, NV12) | (NV21, NV21) => Self::SemiPlanarCopy { swapped: false },
            (NV12, NV21) | (NV21, NV12) => Self::SemiPlanarCopy { swapped: true },
        }
    }
}

/// Conversion statistics
#[derive(Debug, Clone, Default)]
pub struct ConversionStats {
    /// Frames converted successfully
    pub frames_converted: u64,
    /// Frames that went through the byte queue
    pub byte_stream_frames: u64,
    /// Frames rejected
    pub failures: u64,
    /// Payload bytes written into destinations
    pub bytes_written: u64,
}

/// Copies frames into encoder input images
#[derive(Debug)]
pub struct FormatConverter {
    queue: ByteQueue,
    stats: ConversionStats,
}

impl Default for FormatConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter {
    /// Create a converter; the byte queue grows on first use
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: ByteQueue::with_capacity(0),
            stats: ConversionStats::default(),
        }
    }

    /// Conversion statistics
    #[must_use]
    pub fn stats(&self) -> &ConversionStats {
        &self.stats
    }

    /// Copy `src` into `dst`
    ///
    /// `src_format` and `dst_format` are the detections for the two plane
    /// triples. On success returns the routine that was used.
    pub fn convert(
        &mut self,
        src: &Frame,
        src_format: Detection,
        dst: &mut InputImage<'_>,
        dst_format: Detection,
    ) -> Result<ConversionPath> {
        if let Err(err) = check_bounds(src, dst) {
            self.stats.failures += 1;
            return Err(err);
        }

        let path = ConversionPath::select(src_format.format, dst_format.format);
        trace!(
            "Converting {}x{} {} -> {} via {:?}",
            src.width,
            src.height,
            src_format.format,
            dst_format.format,
            path
        );

        let geometry = Geometry::of(src);
        match path {
            ConversionPath::PlanarCopy => {
                for plane in [PLANE_Y, PLANE_U, PLANE_V] {
                    let (cols, rows) = geometry.plane(plane);
                    copy_plane(src, plane, dst, plane, cols, rows);
                }
            }
            ConversionPath::Deinterleave => {
                copy_luma(src, dst, &geometry);
                deinterleave(src, src_format.chroma_order, dst, &geometry);
            }
            ConversionPath::Interleave => {
                copy_luma(src, dst, &geometry);
                interleave(src, dst, dst_format.chroma_order, &geometry);
            }
            ConversionPath::SemiPlanarCopy { swapped } => {
                copy_luma(src, dst, &geometry);
                copy_semi_planar(src, dst, swapped, &geometry);
            }
            ConversionPath::ByteStream => {
                self.byte_stream(src, dst, &geometry);
                self.stats.byte_stream_frames += 1;
            }
        }

        self.stats.frames_converted += 1;
        self.stats.bytes_written += dst.payload_len() as u64;
        Ok(path)
    }

    fn byte_stream(&mut self, src: &Frame, dst: &mut InputImage<'_>, geometry: &Geometry) {
        self.queue.reserve(geometry.width * geometry.height);

        for plane in [PLANE_Y, PLANE_U, PLANE_V] {
            let (cols, rows) = geometry.plane(plane);
            let s = &src.planes[plane];
            let d = &dst.planes[plane];

            for row in 0..rows {
                for col in 0..cols {
                    self.queue.push(src.data[s.index(col, row)]);
                }
            }
            for row in 0..rows {
                for col in 0..cols {
                    if let Some(byte) = self.queue.pop() {
                        dst.data[d.index(col, row)] = byte;
                    }
                }
            }
        }
        self.queue.clear();
    }
}

/// Plane dimensions of a 4:2:0 image
#[derive(Debug, Clone, Copy)]
struct Geometry {
    width: usize,
    height: usize,
    chroma_width: usize,
    chroma_height: usize,
}

impl Geometry {
    fn of(frame: &Frame) -> Self {
        Self {
            width: frame.width as usize,
            height: frame.height as usize,
            chroma_width: chroma_dim(frame.width),
            chroma_height: chroma_dim(frame.height),
        }
    }

    fn plane(&self, plane: usize) -> (usize, usize) {
        if plane == PLANE_Y {
            (self.width, self.height)
        } else {
            (self.chroma_width, self.chroma_height)
        }
    }
}

fn check_bounds(src: &Frame, dst: &InputImage<'_>) -> Result<()> {
    if src.width != dst.width || src.height != dst.height {
        return Err(ConvertError::FormatMismatch {
            src_width: src.width,
            src_height: src.height,
            dst_width: dst.width,
            dst_height: dst.height,
        });
    }

    let needed = PlaneLayout::buffer_len(&src.planes, src.width, src.height);
    if needed > src.data.len() {
        return Err(ConvertError::InsufficientCapacity {
            side: "source",
            needed,
            available: src.data.len(),
        });
    }

    let needed = dst.payload_len();
    if needed > dst.data.len() {
        return Err(ConvertError::InsufficientCapacity {
            side: "destination",
            needed,
            available: dst.data.len(),
        });
    }

    Ok(())
}

/// Strided copy of one plane; bulk when layouts match, row by row when only
/// pixel strides match, sample by sample otherwise
fn copy_plane(
    src: &Frame,
    src_plane: usize,
    dst: &mut InputImage<'_>,
    dst_plane: usize,
    cols: usize,
    rows: usize,
) {
    if cols == 0 || rows == 0 {
        return;
    }
    let s = src.planes[src_plane];
    let d = dst.planes[dst_plane];

    if s.pixel_stride == 1 && d.pixel_stride == 1 {
        if s.row_stride == d.row_stride {
            let len = s.required_len(cols, rows) - s.offset;
            dst.data[d.offset..d.offset + len].copy_from_slice(&src.data[s.offset..s.offset + len]);
        } else {
            for row in 0..rows {
                let from = s.index(0, row);
                let to = d.index(0, row);
                dst.data[to..to + cols].copy_from_slice(&src.data[from..from + cols]);
            }
        }
        return;
    }

    for row in 0..rows {
        for col in 0..cols {
            dst.data[d.index(col, row)] = src.data[s.index(col, row)];
        }
    }
}

fn copy_luma(src: &Frame, dst: &mut InputImage<'_>, geometry: &Geometry) {
    copy_plane(src, PLANE_Y, dst, PLANE_Y, geometry.width, geometry.height);
}

/// Start of an interleaved chroma region when the U and V descriptors
/// address adjacent bytes of one plane
fn interleaved_base(planes: &[PlaneLayout; 3]) -> Option<(usize, usize)> {
    let u = planes[PLANE_U];
    let v = planes[PLANE_V];
    let adjacent = u.offset + 1 == v.offset || v.offset + 1 == u.offset;
    (adjacent && u.pixel_stride == 2 && u.row_stride == v.row_stride)
        .then(|| (u.offset.min(v.offset), u.row_stride))
}

fn split_pair(pair: &[u8], order: ChromaOrder) -> (u8, u8) {
    match order {
        ChromaOrder::Uv => (pair[0], pair[1]),
        ChromaOrder::Vu => (pair[1], pair[0]),
    }
}

fn deinterleave(src: &Frame, order: ChromaOrder, dst: &mut InputImage<'_>, geometry: &Geometry) {
    let Some((base, stride)) = interleaved_base(&src.planes) else {
        copy_plane(src, PLANE_U, dst, PLANE_U, geometry.chroma_width, geometry.chroma_height);
        copy_plane(src, PLANE_V, dst, PLANE_V, geometry.chroma_width, geometry.chroma_height);
        return;
    };
    let du = dst.planes[PLANE_U];
    let dv = dst.planes[PLANE_V];

    for row in 0..geometry.chroma_height {
        let start = base + row * stride;
        let pairs = &src.data[start..start + geometry.chroma_width * 2];
        for (col, pair) in pairs.chunks_exact(2).enumerate() {
            let (u, v) = split_pair(pair, order);
            dst.data[du.index(col, row)] = u;
            dst.data[dv.index(col, row)] = v;
        }
    }
}

fn interleave(src: &Frame, dst: &mut InputImage<'_>, order: ChromaOrder, geometry: &Geometry) {
    let Some((base, stride)) = interleaved_base(&dst.planes) else {
        copy_plane(src, PLANE_U, dst, PLANE_U, geometry.chroma_width, geometry.chroma_height);
        copy_plane(src, PLANE_V, dst, PLANE_V, geometry.chroma_width, geometry.chroma_height);
        return;
    };
    let su = src.planes[PLANE_U];
    let sv = src.planes[PLANE_V];

    for row in 0..geometry.chroma_height {
        let start = base + row * stride;
        let pairs = &mut dst.data[start..start + geometry.chroma_width * 2];
        for (col, pair) in pairs.chunks_exact_mut(2).enumerate() {
            let u = src.data[su.index(col, row)];
            let v = src.data[sv.index(col, row)];
            let (first, second) = match order {
                ChromaOrder::Uv => (u, v),
                ChromaOrder::Vu => (v, u),
            };
            pair[0] = first;
            pair[1] = second;
        }
    }
}

fn copy_semi_planar(src: &Frame, dst: &mut InputImage<'_>, swapped: bool, geometry: &Geometry) {
    let (Some((src_base, src_stride)), Some((dst_base, dst_stride))) =
        (interleaved_base(&src.planes), interleaved_base(&dst.planes))
    else {
        copy_plane(src, PLANE_U, dst, PLANE_U, geometry.chroma_width, geometry.chroma_height);
        copy_plane(src, PLANE_V, dst, PLANE_V, geometry.chroma_width, geometry.chroma_height);
        return;
    };
    let row_bytes = geometry.chroma_width * 2;

    for row in 0..geometry.chroma_height {
        let from = src_base + row * src_stride;
        let to = dst_base + row * dst_stride;
        let src_row = &src.data[from..from + row_bytes];
        let dst_row = &mut dst.data[to..to + row_bytes];

        if swapped {
            for (out, pair) in dst_row.chunks_exact_mut(2).zip(src_row.chunks_exact(2)) {
                out[0] = pair[1];
                out[1] = pair[0];
            }
        } else {
            dst_row.copy_from_slice(src_row);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::format::PixelFormatDetector;

    /// Frame whose Y samples are `row * 16 + col`, U samples `100 + i`, V `200 + i`
    fn patterned(width: u32, height: u32, planes: [PlaneLayout; 3]) -> Frame {
        let len = PlaneLayout::buffer_len(&planes, width, height);
        let mut data = vec![0u8; len];
        for row in 0..height as usize {
            for col in 0..width as usize {
                data[planes[PLANE_Y].index(col, row)] = (row * 16 + col) as u8;
            }
        }
        let (cw, ch) = (chroma_dim(width), chroma_dim(height));
        for row in 0..ch {
            for col in 0..cw {
                data[planes[PLANE_U].index(col, row)] = (100 + row * cw + col) as u8;
                data[planes[PLANE_V].index(col, row)] = (200 + row * cw + col) as u8;
            }
        }
        Frame::new(width, height, data, planes, Duration::ZERO, 0)
    }

    fn samples(data: &[u8], planes: &[PlaneLayout; 3], width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for (plane, (cols, rows)) in [
            (PLANE_Y, (width as usize, height as usize)),
            (PLANE_U, (chroma_dim(width), chroma_dim(height))),
            (PLANE_V, (chroma_dim(width), chroma_dim(height))),
        ] {
            for row in 0..rows {
                for col in 0..cols {
                    out.push(data[planes[plane].index(col, row)]);
                }
            }
        }
        out
    }

    fn run(frame: &Frame, dst_planes: [PlaneLayout; 3]) -> (ConversionPath, Vec<u8>) {
        let detector = PixelFormatDetector::default();
        let mut buffer = vec![0u8; PlaneLayout::buffer_len(&dst_planes, frame.width, frame.height)];
        let mut image = InputImage::new(frame.width, frame.height, &mut buffer, dst_planes);
        let src = detector.detect(frame.width, &frame.planes);
        let dst = detector.detect(image.width, &image.planes);

        let path = FormatConverter::new()
            .convert(frame, src, &mut image, dst)
            .unwrap();
        (path, samples(&buffer, &dst_planes, frame.width, frame.height))
    }

    #[test]
    fn test_route_selection() {
        use PixelFormat::{Unknown, I420, NV12, NV21};
        assert_eq!(ConversionPath::select(I420, I420), ConversionPath::PlanarCopy);
        assert_eq!(ConversionPath::select(NV21, I420), ConversionPath::Deinterleave);
        assert_eq!(ConversionPath::select(I420, NV12), ConversionPath::Interleave);
        assert_eq!(
            ConversionPath::select(NV12, NV21),
            ConversionPath::SemiPlanarCopy { swapped: true }
        );
        assert_eq!(ConversionPath::select(Unknown, NV12), ConversionPath::ByteStream);
    }

    #[test]
    fn test_planar_copy_with_padding() {
        let frame = patterned(6, 4, PlaneLayout::i420(6, 4, 8));
        let expected = samples(&frame.data, &frame.planes, 6, 4);

        let (path, out) = run(&frame, PlaneLayout::i420(6, 4, 6));
        assert_eq!(path, ConversionPath::PlanarCopy);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_packed_i420_bulk_copy() {
        // Matching strides on both sides take the bulk branch for every plane
        let frame = patterned(8, 8, PlaneLayout::i420(8, 8, 8));
        let (path, out) = run(&frame, PlaneLayout::i420(8, 8, 8));
        assert_eq!(path, ConversionPath::PlanarCopy);

        let mut buffer = vec![0u8; frame.data.len()];
        let mut image = InputImage::new(8, 8, &mut buffer, PlaneLayout::i420(8, 8, 8));
        let detection = Detection {
            format: PixelFormat::I420,
            chroma_order: ChromaOrder::Uv,
        };
        FormatConverter::new()
            .convert(&frame, detection, &mut image, detection)
            .unwrap();
        assert_eq!(buffer, frame.data);
        assert_eq!(out, samples(&frame.data, &frame.planes, 8, 8));
    }

    #[test]
    fn test_yv12_to_i420_keeps_components() {
        let frame = patterned(4, 4, PlaneLayout::yv12(4, 4, 4));
        let expected = samples(&frame.data, &frame.planes, 4, 4);

        let (_, out) = run(&frame, PlaneLayout::i420(4, 4, 4));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_nv21_to_i420() {
        let frame = patterned(4, 4, PlaneLayout::nv21(4, 4, 4));
        let expected = samples(&frame.data, &frame.planes, 4, 4);

        let (path, out) = run(&frame, PlaneLayout::i420(4, 4, 4));
        assert_eq!(path, ConversionPath::Deinterleave);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_i420_nv12_i420_round_trip() {
        let frame = patterned(8, 6, PlaneLayout::i420(8, 6, 8));
        let original = samples(&frame.data, &frame.planes, 8, 6);

        let nv12_planes = PlaneLayout::nv12(8, 6, 8);
        let detector = PixelFormatDetector::default();
        let mut nv12 = vec![0u8; PlaneLayout::buffer_len(&nv12_planes, 8, 6)];
        let mut image = InputImage::new(8, 6, &mut nv12, nv12_planes);
        let mut converter = FormatConverter::new();
        let path = converter
            .convert(
                &frame,
                detector.detect(8, &frame.planes),
                &mut image,
                detector.detect(8, &nv12_planes),
            )
            .unwrap();
        assert_eq!(path, ConversionPath::Interleave);
        // U/V pairs land interleaved in U-first order
        assert_eq!(&nv12[48..52], &[100, 200, 101, 201]);

        let back = Frame::new(8, 6, nv12, nv12_planes, Duration::ZERO, 0);
        let (path, out) = run(&back, PlaneLayout::i420(8, 6, 8));
        assert_eq!(path, ConversionPath::Deinterleave);
        assert_eq!(out, original);
    }

    #[test]
    fn test_nv12_to_nv21_swaps_pairs() {
        let frame = patterned(4, 2, PlaneLayout::nv12(4, 2, 4));
        let expected = samples(&frame.data, &frame.planes, 4, 2);

        let (path, out) = run(&frame, PlaneLayout::nv21(4, 2, 4));
        assert_eq!(path, ConversionPath::SemiPlanarCopy { swapped: true });
        assert_eq!(out, expected);
    }

    #[test]
    fn test_unknown_source_uses_byte_stream() {
        // Chroma pixel stride 3 is not a recognised layout
        let planes = [
            PlaneLayout::new(0, 4, 1),
            PlaneLayout::new(16, 6, 3),
            PlaneLayout::new(17, 6, 3),
        ];
        let frame = patterned(4, 4, planes);
        let expected = samples(&frame.data, &frame.planes, 4, 4);

        let (path, out) = run(&frame, PlaneLayout::i420(4, 4, 4));
        assert_eq!(path, ConversionPath::ByteStream);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_geometry_mismatch() {
        let frame = patterned(4, 4, PlaneLayout::i420(4, 4, 4));
        let planes = PlaneLayout::i420(8, 8, 8);
        let mut buffer = vec![0u8; 96];
        let mut image = InputImage::new(8, 8, &mut buffer, planes);
        let detection = Detection {
            format: PixelFormat::I420,
            chroma_order: ChromaOrder::Uv,
        };

        let mut converter = FormatConverter::new();
        let err = converter.convert(&frame, detection, &mut image, detection).unwrap_err();
        assert!(matches!(err, ConvertError::FormatMismatch { .. }));
        assert_eq!(converter.stats().failures, 1);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_insufficient_capacity() {
        let mut frame = patterned(4, 4, PlaneLayout::i420(4, 4, 4));
        frame.data.truncate(20);
        let planes = PlaneLayout::i420(4, 4, 4);
        let mut buffer = vec![0u8; 24];
        let mut image = InputImage::new(4, 4, &mut buffer, planes);
        let detection = Detection {
            format: PixelFormat::I420,
            chroma_order: ChromaOrder::Uv,
        };

        let err = FormatConverter::new()
            .convert(&frame, detection, &mut image, detection)
            .unwrap_err();
        assert_eq!(
            err,
            ConvertError::InsufficientCapacity {
                side: "source",
                needed: 24,
                available: 20
            }
        );
    }
}
