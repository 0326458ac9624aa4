//! Raw Frame Types
//!
//! A [`Frame`] is one captured camera image: a single backing buffer plus
//! three plane descriptors (Y, U, V). The descriptors are the only source of
//! truth about the memory layout; the pixel format is detected from them
//! rather than asserted by the producer.
//!
//! # Examples
//!
//! ```rust
//! use lamco_frame::{Frame, PlaneLayout};
//! use std::time::Duration;
//!
//! // 4x2 I420 image, tightly packed
//! let planes = PlaneLayout::i420(4, 2, 4);
//! let frame = Frame::new(4, 2, vec![0u8; 12], planes, Duration::ZERO, 0);
//!
//! assert_eq!(frame.chroma_width(), 2);
//! assert_eq!(frame.planes[2].offset, 10);
//! ```

use std::time::Duration;

/// Index of the luma plane in a plane triple
pub const PLANE_Y: usize = 0;
/// Index of the U (Cb) plane in a plane triple
pub const PLANE_U: usize = 1;
/// Index of the V (Cr) plane in a plane triple
pub const PLANE_V: usize = 2;

/// Memory layout of one image plane inside a backing buffer
///
/// `row_stride` is the byte distance between the starts of two consecutive
/// rows, `pixel_stride` the byte distance between two horizontally adjacent
/// samples. Interleaved chroma is described by two planes with pixel stride 2
/// whose offsets differ by one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneLayout {
    /// Byte offset of the first sample
    pub offset: usize,
    /// Bytes between row starts
    pub row_stride: usize,
    /// Bytes between adjacent samples of a row
    pub pixel_stride: usize,
}

impl PlaneLayout {
    /// Create a plane descriptor
    #[must_use]
    pub const fn new(offset: usize, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            offset,
            row_stride,
            pixel_stride,
        }
    }

    /// Byte index of sample `(col, row)`
    #[inline]
    #[must_use]
    pub fn index(&self, col: usize, row: usize) -> usize {
        self.offset + row * self.row_stride + col * self.pixel_stride
    }

    /// Minimum buffer length needed to address `cols` x `rows` samples
    ///
    /// Returns 0 for an empty plane.
    #[must_use]
    pub fn required_len(&self, cols: usize, rows: usize) -> usize {
        if cols == 0 || rows == 0 {
            return 0;
        }
        self.index(cols - 1, rows - 1) + 1
    }

    /// Planar I420 layout (Y, then U, then V) with the given luma row stride
    ///
    /// Chroma rows use half the luma stride, rounded up.
    #[must_use]
    pub fn i420(width: u32, height: u32, y_stride: usize) -> [PlaneLayout; 3] {
        let (y_stride, c_stride, c_rows) = planar_strides(width, height, y_stride);
        let u_offset = y_stride * height as usize;
        let v_offset = u_offset + c_stride * c_rows;

        [
            PlaneLayout::new(0, y_stride, 1),
            PlaneLayout::new(u_offset, c_stride, 1),
            PlaneLayout::new(v_offset, c_stride, 1),
        ]
    }

    /// Planar YV12 layout (Y, then V, then U)
    #[must_use]
    pub fn yv12(width: u32, height: u32, y_stride: usize) -> [PlaneLayout; 3] {
        let [y, u, v] = Self::i420(width, height, y_stride);
        // Same geometry as I420 with the chroma planes swapped in memory
        [y, PlaneLayout { offset: v.offset, ..u }, PlaneLayout { offset: u.offset, ..v }]
    }

    /// Semi-planar NV12 layout (Y, then interleaved U/V)
    #[must_use]
    pub fn nv12(width: u32, height: u32, y_stride: usize) -> [PlaneLayout; 3] {
        let y_stride = y_stride.max(width as usize);
        let uv_stride = y_stride.max(chroma_dim(width) * 2);
        let uv_offset = y_stride * height as usize;

        [
            PlaneLayout::new(0, y_stride, 1),
            PlaneLayout::new(uv_offset, uv_stride, 2),
            PlaneLayout::new(uv_offset + 1, uv_stride, 2),
        ]
    }

    /// Semi-planar NV21 layout (Y, then interleaved V/U)
    #[must_use]
    pub fn nv21(width: u32, height: u32, y_stride: usize) -> [PlaneLayout; 3] {
        let [y, u, v] = Self::nv12(width, height, y_stride);
        [y, PlaneLayout { offset: v.offset, ..u }, PlaneLayout { offset: u.offset, ..v }]
    }

    /// Buffer length needed by a full 4:2:0 plane triple
    #[must_use]
    pub fn buffer_len(planes: &[PlaneLayout; 3], width: u32, height: u32) -> usize {
        let (cw, ch) = (chroma_dim(width), chroma_dim(height));
        planes[PLANE_Y]
            .required_len(width as usize, height as usize)
            .max(planes[PLANE_U].required_len(cw, ch))
            .max(planes[PLANE_V].required_len(cw, ch))
    }
}

/// Chroma dimension for a 4:2:0 luma dimension (rounded up)
#[inline]
#[must_use]
pub fn chroma_dim(luma: u32) -> usize {
    (luma as usize + 1) / 2
}

fn planar_strides(width: u32, height: u32, y_stride: usize) -> (usize, usize, usize) {
    let y_stride = y_stride.max(width as usize);
    let c_stride = ((y_stride + 1) / 2).max(chroma_dim(width));
    (y_stride, c_stride, chroma_dim(height))
}

/// A captured raw image frame
///
/// Owned by the frame source until it is handed back through the source's
/// release call. The buffer slot identifies the device buffer the frame was
/// captured into.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Backing buffer shared by all three planes
    pub data: Vec<u8>,
    /// Y, U, V plane descriptors
    pub planes: [PlaneLayout; 3],
    /// Monotonic capture timestamp
    pub timestamp: Duration,
    /// Device buffer slot
    pub slot: u32,
}

impl Frame {
    /// Create a new frame
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        planes: [PlaneLayout; 3],
        timestamp: Duration,
        slot: u32,
    ) -> Self {
        Self {
            width,
            height,
            data,
            planes,
            timestamp,
            slot,
        }
    }

    /// Chroma plane width
    #[must_use]
    pub fn chroma_width(&self) -> usize {
        chroma_dim(self.width)
    }

    /// Chroma plane height
    #[must_use]
    pub fn chroma_height(&self) -> usize {
        chroma_dim(self.height)
    }

    /// Whether every plane descriptor stays inside the backing buffer
    #[must_use]
    pub fn planes_in_bounds(&self) -> bool {
        PlaneLayout::buffer_len(&self.planes, self.width, self.height) <= self.data.len()
    }

    /// Timestamp in microseconds
    #[must_use]
    pub fn timestamp_us(&self) -> i64 {
        i64::try_from(self.timestamp.as_micros()).unwrap_or(i64::MAX)
    }
}

/// Mutable view of an encoder input buffer
///
/// Borrowed from the encoder for the duration of one conversion; the plane
/// descriptors describe the layout the encoder expects.
#[derive(Debug)]
pub struct InputImage<'a> {
    /// Image width the encoder was configured with
    pub width: u32,
    /// Image height the encoder was configured with
    pub height: u32,
    /// Encoder-owned input memory
    pub data: &'a mut [u8],
    /// Y, U, V plane descriptors of the encoder input
    pub planes: [PlaneLayout; 3],
}

impl<'a> InputImage<'a> {
    /// Wrap an encoder input buffer
    pub fn new(width: u32, height: u32, data: &'a mut [u8], planes: [PlaneLayout; 3]) -> Self {
        Self {
            width,
            height,
            data,
            planes,
        }
    }

    /// Number of payload bytes a full image occupies
    #[must_use]
    pub fn payload_len(&self) -> usize {
        PlaneLayout::buffer_len(&self.planes, self.width, self.height)
    }

    /// Whether every plane descriptor stays inside the buffer
    #[must_use]
    pub fn planes_in_bounds(&self) -> bool {
        self.payload_len() <= self.data.len()
    }
}
