//! Encoder Abstraction
//!
//! The hardware encoder is modelled as a buffer-queue state machine: the
//! caller borrows an input slot, fills its image, queues it with a
//! timestamp, and independently dequeues compressed output units. The first
//! output unit carries the codec configuration (the segment header).
//!
//! [`EncoderHandle`] owns a boxed [`VideoEncoder`] and guarantees that
//! `stop` and `release` are attempted exactly once, on every exit path.

use std::fmt;
use std::time::Duration;

use enumflags2::{bitflags, BitFlags};
use lamco_frame::InputImage;
use tracing::{debug, warn};

use crate::error::{EncodeError, Result};

/// Default video MIME type (H.264 / AVC)
pub const MIME_AVC: &str = "video/avc";

/// Flags attached to encoder input and output buffers
#[bitflags]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferFlag {
    /// Output unit is a sync (IDR) frame
    KeyFrame = 0b001,
    /// Output unit carries codec configuration, not picture data
    CodecConfig = 0b010,
    /// Last buffer of the stream
    EndOfStream = 0b100,
}

/// Set of [`BufferFlag`]s
pub type BufferFlags = BitFlags<BufferFlag>;

/// Quality tier of an encode path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityTier {
    /// High bitrate stream
    High,
    /// Low bitrate stream
    Low,
}

impl QualityTier {
    /// Both tiers, high first
    pub const ALL: [QualityTier; 2] = [QualityTier::High, QualityTier::Low];

    /// Label used in output file names
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::High => "high_quality",
            Self::Low => "low_quality",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parameters an encoder is configured with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderParams {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Frames per second
    pub frame_rate: u32,
    /// Seconds between sync frames
    pub key_frame_interval_secs: u32,
    /// Output MIME type
    pub mime: String,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            bitrate: 10_000_000,
            frame_rate: 30,
            key_frame_interval_secs: 1,
            mime: MIME_AVC.to_string(),
        }
    }
}

impl EncoderParams {
    /// Validate parameters and return any issues
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.width == 0 || self.height == 0 {
            issues.push(format!("invalid resolution {}x{}", self.width, self.height));
        }
        if self.bitrate == 0 {
            issues.push("bitrate must be positive".to_string());
        }
        if self.frame_rate == 0 {
            issues.push("frame_rate must be positive".to_string());
        }
        if self.mime.is_empty() {
            issues.push("mime cannot be empty".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Frames between sync frames
    #[must_use]
    pub fn key_frame_period(&self) -> u64 {
        u64::from(self.frame_rate) * u64::from(self.key_frame_interval_secs.max(1))
    }
}

/// Identifier of a borrowed encoder input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot(pub usize);

/// One compressed output unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    /// Compressed payload
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
    /// Unit flags
    pub flags: BufferFlags,
}

impl EncodedUnit {
    /// Whether this unit carries codec configuration
    #[must_use]
    pub fn is_config(&self) -> bool {
        self.flags.contains(BufferFlag::CodecConfig)
    }

    /// Whether this unit is a sync frame
    #[must_use]
    pub fn is_key_frame(&self) -> bool {
        self.flags.contains(BufferFlag::KeyFrame)
    }

    /// Whether this is the final unit
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlag::EndOfStream)
    }
}

/// Output format announced by the encoder once configuration is known
///
/// Used by the muxer to add the video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    /// MIME type
    pub mime: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bitrate in bits per second
    pub bitrate: u32,
    /// Frames per second
    pub frame_rate: u32,
    /// Codec-specific configuration (e.g. SPS/PPS)
    pub codec_config: Vec<u8>,
}

impl TrackFormat {
    /// Track format for `params` with the given configuration payload
    #[must_use]
    pub fn from_params(params: &EncoderParams, codec_config: Vec<u8>) -> Self {
        Self {
            mime: params.mime.clone(),
            width: params.width,
            height: params.height,
            bitrate: params.bitrate,
            frame_rate: params.frame_rate,
            codec_config,
        }
    }
}

/// Buffer-queue video encoder
///
/// All waits are bounded by the timeout passed in. `Ok(None)` from the
/// dequeue calls means "nothing available yet".
pub trait VideoEncoder: Send {
    /// Transition to the executing state
    fn start(&mut self) -> Result<()>;

    /// Borrow a free input buffer
    fn dequeue_input(&mut self, timeout: Duration) -> Result<Option<InputSlot>>;

    /// Image view of a borrowed input buffer
    fn input_image(&mut self, slot: InputSlot) -> Result<InputImage<'_>>;

    /// Return a filled input buffer; `len` 0 submits an empty buffer
    fn queue_input(&mut self, slot: InputSlot, len: usize, pts_us: i64, flags: BufferFlags) -> Result<()>;

    /// Take the next compressed unit
    fn dequeue_output(&mut self, timeout: Duration) -> Result<Option<EncodedUnit>>;

    /// Output format, available once the configuration unit was produced
    fn output_format(&self) -> Option<TrackFormat>;

    /// Ask for a sync frame as soon as possible
    fn request_key_frame(&mut self) -> Result<()> {
        Ok(())
    }

    /// Leave the executing state
    fn stop(&mut self) -> Result<()>;

    /// Free codec resources; must be safe to call after a failed stop
    fn release(&mut self);
}

/// Creates encoders bound to fixed parameters
pub trait EncoderFactory: Send + Sync {
    /// Create an encoder for `tier`
    fn create(&self, tier: QualityTier, params: &EncoderParams) -> Result<Box<dyn VideoEncoder>>;
}

/// Owning handle over a configured encoder
///
/// Stops and releases the encoder on [`EncoderHandle::shutdown`] or drop,
/// whichever comes first.
pub struct EncoderHandle {
    tier: QualityTier,
    encoder: Box<dyn VideoEncoder>,
    released: bool,
}

impl EncoderHandle {
    /// Wrap a freshly created encoder
    #[must_use]
    pub fn new(tier: QualityTier, encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            tier,
            encoder,
            released: false,
        }
    }

    /// Access the encoder while it is not yet released
    pub fn encoder(&mut self) -> Result<&mut dyn VideoEncoder> {
        if self.released {
            return Err(EncodeError::invalid_state(format!(
                "{} encoder already released",
                self.tier
            )));
        }
        Ok(&mut *self.encoder)
    }

    /// Whether the encoder has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop then release; idempotent
    ///
    /// A failing stop is logged and release still runs.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.encoder.stop() {
            warn!("Stopping {} encoder failed: {}", self.tier, e);
        }
        self.encoder.release();
        debug!("Released {} encoder", self.tier);
    }
}

impl fmt::Debug for EncoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderHandle")
            .field("tier", &self.tier)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for EncoderHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
