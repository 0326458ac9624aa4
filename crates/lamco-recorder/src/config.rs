//! Recording Configuration
//!
//! Per-session [`RecordingSettings`] (what to record) and per-recorder
//! [`RecorderConfig`] (where and how to write it), both with builders.
//!
//! # Examples
//!
//! ```rust
//! use lamco_recorder::{RecorderConfig, RecordingSettings, Resolution};
//!
//! let settings = RecordingSettings::builder()
//!     .resolution(Resolution::HD_720)
//!     .frame_rate(30)
//!     .segment_frame_count(300)
//!     .build();
//! assert!(settings.validate().is_ok());
//!
//! let config = RecorderConfig::builder()
//!     .output_dir("/tmp/recordings")
//!     .base_name("front")
//!     .build();
//! assert_eq!(config.extension, "h264");
//! ```

use std::fmt;
use std::path::PathBuf;

use lamco_encode::{EncoderParams, PathTimings, QualityTier, SegmentNaming, MIME_AVC};

/// A capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Resolution {
    /// 640x480
    pub const VGA: Self = Self::new(640, 480);
    /// 1280x720
    pub const HD_720: Self = Self::new(1280, 720);
    /// 1920x1080
    pub const HD_1080: Self = Self::new(1920, 1080);
    /// 3840x2160
    pub const UHD_2160: Self = Self::new(3840, 2160);

    /// Resolutions offered to the user
    pub const SUPPORTED: [Self; 4] = [Self::VGA, Self::HD_720, Self::HD_1080, Self::UHD_2160];

    /// Create a resolution
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Class prefix; either dimension can place a resolution in a class
    ///
    /// Sizes outside every bucket get no prefix.
    #[must_use]
    pub fn class(&self) -> &'static str {
        let either = |range: std::ops::RangeInclusive<u32>| {
            range.contains(&self.width) || range.contains(&self.height)
        };
        if self.width < 720 || self.height < 720 {
            "vga"
        } else if either(720..=1080) {
            "hd"
        } else if either(1081..=2048) {
            "hd2k"
        } else if either(2160..=4096) {
            "hd4k"
        } else {
            ""
        }
    }

    /// Display label, e.g. `hd1280x720`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{}x{}", self.class(), self.width, self.height)
    }

    /// Whether this is one of [`Resolution::SUPPORTED`]
    #[must_use]
    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What one recording session captures and encodes
///
/// Immutable once passed to `start_recording`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSettings {
    /// Frame width (default: 1920)
    pub width: u32,
    /// Frame height (default: 1080)
    pub height: u32,
    /// Capture and encode frame rate (default: 30)
    pub frame_rate: u32,
    /// High-quality bitrate in bits per second (default: 10 Mbps)
    pub hq_bitrate: u32,
    /// Low-quality bitrate in bits per second (default: 500 kbps)
    pub lq_bitrate: u32,
    /// Seconds between key frames (default: 1)
    pub key_frame_interval_secs: u32,
    /// Samples per output file (default: 300)
    pub segment_frame_count: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 30,
            hq_bitrate: 10_000_000,
            lq_bitrate: 500_000,
            key_frame_interval_secs: 1,
            segment_frame_count: 300,
        }
    }
}

impl RecordingSettings {
    /// Create a new settings builder
    #[must_use]
    pub fn builder() -> RecordingSettingsBuilder {
        RecordingSettingsBuilder::default()
    }

    /// Capture resolution
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Bitrate of a tier
    #[must_use]
    pub fn bitrate(&self, tier: QualityTier) -> u32 {
        match tier {
            QualityTier::High => self.hq_bitrate,
            QualityTier::Low => self.lq_bitrate,
        }
    }

    /// Encoder parameters for a tier
    #[must_use]
    pub fn params_for(&self, tier: QualityTier, mime: &str) -> EncoderParams {
        EncoderParams {
            width: self.width,
            height: self.height,
            bitrate: self.bitrate(tier),
            frame_rate: self.frame_rate,
            key_frame_interval_secs: self.key_frame_interval_secs,
            mime: mime.to_string(),
        }
    }

    /// Validate settings and return any issues
    ///
    /// Returns `Ok(())` if settings are valid, or a list of issues.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.width == 0 || self.height == 0 {
            issues.push(format!("resolution {}x{} is empty", self.width, self.height));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            issues.push(format!("resolution {}x{} must be even", self.width, self.height));
        }
        if self.frame_rate == 0 {
            issues.push("frame_rate must be at least 1".to_string());
        }
        if self.hq_bitrate == 0 || self.lq_bitrate == 0 {
            issues.push("bitrates must be positive".to_string());
        }
        if self.lq_bitrate > self.hq_bitrate {
            issues.push("lq_bitrate should not exceed hq_bitrate".to_string());
        }
        if self.key_frame_interval_secs == 0 {
            issues.push("key_frame_interval_secs must be at least 1".to_string());
        }
        if self.segment_frame_count == 0 {
            issues.push("segment_frame_count must be at least 1".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`RecordingSettings`]
#[derive(Debug, Clone, Default)]
pub struct RecordingSettingsBuilder {
    width: Option<u32>,
    height: Option<u32>,
    frame_rate: Option<u32>,
    lq_bitrate: Option<u32>,
    segment_frame_count: Option<u32>,
}

impl RecordingSettingsBuilder {
    /// Set width and height from a resolution
    #[must_use]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.width = Some(resolution.width);
        self.height = Some(resolution.height);
        self
    }

    /// Set frame width
    #[must_use]
    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Set frame height
    #[must_use]
    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    /// Set frame rate
    #[must_use]
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    /// Set low-quality bitrate
    #[must_use]
    pub fn lq_bitrate(mut self, bps: u32) -> Self {
        self.lq_bitrate = Some(bps);
        self
    }

    /// Set samples per segment
    #[must_use]
    pub fn segment_frame_count(mut self, count: u32) -> Self {
        self.segment_frame_count = Some(count);
        self
    }

    /// Build the settings
    #[must_use]
    pub fn build(self) -> RecordingSettings {
        let defaults = RecordingSettings::default();

        RecordingSettings {
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            frame_rate: self.frame_rate.unwrap_or(defaults.frame_rate),
            lq_bitrate: self.lq_bitrate.unwrap_or(defaults.lq_bitrate),
            segment_frame_count: self
                .segment_frame_count
                .unwrap_or(defaults.segment_frame_count),
            ..defaults
        }
    }
}

/// Where and how a recorder writes its output
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory for segment files (default: current directory)
    pub output_dir: PathBuf,

    /// File name prefix (default: "recording")
    pub base_name: String,

    /// Segment file extension (default: "h264")
    pub extension: String,

    /// Frames each path may hold before evicting the oldest (default: 4)
    ///
    /// Every queued frame keeps a camera buffer checked out.
    pub frame_queue_depth: usize,

    /// Encoder waits and drain bound
    pub timings: PathTimings,

    /// Encoder MIME type (default: "video/avc")
    pub mime: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            base_name: "recording".to_string(),
            extension: "h264".to_string(),
            frame_queue_depth: 4,
            timings: PathTimings::default(),
            mime: MIME_AVC.to_string(),
        }
    }
}

impl RecorderConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> RecorderConfigBuilder {
        RecorderConfigBuilder::default()
    }

    /// File naming of a tier
    #[must_use]
    pub fn naming(&self, tier: QualityTier) -> SegmentNaming {
        SegmentNaming {
            dir: self.output_dir.clone(),
            base_name: self.base_name.clone(),
            tier_label: tier.label().to_string(),
            extension: self.extension.clone(),
        }
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.base_name.is_empty() {
            issues.push("base_name cannot be empty".to_string());
        }
        if self.base_name.contains(std::path::MAIN_SEPARATOR) {
            issues.push("base_name cannot contain a path separator".to_string());
        }
        if self.extension.is_empty() {
            issues.push("extension cannot be empty".to_string());
        }
        if self.frame_queue_depth == 0 {
            issues.push("frame_queue_depth must be at least 1".to_string());
        }
        if self.mime.is_empty() {
            issues.push("mime cannot be empty".to_string());
        }
        if let Err(timing_issues) = self.timings.validate() {
            issues.extend(timing_issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`RecorderConfig`]
#[derive(Debug, Clone, Default)]
pub struct RecorderConfigBuilder {
    output_dir: Option<PathBuf>,
    base_name: Option<String>,
    extension: Option<String>,
    frame_queue_depth: Option<usize>,
    timings: Option<PathTimings>,
}

impl RecorderConfigBuilder {
    /// Set output directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set file name prefix
    #[must_use]
    pub fn base_name(mut self, name: impl Into<String>) -> Self {
        self.base_name = Some(name.into());
        self
    }

    /// Set file extension
    #[must_use]
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Set per-path queue depth
    #[must_use]
    pub fn frame_queue_depth(mut self, depth: usize) -> Self {
        self.frame_queue_depth = Some(depth);
        self
    }

    /// Set encoder timings
    #[must_use]
    pub fn timings(mut self, timings: PathTimings) -> Self {
        self.timings = Some(timings);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> RecorderConfig {
        let defaults = RecorderConfig::default();

        RecorderConfig {
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            base_name: self.base_name.unwrap_or(defaults.base_name),
            extension: self.extension.unwrap_or(defaults.extension),
            frame_queue_depth: self.frame_queue_depth.unwrap_or(defaults.frame_queue_depth),
            timings: self.timings.unwrap_or(defaults.timings),
            mime: defaults.mime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_labels() {
        assert_eq!(Resolution::VGA.label(), "vga640x480");
        assert_eq!(Resolution::HD_720.label(), "hd1280x720");
        assert_eq!(Resolution::HD_1080.label(), "hd1920x1080");
        assert_eq!(Resolution::new(2560, 1440).label(), "hd2k2560x1440");
        assert_eq!(Resolution::UHD_2160.label(), "hd4k3840x2160");
        assert_eq!(Resolution::new(8192, 4320).label(), "8192x4320");
    }

    #[test]
    fn test_resolution_class_edges() {
        assert_eq!(Resolution::new(2048, 2048).class(), "hd2k");
        assert_eq!(Resolution::new(4096, 4096).class(), "hd4k");
        assert_eq!(Resolution::new(2100, 2100).class(), "");
        // Portrait sizes classify by whichever side fits
        assert_eq!(Resolution::new(720, 1280).class(), "hd");
        assert_eq!(Resolution::new(1080, 1920).class(), "hd");
        assert_eq!(Resolution::new(480, 640).class(), "vga");
        assert_eq!(Resolution::new(2160, 3840).class(), "hd4k");
    }

    #[test]
    fn test_supported() {
        assert!(Resolution::HD_1080.is_supported());
        assert!(!Resolution::new(1000, 1000).is_supported());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = RecordingSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.resolution(), Resolution::HD_1080);
    }

    #[test]
    fn test_settings_builder() {
        let settings = RecordingSettings::builder()
            .resolution(Resolution::VGA)
            .lq_bitrate(250_000)
            .segment_frame_count(60)
            .build();

        assert_eq!(settings.width, 640);
        assert_eq!(settings.lq_bitrate, 250_000);
        assert_eq!(settings.hq_bitrate, 10_000_000);
        assert_eq!(settings.segment_frame_count, 60);
    }

    #[test]
    fn test_settings_validation() {
        let settings = RecordingSettings {
            width: 641,
            frame_rate: 0,
            lq_bitrate: 20_000_000,
            segment_frame_count: 0,
            ..Default::default()
        };
        let issues = settings.validate().unwrap_err();
        assert_eq!(issues.len(), 4);
    }

    #[test]
    fn test_params_per_tier() {
        let settings = RecordingSettings::default();
        let hq = settings.params_for(QualityTier::High, MIME_AVC);
        let lq = settings.params_for(QualityTier::Low, MIME_AVC);
        assert_eq!(hq.bitrate, 10_000_000);
        assert_eq!(lq.bitrate, 500_000);
        assert_eq!((hq.width, hq.height), (lq.width, lq.height));
        assert!(hq.validate().is_ok());
    }

    #[test]
    fn test_config_naming() {
        let config = RecorderConfig::builder()
            .output_dir("/data")
            .base_name("cam")
            .extension("mp4")
            .build();

        let path = config.naming(QualityTier::Low).path_for(2);
        assert_eq!(path, PathBuf::from("/data/cam_low_quality_2.mp4"));
    }

    #[test]
    fn test_config_validation() {
        let config = RecorderConfig {
            base_name: String::new(),
            frame_queue_depth: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().len(), 2);
        assert!(RecorderConfig::default().validate().is_ok());
    }
}
