//! Segmented Muxer
//!
//! Writes one encode path's compressed output into a sequence of container
//! files of at most `segment_frame_count` samples each, without pausing the
//! encoder at segment boundaries.
//!
//! # Lifecycle
//!
//! ```text
//!  header (recording) ──► open file, add track, start ──► samples ...
//!                                                          │
//!                  segment_frame_count reached ◄───────────┘
//!                          │
//!                          ▼
//!           stop + release file, allocate next path
//!                          │
//!           next sample ──► replay cached header ──► samples ...
//! ```
//!
//! Files are created lazily when their header is written, so a session that
//! never received a header leaves nothing on disk. Segment names follow
//! `<base>_<tier>_<index>.<ext>` with the index starting at 0.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::encoder::{EncodedUnit, TrackFormat};
use crate::error::MuxerError;

/// Result type for container operations
pub type MuxResult<T> = std::result::Result<T, MuxerError>;

/// Timing and sync information of one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
    /// Whether the sample is a sync frame
    pub key_frame: bool,
}

/// One open container file
///
/// Resources are released when the writer is dropped, whether or not
/// [`ContainerWriter::stop`] succeeded.
pub trait ContainerWriter: Send {
    /// Add a track; returns its index
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<usize>;

    /// Write the container header; samples are accepted afterwards
    fn start(&mut self) -> MuxResult<()>;

    /// Append one sample to `track`
    fn write_sample(&mut self, track: usize, data: &[u8], info: SampleInfo) -> MuxResult<()>;

    /// Finalize the file
    fn stop(&mut self) -> MuxResult<()>;
}

/// Opens container writers
pub trait ContainerFactory: Send + Sync {
    /// Create a writer for `path`
    fn open(&self, path: &Path) -> MuxResult<Box<dyn ContainerWriter>>;
}

/// Output file naming for one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNaming {
    /// Output directory
    pub dir: PathBuf,
    /// Base file name shared by both tiers
    pub base_name: String,
    /// Tier label (`high_quality`, `low_quality`)
    pub tier_label: String,
    /// File extension without the dot
    pub extension: String,
}

impl SegmentNaming {
    /// Path of segment `index`
    #[must_use]
    pub fn path_for(&self, index: u32) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.{}",
            self.base_name, self.tier_label, index, self.extension
        ))
    }
}

/// Lifecycle state of an output segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Path allocated, header not written yet
    Pending,
    /// Header written, accepting samples
    Open,
    /// Finalized
    Closed,
}

/// The segment currently being filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSegment {
    /// Segment index within the session
    pub index: u32,
    /// Output file path
    pub path: PathBuf,
    /// Lifecycle state
    pub state: SegmentState,
    /// Video track index; set once the header is written
    pub track: Option<usize>,
    /// Samples written so far
    pub frame_count: u32,
}

impl OutputSegment {
    fn pending(index: u32, path: PathBuf) -> Self {
        Self {
            index,
            path,
            state: SegmentState::Pending,
            track: None,
            frame_count: 0,
        }
    }
}

/// A finalized segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSegment {
    /// Segment index
    pub index: u32,
    /// Output file path
    pub path: PathBuf,
    /// Samples in the file
    pub frames: u32,
}

/// What happened to a sample handed to [`SegmentedMuxer::on_sample`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Written to the current segment
    Written,
    /// Written and the segment reached its length and was closed
    Rotated(ClosedSegment),
    /// Empty payload, nothing written
    Skipped,
    /// No header yet (or muxer stopped); sample dropped
    NotStarted,
}

/// Segmenting writer for one encode path
pub struct SegmentedMuxer {
    naming: SegmentNaming,
    factory: Arc<dyn ContainerFactory>,
    recording: Arc<AtomicBool>,
    segment_frame_count: u32,
    header: Option<TrackFormat>,
    segment: OutputSegment,
    writer: Option<Box<dyn ContainerWriter>>,
    started: bool,
    stopped: bool,
    closed: Vec<ClosedSegment>,
}

impl SegmentedMuxer {
    /// Create a muxer; no file is touched until the first header
    ///
    /// `recording` is the coordinator's recording flag: header events are
    /// ignored while it is clear.
    #[must_use]
    pub fn new(
        naming: SegmentNaming,
        factory: Arc<dyn ContainerFactory>,
        recording: Arc<AtomicBool>,
        segment_frame_count: u32,
    ) -> Self {
        let segment = OutputSegment::pending(0, naming.path_for(0));
        Self {
            naming,
            factory,
            recording,
            segment_frame_count: segment_frame_count.max(1),
            header: None,
            segment,
            writer: None,
            started: false,
            stopped: false,
            closed: Vec::new(),
        }
    }

    /// The segment currently being filled
    #[must_use]
    pub fn current_segment(&self) -> &OutputSegment {
        &self.segment
    }

    /// Segments finalized so far
    #[must_use]
    pub fn closed_segments(&self) -> &[ClosedSegment] {
        &self.closed
    }

    /// Whether the current segment's header has been written
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Handle the encoder's configuration unit
    ///
    /// Caches the format for later segments and, while recording, writes the
    /// current segment's header if it is not written yet.
    pub fn on_header_data(&mut self, format: TrackFormat) -> MuxResult<()> {
        self.header = Some(format);

        if self.stopped || self.started {
            return Ok(());
        }
        if !self.recording.load(Ordering::Acquire) {
            debug!("Header for {} cached, not recording", self.naming.tier_label);
            return Ok(());
        }
        self.open_segment()
    }

    /// Handle one compressed picture unit
    ///
    /// When the current segment has no header yet, the cached header is
    /// replayed first; without a cached header the sample is dropped.
    pub fn on_sample(&mut self, unit: &EncodedUnit) -> MuxResult<SampleOutcome> {
        if self.stopped {
            return Ok(SampleOutcome::NotStarted);
        }
        if unit.data.is_empty() {
            return Ok(SampleOutcome::Skipped);
        }
        if !self.started {
            if self.header.is_none() {
                debug!(
                    "Dropping {} sample at {}us: no header yet",
                    self.naming.tier_label, unit.pts_us
                );
                return Ok(SampleOutcome::NotStarted);
            }
            self.open_segment()?;
        }

        let (Some(writer), Some(track)) = (self.writer.as_mut(), self.segment.track) else {
            return Ok(SampleOutcome::NotStarted);
        };
        writer.write_sample(
            track,
            &unit.data,
            SampleInfo {
                pts_us: unit.pts_us,
                key_frame: unit.is_key_frame(),
            },
        )?;
        self.segment.frame_count += 1;

        if self.segment.frame_count >= self.segment_frame_count {
            let closed = self.rotate();
            return Ok(SampleOutcome::Rotated(closed));
        }
        Ok(SampleOutcome::Written)
    }

    /// Close the current segment (if started) and release everything
    ///
    /// Idempotent. The writer is dropped even when finalizing fails; the
    /// failure is returned after cleanup.
    pub fn stop(&mut self) -> MuxResult<Option<ClosedSegment>> {
        if self.stopped {
            return Ok(None);
        }
        self.stopped = true;

        if !self.started {
            self.writer = None;
            debug!("{} muxer stopped before any header", self.naming.tier_label);
            return Ok(None);
        }

        let (closed, result) = self.close_current();
        info!(
            "{} muxer stopped after {} segment(s)",
            self.naming.tier_label,
            self.closed.len()
        );
        result.map(|()| Some(closed))
    }

    fn open_segment(&mut self) -> MuxResult<()> {
        let Some(format) = self.header.as_ref() else {
            return Err(MuxerError::invalid_state("no header cached"));
        };

        let mut writer = self.factory.open(&self.segment.path)?;
        let track = writer.add_track(format)?;
        writer.start()?;

        self.writer = Some(writer);
        self.segment.track = Some(track);
        self.segment.state = SegmentState::Open;
        self.started = true;
        debug!("Opened segment {}", self.segment.path.display());
        Ok(())
    }

    /// Finalize the current segment; the writer is released either way
    fn close_current(&mut self) -> (ClosedSegment, MuxResult<()>) {
        let result = match self.writer.take() {
            Some(mut writer) => writer.stop(),
            None => Ok(()),
        };

        self.started = false;
        self.segment.state = SegmentState::Closed;
        let closed = ClosedSegment {
            index: self.segment.index,
            path: self.segment.path.clone(),
            frames: self.segment.frame_count,
        };
        self.closed.push(closed.clone());

        match &result {
            Ok(()) => debug!(
                "Closed segment {} with {} frames",
                closed.path.display(),
                closed.frames
            ),
            Err(e) => warn!("Finalizing {} failed: {}", closed.path.display(), e),
        }
        (closed, result)
    }

    /// Close the full segment and allocate the next one
    fn rotate(&mut self) -> ClosedSegment {
        let (closed, _) = self.close_current();

        let index = self.segment.index + 1;
        self.segment = OutputSegment::pending(index, self.naming.path_for(index));
        info!("Rotated {} to segment {}", self.naming.tier_label, index);
        closed
    }
}

impl fmt::Debug for SegmentedMuxer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedMuxer")
            .field("naming", &self.naming)
            .field("segment", &self.segment)
            .field("started", &self.started)
            .field("stopped", &self.stopped)
            .field("closed", &self.closed.len())
            .finish_non_exhaustive()
    }
}

impl Drop for SegmentedMuxer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Stopping {} muxer on drop failed: {}", self.naming.tier_label, e);
        }
    }
}
