//! Encode Path State Machine
//!
//! One [`EncodePath`] turns leased frames into one tier's segmented output.
//!
//! ```text
//!  Idle ──configure──► Configuring ──start──► Running ──finish──► Draining ──► Stopped
//!                                                │                               ▲
//!                                                └────────── fatal error ────────┘
//! ```
//!
//! Per tick while running the path borrows an encoder input buffer (a
//! missing buffer drops the frame for this path only), converts the frame
//! into it, submits it with a non-decreasing microsecond timestamp, and
//! drains every output unit the encoder has ready into the
//! [`SegmentedMuxer`]. Draining also happens on idle ticks with no frame.
//!
//! Errors never escape a tick: state errors are counted and skipped,
//! container errors are logged, fatal encoder errors stop this path only and
//! emit [`RecorderEvent::PathDegraded`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lamco_frame::{FormatConverter, FramePermit, PixelFormatDetector};
use tracing::{debug, error, info, trace, warn};

use crate::encoder::{
    BufferFlag, BufferFlags, EncodedUnit, EncoderFactory, EncoderHandle, EncoderParams,
    QualityTier, TrackFormat, VideoEncoder,
};
use crate::error::{classify_error, EncodeError, ErrorType, Result};
use crate::event::{EventSender, RecorderEvent};
use crate::muxer::{ClosedSegment, ContainerFactory, SampleOutcome, SegmentNaming, SegmentedMuxer};
use crate::session::EncodeSession;
use crate::stats::PathStats;

/// Lifecycle state of an encode path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathState {
    /// Created, no encoder yet
    Idle,
    /// Encoder created with fixed parameters
    Configuring,
    /// Accepting frames
    Running,
    /// End of stream submitted, draining output
    Draining,
    /// Encoder and muxer released
    Stopped,
}

/// Bounded waits used by an encode path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTimings {
    /// Wait for a free encoder input buffer (default: 10ms)
    pub input_wait: Duration,
    /// Wait for an encoder output unit (default: 10ms)
    pub output_wait: Duration,
    /// Upper bound on draining after stop (default: 3s)
    pub drain_timeout: Duration,
    /// Worker wake-up interval without frames (default: 10ms)
    pub idle_tick: Duration,
}

impl Default for PathTimings {
    fn default() -> Self {
        Self {
            input_wait: Duration::from_millis(10),
            output_wait: Duration::from_millis(10),
            drain_timeout: Duration::from_secs(3),
            idle_tick: Duration::from_millis(10),
        }
    }
}

impl PathTimings {
    /// Validate timings and return any issues
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.drain_timeout.is_zero() {
            issues.push("drain_timeout must be positive".to_string());
        }
        if self.idle_tick.is_zero() {
            issues.push("idle_tick must be positive".to_string());
        }
        if self.input_wait > self.drain_timeout || self.output_wait > self.drain_timeout {
            issues.push("encoder waits should not exceed drain_timeout".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Everything needed to build one encode path
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Tier of the path
    pub tier: QualityTier,
    /// Encoder parameters
    pub params: EncoderParams,
    /// Output file naming
    pub naming: SegmentNaming,
    /// Samples per segment file
    pub segment_frame_count: u32,
    /// Bounded waits
    pub timings: PathTimings,
}

/// Final outcome of an encode path
#[derive(Debug, Clone, PartialEq)]
pub struct PathReport {
    /// Path tier
    pub tier: QualityTier,
    /// State at the time of the report
    pub state: PathState,
    /// Counters
    pub stats: PathStats,
    /// Finalized segments in order
    pub segments: Vec<ClosedSegment>,
    /// Fatal error that stopped the path, if any
    pub fault: Option<String>,
}

/// One tier's encoder, converter and segmented muxer
pub struct EncodePath {
    tier: QualityTier,
    state: PathState,
    timings: PathTimings,
    session: EncodeSession,
    encoder: Option<EncoderHandle>,
    muxer: SegmentedMuxer,
    detector: PixelFormatDetector,
    converter: FormatConverter,
    stats: PathStats,
    fault: Option<String>,
    events: Option<EventSender>,
    eos_received: bool,
}

impl EncodePath {
    /// Create an idle path
    ///
    /// `recording` is the coordinator's recording flag, shared with the muxer.
    #[must_use]
    pub fn new(
        config: PathConfig,
        containers: Arc<dyn ContainerFactory>,
        recording: Arc<AtomicBool>,
    ) -> Self {
        let muxer = SegmentedMuxer::new(
            config.naming,
            containers,
            recording,
            config.segment_frame_count,
        );

        Self {
            tier: config.tier,
            state: PathState::Idle,
            timings: config.timings,
            session: EncodeSession::new(config.params),
            encoder: None,
            muxer,
            detector: PixelFormatDetector::default(),
            converter: FormatConverter::new(),
            stats: PathStats::default(),
            fault: None,
            events: None,
            eos_received: false,
        }
    }

    /// Use a specific format detector
    #[must_use]
    pub fn with_detector(mut self, detector: PixelFormatDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Emit [`RecorderEvent`]s on `events`
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn events(&self) -> Option<EventSender> {
        self.events.clone()
    }

    /// Path tier
    #[must_use]
    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PathState {
        self.state
    }

    /// Bounded waits
    #[must_use]
    pub fn timings(&self) -> &PathTimings {
        &self.timings
    }

    /// Live counters
    #[must_use]
    pub fn stats(&self) -> &PathStats {
        &self.stats
    }

    /// Fatal error that stopped the path
    #[must_use]
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Idle → Configuring: create the encoder bound to the session parameters
    pub fn configure(&mut self, factory: &dyn EncoderFactory) -> Result<()> {
        if self.state != PathState::Idle {
            return Err(EncodeError::invalid_state(format!(
                "{} path cannot configure while {:?}",
                self.tier, self.state
            )));
        }
        let params = self.session.params();
        params
            .validate()
            .map_err(|issues| EncodeError::invalid_parameter(issues.join(", ")))?;

        let encoder = factory.create(self.tier, params)?;
        info!(
            "Configured {} encoder: {}x{} @ {} bps, {} fps, key frame every {}s",
            self.tier,
            params.width,
            params.height,
            params.bitrate,
            params.frame_rate,
            params.key_frame_interval_secs
        );
        self.encoder = Some(EncoderHandle::new(self.tier, encoder));
        self.set_state(PathState::Configuring);
        Ok(())
    }

    /// Configuring → Running
    pub fn start(&mut self) -> Result<()> {
        if self.state != PathState::Configuring {
            return Err(EncodeError::invalid_state(format!(
                "{} path cannot start while {:?}",
                self.tier, self.state
            )));
        }
        self.encoder_mut()?.start()?;
        self.set_state(PathState::Running);
        Ok(())
    }

    /// Run one tick, with or without a new frame
    ///
    /// The permit is dropped as soon as the frame has been copied (or
    /// skipped), before any output is drained. Only the first output wait
    /// blocks; the rest of the tick takes what is already there.
    pub fn process_frame(&mut self, permit: Option<FramePermit>) {
        if self.state != PathState::Running {
            if permit.is_some() {
                self.stats.queue_evicted += 1;
            }
            return;
        }

        if let Some(permit) = permit {
            let result = self.submit(&permit);
            drop(permit);
            if let Err(e) = result {
                self.handle_error(e);
                if self.state != PathState::Running {
                    return;
                }
            }
        }
        let mut wait = self.timings.output_wait;
        while self.state == PathState::Running && self.drain_output(wait) {
            wait = Duration::ZERO;
        }
    }

    /// Running → Draining → Stopped
    ///
    /// Submits an empty end-of-stream buffer, drains until the end-of-stream
    /// unit or the drain timeout, then releases encoder and muxer. From any
    /// other state only the release part runs.
    pub fn finish(&mut self) {
        if self.state == PathState::Running {
            self.set_state(PathState::Draining);
            let deadline = Instant::now() + self.timings.drain_timeout;

            match self.submit_end_of_stream(deadline) {
                Ok(()) => {
                    while self.state == PathState::Draining
                        && !self.eos_received
                        && Instant::now() < deadline
                    {
                        self.drain_output(self.timings.output_wait);
                    }
                }
                Err(e) => warn!("{} path could not signal end of stream: {}", self.tier, e),
            }

            if self.eos_received {
                debug!("{} path drained", self.tier);
            } else if self.state == PathState::Draining {
                warn!(
                    "{} path drain timed out after {:?}",
                    self.tier, self.timings.drain_timeout
                );
            }
        }
        self.teardown();
    }

    /// Release everything without draining
    pub fn abort(&mut self) {
        self.teardown();
    }

    /// Snapshot of the path outcome
    #[must_use]
    pub fn report(&self) -> PathReport {
        PathReport {
            tier: self.tier,
            state: self.state,
            stats: self.stats.clone(),
            segments: self.muxer.closed_segments().to_vec(),
            fault: self.fault.clone(),
        }
    }

    fn encoder_mut(&mut self) -> Result<&mut dyn VideoEncoder> {
        match self.encoder.as_mut() {
            Some(handle) => handle.encoder(),
            None => Err(EncodeError::invalid_state(format!("{} path has no encoder", self.tier))),
        }
    }

    fn submit(&mut self, permit: &FramePermit) -> Result<()> {
        let tier = self.tier;
        let handle = self
            .encoder
            .as_mut()
            .ok_or_else(|| EncodeError::invalid_state(format!("{} path has no encoder", tier)))?;
        let encoder = handle.encoder()?;

        let Some(slot) = encoder.dequeue_input(self.timings.input_wait)? else {
            self.stats.input_starved += 1;
            trace!("{} input starved, frame dropped", tier);
            return Ok(());
        };

        let frame = permit.frame();
        let pts_us = self.session.next_pts(frame.timestamp);
        let filled = match encoder.input_image(slot) {
            Ok(mut image) => {
                let src = self.detector.detect(frame.width, &frame.planes);
                let dst = self.detector.detect(image.width, &image.planes);

                match self.converter.convert(frame, src, &mut image, dst) {
                    Ok(_) => Ok(image.payload_len()),
                    Err(e) => {
                        self.stats.conversion_failures += 1;
                        debug!("{} conversion failed, submitting empty buffer: {}", tier, e);
                        Ok(0)
                    }
                }
            }
            Err(e) => Err(e),
        };
        let len = match filled {
            Ok(len) => len,
            Err(e) => {
                // The slot is ours until queued; hand it back empty
                if let Err(requeue) = encoder.queue_input(slot, 0, pts_us, BufferFlags::empty()) {
                    debug!("{} could not return input slot {}: {}", tier, slot.0, requeue);
                }
                return Err(e);
            }
        };

        encoder.queue_input(slot, len, pts_us, BufferFlags::empty())?;
        self.session.record_submission();
        self.stats.frames_submitted += 1;
        Ok(())
    }

    fn submit_end_of_stream(&mut self, deadline: Instant) -> Result<()> {
        loop {
            let pts_us = self.session.current_pts();
            let wait = self.timings.input_wait;
            let encoder = self.encoder_mut()?;

            if let Some(slot) = encoder.dequeue_input(wait)? {
                encoder.queue_input(slot, 0, pts_us, BufferFlag::EndOfStream.into())?;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EncodeError::invalid_state("no input buffer for end of stream"));
            }
            // Draining output frees input buffers on real encoders
            self.drain_output(self.timings.output_wait);
        }
    }

    /// Take at most one output unit; returns whether one was handled
    fn drain_output(&mut self, timeout: Duration) -> bool {
        let Ok(encoder) = self.encoder_mut() else {
            return false;
        };
        let unit = match encoder.dequeue_output(timeout) {
            Ok(Some(unit)) => unit,
            Ok(None) => return false,
            Err(e) => {
                self.handle_error(e);
                return false;
            }
        };

        if unit.is_config() {
            let format = encoder
                .output_format()
                .unwrap_or_else(|| TrackFormat::from_params(self.session.params(), unit.data.clone()));
            if let Err(e) = self.muxer.on_header_data(format) {
                self.handle_error(e.into());
            }
        } else {
            self.write_sample(&unit);
        }

        if unit.is_end_of_stream() {
            self.eos_received = true;
        }
        true
    }

    fn write_sample(&mut self, unit: &EncodedUnit) {
        match self.muxer.on_sample(unit) {
            Ok(SampleOutcome::Written) => self.stats.samples_written += 1,
            Ok(SampleOutcome::Rotated(segment)) => {
                self.stats.samples_written += 1;
                self.sync_segment_count();
                self.request_key_frame();
                self.emit(RecorderEvent::SegmentClosed {
                    tier: self.tier,
                    segment,
                });
            }
            Ok(SampleOutcome::Skipped | SampleOutcome::NotStarted) => {}
            Err(e) => self.handle_error(e.into()),
        }
    }

    fn request_key_frame(&mut self) {
        if let Err(e) = self.encoder_mut().and_then(|encoder| encoder.request_key_frame()) {
            debug!("{} key frame request failed: {}", self.tier, e);
        }
    }

    fn handle_error(&mut self, error: EncodeError) {
        match classify_error(&error) {
            ErrorType::Transient => {
                self.stats.transient_errors += 1;
                debug!("{} path skipped tick: {}", self.tier, error);
            }
            ErrorType::Container => warn!("{} container error: {}", self.tier, error),
            ErrorType::Fatal => self.fail(error),
        }
    }

    fn fail(&mut self, error: EncodeError) {
        error!("{} encode path failed: {}", self.tier, error);
        let reason = error.to_string();
        self.fault = Some(reason.clone());
        self.emit(RecorderEvent::PathDegraded {
            tier: self.tier,
            reason,
        });
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.state == PathState::Stopped {
            return;
        }
        if let Some(mut handle) = self.encoder.take() {
            handle.shutdown();
        }

        let before = self.muxer.closed_segments().len();
        if let Err(e) = self.muxer.stop() {
            warn!("{} muxer stop failed: {}", self.tier, e);
        }
        let closed = self.muxer.closed_segments()[before..].to_vec();
        self.sync_segment_count();
        for segment in closed {
            self.emit(RecorderEvent::SegmentClosed {
                tier: self.tier,
                segment,
            });
        }

        self.set_state(PathState::Stopped);
    }

    fn sync_segment_count(&mut self) {
        self.stats.segments_closed = u64::try_from(self.muxer.closed_segments().len()).unwrap_or(u64::MAX);
    }

    fn set_state(&mut self, state: PathState) {
        if self.state == state {
            return;
        }
        debug!("{} path {:?} -> {:?}", self.tier, self.state, state);
        self.state = state;
        self.emit(RecorderEvent::PathStateChanged {
            tier: self.tier,
            state,
        });
    }

    fn emit(&self, event: RecorderEvent) {
        if let Some(events) = &self.events {
            // Receiver may be gone; events are advisory
            let _ = events.send(event);
        }
    }
}

impl std::fmt::Debug for EncodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodePath")
            .field("tier", &self.tier)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}
