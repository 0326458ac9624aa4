//! Pipeline Coordinator
//!
//! Owns the recording flag and both encode paths, and fans every captured
//! frame out to them.
//!
//! # Frame hand-off
//!
//! ```text
//!  capture thread                       encode workers
//!  ──────────────                       ──────────────
//!  FrameDispatcher::on_frame
//!    not recording ──► FrameSource::release
//!    recording     ──► FrameLease (2 permits)
//!                        ├──► high_quality FrameQueue ──► EncodePath
//!                        └──► low_quality  FrameQueue ──► EncodePath
//!                                 last permit dropped ──► FrameSource::release
//! ```
//!
//! The capture thread never waits on an encoder. A full queue evicts its
//! oldest frame, which releases that frame's permit. A worker that dies
//! closes its queue, so its permits are dropped on arrival.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lamco_encode::{
    event_channel, ContainerFactory, EncodePath, EncodePathWorker, EncoderFactory, EventReceiver,
    EventSender, FrameQueue, PathConfig, PathHandle, PathReport, PathState, PathStats, PushOutcome,
    QualityTier, RecorderEvent, WaitError,
};
use lamco_frame::{Frame, FrameLease};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::{RecorderConfig, RecordingSettings};
use crate::error::{RecorderError, Result};
use crate::source::{CaptureFormat, FrameSink, FrameSource};

/// Slack on top of the drain timeout when waiting for workers
const STOP_MARGIN: Duration = Duration::from_secs(2);

/// Outcome of one recording session
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingReport {
    /// High-quality path
    pub high: PathReport,
    /// Low-quality path
    pub low: PathReport,
}

impl RecordingReport {
    /// Report of one tier
    #[must_use]
    pub fn path(&self, tier: QualityTier) -> &PathReport {
        match tier {
            QualityTier::High => &self.high,
            QualityTier::Low => &self.low,
        }
    }

    /// Whether either path stopped on a fatal error
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.high.fault.is_some() || self.low.fault.is_some()
    }
}

struct DispatchShared {
    recording: Arc<AtomicBool>,
    source: Arc<dyn FrameSource>,
    queues: RwLock<Vec<Arc<FrameQueue>>>,
    retired: Mutex<Vec<PathHandle>>,
}

impl DispatchShared {
    /// Drop workers that already exited, without blocking
    fn reap(&self) {
        if let Some(mut retired) = self.retired.try_lock() {
            retired.retain(|handle| !handle.is_finished());
        }
    }
}

/// Frame callback handed to the capture side
///
/// Cheap to clone; every clone feeds the same coordinator.
#[derive(Clone)]
pub struct FrameDispatcher {
    shared: Arc<DispatchShared>,
}

impl FrameDispatcher {
    /// Whether frames are currently routed to the encode paths
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::Acquire)
    }
}

impl FrameSink for FrameDispatcher {
    fn on_frame(&self, frame: Frame) {
        let queues = self.shared.queues.read();
        if !self.is_recording() || queues.is_empty() {
            drop(queues);
            self.shared.source.release(frame);
            self.shared.reap();
            return;
        }

        let source = self.shared.source.clone();
        let permits = FrameLease::share(frame, queues.len(), move |frame| source.release(frame));
        for (queue, permit) in queues.iter().zip(permits) {
            if queue.push(permit) == PushOutcome::Evicted {
                trace!("Frame queue full, evicted oldest frame");
            }
        }
    }
}

impl std::fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}

/// Starts and stops dual-quality recording sessions
pub struct PipelineCoordinator {
    config: RecorderConfig,
    encoders: Arc<dyn EncoderFactory>,
    containers: Arc<dyn ContainerFactory>,
    shared: Arc<DispatchShared>,
    handles: Vec<PathHandle>,
    events_tx: EventSender,
    events_rx: Option<EventReceiver>,
    last_report: Option<RecordingReport>,
}

impl PipelineCoordinator {
    /// Create an idle coordinator
    pub fn new(
        config: RecorderConfig,
        source: Arc<dyn FrameSource>,
        encoders: Arc<dyn EncoderFactory>,
        containers: Arc<dyn ContainerFactory>,
    ) -> Self {
        let (events_tx, events_rx) = event_channel();

        Self {
            config,
            encoders,
            containers,
            shared: Arc::new(DispatchShared {
                recording: Arc::new(AtomicBool::new(false)),
                source,
                queues: RwLock::new(Vec::new()),
                retired: Mutex::new(Vec::new()),
            }),
            handles: Vec::new(),
            events_tx,
            events_rx: Some(events_rx),
            last_report: None,
        }
    }

    /// Recorder configuration
    #[must_use]
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Frame callback to register with the capture side
    #[must_use]
    pub fn dispatcher(&self) -> FrameDispatcher {
        FrameDispatcher {
            shared: self.shared.clone(),
        }
    }

    /// Take the event stream; returns `None` after the first call
    pub fn take_event_receiver(&mut self) -> Option<EventReceiver> {
        self.events_rx.take()
    }

    /// Whether a session is active
    #[must_use]
    pub fn is_recording(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Configure both paths, open the source and start routing frames
    ///
    /// On any failure everything acquired so far is released again.
    pub fn start_recording(&mut self, settings: RecordingSettings) -> Result<()> {
        if self.is_recording() {
            return Err(RecorderError::AlreadyRecording);
        }
        settings.validate().map_err(RecorderError::InvalidSettings)?;
        self.config.validate().map_err(RecorderError::InvalidSettings)?;
        self.shared.reap();

        info!(
            "Starting recording: {} @ {} fps, HQ {} bps, LQ {} bps, {} frames per segment",
            settings.resolution().label(),
            settings.frame_rate,
            settings.hq_bitrate,
            settings.lq_bitrate,
            settings.segment_frame_count
        );

        let mut paths = Vec::with_capacity(QualityTier::ALL.len());
        for tier in QualityTier::ALL {
            let mut path = EncodePath::new(
                self.path_config(tier, &settings),
                self.containers.clone(),
                self.shared.recording.clone(),
            )
            .with_events(self.events_tx.clone());

            if let Err(e) = path.configure(&*self.encoders) {
                abort_all(&mut paths);
                return Err(RecorderError::path_start(tier, e));
            }
            paths.push(path);
        }

        if let Err(e) = self.shared.source.open(&CaptureFormat::from(&settings)) {
            abort_all(&mut paths);
            return Err(e.into());
        }

        let started = paths
            .iter_mut()
            .try_for_each(|path| path.start().map_err(|e| RecorderError::path_start(path.tier(), e)));
        if let Err(e) = started {
            abort_all(&mut paths);
            self.shared.source.close();
            return Err(e);
        }

        let mut handles = Vec::with_capacity(paths.len());
        for path in paths {
            let queue = Arc::new(FrameQueue::new(self.config.frame_queue_depth));
            match EncodePathWorker::spawn(path, queue) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Dropping the handles stops and joins the workers already running
                    drop(handles);
                    self.shared.source.close();
                    return Err(e.into());
                }
            }
        }

        *self.shared.queues.write() = handles.iter().map(|h| h.queue().clone()).collect();
        self.handles = handles;
        self.last_report = None;
        self.shared.recording.store(true, Ordering::Release);

        info!("Recording started");
        Ok(())
    }

    /// Stop routing frames, drain both paths and close the source
    ///
    /// Waits at most the drain timeout (plus a small margin) for each path.
    /// Calling it again returns the report of the last session.
    pub async fn stop_recording(&mut self) -> Result<RecordingReport> {
        if !self.is_recording() {
            return self.last_report.clone().ok_or(RecorderError::NotRecording);
        }

        self.shared.recording.store(false, Ordering::Release);
        self.shared.queues.write().clear();
        for handle in &self.handles {
            handle.request_stop();
        }
        info!("Stopping recording");

        let bound = self.config.timings.drain_timeout + STOP_MARGIN;
        let reports = join_all(self.handles.iter_mut().map(|handle| handle.wait(bound))).await;
        self.shared.source.close();

        let mut high = None;
        let mut low = None;
        let handles = std::mem::take(&mut self.handles);
        for (handle, report) in handles.iter().zip(reports) {
            let report = report.unwrap_or_else(|e| self.unfinished(handle.tier(), e));
            match report.tier {
                QualityTier::High => high = Some(report),
                QualityTier::Low => low = Some(report),
            }
        }
        // Finished workers are joined lazily by the dispatcher or on drop
        self.shared.retired.lock().extend(handles);

        let report = RecordingReport {
            high: high.unwrap_or_else(|| self.unfinished(QualityTier::High, WaitError::WorkerLost)),
            low: low.unwrap_or_else(|| self.unfinished(QualityTier::Low, WaitError::WorkerLost)),
        };

        for path in [&report.high, &report.low] {
            info!(
                "{}: {} segments, {} samples, {} frames dropped ({:.1}%)",
                path.tier,
                path.segments.len(),
                path.stats.samples_written,
                path.stats.frames_dropped(),
                path.stats.drop_rate() * 100.0
            );
        }
        if report.is_degraded() {
            warn!("Recording finished degraded");
        }

        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Placeholder report for a path whose worker gave none
    fn unfinished(&self, tier: QualityTier, error: WaitError) -> PathReport {
        let reason = error.to_string();
        warn!("{} path unfinished: {}", tier, reason);
        let _ = self.events_tx.send(RecorderEvent::PathDegraded {
            tier,
            reason: reason.clone(),
        });

        PathReport {
            tier,
            state: match error {
                WaitError::TimedOut(_) => PathState::Draining,
                WaitError::WorkerLost => PathState::Stopped,
            },
            stats: PathStats::default(),
            segments: Vec::new(),
            fault: Some(reason),
        }
    }

    fn path_config(&self, tier: QualityTier, settings: &RecordingSettings) -> PathConfig {
        PathConfig {
            tier,
            params: settings.params_for(tier, &self.config.mime),
            naming: self.config.naming(tier),
            segment_frame_count: settings.segment_frame_count,
            timings: self.config.timings,
        }
    }
}

fn abort_all(paths: &mut Vec<EncodePath>) {
    for path in paths.iter_mut() {
        path.abort();
    }
    paths.clear();
}

impl std::fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("recording", &self.is_recording())
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}

impl Drop for PipelineCoordinator {
    fn drop(&mut self) {
        let active = self.is_recording();
        self.shared.recording.store(false, Ordering::Release);
        self.shared.queues.write().clear();

        // PathHandle::drop requests the stop and joins
        self.handles.clear();
        self.shared.retired.lock().clear();

        if active {
            debug!("Coordinator dropped while recording, closing source");
            self.shared.source.close();
        }
    }
}
