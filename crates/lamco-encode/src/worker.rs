//! Dedicated encode worker threads
//!
//! Each [`EncodePath`] runs on its own named thread, fed through a
//! [`FrameQueue`]. The worker owns the path for its whole life; the
//! coordinator only keeps a [`PathHandle`] to dispatch frames, request the
//! stop and collect the final [`PathReport`].
//!
//! A worker that panics still reports: its queue is closed so frames stop
//! piling up behind it, and the report carries the panic as the fault.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lamco_frame::FramePermit;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::encoder::QualityTier;
use crate::event::{EventSender, RecorderEvent};
use crate::path::{EncodePath, PathReport, PathState};
use crate::queue::{FrameQueue, PathMessage, PushOutcome};
use crate::stats::PathStats;

/// Why [`PathHandle::wait`] returned without a report
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The worker is still running
    #[error("did not stop within {0:?}")]
    TimedOut(Duration),

    /// The worker exited without sending a report
    #[error("encode worker exited without a report")]
    WorkerLost,
}

/// Spawns encode workers
pub struct EncodePathWorker;

impl EncodePathWorker {
    /// Run a started path on a new thread
    ///
    /// The path should be [`PathState::Running`]; any other state goes
    /// straight to teardown.
    pub fn spawn(path: EncodePath, queue: Arc<FrameQueue>) -> io::Result<PathHandle> {
        let tier = path.tier();
        let (done_tx, done_rx) = oneshot::channel();

        let worker_queue = queue.clone();
        let join = thread::Builder::new()
            .name(format!("lamco-encode-{}", tier.label()))
            .spawn(move || {
                let events = path.events();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| Self::run(path, &worker_queue)));
                let report = match outcome {
                    Ok(report) => report,
                    Err(payload) => Self::crashed(tier, &worker_queue, events.as_ref(), &*payload),
                };
                // Nobody waiting is fine; the join handle carries the report too
                let _ = done_tx.send(report.clone());
                report
            })?;

        Ok(PathHandle {
            tier,
            queue,
            join: Some(join),
            done: Some(done_rx),
            report: None,
        })
    }

    fn run(mut path: EncodePath, queue: &FrameQueue) -> PathReport {
        let tier = path.tier();
        let idle_tick = path.timings().idle_tick;
        info!("{} encode worker started", tier);

        while path.state() == PathState::Running {
            match queue.pop(idle_tick) {
                Some(PathMessage::Frame(permit)) => path.process_frame(Some(permit)),
                Some(PathMessage::Stop) => break,
                None => path.process_frame(None),
            }
        }

        path.finish();
        let dropped = u64::try_from(queue.close()).unwrap_or(u64::MAX);

        let mut report = path.report();
        report.stats.frames_received = queue.received();
        report.stats.queue_evicted += queue.evicted() + dropped;

        info!(
            "{} encode worker finished: {} received, {} submitted, {} dropped, {} segments",
            tier,
            report.stats.frames_received,
            report.stats.frames_submitted,
            report.stats.frames_dropped(),
            report.segments.len()
        );
        report
    }

    /// Report for a worker whose path panicked
    ///
    /// The path itself was dropped while unwinding, which released its
    /// encoder and muxer. Its counters are lost with it.
    fn crashed(
        tier: QualityTier,
        queue: &FrameQueue,
        events: Option<&EventSender>,
        payload: &(dyn Any + Send),
    ) -> PathReport {
        let dropped = u64::try_from(queue.close()).unwrap_or(u64::MAX);
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        let reason = format!("encode worker panicked: {}", message);
        error!("{} {}", tier, reason);

        if let Some(events) = events {
            let _ = events.send(RecorderEvent::PathDegraded {
                tier,
                reason: reason.clone(),
            });
        }

        PathReport {
            tier,
            state: PathState::Stopped,
            stats: PathStats {
                frames_received: queue.received(),
                queue_evicted: queue.evicted() + dropped,
                ..Default::default()
            },
            segments: Vec::new(),
            fault: Some(reason),
        }
    }
}

/// Control-side handle of a running encode worker
pub struct PathHandle {
    tier: QualityTier,
    queue: Arc<FrameQueue>,
    join: Option<JoinHandle<PathReport>>,
    done: Option<oneshot::Receiver<PathReport>>,
    report: Option<PathReport>,
}

impl PathHandle {
    /// Worker tier
    #[must_use]
    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    /// The worker's inbox
    #[must_use]
    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// Hand a frame to the worker without blocking
    pub fn dispatch(&self, permit: FramePermit) -> PushOutcome {
        self.queue.push(permit)
    }

    /// Ask the worker to drain and stop after the frames already queued
    pub fn request_stop(&self) {
        self.queue.request_stop();
    }

    /// Whether the worker thread has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the final report, at most `timeout`
    ///
    /// Once received, the report is cached.
    pub async fn wait(&mut self, timeout: Duration) -> Result<PathReport, WaitError> {
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }
        let Some(done) = self.done.as_mut() else {
            return Err(WaitError::WorkerLost);
        };
        let result = tokio::time::timeout(timeout, done).await;

        match result {
            Ok(Ok(report)) => {
                self.done = None;
                self.report = Some(report.clone());
                Ok(report)
            }
            Ok(Err(_)) => {
                self.done = None;
                error!("{} encode worker exited without a report", self.tier);
                Err(WaitError::WorkerLost)
            }
            Err(_) => {
                warn!("{} encode worker did not stop within {:?}", self.tier, timeout);
                Err(WaitError::TimedOut(timeout))
            }
        }
    }

    /// Join the worker, blocking until it exits
    pub fn join_blocking(&mut self) -> Option<PathReport> {
        if let Some(join) = self.join.take() {
            match join.join() {
                Ok(report) => {
                    if self.report.is_none() {
                        self.report = Some(report);
                    }
                }
                Err(_) => error!("{} encode worker panicked", self.tier),
            }
        }
        self.done = None;
        self.report.clone()
    }
}

impl std::fmt::Debug for PathHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathHandle")
            .field("tier", &self.tier)
            .field("queued", &self.queue.len())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl Drop for PathHandle {
    fn drop(&mut self) {
        self.request_stop();
        self.join_blocking();
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use lamco_frame::{Frame, FrameLease, PlaneLayout};

    use super::*;
    use crate::encoder::EncoderParams;
    use crate::event::event_channel;
    use crate::muxer::{ContainerFactory, ContainerWriter, MuxResult, SegmentNaming};
    use crate::path::{PathConfig, PathTimings};
    use crate::testing::{MemoryContainerFactory, SimulatedEncoderFactory};

    struct CrashingContainers;

    impl ContainerFactory for CrashingContainers {
        fn open(&self, _path: &Path) -> MuxResult<Box<dyn ContainerWriter>> {
            panic!("container backend crashed");
        }
    }

    fn started_path(encoders: &SimulatedEncoderFactory, containers: Arc<dyn ContainerFactory>) -> EncodePath {
        let config = PathConfig {
            tier: QualityTier::Low,
            params: EncoderParams {
                width: 4,
                height: 4,
                ..Default::default()
            },
            naming: SegmentNaming {
                dir: PathBuf::from("/w"),
                base_name: "rec".to_string(),
                tier_label: QualityTier::Low.label().to_string(),
                extension: "mp4".to_string(),
            },
            segment_frame_count: 4,
            timings: PathTimings::default(),
        };
        let mut path = EncodePath::new(config, containers, Arc::new(AtomicBool::new(true)));
        path.configure(encoders).unwrap();
        path.start().unwrap();
        path
    }

    fn permit(i: u32, released: &Arc<AtomicUsize>) -> FramePermit {
        let released = released.clone();
        let frame = Frame::new(
            4,
            4,
            vec![i as u8; 24],
            PlaneLayout::i420(4, 4, 4),
            Duration::from_millis(u64::from(i) * 33),
            i,
        );
        FrameLease::share(frame, 1, move |_| {
            released.fetch_add(1, Ordering::SeqCst);
        })
        .remove(0)
    }

    #[tokio::test]
    async fn test_worker_encodes_queued_frames_before_stop() {
        let encoders = SimulatedEncoderFactory::new();
        let containers = MemoryContainerFactory::new();
        let released = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(FrameQueue::new(64));

        // Queue everything before the worker runs so the stop lands behind it
        for i in 0..10 {
            queue.push(permit(i, &released));
        }
        queue.request_stop();

        let mut handle = EncodePathWorker::spawn(started_path(&encoders, Arc::new(containers.clone())), queue).unwrap();
        let report = handle.wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(report.state, PathState::Stopped);
        assert_eq!(report.stats.frames_received, 10);
        assert_eq!(report.stats.frames_submitted, 10);
        assert_eq!(report.stats.samples_written, 10);
        assert_eq!(report.segments.len(), 3);
        assert_eq!(released.load(Ordering::SeqCst), 10);
        assert!(handle.is_finished() || handle.join_blocking().is_some());
    }

    #[tokio::test]
    async fn test_wait_caches_report() {
        let encoders = SimulatedEncoderFactory::new();
        let containers = MemoryContainerFactory::new();
        let path = started_path(&encoders, Arc::new(containers.clone()));
        let mut handle = EncodePathWorker::spawn(path, Arc::new(FrameQueue::new(4))).unwrap();

        handle.request_stop();
        let first = handle.wait(Duration::from_secs(5)).await.unwrap();
        let second = handle.wait(Duration::from_millis(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(handle.join_blocking(), Some(first));
    }

    #[tokio::test]
    async fn test_wait_times_out_while_running() {
        let encoders = SimulatedEncoderFactory::new();
        let containers = MemoryContainerFactory::new();
        let path = started_path(&encoders, Arc::new(containers.clone()));
        let mut handle = EncodePathWorker::spawn(path, Arc::new(FrameQueue::new(4))).unwrap();

        let waited = Duration::from_millis(20);
        assert_eq!(handle.wait(waited).await.unwrap_err(), WaitError::TimedOut(waited));

        handle.request_stop();
        let report = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert!(report.fault.is_none());
    }

    #[tokio::test]
    async fn test_worker_panic_closes_queue_and_reports_fault() {
        let encoders = SimulatedEncoderFactory::new();
        let released = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(FrameQueue::new(8));
        let (tx, mut rx) = event_channel();
        let path = started_path(&encoders, Arc::new(CrashingContainers)).with_events(tx);

        for i in 0..3 {
            queue.push(permit(i, &released));
        }
        let mut handle = EncodePathWorker::spawn(path, queue.clone()).unwrap();
        let report = handle.wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(report.state, PathState::Stopped);
        assert!(report.fault.as_deref().unwrap_or_default().contains("container backend crashed"));
        assert_eq!(report.stats.frames_received, 3);
        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert_eq!(encoders.control(QualityTier::Low).released(), 1);

        // Frames dispatched afterwards go straight back
        assert_eq!(queue.push(permit(3, &released)), PushOutcome::Rejected);
        assert_eq!(released.load(Ordering::SeqCst), 4);

        let mut degraded = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RecorderEvent::PathDegraded { tier: QualityTier::Low, .. }) {
                degraded += 1;
            }
        }
        assert_eq!(degraded, 1);
    }

    #[test]
    fn test_drop_stops_worker() {
        let encoders = SimulatedEncoderFactory::new();
        let containers = MemoryContainerFactory::new();
        let released = Arc::new(AtomicUsize::new(0));
        let path = started_path(&encoders, Arc::new(containers.clone()));
        let handle = EncodePathWorker::spawn(path, Arc::new(FrameQueue::new(4))).unwrap();

        handle.dispatch(permit(0, &released));
        drop(handle);

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(encoders.control(QualityTier::Low).released(), 1);
    }
}
