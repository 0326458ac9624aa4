//! Per-path frame inbox
//!
//! Bounded queue between the frame callback and one encode worker. The
//! producer never blocks: when the queue is full the oldest queued frame is
//! evicted and its permit dropped, which hands the frame back to the source
//! as soon as the other path is done with it too.
//!
//! A stop request is delivered behind every frame already queued, so frames
//! dispatched before the stop are still encoded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lamco_frame::FramePermit;
use parking_lot::{Condvar, Mutex};

/// Message taken by an encode worker
#[derive(Debug)]
pub enum PathMessage {
    /// A frame to encode
    Frame(FramePermit),
    /// Stop was requested and no frames are left
    Stop,
}

/// Result of [`FrameQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued
    Queued,
    /// Frame queued, the oldest queued frame was evicted
    Evicted,
    /// Queue stopped or closed; frame dropped
    Rejected,
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<FramePermit>,
    stop_requested: bool,
    closed: bool,
}

/// Overwrite-oldest frame queue with a cooperative stop marker
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    capacity: usize,
    received: AtomicU64,
    evicted: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                ..Default::default()
            }),
            ready: Condvar::new(),
            capacity,
            received: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Maximum number of queued frames
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Whether no frames are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames accepted by [`FrameQueue::push`] so far
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Frames evicted so far
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Queue a frame without blocking
    ///
    /// Evicted or rejected permits are dropped after the lock is released.
    pub fn push(&self, permit: FramePermit) -> PushOutcome {
        let (outcome, dropped) = {
            let mut inner = self.inner.lock();
            if inner.closed || inner.stop_requested {
                (PushOutcome::Rejected, Some(permit))
            } else if inner.frames.len() >= self.capacity {
                let oldest = inner.frames.pop_front();
                inner.frames.push_back(permit);
                self.evicted.fetch_add(1, Ordering::Relaxed);
                (PushOutcome::Evicted, oldest)
            } else {
                inner.frames.push_back(permit);
                (PushOutcome::Queued, None)
            }
        };

        if outcome != PushOutcome::Rejected {
            self.received.fetch_add(1, Ordering::Relaxed);
            self.ready.notify_one();
        }
        drop(dropped);
        outcome
    }

    /// Ask the worker to stop once the queued frames are processed
    pub fn request_stop(&self) {
        self.inner.lock().stop_requested = true;
        self.ready.notify_all();
    }

    /// Take the next message, waiting at most `timeout`
    ///
    /// Returns `None` when nothing arrived in time.
    pub fn pop(&self, timeout: Duration) -> Option<PathMessage> {
        let mut inner = self.inner.lock();
        if let Some(message) = Self::take(&mut inner) {
            return Some(message);
        }
        if timeout.is_zero() {
            return None;
        }
        let _ = self.ready.wait_for(&mut inner, timeout);
        Self::take(&mut inner)
    }

    fn take(inner: &mut Inner) -> Option<PathMessage> {
        if let Some(permit) = inner.frames.pop_front() {
            return Some(PathMessage::Frame(permit));
        }
        inner.stop_requested.then_some(PathMessage::Stop)
    }

    /// Reject further pushes and drop every queued frame
    ///
    /// Returns the number of frames dropped.
    pub fn close(&self) -> usize {
        let drained: Vec<FramePermit> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.frames.drain(..).collect()
        };
        self.ready.notify_all();
        drained.len()
    }
}
