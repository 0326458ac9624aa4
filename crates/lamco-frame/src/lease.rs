//! Shared Frame Leases
//!
//! A captured [`Frame`] belongs to its source until it is released, yet both
//! encode paths must read it. [`FrameLease`] hands out one [`FramePermit`] per
//! consumer; the frame goes back to the source through the release callback
//! when the last permit is dropped, whether the consumer finished copying,
//! discarded the frame, or failed.
//!
//! # Examples
//!
//! ```rust
//! use lamco_frame::{Frame, FrameLease};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let released = Arc::new(AtomicUsize::new(0));
//! let counter = released.clone();
//!
//! let (high, low) = FrameLease::split(Frame::default(), move |_frame| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! drop(high);
//! assert_eq!(released.load(Ordering::SeqCst), 0);
//! drop(low);
//! assert_eq!(released.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::frame::Frame;

type ReleaseFn = Box<dyn FnOnce(Frame) + Send>;

struct LeaseInner {
    frame: Frame,
    release: Mutex<Option<ReleaseFn>>,
}

impl Drop for LeaseInner {
    fn drop(&mut self) {
        if let Some(release) = self.release.get_mut().take() {
            trace!("Releasing frame slot {}", self.frame.slot);
            release(std::mem::take(&mut self.frame));
        }
    }
}

/// Factory for frame permits
#[derive(Debug)]
pub struct FrameLease;

impl FrameLease {
    /// Share `frame` between `consumers` readers
    ///
    /// `release` runs exactly once, after every returned permit is dropped.
    /// With zero consumers the frame is released immediately.
    pub fn share<F>(frame: Frame, consumers: usize, release: F) -> Vec<FramePermit>
    where
        F: FnOnce(Frame) + Send + 'static,
    {
        let inner = Arc::new(LeaseInner {
            frame,
            release: Mutex::new(Some(Box::new(release))),
        });

        (0..consumers)
            .map(|_| FramePermit {
                inner: Arc::clone(&inner),
            })
            .collect()
    }

    /// Share `frame` between exactly two readers
    pub fn split<F>(frame: Frame, release: F) -> (FramePermit, FramePermit)
    where
        F: FnOnce(Frame) + Send + 'static,
    {
        let inner = Arc::new(LeaseInner {
            frame,
            release: Mutex::new(Some(Box::new(release))),
        });
        let first = FramePermit {
            inner: Arc::clone(&inner),
        };
        (first, FramePermit { inner })
    }
}

/// Read access to a leased frame
///
/// Permits cannot be cloned; dropping the last one releases the frame.
pub struct FramePermit {
    inner: Arc<LeaseInner>,
}

impl FramePermit {
    /// The leased frame
    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.inner.frame
    }

    /// Permits (including this one) still holding the frame
    #[must_use]
    pub fn outstanding(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for FramePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePermit")
            .field("slot", &self.inner.frame.slot)
            .field("timestamp", &self.inner.frame.timestamp)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
