//! Encode path statistics

/// Counters of one encode path
///
/// While the encoder stays healthy every frame dispatched to a path ends up
/// in exactly one of `frames_submitted`, `input_starved` or `queue_evicted`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathStats {
    /// Frames dispatched to the path's queue
    pub frames_received: u64,
    /// Frames queued to the encoder (including empty buffers after a failed conversion)
    pub frames_submitted: u64,
    /// Frames dropped because no encoder input buffer was free
    pub input_starved: u64,
    /// Frames evicted from the path queue before the worker reached them
    pub queue_evicted: u64,
    /// Frames whose conversion failed (submitted as empty buffers)
    pub conversion_failures: u64,
    /// Samples accepted by the muxer
    pub samples_written: u64,
    /// Segments finalized
    pub segments_closed: u64,
    /// Errors treated as "nothing this tick"
    pub transient_errors: u64,
}

impl PathStats {
    /// Frames dropped before reaching the encoder
    #[must_use]
    pub fn frames_dropped(&self) -> u64 {
        self.input_starved + self.queue_evicted
    }

    /// Fraction of received frames that never reached the encoder
    #[must_use]
    pub fn drop_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        self.frames_dropped() as f64 / self.frames_received as f64
    }
}
