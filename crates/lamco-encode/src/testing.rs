//! Simulated encoder and in-memory container
//!
//! Deterministic stand-ins for a hardware encoder and a container writer,
//! used by tests and the demo. Enabled with the `test-util` feature.
//!
//! The simulated encoder emits a codec configuration unit on start, one
//! picture unit per non-empty input buffer and an end-of-stream unit after
//! an end-of-stream input. Each picture unit is a start code, the
//! timestamp, a prefix of the input image and a checksum of the whole image,
//! so two runs fed the same frames produce identical output.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lamco_frame::{ChromaOrder, InputImage, PlaneLayout};
use parking_lot::Mutex;

use crate::encoder::{
    BufferFlag, BufferFlags, EncodedUnit, EncoderFactory, EncoderParams, InputSlot, QualityTier,
    TrackFormat, VideoEncoder,
};
use crate::error::{EncodeError, MuxerError, Result};
use crate::muxer::{ContainerFactory, ContainerWriter, MuxResult, SampleInfo};

/// Bytes of the input image copied into each picture unit
const PAYLOAD_PREFIX: usize = 16;

/// Input buffers per simulated encoder
const INPUT_SLOTS: usize = 4;

/// Memory layout the simulated encoder asks its input in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputLayout {
    /// Three-plane I420
    #[default]
    Planar,
    /// Luma plus interleaved chroma in the given order
    SemiPlanar(ChromaOrder),
}

impl InputLayout {
    fn planes(self, width: u32, height: u32) -> [PlaneLayout; 3] {
        match self {
            Self::Planar => PlaneLayout::i420(width, height, width as usize),
            Self::SemiPlanar(ChromaOrder::Uv) => PlaneLayout::nv12(width, height, width as usize),
            Self::SemiPlanar(ChromaOrder::Vu) => PlaneLayout::nv21(width, height, width as usize),
        }
    }
}

#[derive(Debug, Default)]
struct ControlState {
    layout: Mutex<InputLayout>,
    starve: AtomicU64,
    image_failures: AtomicU64,
    fail_after: Mutex<Option<u64>>,
    fail_start: Mutex<bool>,
    created: AtomicUsize,
    released: AtomicUsize,
    key_frame_requests: AtomicUsize,
}

/// Shared knobs and counters of the simulated encoders of one tier
#[derive(Debug, Clone, Default)]
pub struct EncoderControl {
    state: Arc<ControlState>,
}

impl EncoderControl {
    /// Layout of input images for encoders created afterwards
    pub fn set_layout(&self, layout: InputLayout) {
        *self.state.layout.lock() = layout;
    }

    /// Make the next `count` input requests find no free buffer
    pub fn starve_input(&self, count: u64) {
        self.state.starve.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` input image lookups fail transiently
    pub fn fail_input_image(&self, count: u64) {
        self.state.image_failures.store(count, Ordering::SeqCst);
    }

    /// Fail fatally once `frames` frames have been encoded
    pub fn fail_after(&self, frames: u64) {
        *self.state.fail_after.lock() = Some(frames);
    }

    /// Fail fatally on start
    pub fn fail_start(&self, fail: bool) {
        *self.state.fail_start.lock() = fail;
    }

    /// Encoders created
    #[must_use]
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// Encoders released
    #[must_use]
    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    /// Key frame requests received
    #[must_use]
    pub fn key_frame_requests(&self) -> usize {
        self.state.key_frame_requests.load(Ordering::SeqCst)
    }

    fn take_starved(&self) -> bool {
        Self::take_one(&self.state.starve)
    }

    fn take_image_failure(&self) -> bool {
        Self::take_one(&self.state.image_failures)
    }

    fn take_one(counter: &AtomicU64) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn should_fail(&self, encoded: u64) -> bool {
        self.state.fail_after.lock().is_some_and(|limit| encoded >= limit)
    }
}

/// Creates [`SimulatedEncoder`]s with one [`EncoderControl`] per tier
#[derive(Debug, Clone)]
pub struct SimulatedEncoderFactory {
    controls: HashMap<QualityTier, EncoderControl>,
}

impl Default for SimulatedEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEncoderFactory {
    /// Factory with default controls
    #[must_use]
    pub fn new() -> Self {
        let controls = QualityTier::ALL
            .into_iter()
            .map(|tier| (tier, EncoderControl::default()))
            .collect();
        Self { controls }
    }

    /// Control for `tier`
    #[must_use]
    pub fn control(&self, tier: QualityTier) -> EncoderControl {
        self.controls.get(&tier).cloned().unwrap_or_default()
    }
}

impl EncoderFactory for SimulatedEncoderFactory {
    fn create(&self, tier: QualityTier, params: &EncoderParams) -> Result<Box<dyn VideoEncoder>> {
        params
            .validate()
            .map_err(|issues| EncodeError::invalid_parameter(issues.join(", ")))?;
        let control = self.control(tier);
        control.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedEncoder::new(tier, params.clone(), control)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimState {
    Configured,
    Executing,
    Stopped,
    Released,
}

/// Deterministic software stand-in for a hardware encoder
#[derive(Debug)]
pub struct SimulatedEncoder {
    tier: QualityTier,
    params: EncoderParams,
    control: EncoderControl,
    planes: [PlaneLayout; 3],
    slots: Vec<Vec<u8>>,
    free: VecDeque<usize>,
    output: VecDeque<EncodedUnit>,
    format: Option<TrackFormat>,
    state: SimState,
    encoded: u64,
    force_key: bool,
}

impl SimulatedEncoder {
    fn new(tier: QualityTier, params: EncoderParams, control: EncoderControl) -> Self {
        let layout = *control.state.layout.lock();
        let planes = layout.planes(params.width, params.height);
        let len = PlaneLayout::buffer_len(&planes, params.width, params.height);

        Self {
            tier,
            params,
            control,
            planes,
            slots: vec![vec![0; len]; INPUT_SLOTS],
            free: (0..INPUT_SLOTS).collect(),
            output: VecDeque::new(),
            format: None,
            state: SimState::Configured,
            encoded: 0,
            force_key: false,
        }
    }

    fn ensure_executing(&self, op: &str) -> Result<()> {
        if self.state == SimState::Executing {
            Ok(())
        } else {
            Err(EncodeError::invalid_state(format!(
                "{} encoder: {} while {:?}",
                self.tier, op, self.state
            )))
        }
    }

    fn codec_config(&self) -> Vec<u8> {
        let mut config = vec![0, 0, 0, 1, 0x67];
        config.extend_from_slice(&self.params.width.to_be_bytes());
        config.extend_from_slice(&self.params.height.to_be_bytes());
        config.extend_from_slice(&self.params.bitrate.to_be_bytes());
        config.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xce]);
        config
    }

    fn encode(&mut self, slot: usize, len: usize, pts_us: i64) -> EncodedUnit {
        let key = self.force_key || self.encoded % self.params.key_frame_period() == 0;
        self.force_key = false;

        let image = &self.slots[slot][..len];
        let checksum = image
            .iter()
            .fold(0u32, |acc, &b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));

        let mut data = vec![0, 0, 0, 1, if key { 0x65 } else { 0x41 }];
        data.extend_from_slice(&pts_us.to_be_bytes());
        data.extend_from_slice(&image[..len.min(PAYLOAD_PREFIX)]);
        data.extend_from_slice(&checksum.to_be_bytes());

        self.encoded += 1;

        let flags = if key {
            BufferFlag::KeyFrame.into()
        } else {
            BufferFlags::empty()
        };
        EncodedUnit { data, pts_us, flags }
    }
}

impl VideoEncoder for SimulatedEncoder {
    fn start(&mut self) -> Result<()> {
        if self.state != SimState::Configured {
            return Err(EncodeError::invalid_state("start after start"));
        }
        if *self.control.state.fail_start.lock() {
            return Err(EncodeError::fatal(format!("{} encoder failed to start", self.tier)));
        }
        let config = self.codec_config();
        self.format = Some(TrackFormat::from_params(&self.params, config.clone()));
        self.output.push_back(EncodedUnit {
            data: config,
            pts_us: 0,
            flags: BufferFlag::CodecConfig.into(),
        });
        self.state = SimState::Executing;
        Ok(())
    }

    fn dequeue_input(&mut self, _timeout: Duration) -> Result<Option<InputSlot>> {
        self.ensure_executing("dequeue_input")?;
        if self.control.take_starved() {
            return Ok(None);
        }
        Ok(self.free.pop_front().map(InputSlot))
    }

    fn input_image(&mut self, slot: InputSlot) -> Result<InputImage<'_>> {
        self.ensure_executing("input_image")?;
        if self.control.take_image_failure() {
            return Err(EncodeError::invalid_state(format!("input slot {} unavailable", slot.0)));
        }
        let (width, height, planes) = (self.params.width, self.params.height, self.planes);
        let buffer = self
            .slots
            .get_mut(slot.0)
            .ok_or_else(|| EncodeError::invalid_state(format!("no input slot {}", slot.0)))?;
        Ok(InputImage::new(width, height, buffer, planes))
    }

    fn queue_input(&mut self, slot: InputSlot, len: usize, pts_us: i64, flags: BufferFlags) -> Result<()> {
        self.ensure_executing("queue_input")?;
        if slot.0 >= self.slots.len() || self.free.contains(&slot.0) {
            return Err(EncodeError::invalid_state(format!("slot {} not dequeued", slot.0)));
        }
        self.free.push_back(slot.0);

        if flags.contains(BufferFlag::EndOfStream) {
            self.output.push_back(EncodedUnit {
                data: Vec::new(),
                pts_us,
                flags: BufferFlag::EndOfStream.into(),
            });
            return Ok(());
        }
        if self.control.should_fail(self.encoded) {
            return Err(EncodeError::fatal(format!(
                "{} encoder failed after {} frames",
                self.tier, self.encoded
            )));
        }
        if len > 0 {
            let unit = self.encode(slot.0, len.min(self.slots[slot.0].len()), pts_us);
            self.output.push_back(unit);
        }
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<Option<EncodedUnit>> {
        if matches!(self.state, SimState::Configured | SimState::Released) {
            return Err(EncodeError::invalid_state("dequeue_output while not started"));
        }
        Ok(self.output.pop_front())
    }

    fn output_format(&self) -> Option<TrackFormat> {
        self.format.clone()
    }

    fn request_key_frame(&mut self) -> Result<()> {
        self.ensure_executing("request_key_frame")?;
        self.force_key = true;
        self.control.state.key_frame_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.ensure_executing("stop")?;
        self.state = SimState::Stopped;
        Ok(())
    }

    fn release(&mut self) {
        if self.state != SimState::Released {
            self.state = SimState::Released;
            self.control.state.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// One sample recorded by the in-memory container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    /// Sample payload
    pub data: Vec<u8>,
    /// Presentation timestamp
    pub pts_us: i64,
    /// Sync frame flag
    pub key_frame: bool,
}

/// Everything that happened to one in-memory container file
#[derive(Debug, Clone, Default)]
pub struct ContainerLog {
    /// Track format of the last added track
    pub format: Option<TrackFormat>,
    /// `add_track` calls
    pub tracks_added: usize,
    /// `start` calls
    pub starts: usize,
    /// Samples in write order
    pub samples: Vec<SampleRecord>,
    /// `stop` calls
    pub stop_calls: usize,
    /// Whether a `stop` succeeded
    pub stopped: bool,
    /// Whether the writer was dropped
    pub released: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    logs: BTreeMap<PathBuf, ContainerLog>,
    opened: Vec<PathBuf>,
    fail_stop: bool,
}

/// Container factory that records every call in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryContainerFactory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryContainerFactory {
    /// Empty factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `stop` fail
    pub fn fail_stop(&self, fail: bool) {
        self.state.lock().fail_stop = fail;
    }

    /// Opened paths in open order
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().opened.clone()
    }

    /// Log of the file at `path`
    #[must_use]
    pub fn log(&self, path: &Path) -> Option<ContainerLog> {
        self.state.lock().logs.get(path).cloned()
    }

    /// Logs of every opened file whose name contains `label`, in open order
    #[must_use]
    pub fn logs_for(&self, label: &str) -> Vec<ContainerLog> {
        let state = self.state.lock();
        state
            .opened
            .iter()
            .filter(|path| path.to_string_lossy().contains(label))
            .filter_map(|path| state.logs.get(path).cloned())
            .collect()
    }
}

impl ContainerFactory for MemoryContainerFactory {
    fn open(&self, path: &Path) -> MuxResult<Box<dyn ContainerWriter>> {
        let mut state = self.state.lock();
        state.logs.insert(path.to_path_buf(), ContainerLog::default());
        state.opened.push(path.to_path_buf());
        Ok(Box::new(MemoryWriter {
            path: path.to_path_buf(),
            state: Arc::clone(&self.state),
            started: false,
        }))
    }
}

struct MemoryWriter {
    path: PathBuf,
    state: Arc<Mutex<MemoryState>>,
    started: bool,
}

impl MemoryWriter {
    fn with_log<T>(&self, f: impl FnOnce(&mut ContainerLog, bool) -> T) -> T {
        let mut state = self.state.lock();
        let fail_stop = state.fail_stop;
        let log = state.logs.entry(self.path.clone()).or_default();
        f(log, fail_stop)
    }
}

impl ContainerWriter for MemoryWriter {
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<usize> {
        self.with_log(|log, _| {
            log.format = Some(format.clone());
            log.tracks_added += 1;
            log.tracks_added - 1
        });
        Ok(0)
    }

    fn start(&mut self) -> MuxResult<()> {
        self.with_log(|log, _| log.starts += 1);
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, _track: usize, data: &[u8], info: SampleInfo) -> MuxResult<()> {
        if !self.started {
            return Err(MuxerError::invalid_state("sample before start"));
        }
        self.with_log(|log, _| {
            log.samples.push(SampleRecord {
                data: data.to_vec(),
                pts_us: info.pts_us,
                key_frame: info.key_frame,
            });
        });
        Ok(())
    }

    fn stop(&mut self) -> MuxResult<()> {
        let failed = self.with_log(|log, fail_stop| {
            log.stop_calls += 1;
            log.stopped = !fail_stop;
            fail_stop
        });
        if failed {
            return Err(MuxerError::invalid_state("simulated stop failure"));
        }
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.with_log(|log, _| log.released = true);
    }
}
