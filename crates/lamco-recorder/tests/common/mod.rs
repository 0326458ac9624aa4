//! Shared helpers for recorder integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lamco_encode::{ContainerFactory, EncoderFactory, PathTimings, RecorderEvent};
use lamco_frame::{Frame, PlaneLayout};
use lamco_recorder::{
    CaptureFormat, FrameSink, FrameSource, PipelineCoordinator, RecorderConfig, RecordingReport,
    RecordingSettings, SourceError,
};
use parking_lot::Mutex;

pub const WIDTH: u32 = 16;
pub const HEIGHT: u32 = 8;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Frame source that counts how often each slot came back
#[derive(Default)]
pub struct TestCamera {
    releases: Mutex<BTreeMap<u32, usize>>,
    opened: Mutex<Vec<CaptureFormat>>,
    closed: Mutex<usize>,
}

impl TestCamera {
    pub fn releases(&self) -> BTreeMap<u32, usize> {
        self.releases.lock().clone()
    }

    pub fn closed(&self) -> usize {
        *self.closed.lock()
    }
}

impl FrameSource for TestCamera {
    fn open(&self, format: &CaptureFormat) -> Result<(), SourceError> {
        self.opened.lock().push(*format);
        Ok(())
    }

    fn close(&self) {
        *self.closed.lock() += 1;
    }

    fn release(&self, frame: Frame) {
        *self.releases.lock().entry(frame.slot).or_default() += 1;
    }
}

fn pattern(len: usize, seed: u32) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u32).wrapping_mul(7).wrapping_add(seed.wrapping_mul(13)) & 0xff) as u8)
        .collect()
}

/// Tightly packed I420 frame with slot-dependent content, 33ms apart
pub fn i420_frame(slot: u32) -> Frame {
    let planes = PlaneLayout::i420(WIDTH, HEIGHT, WIDTH as usize);
    let len = PlaneLayout::buffer_len(&planes, WIDTH, HEIGHT);
    Frame::new(
        WIDTH,
        HEIGHT,
        pattern(len, slot),
        planes,
        Duration::from_millis(u64::from(slot) * 33),
        slot,
    )
}

/// NV21 frame with a padded luma stride, as camera HALs commonly deliver
pub fn nv21_frame(slot: u32) -> Frame {
    let planes = PlaneLayout::nv21(WIDTH, HEIGHT, WIDTH as usize + 8);
    let len = PlaneLayout::buffer_len(&planes, WIDTH, HEIGHT);
    Frame::new(
        WIDTH,
        HEIGHT,
        pattern(len, slot),
        planes,
        Duration::from_millis(u64::from(slot) * 33),
        slot,
    )
}

pub fn settings(segment_frame_count: u32) -> RecordingSettings {
    RecordingSettings::builder()
        .width(WIDTH)
        .height(HEIGHT)
        .segment_frame_count(segment_frame_count)
        .build()
}

pub fn config(frame_queue_depth: usize) -> RecorderConfig {
    RecorderConfig::builder()
        .output_dir("/recordings")
        .base_name("session")
        .extension("mp4")
        .frame_queue_depth(frame_queue_depth)
        .timings(PathTimings {
            drain_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .build()
}

pub struct SessionRun {
    pub report: RecordingReport,
    pub events: Vec<RecorderEvent>,
}

/// Record `frames` in one session and stop
pub async fn record(
    camera: &Arc<TestCamera>,
    config: RecorderConfig,
    encoders: Arc<dyn EncoderFactory>,
    containers: Arc<dyn ContainerFactory>,
    settings: RecordingSettings,
    frames: impl IntoIterator<Item = Frame>,
) -> SessionRun {
    let mut coordinator = PipelineCoordinator::new(config, camera.clone(), encoders, containers);
    let mut events_rx = coordinator.take_event_receiver().unwrap();
    let dispatcher = coordinator.dispatcher();

    coordinator.start_recording(settings).unwrap();
    for frame in frames {
        dispatcher.on_frame(frame);
    }
    let report = coordinator.stop_recording().await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }
    SessionRun { report, events }
}
