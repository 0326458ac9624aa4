//! Simulated Dual-Quality Recording Example
//!
//! Records three seconds of synthetic NV21 camera frames through the
//! simulated encoder and writes both tiers as `.h264` segment files.
//!
//! # Running
//!
//! ```bash
//! cargo run -p lamco-recorder --example simulated
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lamco_encode::testing::SimulatedEncoderFactory;
use lamco_encode::{ElementaryStreamFactory, RecorderEvent};
use lamco_frame::{Frame, PlaneLayout};
use lamco_recorder::{
    CaptureFormat, FrameSink, FrameSource, PipelineCoordinator, RecorderConfig, RecordingSettings,
    Resolution, SourceError,
};

/// Stand-in for a camera that lends out frames
#[derive(Default)]
struct SyntheticCamera {
    released: AtomicUsize,
}

impl FrameSource for SyntheticCamera {
    fn open(&self, format: &CaptureFormat) -> Result<(), SourceError> {
        println!("Camera opened at {} @ {} fps", format.resolution, format.frame_rate);
        Ok(())
    }

    fn close(&self) {
        println!("Camera closed");
    }

    fn release(&self, _frame: Frame) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

fn synthetic_frame(resolution: Resolution, index: u32, timestamp: Duration) -> Frame {
    let planes = PlaneLayout::nv21(resolution.width, resolution.height, resolution.width as usize);
    let len = PlaneLayout::buffer_len(&planes, resolution.width, resolution.height);
    let data = (0..len).map(|i| (i as u32 ^ index) as u8).collect();
    Frame::new(resolution.width, resolution.height, data, planes, timestamp, index % 8)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("lamco-recorder Simulated Example");
    println!("================================");

    let output_dir = std::env::temp_dir().join("lamco-dualrec-demo");
    std::fs::create_dir_all(&output_dir)?;

    let config = RecorderConfig::builder()
        .output_dir(&output_dir)
        .base_name("demo")
        .frame_queue_depth(8)
        .build();
    let settings = RecordingSettings::builder()
        .resolution(Resolution::VGA)
        .frame_rate(30)
        .segment_frame_count(30)
        .build();

    let camera = Arc::new(SyntheticCamera::default());
    let mut recorder = PipelineCoordinator::new(
        config,
        camera.clone(),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(ElementaryStreamFactory),
    );
    let mut events = recorder.take_event_receiver().ok_or("event receiver already taken")?;
    let dispatcher = recorder.dispatcher();

    let resolution = settings.resolution();
    let frame_interval = Duration::from_secs(1) / settings.frame_rate;
    recorder.start_recording(settings)?;

    let started = Instant::now();
    for index in 0..90 {
        dispatcher.on_frame(synthetic_frame(resolution, index, started.elapsed()));
        tokio::time::sleep(frame_interval).await;
    }

    let report = recorder.stop_recording().await?;

    while let Ok(event) = events.try_recv() {
        if let RecorderEvent::SegmentClosed { tier, segment } = event {
            println!("  {} segment {}: {} frames", tier, segment.index, segment.frames);
        }
    }

    println!("\nOutput in {}", output_dir.display());
    for path in [&report.high, &report.low] {
        println!(
            "  {}: {} segments, {} samples, drop rate {:.1}%",
            path.tier,
            path.segments.len(),
            path.stats.samples_written,
            path.stats.drop_rate() * 100.0
        );
    }
    println!("Frames returned to camera: {}", camera.released.load(Ordering::Relaxed));

    Ok(())
}
