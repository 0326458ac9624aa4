//! End-to-end pipeline tests against the simulated encoder and in-memory container

mod common;

use std::sync::Arc;

use common::{config, i420_frame, init_tracing, nv21_frame, record, settings, TestCamera, HEIGHT, WIDTH};
use lamco_encode::testing::{InputLayout, MemoryContainerFactory, SimulatedEncoderFactory};
use lamco_encode::{PathState, QualityTier, RecorderEvent};
use lamco_frame::{ChromaOrder, FormatConverter, InputImage, PixelFormatDetector, PlaneLayout};
use lamco_recorder::{FrameSink, PipelineCoordinator, RecorderError};

fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
}

#[tokio::test]
async fn test_every_frame_released_exactly_once() {
    init_tracing();
    let camera = Arc::new(TestCamera::default());

    // Tiny queues so the producer outruns the workers and evicts
    let run = record(
        &camera,
        config(2),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(MemoryContainerFactory::new()),
        settings(50),
        (0..200).map(nv21_frame),
    )
    .await;

    let releases = camera.releases();
    assert_eq!(releases.len(), 200);
    assert!(releases.values().all(|&count| count == 1));

    for path in [&run.report.high, &run.report.low] {
        let stats = &path.stats;
        assert_eq!(stats.frames_received, 200);
        assert_eq!(
            stats.frames_received,
            stats.frames_submitted + stats.frames_dropped()
        );
        assert_eq!(stats.samples_written, stats.frames_submitted);
    }
}

#[tokio::test]
async fn test_segmentation_exact() {
    init_tracing();
    let camera = Arc::new(TestCamera::default());
    let containers = MemoryContainerFactory::new();

    let run = record(
        &camera,
        config(1024),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(containers.clone()),
        settings(300),
        (0..950).map(nv21_frame),
    )
    .await;

    for tier in QualityTier::ALL {
        let logs = containers.logs_for(tier.label());
        let counts: Vec<usize> = logs.iter().map(|log| log.samples.len()).collect();
        assert_eq!(counts, vec![300, 300, 300, 50], "{}", tier);

        let report = run.report.path(tier);
        assert_eq!(report.segments.len(), 4);
        let frames: Vec<u32> = report.segments.iter().map(|s| s.frames).collect();
        assert_eq!(frames, vec![300, 300, 300, 50]);
        for (i, segment) in report.segments.iter().enumerate() {
            let expected = format!("/recordings/session_{}_{}.mp4", tier.label(), i);
            assert_eq!(segment.path.to_string_lossy(), expected);
        }
    }
    assert_eq!(containers.paths().len(), 8);
}

#[tokio::test]
async fn test_header_written_once_per_segment() {
    init_tracing();
    let camera = Arc::new(TestCamera::default());
    let containers = MemoryContainerFactory::new();

    record(
        &camera,
        config(256),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(containers.clone()),
        settings(40),
        (0..130).map(i420_frame),
    )
    .await;

    // 130 frames at 40 per segment, on both tiers
    assert_eq!(containers.paths().len(), 8);
    for path in containers.paths() {
        let log = containers.log(&path).unwrap();
        assert_eq!(log.tracks_added, 1, "{}", path.display());
        assert_eq!(log.starts, 1, "{}", path.display());
        assert_eq!(log.stop_calls, 1, "{}", path.display());
        assert!(log.released);

        let format = log.format.unwrap();
        assert_eq!((format.width, format.height), (WIDTH, HEIGHT));
        assert!(format.codec_config.starts_with(&[0, 0, 0, 1, 0x67]));

        // Each segment opens on a sync frame
        assert!(log.samples[0].key_frame, "{}", path.display());
    }
}

#[tokio::test]
async fn test_i420_source_round_trips_through_nv12_encoder() {
    init_tracing();
    let camera = Arc::new(TestCamera::default());
    let encoders = SimulatedEncoderFactory::new();
    encoders
        .control(QualityTier::High)
        .set_layout(InputLayout::SemiPlanar(ChromaOrder::Uv));
    let containers = MemoryContainerFactory::new();

    let frames: Vec<_> = (0..12).map(i420_frame).collect();
    let run = record(
        &camera,
        config(64),
        Arc::new(encoders),
        Arc::new(containers.clone()),
        settings(100),
        frames.clone(),
    )
    .await;
    assert_eq!(run.report.high.stats.conversion_failures, 0);

    let detector = PixelFormatDetector::default();
    let mut converter = FormatConverter::new();
    let nv12 = PlaneLayout::nv12(WIDTH, HEIGHT, WIDTH as usize);
    let i420 = PlaneLayout::i420(WIDTH, HEIGHT, WIDTH as usize);
    let len = PlaneLayout::buffer_len(&nv12, WIDTH, HEIGHT);

    let samples = containers.logs_for("high_quality").remove(0).samples;
    assert_eq!(samples.len(), frames.len());

    for (frame, sample) in frames.iter().zip(&samples) {
        // What the encoder should have been handed
        let mut encoder_input = vec![0u8; len];
        let mut image = InputImage::new(WIDTH, HEIGHT, &mut encoder_input, nv12);
        converter
            .convert(
                frame,
                detector.detect(WIDTH, &frame.planes),
                &mut image,
                detector.detect(WIDTH, &nv12),
            )
            .unwrap();

        let tail = &sample.data[sample.data.len() - 4..];
        assert_eq!(tail, checksum(&encoder_input).to_be_bytes());

        // And back again
        let back = lamco_frame::Frame::new(WIDTH, HEIGHT, encoder_input, nv12, frame.timestamp, frame.slot);
        let mut restored = vec![0u8; frame.data.len()];
        let mut image = InputImage::new(WIDTH, HEIGHT, &mut restored, i420);
        converter
            .convert(
                &back,
                detector.detect(WIDTH, &back.planes),
                &mut image,
                detector.detect(WIDTH, &i420),
            )
            .unwrap();
        assert_eq!(restored, frame.data);
    }
}

#[tokio::test]
async fn test_packed_i420_source_into_planar_encoder() {
    init_tracing();
    let camera = Arc::new(TestCamera::default());
    let containers = MemoryContainerFactory::new();

    let frames: Vec<_> = (0..12).map(i420_frame).collect();
    let run = record(
        &camera,
        config(64),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(containers.clone()),
        settings(100),
        frames.clone(),
    )
    .await;

    for tier in QualityTier::ALL {
        let report = run.report.path(tier);
        assert!(report.fault.is_none(), "{}", tier);
        assert_eq!(report.stats.conversion_failures, 0);
        assert_eq!(report.stats.frames_submitted, 12);

        // Same layout on both sides, so the encoder sees the frame bytes unchanged
        let samples = containers.logs_for(tier.label()).remove(0).samples;
        assert_eq!(samples.len(), frames.len());
        for (frame, sample) in frames.iter().zip(&samples) {
            let tail = &sample.data[sample.data.len() - 4..];
            assert_eq!(tail, checksum(&frame.data).to_be_bytes());
        }
    }
    assert!(camera.releases().values().all(|&count| count == 1));
}

#[tokio::test]
async fn test_low_quality_failure_leaves_high_quality_untouched() {
    init_tracing();
    let settings = settings(25);

    let baseline_camera = Arc::new(TestCamera::default());
    let baseline = MemoryContainerFactory::new();
    let baseline_run = record(
        &baseline_camera,
        config(256),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(baseline.clone()),
        settings.clone(),
        (0..60).map(nv21_frame),
    )
    .await;
    assert!(!baseline_run.report.is_degraded());

    let camera = Arc::new(TestCamera::default());
    let encoders = SimulatedEncoderFactory::new();
    encoders.control(QualityTier::Low).fail_after(10);
    let degraded = MemoryContainerFactory::new();
    let run = record(
        &camera,
        config(256),
        Arc::new(encoders.clone()),
        Arc::new(degraded.clone()),
        settings,
        (0..60).map(nv21_frame),
    )
    .await;

    assert!(run.report.low.fault.is_some());
    assert!(run.report.high.fault.is_none());
    assert_eq!(run.report.high.state, PathState::Stopped);
    assert_eq!(encoders.control(QualityTier::Low).released(), 1);
    assert!(run.events.iter().any(|event| matches!(
        event,
        RecorderEvent::PathDegraded {
            tier: QualityTier::Low,
            ..
        }
    )));

    let expected = baseline.logs_for("high_quality");
    let actual = degraded.logs_for("high_quality");
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(&expected) {
        assert_eq!(a.samples, e.samples);
    }

    // Frames still all went back to the camera exactly once
    assert!(camera.releases().values().all(|&count| count == 1));
    assert_eq!(camera.releases().len(), 60);
}

#[tokio::test]
async fn test_starved_high_quality_input_drops_only_there() {
    init_tracing();
    const STARVED: u64 = 7;
    let camera = Arc::new(TestCamera::default());
    let encoders = SimulatedEncoderFactory::new();
    encoders.control(QualityTier::High).starve_input(STARVED);

    let run = record(
        &camera,
        config(256),
        Arc::new(encoders),
        Arc::new(MemoryContainerFactory::new()),
        settings(100),
        (0..40).map(nv21_frame),
    )
    .await;

    assert_eq!(run.report.high.stats.input_starved, STARVED);
    assert_eq!(run.report.high.stats.frames_submitted, 40 - STARVED);
    assert_eq!(run.report.low.stats.input_starved, 0);
    assert_eq!(run.report.low.stats.frames_submitted, 40);
    assert_eq!(camera.releases().len(), 40);
}

#[tokio::test]
async fn test_events_follow_path_lifecycle() {
    init_tracing();
    let camera = Arc::new(TestCamera::default());

    let run = record(
        &camera,
        config(256),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(MemoryContainerFactory::new()),
        settings(10),
        (0..25).map(nv21_frame),
    )
    .await;

    for tier in QualityTier::ALL {
        let states: Vec<PathState> = run
            .events
            .iter()
            .filter_map(|event| match event {
                RecorderEvent::PathStateChanged { tier: t, state } if *t == tier => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PathState::Configuring,
                PathState::Running,
                PathState::Draining,
                PathState::Stopped
            ]
        );

        let closed = run
            .events
            .iter()
            .filter(|event| matches!(event, RecorderEvent::SegmentClosed { tier: t, .. } if *t == tier))
            .count();
        assert_eq!(closed, 3);
    }
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    init_tracing();
    let camera = Arc::new(TestCamera::default());
    let mut coordinator = PipelineCoordinator::new(
        config(64),
        camera.clone(),
        Arc::new(SimulatedEncoderFactory::new()),
        Arc::new(MemoryContainerFactory::new()),
    );
    assert!(matches!(
        coordinator.stop_recording().await,
        Err(RecorderError::NotRecording)
    ));

    let dispatcher = coordinator.dispatcher();
    coordinator.start_recording(settings(5)).unwrap();
    for slot in 0..8 {
        dispatcher.on_frame(nv21_frame(slot));
    }

    let first = coordinator.stop_recording().await.unwrap();
    let second = coordinator.stop_recording().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(camera.closed(), 1);
    assert!(!coordinator.is_recording());

    // Frames after stop go straight back
    dispatcher.on_frame(nv21_frame(100));
    assert_eq!(camera.releases().get(&100), Some(&1));

    // A new session starts fresh
    coordinator.start_recording(settings(5)).unwrap();
    dispatcher.on_frame(nv21_frame(200));
    let third = coordinator.stop_recording().await.unwrap();
    assert_eq!(third.high.stats.frames_received, 1);
    assert_eq!(camera.closed(), 2);
}
