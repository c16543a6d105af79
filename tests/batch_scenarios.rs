//! Batch video processing scenarios with in-memory sources and sinks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use video_bgremove::{
    backends::{
        video::{FrameSequenceSink, MemoryVideoSink, MemoryVideoSource, VideoMetadata, VideoSink},
        MockSegmentationModel,
    },
    run_blocking_task, BatchConfig, BatchOutcome, BatchState, BatchVideoProcessor,
    BgRemovalError, FrameProcessingPipeline, OutputImage, ProcessingMode, ProgressReporter,
    ReadFailurePolicy, RejectionReason,
};
use video_bgremove::services::ProgressUpdate;

fn processor(model: MockSegmentationModel, config: BatchConfig) -> BatchVideoProcessor {
    BatchVideoProcessor::new(FrameProcessingPipeline::new(Arc::new(model)), config).unwrap()
}

fn video(seconds: u64, fps: f64) -> MemoryVideoSource {
    let frames = (seconds as f64 * fps) as u64;
    MemoryVideoSource::synthetic(VideoMetadata::new(16, 12, fps, frames))
}

/// Recovers the synthetic frame index stamped into pixel (0, 0)
fn output_index(image: &OutputImage) -> u64 {
    match image {
        OutputImage::Opaque(rgb) => MemoryVideoSource::frame_index(rgb),
        OutputImage::Transparent(rgba) => {
            let p = rgba.get_pixel(0, 0);
            u64::from(p[0]) + u64::from(p[1]) * 256
        }
    }
}

#[test]
fn five_second_video_processes_every_frame_in_order() {
    let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
    let mut source = video(5, 30.0);
    let mut sink = MemoryVideoSink::new();

    let outcome = processor
        .run(&mut source, &mut sink, &CancellationToken::new())
        .unwrap();

    let report = outcome.into_result().unwrap();
    assert_eq!(report.frames_read, 150);
    assert_eq!(report.frames_written, 150);
    assert!(!report.is_partial());
    assert!(report.read_error.is_none());

    let indices: Vec<u64> = sink.frames().iter().map(output_index).collect();
    assert_eq!(indices, (0..150).collect::<Vec<_>>());
    assert!(sink.is_finished());
}

#[test]
fn fifteen_second_video_is_rejected_without_reading() {
    let model = MockSegmentationModel::constant(8, 1.0);
    let mut processor = processor(model, BatchConfig::default());
    let mut source = video(15, 30.0);
    let mut sink = MemoryVideoSink::new();

    let outcome = processor
        .run(&mut source, &mut sink, &CancellationToken::new())
        .unwrap();

    assert_eq!(
        outcome,
        BatchOutcome::Rejected(RejectionReason::DurationExceeded {
            duration: Duration::from_secs(15),
            max: Duration::from_secs(10),
        })
    );
    assert_eq!(source.frames_read(), 0);
    assert_eq!(sink.frames_written(), 0);
    assert!(!sink.is_finished());
    assert_eq!(processor.state(), BatchState::Rejected);

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, BgRemovalError::DurationExceeded { .. }));
}

#[test]
fn under_reported_length_is_bounded_while_decoding() {
    let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
    let mut source = video(60, 30.0).reporting_frame_count(0);
    let mut sink = MemoryVideoSink::new();

    let err = processor
        .run(&mut source, &mut sink, &CancellationToken::new())
        .unwrap_err();

    let BgRemovalError::DurationExceeded { duration, max } = err else {
        panic!("expected duration limit, got {err}");
    };
    assert_eq!(max, Duration::from_secs(10));
    assert!(duration > max);
    assert_eq!(source.frames_read(), 301);
    assert_eq!(sink.frames_written(), 0);
    assert!(sink.is_discarded());
    assert_eq!(processor.state(), BatchState::Failed);
}

#[test]
fn unknown_length_within_limit_completes() {
    let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
    let mut source = video(10, 30.0).reporting_frame_count(0);
    let mut sink = MemoryVideoSink::new();

    let report = processor
        .run(&mut source, &mut sink, &CancellationToken::new())
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(report.frames_written, 300);
    assert_eq!(sink.frames().len(), 300);
}

#[test]
fn custom_duration_limit() {
    let config = BatchConfig::builder()
        .max_duration(Duration::from_secs(20))
        .build()
        .unwrap();
    let mut processor = processor(MockSegmentationModel::constant(8, 1.0), config);
    let mut sink = MemoryVideoSink::new();

    let outcome = processor
        .run(&mut video(15, 24.0), &mut sink, &CancellationToken::new())
        .unwrap();
    assert_eq!(outcome.report().unwrap().frames_written, 360);
}

#[test]
fn source_ending_early_keeps_partial_output() {
    let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
    let mut source = video(4, 30.0).truncated_to(70);
    let mut sink = MemoryVideoSink::new();

    let report = processor
        .run(&mut source, &mut sink, &CancellationToken::new())
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(report.frames_written, 70);
    assert!(report.is_partial());
    assert!(report.read_error.is_none());
    assert_eq!(processor.state(), BatchState::Done);
}

#[test]
fn mid_stream_read_error_policy() {
    let mut keep = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
    let mut sink = MemoryVideoSink::new();
    let report = keep
        .run(&mut video(2, 30.0).failing_at(25), &mut sink, &CancellationToken::new())
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(report.frames_written, 25);
    assert!(report.read_error.unwrap().contains("frame 25"));

    let config = BatchConfig::builder()
        .read_failure(ReadFailurePolicy::FailFast)
        .build()
        .unwrap();
    let mut strict = processor(MockSegmentationModel::constant(8, 1.0), config);
    let mut sink = MemoryVideoSink::new();
    let err = strict
        .run(&mut video(2, 30.0).failing_at(25), &mut sink, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::Video(_)));
    assert!(sink.is_discarded());
    assert_eq!(strict.state(), BatchState::Failed);
}

#[test]
fn frame_failure_discards_sequence_on_disk() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let model = MockSegmentationModel::left_half(8).failing_on_call(6);
    let mut processor = processor(model, BatchConfig::default());
    let mut sink = FrameSequenceSink::create(temp_dir.path().join("frames")).unwrap();

    let err = processor
        .run(&mut video(1, 30.0), &mut sink, &CancellationToken::new())
        .unwrap_err();

    assert!(err.is_frame_error());
    let remaining = std::fs::read_dir(sink.directory()).unwrap().count();
    assert_eq!(remaining, 0);
}

#[test]
fn transparent_run_writes_png_sequence() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = BatchConfig::builder()
        .mode(ProcessingMode::FileTransparent)
        .build()
        .unwrap();
    let mut processor = processor(MockSegmentationModel::left_half(8), config);
    let mut sink = FrameSequenceSink::create(temp_dir.path()).unwrap();

    processor
        .run(&mut video(1, 10.0), &mut sink, &CancellationToken::new())
        .unwrap();

    assert_eq!(sink.frame_paths().len(), 10);
    assert_eq!(sink.has_alpha(), Some(true));
    let first = image::open(&sink.frame_paths()[0]).unwrap().to_rgba8();
    assert_eq!(first.get_pixel(0, 6)[3], 255);
    assert_eq!(first.get_pixel(15, 6)[3], 0);
}

#[derive(Default)]
struct RecordingReporter {
    started: Mutex<Option<(u64, f64)>>,
    last_frame: AtomicU64,
    completed: AtomicU64,
    errors: Mutex<Vec<String>>,
}

impl ProgressReporter for RecordingReporter {
    fn report_started(&self, total_frames: u64, fps: f64) {
        *self.started.lock().unwrap() = Some((total_frames, fps));
    }

    fn report_progress(&self, update: ProgressUpdate) {
        let previous = self.last_frame.swap(update.frames_processed, Ordering::SeqCst);
        assert_eq!(previous + 1, update.frames_processed);
    }

    fn report_completion(&self, frames_written: u64, _elapsed_ms: u64) {
        self.completed.store(frames_written, Ordering::SeqCst);
    }

    fn report_error(&self, error: &str) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

#[test]
fn progress_is_reported_per_frame() {
    let reporter = Arc::new(RecordingReporter::default());
    let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default())
        .with_progress_reporter(reporter.clone());

    processor
        .run(&mut video(1, 30.0), &mut MemoryVideoSink::new(), &CancellationToken::new())
        .unwrap();

    assert_eq!(*reporter.started.lock().unwrap(), Some((30, 30.0)));
    assert_eq!(reporter.last_frame.load(Ordering::SeqCst), 30);
    assert_eq!(reporter.completed.load(Ordering::SeqCst), 30);
    assert!(reporter.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_stops_between_frames() {
    let model = MockSegmentationModel::constant(8, 1.0).with_delay(Duration::from_millis(5));
    let processor = processor(model, BatchConfig::default());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run_blocking_task(
        processor,
        video(5, 30.0),
        MemoryVideoSink::new(),
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(40)).await;
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    let BgRemovalError::Cancelled { frames_processed } = err else {
        panic!("expected cancellation, got {err}");
    };
    assert!(frames_processed < 150);
}

#[tokio::test]
async fn blocking_task_returns_sink() {
    let processor = processor(MockSegmentationModel::centered_disc(8), BatchConfig::default());
    let (outcome, processor, sink) = run_blocking_task(
        processor,
        video(2, 15.0),
        MemoryVideoSink::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.report().unwrap().frames_written, 30);
    assert_eq!(sink.frames().len(), 30);
    assert_eq!(processor.state(), BatchState::Done);
}
