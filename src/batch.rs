//! Batch video processing
//!
//! Drives a whole video through the frame pipeline:
//!
//! ```text
//! Idle ─▶ Reading ─▶ Processing ─▶ Writing ─┐
//!  │         ▲                              │
//!  │         └──────────────────────────────┘
//!  ├─▶ Rejected            (pre-flight duration check)
//!  └─▶ Done | Failed
//! ```
//!
//! The duration check runs before any frame is read, so an over-long video
//! costs nothing beyond opening its metadata.

use crate::{
    backends::video::{VideoMetadata, VideoSink, VideoSource},
    config::{BatchConfig, ReadFailurePolicy},
    error::{BgRemovalError, Result},
    pipeline::FrameProcessingPipeline,
    services::progress::{NoOpProgressReporter, ProgressReporter, ProgressUpdate},
};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Idle,
    Reading,
    Processing,
    Writing,
    Done,
    Rejected,
    Failed,
}

impl BatchState {
    /// Whether no further transitions can happen
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Rejected | Self::Failed)
    }
}

/// Why a video was refused without processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// `frame_count / fps` exceeded the configured maximum
    DurationExceeded { duration: Duration, max: Duration },
}

impl RejectionReason {
    #[must_use]
    pub fn into_error(self) -> BgRemovalError {
        match self {
            Self::DurationExceeded { duration, max } => {
                BgRemovalError::DurationExceeded { duration, max }
            }
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_error())
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Metadata announced by the source
    pub metadata: VideoMetadata,
    /// Frames successfully read from the source
    pub frames_read: u64,
    /// Frames appended to the sink
    pub frames_written: u64,
    /// Mid-stream read error that ended the run early, if any
    pub read_error: Option<String>,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

impl BatchReport {
    /// Whether fewer frames were produced than the source announced
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.frames_written < self.metadata.frame_count
    }
}

/// Result of a batch run that did not error
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Completed(BatchReport),
    Rejected(RejectionReason),
}

impl BatchOutcome {
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Rejected(_) => None,
        }
    }

    /// Treat a rejection as a `DurationExceeded` error
    pub fn into_result(self) -> Result<BatchReport> {
        match self {
            Self::Completed(report) => Ok(report),
            Self::Rejected(reason) => Err(reason.into_error()),
        }
    }
}

/// Processes a video source frame by frame into a sink
pub struct BatchVideoProcessor {
    pipeline: FrameProcessingPipeline,
    config: BatchConfig,
    reporter: Arc<dyn ProgressReporter>,
    state: BatchState,
    history: Vec<BatchState>,
}

impl std::fmt::Debug for BatchVideoProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchVideoProcessor")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl BatchVideoProcessor {
    /// Create a processor; the configuration must select a file mode
    ///
    /// # Errors
    /// - `InvalidConfig` for realtime-preview mode or a zero duration limit
    pub fn new(pipeline: FrameProcessingPipeline, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pipeline,
            config,
            reporter: Arc::new(NoOpProgressReporter),
            state: BatchState::Idle,
            history: vec![BatchState::Idle],
        })
    }

    /// Report progress to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// States entered during the most recent run, starting with `Idle`
    #[must_use]
    pub fn history(&self) -> &[BatchState] {
        &self.history
    }

    fn transition(&mut self, next: BatchState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "batch state transition");
            self.state = next;
            self.history.push(next);
        }
    }

    fn fail<K: VideoSink + ?Sized>(&mut self, sink: &mut K, error: BgRemovalError) -> BgRemovalError {
        if let Err(discard_error) = sink.discard() {
            warn!(error = %discard_error, "failed to discard partial output");
        }
        self.transition(BatchState::Failed);
        self.reporter.report_error(&error.to_string());
        error
    }

    /// Run the whole video through the pipeline
    ///
    /// Frames are written to `sink` in source order. Returns
    /// `Ok(Rejected)` without reading any frame when the video is longer
    /// than the configured maximum. A source that ends early, or fails
    /// mid-stream under [`ReadFailurePolicy::KeepPartial`], completes with
    /// the frames produced so far. Decoding stops with `DurationExceeded`
    /// once the frames read exceed the maximum duration, even when the
    /// source announced fewer frames.
    ///
    /// # Errors
    /// - `Video` for sources with an invalid frame rate, sink failures, or
    ///   read failures under [`ReadFailurePolicy::FailFast`]
    /// - `InvalidFrame` / `Inference` when a frame cannot be processed
    /// - `Cancelled` when `cancel` fires between frames
    /// - `DurationExceeded` when the decoded video outgrows the limit
    ///
    /// The sink is discarded on every error.
    #[instrument(skip_all, fields(mode = %self.config.pipeline.mode, model = %self.pipeline.model_name()))]
    pub fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome>
    where
        S: VideoSource + ?Sized,
        K: VideoSink + ?Sized,
    {
        self.state = BatchState::Idle;
        self.history = vec![BatchState::Idle];
        let start = Instant::now();
        let metadata = source.metadata().clone();

        let duration = match metadata.duration() {
            Ok(duration) => duration,
            Err(e) => return Err(self.fail(sink, e)),
        };

        if duration > self.config.max_duration {
            warn!(
                duration_secs = duration.as_secs_f64(),
                max_secs = self.config.max_duration.as_secs_f64(),
                "video rejected by duration check"
            );
            self.transition(BatchState::Rejected);
            return Ok(BatchOutcome::Rejected(RejectionReason::DurationExceeded {
                duration,
                max: self.config.max_duration,
            }));
        }

        info!(
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            frames = metadata.frame_count,
            "starting batch run"
        );
        self.reporter.report_started(metadata.frame_count, metadata.fps);

        let mut frames_read = 0u64;
        let mut frames_written = 0u64;
        let mut read_error = None;

        loop {
            if cancel.is_cancelled() {
                info!(frames_written, "batch run cancelled");
                return Err(self.fail(
                    sink,
                    BgRemovalError::Cancelled {
                        frames_processed: frames_written,
                    },
                ));
            }

            self.transition(BatchState::Reading);
            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => match self.config.read_failure {
                    ReadFailurePolicy::KeepPartial => {
                        warn!(error = %e, frames_read, "read failed mid-stream; keeping partial output");
                        read_error = Some(e.to_string());
                        break;
                    }
                    ReadFailurePolicy::FailFast => return Err(self.fail(sink, e)),
                },
            };
            frames_read += 1;

            // Bounds sources whose announced frame count is missing or low
            let decoded = frames_read as f64 / metadata.fps;
            if decoded > self.config.max_duration.as_secs_f64() {
                warn!(
                    frames_read,
                    max_secs = self.config.max_duration.as_secs_f64(),
                    "decoded video exceeds duration limit"
                );
                return Err(self.fail(
                    sink,
                    BgRemovalError::DurationExceeded {
                        duration: Duration::from_secs_f64(decoded),
                        max: self.config.max_duration,
                    },
                ));
            }

            self.transition(BatchState::Processing);
            let output = match self.pipeline.process(&frame, &self.config.pipeline) {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, frame = frames_read - 1, "frame processing failed");
                    return Err(self.fail(sink, e));
                }
            };

            self.transition(BatchState::Writing);
            if let Err(e) = sink.write_frame(&output) {
                return Err(self.fail(sink, e));
            }
            frames_written += 1;

            self.reporter.report_progress(ProgressUpdate::new(
                frames_written,
                metadata.frame_count,
                start,
            ));
        }

        if let Err(e) = sink.finish() {
            return Err(self.fail(sink, e));
        }

        if frames_read < metadata.frame_count {
            debug!(
                frames_read,
                expected = metadata.frame_count,
                "source ended before its announced frame count"
            );
        }

        let elapsed = start.elapsed();
        self.transition(BatchState::Done);
        self.reporter
            .report_completion(frames_written, elapsed.as_millis() as u64);
        info!(frames_written, elapsed_ms = elapsed.as_millis() as u64, "batch run complete");

        Ok(BatchOutcome::Completed(BatchReport {
            metadata,
            frames_read,
            frames_written,
            read_error,
            elapsed,
        }))
    }
}

/// Run a batch on a Tokio blocking task, returning the processor and sink
///
/// # Errors
/// Everything [`BatchVideoProcessor::run`] returns, plus `Internal` if the
/// task panics.
pub async fn run_blocking_task<S, K>(
    mut processor: BatchVideoProcessor,
    mut source: S,
    mut sink: K,
    cancel: CancellationToken,
) -> Result<(BatchOutcome, BatchVideoProcessor, K)>
where
    S: VideoSource + Send + 'static,
    K: VideoSink + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let outcome = processor.run(&mut source, &mut sink, &cancel)?;
        Ok((outcome, processor, sink))
    })
    .await
    .map_err(|e| BgRemovalError::internal(format!("Batch task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockSegmentationModel;
    use crate::backends::video::{MemoryVideoSink, MemoryVideoSource};
    use crate::config::ProcessingMode;
    use crate::types::OutputImage;

    fn processor(model: MockSegmentationModel, config: BatchConfig) -> BatchVideoProcessor {
        let pipeline = FrameProcessingPipeline::new(Arc::new(model));
        BatchVideoProcessor::new(pipeline, config).unwrap()
    }

    fn source(frames: u64) -> MemoryVideoSource {
        MemoryVideoSource::synthetic(VideoMetadata::new(8, 6, 30.0, frames))
    }

    #[test]
    fn test_preview_mode_rejected_as_config() {
        let config = BatchConfig {
            pipeline: crate::config::PipelineConfig::realtime_preview(),
            ..BatchConfig::default()
        };
        let pipeline = FrameProcessingPipeline::new(Arc::new(MockSegmentationModel::constant(8, 1.0)));
        let err = BatchVideoProcessor::new(pipeline, config).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
    }

    #[test]
    fn test_state_history_for_completed_run() {
        let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
        let mut sink = MemoryVideoSink::new();
        let outcome = processor
            .run(&mut source(2), &mut sink, &CancellationToken::new())
            .unwrap();

        assert!(!outcome.is_rejected());
        assert_eq!(processor.state(), BatchState::Done);
        assert_eq!(
            processor.history(),
            &[
                BatchState::Idle,
                BatchState::Reading,
                BatchState::Processing,
                BatchState::Writing,
                BatchState::Reading,
                BatchState::Processing,
                BatchState::Writing,
                BatchState::Reading,
                BatchState::Done,
            ]
        );
        assert!(sink.is_finished());
    }

    #[test]
    fn test_rejection_never_reads() {
        let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
        let mut source = source(450);
        let mut sink = MemoryVideoSink::new();

        let outcome = processor
            .run(&mut source, &mut sink, &CancellationToken::new())
            .unwrap();

        assert!(outcome.is_rejected());
        assert_eq!(source.frames_read(), 0);
        assert_eq!(processor.history(), &[BatchState::Idle, BatchState::Rejected]);

        let err = outcome.into_result().unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_exactly_max_duration_is_accepted() {
        let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
        let mut sink = MemoryVideoSink::new();
        let outcome = processor
            .run(&mut source(300), &mut sink, &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.report().unwrap().frames_written, 300);
    }

    #[test]
    fn test_zero_fps_is_source_error() {
        let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
        let mut source = MemoryVideoSource::synthetic(VideoMetadata::new(4, 4, 0.0, 10));
        let mut sink = MemoryVideoSink::new();
        let err = processor
            .run(&mut source, &mut sink, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Video(_)));
        assert_eq!(processor.state(), BatchState::Failed);
    }

    #[test]
    fn test_frame_error_discards_sink() {
        let model = MockSegmentationModel::constant(8, 1.0).failing_on_call(3);
        let mut processor = processor(model, BatchConfig::default());
        let mut sink = MemoryVideoSink::new();

        let err = processor
            .run(&mut source(10), &mut sink, &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, BgRemovalError::Inference(_)));
        assert!(sink.is_discarded());
        assert!(sink.frames().is_empty());
        assert_eq!(processor.state(), BatchState::Failed);
    }

    #[test]
    fn test_read_failure_policies() {
        let mut keep = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
        let mut sink = MemoryVideoSink::new();
        let outcome = keep
            .run(&mut source(10).failing_at(4), &mut sink, &CancellationToken::new())
            .unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.frames_written, 4);
        assert!(report.read_error.is_some());
        assert!(report.is_partial());
        assert!(sink.is_finished());

        let config = BatchConfig::builder()
            .read_failure(ReadFailurePolicy::FailFast)
            .build()
            .unwrap();
        let mut strict = processor(MockSegmentationModel::constant(8, 1.0), config);
        let mut sink = MemoryVideoSink::new();
        let err = strict
            .run(&mut source(10).failing_at(4), &mut sink, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Video(_)));
        assert!(sink.is_discarded());
    }

    #[test]
    fn test_cancelled_before_first_frame() {
        let mut processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
        let mut source = source(10);
        let mut sink = MemoryVideoSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = processor.run(&mut source, &mut sink, &cancel).unwrap_err();
        assert!(matches!(
            err,
            BgRemovalError::Cancelled {
                frames_processed: 0
            }
        ));
        assert_eq!(source.frames_read(), 0);
        assert!(sink.is_discarded());
    }

    #[test]
    fn test_transparent_mode_output() {
        let config = BatchConfig::builder()
            .mode(ProcessingMode::FileTransparent)
            .build()
            .unwrap();
        let mut processor = processor(MockSegmentationModel::constant(8, 1.0), config);
        let mut sink = MemoryVideoSink::new();
        processor
            .run(&mut source(3), &mut sink, &CancellationToken::new())
            .unwrap();

        for frame in sink.frames() {
            let OutputImage::Transparent(image) = frame else {
                panic!("expected RGBA output");
            };
            assert!(image.pixels().all(|p| p[3] == 255));
        }
    }

    #[tokio::test]
    async fn test_run_blocking_task() {
        let processor = processor(MockSegmentationModel::constant(8, 1.0), BatchConfig::default());
        let (outcome, processor, sink) = run_blocking_task(
            processor,
            source(5),
            MemoryVideoSink::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report().unwrap().frames_written, 5);
        assert_eq!(processor.state(), BatchState::Done);
        assert_eq!(sink.frames_written(), 5);
    }
}
