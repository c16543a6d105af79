//! Progress reporting service
//!
//! Batch runs report per-frame progress through a [`ProgressReporter`] so
//! that frontends (CLI progress bar, logs, tests) can observe a run without
//! the processor knowing about them.

use instant::Instant;

/// Snapshot of a batch run after a frame has been written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Frames written to the sink so far
    pub frames_processed: u64,
    /// Frame count announced by the source
    pub total_frames: u64,
    /// Milliseconds since the run started
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(frames_processed: u64, total_frames: u64, start_time: Instant) -> Self {
        Self {
            frames_processed,
            total_frames,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }

    /// Completion percentage, capped at 100
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.total_frames == 0 {
            return 100;
        }
        ((self.frames_processed.saturating_mul(100) / self.total_frames).min(100)) as u8
    }

    /// Estimated milliseconds remaining based on the average frame time
    #[must_use]
    pub fn eta_ms(&self) -> Option<u64> {
        if self.frames_processed == 0 || self.frames_processed >= self.total_frames {
            return None;
        }
        let per_frame = self.elapsed_ms / self.frames_processed;
        Some(per_frame * (self.total_frames - self.frames_processed))
    }
}

/// Observer for batch processing progress
pub trait ProgressReporter: Send + Sync {
    /// Called once after the pre-flight check passes
    fn report_started(&self, total_frames: u64, fps: f64) {
        let _ = (total_frames, fps);
    }

    /// Called after each frame is written
    fn report_progress(&self, update: ProgressUpdate);

    /// Called when the run finishes successfully
    fn report_completion(&self, frames_written: u64, elapsed_ms: u64);

    /// Called when the run fails
    fn report_error(&self, error: &str);
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _frames_written: u64, _elapsed_ms: u64) {}

    fn report_error(&self, _error: &str) {}
}

/// Progress reporter that writes to the `log` facade
#[derive(Debug)]
pub struct LogProgressReporter {
    verbose: bool,
    every: u64,
}

impl LogProgressReporter {
    /// Log every `every`-th frame (every frame when `verbose`)
    #[must_use]
    pub fn new(verbose: bool, every: u64) -> Self {
        Self {
            verbose,
            every: every.max(1),
        }
    }
}

impl Default for LogProgressReporter {
    fn default() -> Self {
        Self::new(false, 30)
    }
}

impl ProgressReporter for LogProgressReporter {
    fn report_started(&self, total_frames: u64, fps: f64) {
        log::info!("Processing {} frames at {:.2} fps", total_frames, fps);
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if !self.verbose && update.frames_processed % self.every != 0 {
            return;
        }
        match update.eta_ms() {
            Some(eta) if self.verbose => log::info!(
                "[{}%] frame {}/{} ({}ms elapsed, ~{}ms remaining)",
                update.percentage(),
                update.frames_processed,
                update.total_frames,
                update.elapsed_ms,
                eta
            ),
            _ => log::info!(
                "[{}%] frame {}/{}",
                update.percentage(),
                update.frames_processed,
                update.total_frames
            ),
        }
    }

    fn report_completion(&self, frames_written: u64, elapsed_ms: u64) {
        log::info!("Processed {} frames in {}ms", frames_written, elapsed_ms);
    }

    fn report_error(&self, error: &str) {
        log::error!("Batch processing failed: {}", error);
    }
}
