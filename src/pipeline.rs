//! Single-frame processing pipeline
//!
//! Normalizer → mask resolver → compositor. This is the only place where
//! the processing mode is dispatched on; batch and real-time consumers
//! simply pass a [`PipelineConfig`].

use crate::{
    compositor::Compositor,
    config::PipelineConfig,
    error::Result,
    inference::SegmentationModel,
    mask::MaskResolver,
    types::{Frame, OutputImage},
    utils::FrameNormalizer,
};
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, instrument, span, Level};

/// Per-stage wall-clock timings for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTimings {
    pub normalization_ms: u64,
    pub inference_ms: u64,
    pub compositing_ms: u64,
    pub total_ms: u64,
}

/// Turns one frame into an output image using an injected model
///
/// Cloning is cheap: the model handle is shared and the remaining stages
/// are stateless.
#[derive(Clone)]
pub struct FrameProcessingPipeline {
    model: Arc<dyn SegmentationModel>,
    normalizer: FrameNormalizer,
    resolver: MaskResolver,
    compositor: Compositor,
}

impl std::fmt::Debug for FrameProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProcessingPipeline")
            .field("model", &self.model.name())
            .field("input_size", &self.normalizer.target_size())
            .finish()
    }
}

impl FrameProcessingPipeline {
    /// Create a pipeline whose normalizer matches the model's input size
    #[must_use]
    pub fn new(model: Arc<dyn SegmentationModel>) -> Self {
        let normalizer = FrameNormalizer::new(model.input_size());
        Self {
            model,
            normalizer,
            resolver: MaskResolver::new(),
            compositor: Compositor::new(),
        }
    }

    /// Name of the underlying model
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Process one frame
    ///
    /// # Errors
    /// - `InvalidFrame` for unusable frames
    /// - `Inference` when the model fails or violates its output contract
    pub fn process(&self, frame: &Frame, config: &PipelineConfig) -> Result<OutputImage> {
        self.process_timed(frame, config).map(|(output, _)| output)
    }

    /// Process one frame and report per-stage timings
    #[instrument(
        skip(self, frame, config),
        fields(
            model = %self.model.name(),
            mode = %config.mode,
            dimensions = %format!("{}x{}", frame.width(), frame.height())
        )
    )]
    pub fn process_timed(
        &self,
        frame: &Frame,
        config: &PipelineConfig,
    ) -> Result<(OutputImage, FrameTimings)> {
        let mut timings = FrameTimings::default();
        let total_start = Instant::now();

        let normalized = {
            let _span = span!(Level::DEBUG, "normalization", size = self.normalizer.target_size())
                .entered();
            let start = Instant::now();
            let normalized = self.normalizer.normalize(frame)?;
            timings.normalization_ms = start.elapsed().as_millis() as u64;
            normalized
        };

        let mask = {
            let _span = span!(Level::DEBUG, "inference", model = %self.model.name()).entered();
            let start = Instant::now();
            let mask = self.resolver.resolve(frame, &normalized, self.model.as_ref())?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            mask
        };
        drop(normalized);

        let output = {
            let _span = span!(Level::DEBUG, "compositing", mode = %config.mode).entered();
            let start = Instant::now();
            let output = self
                .compositor
                .composite(frame, &mask, config.mode, config.color)?;
            timings.compositing_ms = start.elapsed().as_millis() as u64;
            output
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        debug!(
            normalization_ms = timings.normalization_ms,
            inference_ms = timings.inference_ms,
            compositing_ms = timings.compositing_ms,
            total_ms = timings.total_ms,
            "frame processed"
        );

        Ok((output, timings))
    }
}
