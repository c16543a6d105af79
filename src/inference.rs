//! Segmentation model abstraction

use crate::{
    error::Result,
    types::{NormalizedFrame, ProbabilityMap},
};

/// Per-pixel foreground classifier consumed by the pipeline
///
/// Implementations are shared read-only across concurrent callers, so
/// `infer` takes `&self`. A runtime that needs exclusive access while
/// running must serialize internally (see the ONNX backend).
pub trait SegmentationModel: Send + Sync {
    /// Side length of the square input the model expects
    fn input_size(&self) -> u32;

    /// Run inference on a normalized frame
    ///
    /// # Errors
    /// - Model runtime failures
    /// - Output tensors that cannot be read as a probability map
    fn infer(&self, input: &NormalizedFrame) -> Result<ProbabilityMap>;

    /// Human-readable model name for logs
    fn name(&self) -> &str {
        "segmentation-model"
    }
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for std::sync::Arc<M> {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn infer(&self, input: &NormalizedFrame) -> Result<ProbabilityMap> {
        (**self).infer(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Box<M> {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn infer(&self, input: &NormalizedFrame) -> Result<ProbabilityMap> {
        (**self).infer(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
