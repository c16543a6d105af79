//! Segmentation model runtimes and video I/O
//!
//! - ONNX Runtime adapter (GPU acceleration, feature `onnx`)
//! - Tract adapter (pure Rust, feature `tract`)
//! - Deterministic mock model for tests and benchmarks
//! - Video sources and sinks

pub mod mock;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "tract")]
pub mod tract;
pub mod video;

pub use self::mock::MockSegmentationModel;
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxSegmentationModel;
#[cfg(feature = "tract")]
pub use self::tract::TractSegmentationModel;

use crate::{
    config::ModelConfig,
    error::{BgRemovalError, Result},
    inference::SegmentationModel,
};
#[cfg(any(feature = "onnx", feature = "tract"))]
use crate::{
    config::{BackendType, TensorLayout},
    types::{NormalizedFrame, ProbabilityMap},
};
#[cfg(any(feature = "onnx", feature = "tract"))]
use ndarray::{Array4, ArrayViewD, Axis, Ix2};
use std::sync::Arc;

/// Load the model described by `config` with the configured runtime
///
/// # Errors
/// - `InvalidConfig` when the requested runtime is not compiled in
/// - `Inference` when the model file cannot be loaded
pub fn load_model(config: &ModelConfig) -> Result<Arc<dyn SegmentationModel>> {
    config.validate()?;
    match config.backend {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Arc::new(OnnxSegmentationModel::from_config(config)?)),
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Arc::new(TractSegmentationModel::from_config(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(BgRemovalError::invalid_config(format!(
            "Backend {:?} is not enabled in this build",
            other
        ))),
    }
}

/// Arrange a normalized frame for a model expecting `layout`
#[cfg(any(feature = "onnx", feature = "tract"))]
pub(crate) fn model_input(input: &NormalizedFrame, layout: TensorLayout) -> Array4<f32> {
    match layout {
        TensorLayout::Nchw => input.tensor().clone(),
        TensorLayout::Nhwc => input
            .tensor()
            .view()
            .permuted_axes([0, 2, 3, 1])
            .as_standard_layout()
            .into_owned(),
    }
}

/// Extract the foreground probability plane from a model output tensor
///
/// Accepts `[H, W]`, `[N, H, W]` and 4-D outputs. For 4-D outputs channel 0
/// is taken; the channel axis is the one of size 1 when only one is, and
/// otherwise follows `layout`.
#[cfg(any(feature = "onnx", feature = "tract"))]
pub(crate) fn probability_map_from_output(
    output: ArrayViewD<'_, f32>,
    layout: TensorLayout,
) -> Result<ProbabilityMap> {
    let shape = output.shape().to_vec();
    let plane = match shape.as_slice() {
        [h, w] if *h > 0 && *w > 0 => output,
        [n, h, w] if *n > 0 && *h > 0 && *w > 0 => output.index_axis_move(Axis(0), 0),
        [n, d1, d2, d3] if *n > 0 && *d1 > 0 && *d2 > 0 && *d3 > 0 => {
            let channels_last = match (*d1, *d3) {
                (1, c) if c != 1 => false,
                (c, 1) if c != 1 => true,
                _ => layout == TensorLayout::Nhwc,
            };
            let batch = output.index_axis_move(Axis(0), 0);
            if channels_last {
                batch.index_axis_move(Axis(2), 0)
            } else {
                batch.index_axis_move(Axis(0), 0)
            }
        }
        _ => {
            return Err(BgRemovalError::inference(format!(
                "Unsupported model output shape {:?}",
                shape
            )));
        }
    };

    let plane = plane
        .into_dimensionality::<Ix2>()
        .map_err(|e| BgRemovalError::inference(format!("Failed to read model output: {}", e)))?;
    Ok(ProbabilityMap::new(plane.to_owned()))
}
