//! Tract segmentation model
//!
//! Pure Rust inference. The optimized plan is immutable and `run` takes
//! `&self`, so one model instance serves concurrent callers directly.

use super::{model_input, probability_map_from_output};
use crate::{
    config::{ModelConfig, TensorLayout},
    error::{BgRemovalError, Result},
    inference::SegmentationModel,
    types::{NormalizedFrame, ProbabilityMap},
};
use instant::Instant;
use ndarray::{ArrayD, IxDyn};
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Segmentation model executed by Tract
#[derive(Debug)]
pub struct TractSegmentationModel {
    model: TractModel,
    input_size: u32,
    layout: TensorLayout,
    name: String,
}

impl TractSegmentationModel {
    /// Load and optimize a model file for a fixed `[1, 3, S, S]` input
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let load_start = Instant::now();
        let name = config
            .path
            .file_stem()
            .map_or_else(|| "tract-model".to_string(), |s| s.to_string_lossy().into_owned());
        let shape = Self::input_shape(config.input_size, config.layout);

        let fail = |stage: &str, e: &dyn std::fmt::Display| {
            BgRemovalError::inference_with_model(&name, stage, &e.to_string())
        };

        let model = onnx()
            .model_for_path(&config.path)
            .map_err(|e| fail("Model loading", &e))?
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(|e| fail("Input shape", &e))?
            .into_optimized()
            .map_err(|e| fail("Optimization", &e))?
            .into_runnable()
            .map_err(|e| fail("Plan creation", &e))?;

        log::info!(
            "Loaded Tract model '{}' ({}x{} input, {:?}) in {:.0}ms",
            name,
            config.input_size,
            config.input_size,
            config.layout,
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            model,
            input_size: config.input_size,
            layout: config.layout,
            name,
        })
    }

    fn input_shape(size: u32, layout: TensorLayout) -> [usize; 4] {
        let side = size as usize;
        match layout {
            TensorLayout::Nchw => [1, 3, side, side],
            TensorLayout::Nhwc => [1, side, side, 3],
        }
    }
}

impl SegmentationModel for TractSegmentationModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, input: &NormalizedFrame) -> Result<ProbabilityMap> {
        let start = Instant::now();
        let array = model_input(input, self.layout);
        let data = array.as_slice().ok_or_else(|| {
            BgRemovalError::internal("Model input tensor is not contiguous")
        })?;

        let tensor = Tensor::from_shape(array.shape(), data).map_err(|e| {
            BgRemovalError::inference_with_model(&self.name, "Tensor conversion", &e.to_string())
        })?;

        let outputs = self.model.run(tvec![tensor.into()]).map_err(|e| {
            BgRemovalError::inference_with_model(&self.name, "Inference", &e.to_string())
        })?;

        let output = outputs.into_iter().next().ok_or_else(|| {
            BgRemovalError::inference_with_model(&self.name, "Output extraction", "no outputs")
        })?;
        let view = output.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference_with_model(&self.name, "Output extraction", &e.to_string())
        })?;

        // Copy through the shape to stay independent of tract's ndarray version
        let owned = ArrayD::from_shape_vec(IxDyn(view.shape()), view.iter().copied().collect())
            .map_err(|e| {
                BgRemovalError::inference_with_model(&self.name, "Output extraction", &e.to_string())
            })?;

        let map = probability_map_from_output(owned.view(), self.layout)?;
        log::debug!(
            "Tract inference: {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(map)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
