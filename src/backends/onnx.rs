//! ONNX Runtime segmentation model
//!
//! `Session::run` needs exclusive access, so the session is kept behind a
//! mutex and concurrent callers are serialized.

use super::{model_input, probability_map_from_output};
use crate::{
    config::{ExecutionProvider, ModelConfig, TensorLayout},
    error::{BgRemovalError, Result},
    inference::SegmentationModel,
    types::{NormalizedFrame, ProbabilityMap},
};
use instant::Instant;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::sync::Mutex;

/// Segmentation model executed by ONNX Runtime
#[derive(Debug)]
pub struct OnnxSegmentationModel {
    session: Mutex<Session>,
    input_size: u32,
    layout: TensorLayout,
    name: String,
}

impl OnnxSegmentationModel {
    /// Load a model file with the configured execution provider and threading
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let load_start = Instant::now();
        let name = config
            .path
            .file_stem()
            .map_or_else(|| "onnx-model".to_string(), |s| s.to_string_lossy().into_owned());

        let builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let builder = Self::configure_provider(builder, config.execution_provider)?;

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(&config.path)
            .map_err(|e| {
                BgRemovalError::inference_with_model(
                    &name,
                    "Model loading",
                    &format!("{} ({e})", config.path.display()),
                )
            })?;

        log::info!(
            "Loaded ONNX model '{}' ({}x{} input, {:?}) in {:.0}ms",
            name,
            config.input_size,
            config.input_size,
            config.layout,
            load_start.elapsed().as_secs_f64() * 1000.0
        );
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!("  - Intra-op threads: {intra_threads}");

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            layout: config.layout,
            name,
        })
    }

    fn configure_provider(
        builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let cuda_available =
            || OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available = || {
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
        };

        let mut providers = Vec::new();
        match provider {
            ExecutionProvider::Auto => {
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
            }
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            }
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            }
        }

        if providers.is_empty() {
            return Ok(builder);
        }
        builder.with_execution_providers(providers).map_err(|e| {
            BgRemovalError::inference(format!("Failed to set execution providers: {e}"))
        })
    }
}

impl SegmentationModel for OnnxSegmentationModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, input: &NormalizedFrame) -> Result<ProbabilityMap> {
        let start = Instant::now();

        let input_value = Value::from_array(model_input(input, self.layout)).map_err(|e| {
            BgRemovalError::inference_with_model(&self.name, "Tensor conversion", &e.to_string())
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BgRemovalError::internal("ONNX session mutex poisoned"))?;

        // Positional inputs and outputs avoid depending on tensor names
        let outputs = session.run(ort::inputs![input_value]).map_err(|e| {
            BgRemovalError::inference_with_model(&self.name, "Inference", &e.to_string())
        })?;

        let first_key = outputs.keys().next().ok_or_else(|| {
            BgRemovalError::inference_with_model(&self.name, "Output extraction", "no outputs")
        })?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| {
                BgRemovalError::inference_with_model(
                    &self.name,
                    "Output extraction",
                    "first output tensor not found",
                )
            })?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgRemovalError::inference_with_model(&self.name, "Output extraction", &e.to_string())
            })?;

        let map = probability_map_from_output(output, self.layout)?;
        log::debug!(
            "ONNX inference: {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(map)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file() {
        let config = ModelConfig::new("/nonexistent/segmentation.onnx");
        let err = OnnxSegmentationModel::from_config(&config).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }
}
