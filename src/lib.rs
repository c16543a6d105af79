#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Video Background Removal
//!
//! Segmentation-driven background removal for short videos and live
//! preview streams.
//!
//! Every frame goes through one pipeline:
//!
//! 1. **Normalize**: resize to the model's square input and scale to `[0, 1]`
//! 2. **Segment**: the injected [`SegmentationModel`] returns per-pixel
//!    foreground probabilities
//! 3. **Resolve**: resample the probabilities to frame size and threshold
//!    them (`p > 0.5` is foreground)
//! 4. **Composite**: replace the background with a solid color, or make it
//!    transparent
//!
//! Two consumers drive the pipeline:
//!
//! - [`BatchVideoProcessor`] processes a whole video file frame by frame,
//!   after a pre-flight duration check
//! - [`RealtimeFrameRelay`] processes single frames from a streaming client
//!   and returns encoded preview images
//!
//! ## Features
//!
//! - `onnx` (default): ONNX Runtime model backend with GPU execution providers
//! - `tract` (default): pure Rust model backend
//! - `video-support` (default): FFmpeg-backed video decoding
//! - `webp-support` (default): WebP relay output
//! - `cli` (default): the `video-bgremove` command-line tool
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use video_bgremove::{
//!     backends::MockSegmentationModel, CompositionColor, Frame, FrameProcessingPipeline,
//!     PipelineConfig, ProcessingMode,
//! };
//!
//! # fn main() -> video_bgremove::Result<()> {
//! let pipeline = FrameProcessingPipeline::new(Arc::new(MockSegmentationModel::centered_disc(64)));
//! let frame = Frame::from_raw_rgb(4, 4, vec![128; 4 * 4 * 3])?;
//!
//! let config = PipelineConfig::new(
//!     ProcessingMode::FileSolidBackground,
//!     CompositionColor::parse_hex("#00FF00")?,
//! );
//! let output = pipeline.process(&frame, &config)?;
//! assert_eq!(output.dimensions(), (4, 4));
//! # Ok(())
//! # }
//! ```
//!
//! Real models are loaded with [`backends::load_model`] from a
//! [`ModelConfig`].

pub mod backends;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod mask;
pub mod pipeline;
pub mod realtime;
pub mod services;
pub mod sweep;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use backends::load_model;
pub use batch::{
    run_blocking_task, BatchOutcome, BatchReport, BatchState, BatchVideoProcessor,
    RejectionReason,
};
pub use compositor::Compositor;
pub use config::{
    BackendType, BatchConfig, CompositionColor, ExecutionProvider, ModelConfig, OutputFormat,
    PipelineConfig, ProcessingMode, ReadFailurePolicy, RelayConfig, ServiceConfig, SweepConfig,
    TensorLayout,
};
pub use error::{BgRemovalError, Result};
pub use inference::SegmentationModel;
pub use mask::{MaskResolver, FOREGROUND_THRESHOLD};
pub use pipeline::{FrameProcessingPipeline, FrameTimings};
pub use realtime::{FrameMessage, RealtimeFrameRelay, RelayResponse, RelaySession};
pub use services::{LogProgressReporter, NoOpProgressReporter, OutputFormatHandler, ProgressReporter};
pub use sweep::{ArtifactSweeper, SweepReport};
pub use types::{BinaryMask, Frame, NormalizedFrame, OutputImage, ProbabilityMap};
pub use utils::FrameNormalizer;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};
