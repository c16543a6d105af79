//! Configuration types for the frame pipeline and its consumers

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Compositing policy applied to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingMode {
    /// Opaque output, background replaced by a solid color
    FileSolidBackground,
    /// RGBA output, background fully transparent
    FileTransparent,
    /// Foreground only, background left transparent/zero without a color fill
    RealtimePreview,
}

impl ProcessingMode {
    /// Whether this mode is valid for batch file processing
    #[must_use]
    pub fn is_file_mode(self) -> bool {
        matches!(self, Self::FileSolidBackground | Self::FileTransparent)
    }

    /// Whether output of this mode carries an alpha channel
    #[must_use]
    pub fn produces_alpha(self) -> bool {
        matches!(self, Self::FileTransparent | Self::RealtimePreview)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileSolidBackground => "file-solid-background",
            Self::FileTransparent => "file-transparent",
            Self::RealtimePreview => "realtime-preview",
        }
    }
}

impl Default for ProcessingMode {
    fn default() -> Self {
        Self::FileSolidBackground
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file-solid-background" | "solid" => Ok(Self::FileSolidBackground),
            "file-transparent" | "transparent" => Ok(Self::FileTransparent),
            "realtime-preview" | "preview" => Ok(Self::RealtimePreview),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown processing mode '{}'",
                other
            ))),
        }
    }
}

/// Solid replacement background color
///
/// Serialized as a `#RRGGBB` string. Malformed codes deserialize to white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CompositionColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl CompositionColor {
    pub const WHITE: Self = Self::new(255, 255, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#RRGGBB` or `RRGGBB` color code
    ///
    /// # Errors
    /// Returns `UnsupportedColor` for anything other than six hex digits.
    pub fn parse_hex(code: &str) -> Result<Self> {
        let hex = code.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);

        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BgRemovalError::unsupported_color(code));
        }

        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| BgRemovalError::unsupported_color(code))
        };

        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Parse an optional color code, falling back to white
    ///
    /// Malformed codes are recovered here and never surface to the caller.
    #[must_use]
    pub fn from_hex_or_default(code: Option<&str>) -> Self {
        match code {
            None => Self::default(),
            Some(code) => Self::parse_hex(code).unwrap_or_else(|e| {
                log::debug!("{}; falling back to white background", e);
                Self::default()
            }),
        }
    }

    /// Hex representation with a leading `#`
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    #[must_use]
    pub fn to_rgb(self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }
}

impl Default for CompositionColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<String> for CompositionColor {
    fn from(code: String) -> Self {
        Self::from_hex_or_default(Some(&code))
    }
}

impl From<CompositionColor> for String {
    fn from(color: CompositionColor) -> Self {
        color.to_hex()
    }
}

impl std::fmt::Display for CompositionColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Per-call pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: ProcessingMode,
    #[serde(default)]
    pub color: CompositionColor,
}

impl PipelineConfig {
    #[must_use]
    pub fn new(mode: ProcessingMode, color: CompositionColor) -> Self {
        Self { mode, color }
    }

    #[must_use]
    pub fn realtime_preview() -> Self {
        Self::new(ProcessingMode::RealtimePreview, CompositionColor::default())
    }
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{}'",
                other
            ))),
        }
    }
}

/// Model runtime used to back the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract (pure Rust)
    Tract,
}

impl FromStr for BackendType {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown backend '{}'",
                other
            ))),
        }
    }
}

/// Memory layout of the model's input and output tensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 3, H, W]` (PyTorch-style exports)
    #[default]
    Nchw,
    /// `[1, H, W, 3]` (Keras/TensorFlow exports)
    Nhwc,
}

impl FromStr for TensorLayout {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nchw" => Ok(Self::Nchw),
            "nhwc" => Ok(Self::Nhwc),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown tensor layout '{}'",
                other
            ))),
        }
    }
}

/// Where and how to load the segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to an ONNX model file
    pub path: PathBuf,
    #[serde(default)]
    pub backend: BackendType,
    /// Side length of the square model input
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub layout: TensorLayout,
    #[serde(default)]
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    #[serde(default)]
    pub intra_threads: usize,
}

fn default_input_size() -> u32 {
    512
}

impl ModelConfig {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            backend: BackendType::default(),
            input_size: default_input_size(),
            layout: TensorLayout::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(BgRemovalError::config_value_error(
                "model input_size",
                self.input_size,
                "1 or more",
            ));
        }
        Ok(())
    }
}

/// What to do when the video source fails mid-stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadFailurePolicy {
    /// Stop reading and finish with the frames written so far
    #[default]
    KeepPartial,
    /// Fail the whole run and discard output
    FailFast,
}

/// Batch video processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Longest video accepted by the pre-flight check
    #[serde(with = "duration_secs", default = "default_max_duration")]
    pub max_duration: Duration,
    #[serde(default)]
    pub read_failure: ReadFailurePolicy,
}

fn default_max_duration() -> Duration {
    Duration::from_secs(10)
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            max_duration: default_max_duration(),
            read_failure: ReadFailurePolicy::default(),
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.pipeline.mode.is_file_mode() {
            return Err(BgRemovalError::invalid_config(format!(
                "Batch processing requires a file mode, got '{}'",
                self.pipeline.mode
            )));
        }
        if self.max_duration.is_zero() {
            return Err(BgRemovalError::config_value_error(
                "max_duration",
                "0s",
                "greater than zero",
            ));
        }
        Ok(())
    }
}

/// Builder for `BatchConfig`
#[derive(Debug, Default)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    #[must_use]
    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.config.pipeline.mode = mode;
        self
    }

    #[must_use]
    pub fn color(mut self, color: CompositionColor) -> Self {
        self.config.pipeline.color = color;
        self
    }

    /// Set the color from an optional hex code (malformed codes become white)
    #[must_use]
    pub fn color_hex(mut self, code: Option<&str>) -> Self {
        self.config.pipeline.color = CompositionColor::from_hex_or_default(code);
        self
    }

    #[must_use]
    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.config.max_duration = max_duration;
        self
    }

    #[must_use]
    pub fn read_failure(mut self, policy: ReadFailurePolicy) -> Self {
        self.config.read_failure = policy;
        self
    }

    pub fn build(self) -> Result<BatchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Encoded image format for relay output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency; background renders black)
    Jpeg,
    /// Lossless WebP with alpha channel transparency
    WebP,
}

impl FromStr for OutputFormat {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown output format '{}'",
                other
            ))),
        }
    }
}

/// Real-time relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Advisory per-frame latency budget
    #[serde(with = "duration_secs", default = "default_frame_budget")]
    pub frame_budget: Duration,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// JPEG quality (0-100, only used for JPEG output)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Capacity of the per-session response channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_frame_budget() -> Duration {
    Duration::from_millis(500)
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_channel_capacity() -> usize {
    8
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            frame_budget: default_frame_budget(),
            output_format: OutputFormat::default(),
            jpeg_quality: default_jpeg_quality(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(BgRemovalError::config_value_error(
                "jpeg_quality",
                self.jpeg_quality,
                "0-100",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(BgRemovalError::config_value_error(
                "channel_capacity",
                self.channel_capacity,
                "1 or more",
            ));
        }
        Ok(())
    }
}

/// Output artifact retention configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Directory holding batch output artifacts
    pub directory: PathBuf,
    #[serde(with = "duration_secs", default = "default_sweep_period")]
    pub interval: Duration,
    #[serde(with = "duration_secs", default = "default_sweep_period")]
    pub retention: Duration,
}

fn default_sweep_period() -> Duration {
    Duration::from_secs(300)
}

impl SweepConfig {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            interval: default_sweep_period(),
            retention: default_sweep_period(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(BgRemovalError::config_value_error(
                "sweep interval",
                "0s",
                "greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::new("output")
    }
}

/// Aggregate service configuration, loadable from JSON
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl ServiceConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BgRemovalError::invalid_config(format!("Malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(model) = &self.model {
            model.validate()?;
        }
        self.batch.validate()?;
        self.relay.validate()?;
        self.sweep.validate()
    }
}

/// Serialize durations as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
