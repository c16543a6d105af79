//! Video background removal CLI
//!
//! Decodes a video, runs every frame through the segmentation pipeline into
//! a PNG sequence, and encodes the sequence into the output file.

use super::config::{CliConfigBuilder, CliSettings};
use crate::{
    backends::{load_model, video::Transcoder},
    batch::{BatchOutcome, BatchVideoProcessor},
    pipeline::FrameProcessingPipeline,
    services::progress::{ProgressReporter, ProgressUpdate},
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

/// Remove or replace the background of a short video
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "video-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input video file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output video file [default: <INPUT>_nobg.<ext> next to the input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Segmentation model (ONNX file)
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Model runtime (onnx, tract)
    #[arg(long)]
    pub backend: Option<String>,

    /// ONNX Runtime execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long)]
    pub execution_provider: Option<String>,

    /// Side length of the square model input
    #[arg(long)]
    pub input_size: Option<u32>,

    /// Model input tensor layout (nchw, nhwc)
    #[arg(long)]
    pub layout: Option<String>,

    /// Keep the alpha channel instead of filling the background
    #[arg(short, long)]
    pub transparent: bool,

    /// Replacement background color as #RRGGBB (malformed codes use white)
    #[arg(short, long)]
    pub color: Option<String>,

    /// Longest accepted video in seconds
    #[arg(long, value_name = "SECONDS")]
    pub max_duration: Option<f64>,

    /// Fail on a mid-stream decode error instead of keeping partial output
    #[arg(long)]
    pub fail_fast: bool,

    /// Output codec (h264, prores4444, vp9) [default: by mode]
    #[arg(long)]
    pub codec: Option<String>,

    /// Path to the ffmpeg executable used for encoding
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of inference threads (0 = runtime default)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let settings = CliConfigBuilder::from_cli(&cli).context("Invalid arguments")?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input, settings.output_codec().extension()));

    info!(
        input = %cli.input.display(),
        output = %output.display(),
        mode = %settings.batch.pipeline.mode,
        "starting"
    );

    let model = {
        let _span = info_span!("model_loading", path = %settings.model.path.display()).entered();
        load_model(&settings.model).context("Failed to load segmentation model")?
    };
    let pipeline = FrameProcessingPipeline::new(model);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current frame");
            on_interrupt.cancel();
        }
    });

    process_video(&cli, settings, pipeline, &output, cancel).await
}

/// `<dir>/<stem>_nobg.<extension>`
fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{}_nobg.{}", stem, extension))
}

#[cfg(feature = "video-support")]
async fn process_video(
    cli: &Cli,
    settings: CliSettings,
    pipeline: FrameProcessingPipeline,
    output: &Path,
    cancel: CancellationToken,
) -> Result<()> {
    use crate::backends::video::{FfmpegVideoSource, FrameSequenceSink, VideoSink};

    let scratch = tempfile::Builder::new()
        .prefix("video-bgremove-")
        .tempdir()
        .context("Failed to create frame directory")?;
    let frames_dir = scratch.path().to_path_buf();
    let input = cli.input.clone();
    let codec = settings.output_codec();

    let processor = BatchVideoProcessor::new(pipeline, settings.batch)?
        .with_progress_reporter(Arc::new(IndicatifProgressReporter::new()));

    // The decoder is opened on the blocking thread that drives it
    let (outcome, sink) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut processor = processor;
        let mut source = FfmpegVideoSource::open(&input)
            .with_context(|| format!("Failed to open {}", input.display()))?;
        let mut sink = FrameSequenceSink::create(&frames_dir)?;
        let outcome = processor.run(&mut source, &mut sink, &cancel)?;
        Ok((outcome, sink))
    })
    .await
    .context("Batch task failed")??;

    let report = match outcome {
        BatchOutcome::Completed(report) => report,
        BatchOutcome::Rejected(reason) => {
            return Err(reason.into_error()).context("Video rejected");
        }
    };

    if let Some(error) = &report.read_error {
        warn!(error = %error, "input ended early; encoding the frames decoded so far");
    }
    if sink.frames_written() == 0 {
        anyhow::bail!("No frames were decoded from {}", cli.input.display());
    }

    Transcoder::new(codec)
        .with_program(&cli.ffmpeg)
        .transcode(&sink.input_pattern(), report.metadata.fps, output)
        .await
        .context("Failed to encode output video")?;

    println!(
        "Wrote {} frame(s) to {} in {:.1}s",
        report.frames_written,
        output.display(),
        report.elapsed.as_secs_f64()
    );
    Ok(())
}

#[cfg(not(feature = "video-support"))]
async fn process_video(
    _cli: &Cli,
    _settings: CliSettings,
    _pipeline: FrameProcessingPipeline,
    _output: &Path,
    _cancel: CancellationToken,
) -> Result<()> {
    anyhow::bail!("Video decoding requires the video-support feature")
}

/// Progress bar over the frames of a batch run
#[derive(Debug)]
#[cfg_attr(not(feature = "video-support"), allow(dead_code))]
pub(crate) struct IndicatifProgressReporter {
    bar: ProgressBar,
}

#[cfg_attr(not(feature = "video-support"), allow(dead_code))]
impl IndicatifProgressReporter {
    pub(crate) fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_started(&self, total_frames: u64, _fps: f64) {
        self.bar.set_length(total_frames);
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if update.frames_processed > self.bar.length().unwrap_or(0) {
            self.bar.set_length(update.frames_processed);
        }
        self.bar.set_position(update.frames_processed);
    }

    fn report_completion(&self, frames_written: u64, _elapsed_ms: u64) {
        self.bar.finish_with_message(format!("{} frames", frames_written));
    }

    fn report_error(&self, error: &str) {
        self.bar.abandon_with_message(error.to_string());
    }
}
