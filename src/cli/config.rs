//! Merge command-line flags over an optional JSON configuration file

use crate::backends::video::VideoCodec;
use crate::cli::main_impl::Cli;
use crate::config::{
    BatchConfig, CompositionColor, ModelConfig, ProcessingMode, ReadFailurePolicy, ServiceConfig,
};
use anyhow::{Context, Result};
use std::time::Duration;

/// Everything a CLI run needs, resolved from flags and the config file
#[derive(Debug, Clone)]
pub(crate) struct CliSettings {
    pub(crate) model: ModelConfig,
    pub(crate) batch: BatchConfig,
    /// Explicit output codec; chosen from the mode when absent
    pub(crate) codec: Option<VideoCodec>,
}

impl CliSettings {
    /// Codec used for the output file
    pub(crate) fn output_codec(&self) -> VideoCodec {
        self.codec
            .unwrap_or_else(|| VideoCodec::default_for(self.batch.pipeline.mode.produces_alpha()))
    }
}

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Resolve settings; flags take precedence over the file
    pub(crate) fn from_cli(cli: &Cli) -> Result<CliSettings> {
        let service = match &cli.config {
            Some(path) => ServiceConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        let mut model = match (&cli.model, service.model) {
            (Some(path), Some(mut from_file)) => {
                from_file.path = path.clone();
                from_file
            }
            (Some(path), None) => ModelConfig::new(path),
            (None, Some(from_file)) => from_file,
            (None, None) => {
                anyhow::bail!("No segmentation model given; pass --model or set model.path in --config")
            }
        };

        if let Some(backend) = &cli.backend {
            model.backend = backend.parse().context("Invalid --backend")?;
        }
        if let Some(provider) = &cli.execution_provider {
            model.execution_provider = provider.parse().context("Invalid --execution-provider")?;
        }
        if let Some(layout) = &cli.layout {
            model.layout = layout.parse().context("Invalid --layout")?;
        }
        if let Some(size) = cli.input_size {
            model.input_size = size;
        }
        if cli.threads > 0 {
            model.intra_threads = cli.threads;
        }
        model.validate().context("Invalid model configuration")?;

        let mut batch = service.batch;
        if cli.transparent {
            batch.pipeline.mode = ProcessingMode::FileTransparent;
        }
        if let Some(color) = &cli.color {
            batch.pipeline.color = CompositionColor::from_hex_or_default(Some(color));
        }
        if let Some(secs) = cli.max_duration {
            batch.max_duration =
                Duration::try_from_secs_f64(secs).context("Invalid --max-duration")?;
        }
        if cli.fail_fast {
            batch.read_failure = ReadFailurePolicy::FailFast;
        }
        batch.validate().context("Invalid batch configuration")?;

        let codec = cli
            .codec
            .as_deref()
            .map(str::parse::<VideoCodec>)
            .transpose()
            .context("Invalid --codec")?;

        let settings = CliSettings {
            model,
            batch,
            codec,
        };
        Self::validate(&settings)?;
        Ok(settings)
    }

    fn validate(settings: &CliSettings) -> Result<()> {
        let codec = settings.output_codec();
        if settings.batch.pipeline.mode.produces_alpha() && !codec.supports_alpha() {
            anyhow::bail!(
                "Codec '{}' cannot store transparency; use prores4444 or vp9 with --transparent",
                codec
            );
        }
        Ok(())
    }
}
