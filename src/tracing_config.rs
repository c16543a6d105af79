//! Subscriber configuration for the command-line frontend
//!
//! The library only emits `tracing` spans and events; binaries call
//! [`TracingConfig::init`] once at startup to decide where they go.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// How events are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored, compact console output
    #[default]
    Console,
    /// Plain compact output for CI logs
    Compact,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Where events are written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// stderr
    #[default]
    Console,
    /// A log file (never rotated)
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// stderr plus a daily-rotated log file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps background log writers alive; drop it at the end of `main`
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Subscriber settings
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Number of `-v` flags
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directive; takes precedence over `verbosity`
    pub env_filter: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive for the configured verbosity
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,video_bgremove=info",
            1 => "info,video_bgremove=debug",
            _ => "trace",
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        let directive = self
            .env_filter
            .clone()
            .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
            .unwrap_or_else(|| self.verbosity_to_filter().to_string());
        Ok(EnvFilter::try_new(directive)?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// Fails on an invalid filter directive or when a global subscriber is
    /// already installed.
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let registry = Registry::default().with(self.filter()?);

        match self.output {
            TracingOutput::Console => {
                match self.format {
                    TracingFormat::Console => registry
                        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
                        .try_init()?,
                    TracingFormat::Compact => registry
                        .with(
                            fmt::layer()
                                .with_writer(std::io::stderr)
                                .with_ansi(false)
                                .with_target(false)
                                .compact(),
                        )
                        .try_init()?,
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => registry
                        .with(
                            fmt::layer()
                                .json()
                                .with_writer(std::io::stderr)
                                .with_current_span(true)
                                .with_span_list(true),
                        )
                        .try_init()?,
                }
                Ok(TracingGuard::default())
            }

            #[cfg(feature = "tracing-files")]
            TracingOutput::File(path) => {
                let (writer, guard) = tracing_appender::non_blocking(file_appender(&path, false));
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer).compact())
                    .try_init()?;
                Ok(TracingGuard { _file: Some(guard) })
            }

            #[cfg(feature = "tracing-files")]
            TracingOutput::Both(path) => {
                let (writer, guard) = tracing_appender::non_blocking(file_appender(&path, true));
                registry
                    .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
                    .with(fmt::layer().with_ansi(false).with_writer(writer).compact())
                    .try_init()?;
                Ok(TracingGuard { _file: Some(guard) })
            }
        }
    }
}

#[cfg(feature = "tracing-files")]
fn file_appender(path: &std::path::Path, rotate: bool) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("video-bgremove.log"));
    if rotate {
        tracing_appender::rolling::daily(dir, name)
    } else {
        tracing_appender::rolling::never(dir, name)
    }
}

/// Install console tracing for the given `-v` count
///
/// # Errors
/// See [`TracingConfig::init`].
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<TracingGuard> {
    TracingConfig::new().with_verbosity(verbosity).init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        let filter = |v| TracingConfig::new().with_verbosity(v).verbosity_to_filter();
        assert_eq!(filter(0), "warn,video_bgremove=info");
        assert_eq!(filter(1), "info,video_bgremove=debug");
        assert_eq!(filter(2), "trace");
        assert_eq!(filter(9), "trace");
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_env_filter("video_bgremove::batch=debug");
        assert!(config.filter().is_ok());
        assert_eq!(config.env_filter.as_deref(), Some("video_bgremove::batch=debug"));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = TracingConfig::new().with_env_filter("video_bgremove=loudest");
        assert!(config.filter().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.format, TracingFormat::Console);
        assert_eq!(config.output, TracingOutput::Console);
        assert!(config.env_filter.is_none());
    }
}
