//! Output codecs and the ffmpeg transcoder
//!
//! A finished PNG frame sequence is turned into a playable file by the
//! `ffmpeg` command-line tool. Transparent output needs an alpha-capable
//! codec; ProRes 4444 in a `.mov` container is the default for it.

use crate::error::{BgRemovalError, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::process::Command;

/// Codec used to encode the output video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 in MP4, no alpha
    H264,
    /// Apple ProRes 4444 in MOV, carries alpha
    ProRes4444,
    /// VP9 in WebM, carries alpha
    Vp9,
}

impl VideoCodec {
    /// FFmpeg encoder name
    #[must_use]
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::ProRes4444 => "prores_ks",
            Self::Vp9 => "libvpx-vp9",
        }
    }

    /// Pixel format passed to the encoder
    #[must_use]
    pub fn pixel_format(self) -> &'static str {
        match self {
            Self::H264 => "yuv420p",
            Self::ProRes4444 => "yuva444p10le",
            Self::Vp9 => "yuva420p",
        }
    }

    /// Container file extension
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::H264 => "mp4",
            Self::ProRes4444 => "mov",
            Self::Vp9 => "webm",
        }
    }

    #[must_use]
    pub fn supports_alpha(self) -> bool {
        matches!(self, Self::ProRes4444 | Self::Vp9)
    }

    /// Default codec for output with or without alpha
    #[must_use]
    pub fn default_for(alpha: bool) -> Self {
        if alpha {
            Self::ProRes4444
        } else {
            Self::H264
        }
    }

    /// Video filter needed before encoding, if any
    ///
    /// 4:2:0 chroma subsampling requires even frame dimensions, so odd
    /// widths and heights are trimmed by one pixel.
    #[must_use]
    pub fn video_filter(self) -> Option<&'static str> {
        match self {
            Self::H264 | Self::Vp9 => Some("scale=trunc(iw/2)*2:trunc(ih/2)*2"),
            Self::ProRes4444 => None,
        }
    }

    fn encoder_args(self) -> &'static [&'static str] {
        match self {
            Self::H264 => &["-preset", "medium", "-crf", "20"],
            // Profile 4 is 4444 with alpha
            Self::ProRes4444 => &["-profile:v", "4"],
            Self::Vp9 => &["-b:v", "0", "-crf", "30"],
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ffmpeg_name())
    }
}

impl FromStr for VideoCodec {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "h264" | "libx264" | "avc" => Ok(Self::H264),
            "prores" | "prores4444" | "prores_ks" => Ok(Self::ProRes4444),
            "vp9" | "libvpx-vp9" => Ok(Self::Vp9),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unsupported video codec: {}",
                other
            ))),
        }
    }
}

/// Encodes a numbered image sequence into a video file via `ffmpeg`
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    codec: VideoCodec,
}

impl Transcoder {
    #[must_use]
    pub fn new(codec: VideoCodec) -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            codec,
        }
    }

    /// Use a specific ffmpeg executable
    #[must_use]
    pub fn with_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    /// Command-line arguments for encoding `input_pattern` at `fps` into `output`
    #[must_use]
    pub fn args(&self, input_pattern: &Path, fps: f64, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-framerate".into(),
            format!("{}", fps).into(),
            "-i".into(),
            input_pattern.as_os_str().to_owned(),
            "-c:v".into(),
            self.codec.ffmpeg_name().into(),
        ];
        args.extend(self.codec.encoder_args().iter().map(OsString::from));
        if let Some(filter) = self.codec.video_filter() {
            args.push("-vf".into());
            args.push(filter.into());
        }
        args.push("-pix_fmt".into());
        args.push(self.codec.pixel_format().into());
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Run ffmpeg and wait for it to finish
    ///
    /// # Errors
    /// - `InvalidConfig` for a non-positive frame rate
    /// - `Video` when ffmpeg cannot be started or exits unsuccessfully
    pub async fn transcode(&self, input_pattern: &Path, fps: f64, output: &Path) -> Result<()> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(BgRemovalError::config_value_error("fps", fps, "greater than zero"));
        }

        let args = self.args(input_pattern, fps, output);
        log::info!(
            "Encoding {} with {} at {:.2} fps",
            output.display(),
            self.codec,
            fps
        );

        let result = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BgRemovalError::video(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(BgRemovalError::video(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
