//! Video sources and sinks
//!
//! The batch processor reads frames from a [`VideoSource`] and appends
//! composited frames to a [`VideoSink`]. Container and codec handling stays
//! behind these traits: an FFmpeg-backed decoder (feature `video-support`),
//! in-memory implementations for tests, and a PNG frame-sequence sink that
//! the [`codec::Transcoder`] turns into a playable file.

pub mod codec;
#[cfg(feature = "video-support")]
pub mod ffmpeg;
pub mod memory;
pub mod sequence;

pub use codec::{Transcoder, VideoCodec};
#[cfg(feature = "video-support")]
pub use ffmpeg::FfmpegVideoSource;
pub use memory::{MemoryVideoSink, MemoryVideoSource};
pub use sequence::FrameSequenceSink;

use crate::{
    error::{BgRemovalError, Result},
    types::{Frame, OutputImage},
};
use std::time::Duration;

/// Stream-level properties of a video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Total number of frames reported by the container
    pub frame_count: u64,
    /// Codec name as reported by the decoder
    pub codec: String,
}

impl VideoMetadata {
    #[must_use]
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_count,
            codec: "rawvideo".to_string(),
        }
    }

    /// `frame_count / fps`
    ///
    /// # Errors
    /// - `Video` when the frame rate is not a positive finite number
    pub fn duration(&self) -> Result<Duration> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(BgRemovalError::video(format!(
                "Invalid frame rate {} reported by source",
                self.fps
            )));
        }
        Duration::try_from_secs_f64(self.frame_count as f64 / self.fps).map_err(|e| {
            BgRemovalError::video(format!(
                "Cannot compute duration of {} frames at {} fps: {}",
                self.frame_count, self.fps, e
            ))
        })
    }
}

/// Ordered, finite sequence of decoded frames
pub trait VideoSource {
    /// Metadata available before any frame is read
    fn metadata(&self) -> &VideoMetadata;

    /// Next frame in presentation order, or `None` once exhausted
    ///
    /// # Errors
    /// - `Video` when decoding fails mid-stream
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Ordered destination for composited frames
pub trait VideoSink {
    /// Append a frame after all previously written frames
    fn write_frame(&mut self, image: &OutputImage) -> Result<()>;

    /// Flush and close the output
    fn finish(&mut self) -> Result<()>;

    /// Drop everything written so far
    fn discard(&mut self) -> Result<()>;

    /// Frames accepted so far
    fn frames_written(&self) -> u64;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn metadata(&self) -> &VideoMetadata {
        (**self).metadata()
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        (**self).read_frame()
    }
}

impl<K: VideoSink + ?Sized> VideoSink for Box<K> {
    fn write_frame(&mut self, image: &OutputImage) -> Result<()> {
        (**self).write_frame(image)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }

    fn discard(&mut self) -> Result<()> {
        (**self).discard()
    }

    fn frames_written(&self) -> u64 {
        (**self).frames_written()
    }
}
