//! In-memory video source and sink

use super::{VideoMetadata, VideoSink, VideoSource};
use crate::{
    error::{BgRemovalError, Result},
    types::{Frame, OutputImage},
};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;

enum Frames {
    /// Pre-built frames, returned in order
    Queued(VecDeque<Frame>),
    /// Frames generated on demand; pixel (0, 0) encodes the frame index
    Synthetic { next: u64 },
}

/// Video source backed by memory
pub struct MemoryVideoSource {
    metadata: VideoMetadata,
    frames: Frames,
    available: u64,
    fail_at: Option<u64>,
    frames_read: u64,
}

impl MemoryVideoSource {
    /// Source yielding `frames` in order; metadata frame count is the vector length
    pub fn new(fps: f64, frames: Vec<Frame>) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| BgRemovalError::video("Memory source needs at least one frame"))?;
        let (width, height) = first.dimensions();
        let count = frames.len() as u64;

        Ok(Self {
            metadata: VideoMetadata::new(width, height, fps, count),
            frames: Frames::Queued(frames.into()),
            available: count,
            fail_at: None,
            frames_read: 0,
        })
    }

    /// Source generating `metadata.frame_count` frames on demand
    ///
    /// Frame `i` has pixel (0, 0) set to `[i % 256, (i / 256) % 256, 0]`,
    /// see [`MemoryVideoSource::frame_index`].
    #[must_use]
    pub fn synthetic(metadata: VideoMetadata) -> Self {
        let available = metadata.frame_count;
        Self {
            metadata,
            frames: Frames::Synthetic { next: 0 },
            available,
            fail_at: None,
            frames_read: 0,
        }
    }

    /// Stop after `count` frames even if metadata claims more
    #[must_use]
    pub fn truncated_to(mut self, count: u64) -> Self {
        self.available = count.min(self.available);
        self
    }

    /// Announce `count` frames in the metadata regardless of how many exist
    #[must_use]
    pub fn reporting_frame_count(mut self, count: u64) -> Self {
        self.metadata.frame_count = count;
        self
    }

    /// Fail the read of frame `index` (0-based)
    #[must_use]
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Successful `read_frame` calls that returned a frame
    #[must_use]
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Recover the index encoded by a synthetic frame
    #[must_use]
    pub fn frame_index(image: &RgbImage) -> u64 {
        let pixel = image.get_pixel(0, 0);
        u64::from(pixel[0]) + u64::from(pixel[1]) * 256
    }

    fn synthetic_frame(&self, index: u64) -> Result<Frame> {
        let marker = Rgb([(index % 256) as u8, ((index / 256) % 256) as u8, 0]);
        let mut image = RgbImage::from_pixel(
            self.metadata.width,
            self.metadata.height,
            Rgb([200, 200, 200]),
        );
        image.put_pixel(0, 0, marker);
        Frame::new(image)
    }
}

impl VideoSource for MemoryVideoSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_at == Some(self.frames_read) {
            return Err(BgRemovalError::video(format!(
                "Simulated decode failure at frame {}",
                self.frames_read
            )));
        }
        if self.frames_read >= self.available {
            return Ok(None);
        }

        let frame = match &mut self.frames {
            Frames::Queued(queue) => queue.pop_front(),
            Frames::Synthetic { next } => {
                let index = *next;
                *next += 1;
                Some(self.synthetic_frame(index)?)
            }
        };

        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }
}

/// Video sink collecting frames in memory
#[derive(Debug, Default)]
pub struct MemoryVideoSink {
    frames: Vec<OutputImage>,
    finished: bool,
    discarded: bool,
}

impl MemoryVideoSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn frames(&self) -> &[OutputImage] {
        &self.frames
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.discarded
    }
}

impl VideoSink for MemoryVideoSink {
    fn write_frame(&mut self, image: &OutputImage) -> Result<()> {
        if self.finished || self.discarded {
            return Err(BgRemovalError::video("Sink is closed"));
        }
        self.frames.push(image.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.frames.clear();
        self.discarded = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.len() as u64
    }
}
