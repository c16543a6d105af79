//! PNG frame-sequence sink
//!
//! Frames are written as `frame_000000.png`, `frame_000001.png`, ... so a
//! transcoder can consume them with an `%06d` input pattern.

use super::VideoSink;
use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    services::OutputFormatHandler,
    types::OutputImage,
};
use std::path::{Path, PathBuf};

/// printf-style pattern understood by ffmpeg's image2 demuxer
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// Writes each frame as a numbered PNG into a directory
#[derive(Debug)]
pub struct FrameSequenceSink {
    directory: PathBuf,
    written: Vec<PathBuf>,
    has_alpha: Option<bool>,
    finished: bool,
}

impl FrameSequenceSink {
    /// Create the sink, creating `directory` if needed
    pub fn create<P: Into<PathBuf>>(directory: P) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)
            .map_err(|e| BgRemovalError::file_io_error("create frame directory", &directory, &e))?;
        Ok(Self {
            directory,
            written: Vec::new(),
            has_alpha: None,
            finished: false,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Input pattern for a transcoder
    #[must_use]
    pub fn input_pattern(&self) -> PathBuf {
        self.directory.join(FRAME_PATTERN)
    }

    /// Paths of frames written so far, in order
    #[must_use]
    pub fn frame_paths(&self) -> &[PathBuf] {
        &self.written
    }

    /// Whether the written frames carry alpha (None before the first frame)
    #[must_use]
    pub fn has_alpha(&self) -> Option<bool> {
        self.has_alpha
    }

    fn frame_path(&self, index: usize) -> PathBuf {
        self.directory.join(format!("frame_{:06}.png", index))
    }
}

impl VideoSink for FrameSequenceSink {
    fn write_frame(&mut self, image: &OutputImage) -> Result<()> {
        if self.finished {
            return Err(BgRemovalError::video("Frame sequence already finished"));
        }

        match self.has_alpha {
            None => self.has_alpha = Some(image.has_alpha()),
            Some(alpha) if alpha != image.has_alpha() => {
                return Err(BgRemovalError::video(
                    "Cannot mix opaque and transparent frames in one sequence",
                ));
            }
            Some(_) => {}
        }

        let path = self.frame_path(self.written.len());
        let encoded = OutputFormatHandler::encode(image, OutputFormat::Png, 100)?;
        if let Err(e) = std::fs::write(&path, encoded) {
            // Never leave a truncated frame behind for the transcoder
            if path.is_file() {
                if let Err(remove_error) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove partial frame {}: {}", path.display(), remove_error);
                }
            }
            return Err(BgRemovalError::file_io_error("write frame", &path, &e));
        }

        self.written.push(path);
        if self.written.len() % 30 == 0 {
            log::debug!("Wrote {} frames to {}", self.written.len(), self.directory.display());
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        log::info!(
            "Frame sequence complete: {} frames in {}",
            self.written.len(),
            self.directory.display()
        );
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        for path in self.written.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to remove frame {}: {}", path.display(), e);
            }
        }
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{RgbImage, RgbaImage};

    #[test]
    fn test_failed_write_leaves_no_frame() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        let mut sink = FrameSequenceSink::create(&frames).unwrap();

        std::fs::remove_dir(&frames).unwrap();
        let err = sink
            .write_frame(&OutputImage::Opaque(RgbImage::new(4, 2)))
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Io(_)));
        assert_eq!(sink.frames_written(), 0);

        // A later successful write reuses the same index
        std::fs::create_dir(&frames).unwrap();
        sink.write_frame(&OutputImage::Opaque(RgbImage::new(4, 2)))
            .unwrap();
        assert_eq!(sink.frame_paths(), &[frames.join("frame_000000.png")]);

        sink.discard().unwrap();
        assert_eq!(std::fs::read_dir(&frames).unwrap().count(), 0);
    }

    #[test]
    fn test_writes_numbered_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FrameSequenceSink::create(dir.path().join("frames")).unwrap();

        for _ in 0..3 {
            sink.write_frame(&OutputImage::Transparent(RgbaImage::new(4, 2)))
                .unwrap();
        }
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 3);
        assert_eq!(sink.has_alpha(), Some(true));
        let last = dir.path().join("frames").join("frame_000002.png");
        assert!(last.exists());

        let decoded = image::open(&last).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
        assert!(sink
            .input_pattern()
            .to_string_lossy()
            .ends_with("frame_%06d.png"));
    }

    #[test]
    fn test_rejects_mixed_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FrameSequenceSink::create(dir.path()).unwrap();
        sink.write_frame(&OutputImage::Opaque(RgbImage::new(2, 2)))
            .unwrap();
        let err = sink
            .write_frame(&OutputImage::Transparent(RgbaImage::new(2, 2)))
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Video(_)));
    }

    #[test]
    fn test_discard_removes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FrameSequenceSink::create(dir.path()).unwrap();
        sink.write_frame(&OutputImage::Opaque(RgbImage::new(2, 2)))
            .unwrap();
        let path = sink.frame_paths()[0].clone();

        sink.discard().unwrap();
        assert!(!path.exists());
        assert_eq!(sink.frames_written(), 0);
    }
}
