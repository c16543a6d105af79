//! FFmpeg-backed video decoding
//!
//! Decodes the best video stream of a container with `ffmpeg-next` and
//! converts each frame to packed RGB24.

use super::{VideoMetadata, VideoSource};
use crate::{
    error::{BgRemovalError, Result},
    types::Frame,
};
use ffmpeg_next as ffmpeg;
use std::path::Path;

/// Pull-based decoder over a video file
pub struct FfmpegVideoSource {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    stream_index: usize,
    metadata: VideoMetadata,
    eof_sent: bool,
    frame_number: u64,
}

impl FfmpegVideoSource {
    /// Open a video file and read its metadata
    ///
    /// When the container does not report a frame count it is estimated
    /// from the stream duration and average frame rate.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        ffmpeg::init()
            .map_err(|e| BgRemovalError::video(format!("Failed to initialize FFmpeg: {}", e)))?;

        let input = ffmpeg::format::input(path).map_err(|e| {
            BgRemovalError::video(format!(
                "Failed to open video file {}: {}",
                path.display(),
                e
            ))
        })?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| BgRemovalError::video("No video stream found in file"))?;
        let stream_index = stream.index();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| BgRemovalError::video(format!("Failed to create codec context: {}", e)))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| BgRemovalError::video(format!("Failed to create video decoder: {}", e)))?;

        let fps = f64::from(stream.avg_frame_rate());
        let frame_count = match u64::try_from(stream.frames()) {
            Ok(frames) if frames > 0 => frames,
            _ => {
                let seconds = if stream.duration() > 0 {
                    stream.duration() as f64 * f64::from(stream.time_base())
                } else {
                    // Container duration is in AV_TIME_BASE (microsecond) units
                    input.duration() as f64 / 1_000_000.0
                };
                log::debug!(
                    "Container reports no frame count; estimating from {:.2}s at {:.2} fps",
                    seconds,
                    fps
                );
                (seconds * fps).round().max(0.0) as u64
            }
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            frame_count,
            codec: decoder
                .codec()
                .map_or_else(|| "unknown".to_string(), |c| c.name().to_string()),
        };

        log::info!(
            "Opened {}: {}x{} @ {:.2} fps, {} frames ({})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.frame_count,
            metadata.codec
        );

        Ok(Self {
            input,
            decoder,
            scaler: None,
            stream_index,
            metadata,
            eof_sent: false,
            frame_number: 0,
        })
    }

    fn rgb_scaler(
        format: ffmpeg::format::Pixel,
        width: u32,
        height: u32,
    ) -> Result<ffmpeg::software::scaling::Context> {
        ffmpeg::software::scaling::Context::get(
            format,
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| BgRemovalError::video(format!("Failed to create frame scaler: {}", e)))
    }

    fn convert_frame(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let width = decoded.width();
        let height = decoded.height();

        // Built on the first frame; rebuilt if the stream switches geometry
        let reusable = self.scaler.as_ref().is_some_and(|scaler| {
            let input = scaler.input();
            input.format == decoded.format() && input.width == width && input.height == height
        });
        if !reusable {
            log::debug!("Creating RGB scaler for {}x{} {:?}", width, height, decoded.format());
            self.scaler = Some(Self::rgb_scaler(decoded.format(), width, height)?);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Frame scaler missing"))?;

        let mut rgb = ffmpeg::frame::Video::empty();
        scaler
            .run(decoded, &mut rgb)
            .map_err(|e| BgRemovalError::video(format!("Failed to convert frame to RGB: {}", e)))?;

        // Rows are padded to the stride; copy only the visible bytes
        let data = rgb.data(0);
        let stride = rgb.stride(0);
        let row_bytes = width as usize * 3;
        let mut packed = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let row = data.get(start..start + row_bytes).ok_or_else(|| {
                BgRemovalError::video(format!("Decoded frame row {} is truncated", y))
            })?;
            packed.extend_from_slice(row);
        }

        Frame::from_raw_rgb(width, height, packed)
    }
}

impl VideoSource for FfmpegVideoSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.frame_number += 1;
                return self.convert_frame(&decoded).map(Some);
            }
            if self.eof_sent {
                log::debug!("Decoder drained after {} frames", self.frame_number);
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet).map_err(|e| {
                            BgRemovalError::video(format!(
                                "Failed to decode packet after frame {}: {}",
                                self.frame_number, e
                            ))
                        })?;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof().map_err(|e| {
                        BgRemovalError::video(format!("Failed to flush decoder: {}", e))
                    })?;
                    self.eof_sent = true;
                }
                Err(e) => {
                    return Err(BgRemovalError::video(format!(
                        "Failed to read packet after frame {}: {}",
                        self.frame_number, e
                    )));
                }
            }
        }
    }
}
