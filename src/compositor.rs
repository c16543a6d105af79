//! Compositing of frames and masks into output images

use crate::{
    config::{CompositionColor, ProcessingMode},
    error::{BgRemovalError, Result},
    types::{BinaryMask, Frame, OutputImage},
};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

/// Applies a processing mode's compositing policy to a frame
#[derive(Debug, Clone, Copy, Default)]
pub struct Compositor;

impl Compositor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Combine frame and mask under `mode`
    ///
    /// `color` is only consulted in `FileSolidBackground`.
    ///
    /// # Errors
    /// - `InvalidFrame` when the mask and frame dimensions differ
    pub fn composite(
        &self,
        frame: &Frame,
        mask: &BinaryMask,
        mode: ProcessingMode,
        color: CompositionColor,
    ) -> Result<OutputImage> {
        if mask.dimensions() != frame.dimensions() {
            let (mw, mh) = mask.dimensions();
            let (fw, fh) = frame.dimensions();
            return Err(BgRemovalError::invalid_frame(format!(
                "Mask dimensions {}x{} do not match frame dimensions {}x{}",
                mw, mh, fw, fh
            )));
        }

        let source = frame.as_rgb();
        let (width, height) = frame.dimensions();

        let output = match mode {
            ProcessingMode::FileSolidBackground => {
                let fill = color.to_rgb();
                OutputImage::Opaque(RgbImage::from_fn(width, height, |x, y| {
                    solid_pixel(*source.get_pixel(x, y), mask.is_foreground(x, y), fill)
                }))
            }
            ProcessingMode::FileTransparent | ProcessingMode::RealtimePreview => {
                OutputImage::Transparent(RgbaImage::from_fn(width, height, |x, y| {
                    cutout_pixel(*source.get_pixel(x, y), mask.is_foreground(x, y))
                }))
            }
        };

        Ok(output)
    }
}

/// Foreground keeps the source pixel, background takes the fill color
#[must_use]
pub fn solid_pixel(pixel: Rgb<u8>, foreground: bool, fill: Rgb<u8>) -> Rgb<u8> {
    if foreground {
        pixel
    } else {
        fill
    }
}

/// Foreground becomes fully opaque, background becomes `[0, 0, 0, 0]`
#[must_use]
pub fn cutout_pixel(pixel: Rgb<u8>, foreground: bool) -> Rgba<u8> {
    if foreground {
        Rgba([pixel[0], pixel[1], pixel[2], 255])
    } else {
        Rgba([0, 0, 0, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        Frame::new(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 10) as u8, (y * 10) as u8, 77])
        }))
        .unwrap()
    }

    fn left_half_mask(width: u32, height: u32) -> BinaryMask {
        let data = (0..height)
            .flat_map(|_| (0..width).map(move |x| x < width / 2))
            .collect();
        BinaryMask::new(data, (width, height)).unwrap()
    }

    #[test]
    fn test_solid_background_replaces_background_only() {
        let frame = gradient_frame(6, 4);
        let mask = left_half_mask(6, 4);
        let red = CompositionColor::new(255, 0, 0);

        let output = Compositor::new()
            .composite(&frame, &mask, ProcessingMode::FileSolidBackground, red)
            .unwrap();

        let OutputImage::Opaque(image) = output else {
            panic!("solid background must be opaque");
        };
        assert_eq!(image.get_pixel(1, 2), frame.as_rgb().get_pixel(1, 2));
        assert_eq!(image.get_pixel(4, 2), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_transparent_mode_alpha() {
        let frame = gradient_frame(6, 4);
        let mask = left_half_mask(6, 4);

        let output = Compositor::new()
            .composite(
                &frame,
                &mask,
                ProcessingMode::FileTransparent,
                CompositionColor::WHITE,
            )
            .unwrap();

        let OutputImage::Transparent(image) = output else {
            panic!("transparent mode must carry alpha");
        };
        let fg = image.get_pixel(0, 1);
        assert_eq!(fg[3], 255);
        assert_eq!(&fg.0[..3], &frame.as_rgb().get_pixel(0, 1).0);
        assert_eq!(image.get_pixel(5, 1)[3], 0);
    }

    #[test]
    fn test_transparent_all_foreground_is_fully_opaque() {
        let frame = gradient_frame(5, 5);
        let mask = BinaryMask::filled(5, 5, true);
        let output = Compositor::new()
            .composite(
                &frame,
                &mask,
                ProcessingMode::FileTransparent,
                CompositionColor::WHITE,
            )
            .unwrap();
        assert_eq!(output.opaque_pixel_count(), 25);
    }

    #[test]
    fn test_preview_ignores_color() {
        let frame = gradient_frame(4, 4);
        let mask = BinaryMask::filled(4, 4, false);
        let output = Compositor::new()
            .composite(
                &frame,
                &mask,
                ProcessingMode::RealtimePreview,
                CompositionColor::new(9, 9, 9),
            )
            .unwrap();

        let OutputImage::Transparent(image) = output else {
            panic!("preview must carry alpha");
        };
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let frame = gradient_frame(4, 4);
        let mask = BinaryMask::filled(4, 3, true);
        let err = Compositor::new()
            .composite(
                &frame,
                &mask,
                ProcessingMode::FileSolidBackground,
                CompositionColor::WHITE,
            )
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidFrame(_)));
    }

    #[test]
    fn test_pixel_functions() {
        let pixel = Rgb([1, 2, 3]);
        let fill = Rgb([200, 200, 200]);
        assert_eq!(solid_pixel(pixel, true, fill), pixel);
        assert_eq!(solid_pixel(pixel, false, fill), fill);
        assert_eq!(cutout_pixel(pixel, true), Rgba([1, 2, 3, 255]));
        assert_eq!(cutout_pixel(pixel, false), Rgba([0, 0, 0, 0]));
    }
}
