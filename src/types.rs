//! Core data types flowing through the frame pipeline

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, RgbImage, RgbaImage};
use ndarray::{Array2, Array4};

/// Immutable RGB video frame
///
/// Every pipeline stage reads a `Frame` and produces a new value; nothing
/// mutates a frame once it has been constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap an RGB image, rejecting zero-area input
    pub fn new(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_frame(format!(
                "Frame has zero area: {}x{}",
                width, height
            )));
        }
        Ok(Self { image })
    }

    /// Reconstruct a frame from tightly packed RGB bytes
    ///
    /// The buffer length must be exactly `width * height * 3`.
    pub fn from_raw_rgb(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(3))
            .ok_or_else(|| {
                BgRemovalError::invalid_frame(format!(
                    "Frame dimensions overflow: {}x{}",
                    width, height
                ))
            })?;

        if bytes.len() != expected {
            return Err(BgRemovalError::invalid_frame(format!(
                "Frame data size mismatch for {}x{}: expected {} bytes, got {} bytes",
                width,
                height,
                expected,
                bytes.len()
            )));
        }

        let image = RgbImage::from_raw(width, height, bytes).ok_or_else(|| {
            BgRemovalError::invalid_frame(format!(
                "Could not build {}x{} frame from raw buffer",
                width, height
            ))
        })?;
        Self::new(image)
    }

    /// Convert any decoded image into an RGB frame
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self> {
        Self::new(image.to_rgb8())
    }

    /// Frame dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying pixel buffer
    #[must_use]
    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Consume the frame, returning its pixel buffer
    #[must_use]
    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Frame resized to the model's square input and scaled to 0.0..=1.0
///
/// Stored as an NCHW tensor of shape `[1, 3, size, size]`.
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    tensor: Array4<f32>,
    size: u32,
}

impl NormalizedFrame {
    pub(crate) fn from_tensor(tensor: Array4<f32>, size: u32) -> Self {
        Self { tensor, size }
    }

    /// Side length of the square model input
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// NCHW input tensor
    #[must_use]
    pub fn tensor(&self) -> &Array4<f32> {
        &self.tensor
    }
}

/// Per-pixel foreground likelihood at the model's resolution
///
/// Indexed `[row, column]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    values: Array2<f32>,
}

impl ProbabilityMap {
    #[must_use]
    pub fn new(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// Map filled with a single probability
    #[must_use]
    pub fn filled(width: u32, height: u32, probability: f32) -> Self {
        Self::new(Array2::from_elem(
            (height as usize, width as usize),
            probability,
        ))
    }

    /// Map dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        let (rows, cols) = self.values.dim();
        (cols as u32, rows as u32)
    }

    #[must_use]
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Probability at (x, y), if in bounds
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.values.get([y as usize, x as usize]).copied()
    }
}

/// Foreground/background decision per pixel at the frame's resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    data: Vec<bool>,
    dimensions: (u32, u32),
}

impl BinaryMask {
    /// Build a mask from row-major foreground flags
    pub fn new(data: Vec<bool>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgRemovalError::internal(format!(
                "Mask data length {} does not match {}x{}",
                data.len(),
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Mask with every pixel set to the same classification
    #[must_use]
    pub fn filled(width: u32, height: u32, foreground: bool) -> Self {
        Self {
            data: vec![foreground; width as usize * height as usize],
            dimensions: (width, height),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Whether pixel (x, y) is foreground; out-of-range pixels are background
    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return false;
        }
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&fg| fg).count()
    }

    /// Fraction of pixels classified as foreground
    #[must_use]
    pub fn foreground_ratio(&self) -> f64 {
        if self.data.is_empty() {
            0.0
        } else {
            self.foreground_count() as f64 / self.data.len() as f64
        }
    }
}

/// Final composited image
#[derive(Debug, Clone, PartialEq)]
pub enum OutputImage {
    /// Three-channel image with a solid replacement background
    Opaque(RgbImage),
    /// Four-channel image whose background carries alpha 0
    Transparent(RgbaImage),
}

impl OutputImage {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Opaque(image) => image.dimensions(),
            Self::Transparent(image) => image.dimensions(),
        }
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::Transparent(_))
    }

    /// Number of pixels that are visible (alpha > 0 for RGBA, all for RGB)
    #[must_use]
    pub fn opaque_pixel_count(&self) -> usize {
        match self {
            Self::Opaque(image) => image.pixels().count(),
            Self::Transparent(image) => image.pixels().filter(|p| p[3] > 0).count(),
        }
    }

    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Self::Opaque(image) => DynamicImage::ImageRgb8(image),
            Self::Transparent(image) => DynamicImage::ImageRgba8(image),
        }
    }

    #[must_use]
    pub fn to_dynamic(&self) -> DynamicImage {
        self.clone().into_dynamic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_frame_rejects_zero_area() {
        let err = Frame::new(RgbImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidFrame(_)));

        let err = Frame::new(RgbImage::new(10, 0)).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidFrame(_)));
    }

    #[test]
    fn test_frame_from_raw_rgb() {
        let frame = Frame::from_raw_rgb(2, 2, vec![10; 12]).unwrap();
        assert_eq!(frame.dimensions(), (2, 2));
        assert_eq!(frame.as_rgb().get_pixel(1, 1), &Rgb([10, 10, 10]));
    }

    #[test]
    fn test_frame_from_raw_rgb_length_mismatch() {
        let err = Frame::from_raw_rgb(4, 4, vec![0; 47]).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidFrame(_)));
        assert!(err.to_string().contains("expected 48 bytes"));

        let err = Frame::from_raw_rgb(0, 0, Vec::new()).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidFrame(_)));
    }

    #[test]
    fn test_binary_mask_queries() {
        let mask = BinaryMask::new(vec![true, false, false, true], (2, 2)).unwrap();
        assert!(mask.is_foreground(0, 0));
        assert!(!mask.is_foreground(1, 0));
        assert!(mask.is_foreground(1, 1));
        assert!(!mask.is_foreground(5, 5));
        assert_eq!(mask.foreground_count(), 2);
        assert!((mask.foreground_ratio() - 0.5).abs() < f64::EPSILON);

        assert!(BinaryMask::new(vec![true; 3], (2, 2)).is_err());
    }

    #[test]
    fn test_output_image_opaque_pixel_count() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, image::Rgba([1, 2, 3, 255]));
        let output = OutputImage::Transparent(rgba);
        assert!(output.has_alpha());
        assert_eq!(output.opaque_pixel_count(), 1);

        let output = OutputImage::Opaque(RgbImage::new(3, 3));
        assert!(!output.has_alpha());
        assert_eq!(output.opaque_pixel_count(), 9);
    }
}
