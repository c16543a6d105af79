//! Frame normalization for model inference

use crate::{
    error::{BgRemovalError, Result},
    types::{Frame, NormalizedFrame},
};
use image::imageops::FilterType;
use ndarray::Array4;

/// Resizes frames to the model's square input and rescales channels to 0.0..=1.0
#[derive(Debug, Clone, Copy)]
pub struct FrameNormalizer {
    target_size: u32,
    filter: FilterType,
}

impl FrameNormalizer {
    /// Normalizer for a model with the given square input size
    ///
    /// Uses bilinear (triangle) filtering.
    #[must_use]
    pub fn new(target_size: u32) -> Self {
        Self {
            target_size,
            filter: FilterType::Triangle,
        }
    }

    /// Use a different resampling filter
    ///
    /// Nearest-neighbour loses too much detail for segmentation and is
    /// replaced by `Triangle`.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = match filter {
            FilterType::Nearest => FilterType::Triangle,
            other => other,
        };
        self
    }

    #[must_use]
    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Resize and rescale a frame into an NCHW tensor
    ///
    /// The frame is stretched to the square input; the mask is later
    /// resized back to the original resolution, undoing the stretch.
    ///
    /// # Errors
    /// - `InvalidFrame` for zero-area frames
    /// - `InvalidConfig` when the target size is zero
    pub fn normalize(&self, frame: &Frame) -> Result<NormalizedFrame> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_frame(format!(
                "Cannot normalize zero-area frame {}x{}",
                width, height
            )));
        }
        if self.target_size == 0 {
            return Err(BgRemovalError::invalid_config(
                "Model input size must be greater than zero",
            ));
        }

        let size = self.target_size;
        let resized;
        let source = if (width, height) == (size, size) {
            frame.as_rgb()
        } else {
            resized = image::imageops::resize(frame.as_rgb(), size, size, self.filter);
            &resized
        };

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor allocated to match the resized image
        for (y, row) in source.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                tensor[[0, 0, y, x]] = f32::from(pixel[0]) / 255.0;
                tensor[[0, 1, y, x]] = f32::from(pixel[1]) / 255.0;
                tensor[[0, 2, y, x]] = f32::from(pixel[2]) / 255.0;
            }
        }

        Ok(NormalizedFrame::from_tensor(tensor, size))
    }
}
