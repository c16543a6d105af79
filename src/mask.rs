//! Mask resolution: inference, resize back to frame resolution, binarization

use crate::{
    error::{BgRemovalError, Result},
    inference::SegmentationModel,
    types::{BinaryMask, Frame, NormalizedFrame, ProbabilityMap},
};
use tracing::{debug, instrument};

/// Probability above which a pixel counts as foreground
pub const FOREGROUND_THRESHOLD: f32 = 0.5;

/// Turns model output into a binary mask aligned with the source frame
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskResolver;

impl MaskResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run the model and produce a mask with the frame's exact dimensions
    ///
    /// # Errors
    /// - `Inference` when the model fails or returns a map that does not
    ///   match its input resolution or contains non-finite values
    #[instrument(skip_all, fields(model = %model.name(), width = frame.width(), height = frame.height()))]
    pub fn resolve<M: SegmentationModel + ?Sized>(
        &self,
        frame: &Frame,
        normalized: &NormalizedFrame,
        model: &M,
    ) -> Result<BinaryMask> {
        let probabilities = model.infer(normalized)?;
        Self::validate_probability_map(&probabilities, normalized.size(), model.name())?;

        let (width, height) = frame.dimensions();
        let mask = Self::binarize(&probabilities, width, height)?;
        debug!(
            foreground_ratio = mask.foreground_ratio(),
            "resolved segmentation mask"
        );
        Ok(mask)
    }

    /// Resize a probability map to `width`×`height` and threshold it
    ///
    /// Values strictly greater than [`FOREGROUND_THRESHOLD`] become
    /// foreground; a value of exactly 0.5 is background.
    pub fn binarize(map: &ProbabilityMap, width: u32, height: u32) -> Result<BinaryMask> {
        let (map_width, map_height) = map.dimensions();
        if map_width == 0 || map_height == 0 {
            return Err(BgRemovalError::inference("Probability map is empty"));
        }

        let sampler = BilinearSampler::new(map, width, height);
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(sampler.sample(x, y) > FOREGROUND_THRESHOLD);
            }
        }

        BinaryMask::new(data, (width, height))
    }

    fn validate_probability_map(map: &ProbabilityMap, expected_size: u32, model: &str) -> Result<()> {
        let dimensions = map.dimensions();
        if dimensions != (expected_size, expected_size) {
            return Err(BgRemovalError::inference_with_model(
                model,
                "Output validation",
                &format!(
                    "expected {}x{} probability map, got {}x{}",
                    expected_size, expected_size, dimensions.0, dimensions.1
                ),
            ));
        }

        if let Some(value) = map.values().iter().find(|v| !v.is_finite()) {
            return Err(BgRemovalError::inference_with_model(
                model,
                "Output validation",
                &format!("probability map contains non-finite value {}", value),
            ));
        }

        Ok(())
    }
}

/// Pixel-centre aligned bilinear sampling from map space to frame space
struct BilinearSampler<'a> {
    map: &'a ProbabilityMap,
    scale_x: f32,
    scale_y: f32,
    max_x: f32,
    max_y: f32,
}

impl<'a> BilinearSampler<'a> {
    fn new(map: &'a ProbabilityMap, width: u32, height: u32) -> Self {
        let (map_width, map_height) = map.dimensions();
        Self {
            map,
            scale_x: map_width as f32 / width.max(1) as f32,
            scale_y: map_height as f32 / height.max(1) as f32,
            max_x: (map_width - 1) as f32,
            max_y: (map_height - 1) as f32,
        }
    }

    fn sample(&self, x: u32, y: u32) -> f32 {
        let src_x = ((x as f32 + 0.5) * self.scale_x - 0.5).clamp(0.0, self.max_x);
        let src_y = ((y as f32 + 0.5) * self.scale_y - 0.5).clamp(0.0, self.max_y);

        let x0 = src_x.floor();
        let y0 = src_y.floor();
        let fx = src_x - x0;
        let fy = src_y - y0;
        let x1 = (x0 + 1.0).min(self.max_x);
        let y1 = (y0 + 1.0).min(self.max_y);

        let at = |px: f32, py: f32| self.map.get(px as u32, py as u32).unwrap_or(0.0);

        // Lerp form keeps uniform regions exact, so a flat 0.5 stays 0.5
        let top = lerp(at(x0, y0), at(x1, y0), fx);
        let bottom = lerp(at(x0, y1), at(x1, y1), fx);
        lerp(top, bottom, fy)
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
