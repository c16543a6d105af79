//! Mock segmentation models for testing and benchmarking
//!
//! These produce deterministic probability maps without loading a model
//! file, so pipeline behavior can be exercised in isolation.

use crate::{
    error::{BgRemovalError, Result},
    inference::SegmentationModel,
    types::{NormalizedFrame, ProbabilityMap},
};
use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pattern {
    /// Same probability everywhere
    Constant(f32),
    /// Soft-edged disc in the middle of the input
    CenteredDisc,
    /// Left half foreground, right half background
    LeftHalf,
    /// Foreground where the input pixel is brighter than 0.5
    Brightness,
}

/// Deterministic `SegmentationModel` used by tests and benches
#[derive(Debug)]
pub struct MockSegmentationModel {
    name: &'static str,
    input_size: u32,
    output_size: u32,
    pattern: Pattern,
    delay: Option<Duration>,
    fail_on_call: Option<usize>,
    always_fail: bool,
    calls: AtomicUsize,
}

impl MockSegmentationModel {
    fn with_pattern(name: &'static str, input_size: u32, pattern: Pattern) -> Self {
        Self {
            name,
            input_size,
            output_size: input_size,
            pattern,
            delay: None,
            fail_on_call: None,
            always_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Model reporting `probability` for every pixel
    #[must_use]
    pub fn constant(input_size: u32, probability: f32) -> Self {
        Self::with_pattern("mock-constant", input_size, Pattern::Constant(probability))
    }

    /// Model reporting a disc of foreground centred in the frame
    #[must_use]
    pub fn centered_disc(input_size: u32) -> Self {
        Self::with_pattern("mock-disc", input_size, Pattern::CenteredDisc)
    }

    /// Model reporting the left half of the frame as foreground
    #[must_use]
    pub fn left_half(input_size: u32) -> Self {
        Self::with_pattern("mock-left-half", input_size, Pattern::LeftHalf)
    }

    /// Model treating bright pixels (mean channel > 0.5) as foreground
    #[must_use]
    pub fn brightness(input_size: u32) -> Self {
        Self::with_pattern("mock-brightness", input_size, Pattern::Brightness)
    }

    /// Model whose every inference fails
    #[must_use]
    pub fn failing(input_size: u32) -> Self {
        let mut model = Self::with_pattern("mock-failing", input_size, Pattern::Constant(0.0));
        model.always_fail = true;
        model
    }

    /// Emit maps of a different size than the input (contract violation)
    #[must_use]
    pub fn with_output_size(mut self, output_size: u32) -> Self {
        self.output_size = output_size;
        self
    }

    /// Sleep for `delay` on each inference
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail only the n-th inference (1-based)
    #[must_use]
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Number of times `infer` has been invoked
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn generate(&self, input: &NormalizedFrame) -> Array2<f32> {
        let side = self.output_size as usize;
        match self.pattern {
            Pattern::Constant(p) => Array2::from_elem((side, side), p),
            Pattern::LeftHalf => {
                Array2::from_shape_fn((side, side), |(_, x)| if x < side / 2 { 1.0 } else { 0.0 })
            }
            Pattern::CenteredDisc => {
                let center = side as f32 / 2.0;
                let radius = side as f32 / 3.0;
                Array2::from_shape_fn((side, side), |(y, x)| {
                    let dx = x as f32 + 0.5 - center;
                    let dy = y as f32 + 0.5 - center;
                    let distance = (dx * dx + dy * dy).sqrt();
                    if distance < radius {
                        (0.5 + (radius - distance) / radius).min(1.0)
                    } else {
                        0.0
                    }
                })
            }
            Pattern::Brightness => {
                let tensor = input.tensor();
                let (_, _, height, width) = tensor.dim();
                Array2::from_shape_fn((side, side), |(y, x)| {
                    if y >= height || x >= width {
                        return 0.0;
                    }
                    let mean = (tensor[[0, 0, y, x]] + tensor[[0, 1, y, x]] + tensor[[0, 2, y, x]])
                        / 3.0;
                    if mean > 0.5 {
                        1.0
                    } else {
                        0.0
                    }
                })
            }
        }
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, input: &NormalizedFrame) -> Result<ProbabilityMap> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.always_fail || self.fail_on_call == Some(call) {
            return Err(BgRemovalError::inference_with_model(
                self.name,
                "Inference",
                &format!("simulated failure on call {}", call),
            ));
        }

        if input.size() != self.input_size {
            return Err(BgRemovalError::inference_with_model(
                self.name,
                "Input validation",
                &format!(
                    "expected {}x{} input, got {}x{}",
                    self.input_size,
                    self.input_size,
                    input.size(),
                    input.size()
                ),
            ));
        }

        Ok(ProbabilityMap::new(self.generate(input)))
    }

    fn name(&self) -> &str {
        self.name
    }
}
