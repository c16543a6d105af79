//! Shared frame utilities

pub mod preprocessing;

pub use preprocessing::FrameNormalizer;
