//! Services separating presentation concerns from processing logic

pub mod format;
pub mod progress;

pub use format::OutputFormatHandler;
pub use progress::{LogProgressReporter, NoOpProgressReporter, ProgressReporter, ProgressUpdate};
