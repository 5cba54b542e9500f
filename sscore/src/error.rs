//! Error types for the fit stage.

use thiserror::Error;

/// Errors raised by the fit stage. All of them abort the run; there is no
/// partial-result mode.
#[derive(Debug, Error)]
pub enum FitError {
    /// Timeseries and template tensor disagree on the number of channels.
    #[error("channel mismatch: timeseries has {timeseries} channels, templates have {templates}")]
    ChannelMismatch { timeseries: usize, templates: usize },

    /// Event times handed to the kernel or selector are not ascending.
    #[error("event times are not ascending at position {index} ({previous} > {current})")]
    UnsortedTimes {
        index: usize,
        previous: i64,
        current: i64,
    },

    /// Option values that cannot drive a fit.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// An event carries a label for which no template exists.
    #[error("label {label} out of range: only {num_templates} templates available")]
    LabelOutOfRange { label: usize, num_templates: usize },

    /// A read request that leaves the bounds of the source.
    #[error("read out of bounds: [{start}, {end}) requested from a source of length {len}")]
    ReadOutOfBounds { start: usize, end: usize, len: usize },

    /// Fault reported by a timeseries source (I/O layer).
    #[error("timeseries source failed: {0}")]
    Source(String),

    /// The worker pool could not be created.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
