use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Timepoints handled by one worker in a single kernel invocation.
pub const PROCESSING_CHUNK_SIZE: usize = 100_000;
/// Context read on each side of a chunk so boundary events see full clips.
pub const PROCESSING_CHUNK_OVERLAP_SIZE: usize = 1_000;

/// Configuration for the fit stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Template length T, also the minimum separation between kept events (default: 50)
    pub clip_size: usize,
    /// Smallest shell handed to template computation (default: 150)
    pub min_shell_size: usize,
    /// Peak amplitude bin width used to define shells (default: 2.0)
    pub shell_increment: f64,
    /// Chunk length in timepoints (default: 100000)
    pub chunk_size: usize,
    /// Overlap read on each side of a chunk (default: 1000)
    pub overlap_size: usize,
    /// Worker threads, 0 lets rayon decide (default: 0)
    pub num_threads: usize,
    /// Reject candidates whose score is below this fraction of the squared
    /// template norm. `None` keeps only the score > 0 rule (default: None)
    pub min_improvement_fraction: Option<f64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            clip_size: 50,
            min_shell_size: 150,
            shell_increment: 2.0,
            chunk_size: PROCESSING_CHUNK_SIZE,
            overlap_size: PROCESSING_CHUNK_OVERLAP_SIZE,
            num_threads: 0,
            min_improvement_fraction: None,
        }
    }
}

impl FitOptions {
    pub fn with_clip_size(mut self, clip_size: usize) -> Self {
        self.clip_size = clip_size;
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, overlap_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap_size = overlap_size;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.clip_size == 0 {
            return Err(FitError::InvalidOptions("clip_size must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(FitError::InvalidOptions("chunk_size must be at least 1".into()));
        }
        if self.overlap_size < self.clip_size {
            return Err(FitError::InvalidOptions(format!(
                "overlap_size ({}) must be at least clip_size ({})",
                self.overlap_size, self.clip_size
            )));
        }
        if !(self.shell_increment > 0.0) {
            return Err(FitError::InvalidOptions(format!(
                "shell_increment must be positive, got {}",
                self.shell_increment
            )));
        }
        if let Some(f) = self.min_improvement_fraction {
            if !(f >= 0.0) {
                return Err(FitError::InvalidOptions(format!(
                    "min_improvement_fraction must be non-negative, got {}",
                    f
                )));
            }
        }
        Ok(())
    }

    /// Chunk and overlap sizes actually used for a series of `num_timepoints`:
    /// a series shorter than one chunk is processed as a single chunk without
    /// overlap.
    pub fn chunking_for(&self, num_timepoints: usize) -> (usize, usize) {
        if num_timepoints < self.chunk_size {
            (num_timepoints, 0)
        } else {
            (self.chunk_size, self.overlap_size)
        }
    }
}
