//! DSP Error Types

use thiserror::Error;

/// Errors that can occur when setting up DSP primitives
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Ramp needs at least 2 steps, got {0}")]
    InvalidStepCount(usize),

    #[error("Ramp step must span at least one frame")]
    ZeroStepLength,
}
