//! Configuration errors.
//!
//! Construction and reconfiguration are the only fallible operations;
//! every runtime path of a built engine is total.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("analysis window of {samples} samples is too small (need at least 2)")]
    WindowTooSmall { samples: usize },

    #[error("hop divisor must be at least 1, got {0}")]
    InvalidHopDivisor(u32),

    #[error("fft multiplier must be at least 1, got {0}")]
    InvalidFftMultiplier(u32),
}
