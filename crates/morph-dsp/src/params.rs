//! Parameter schema for the morph engine.
//!
//! All callers (CLI, plugin hosts, tests) use the same `MorphParams`
//! struct. Uses `#[serde(default)]` so sparse preset JSON loads with
//! defaults for missing keys.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Transport algorithm variant, fixed at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// 1-D optimal transport by CDF inversion over bin magnitudes.
    /// One FFT per frame.
    Cdf,
    /// Spectral reassignment with partial-centred mass grouping and
    /// monotone mass transport. Three FFTs per frame.
    Reassignment,
}

/// Engine configuration. Immutable while streaming; changing any field
/// requires a rebuild of the derived state (buffers, FFT plans, phases).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MorphParams {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Analysis window length in milliseconds (typical 50-100).
    pub window_ms: f64,
    /// Hop divisor D. Hop = W/D (CDF) or W/(2D) (Reassignment).
    pub hop_divisor: u32,
    /// FFT zero-padding multiplier M: fft size = nextPow2(W) * M.
    pub fft_multiplier: u32,
    pub algorithm: Algorithm,
}

impl Default for MorphParams {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            window_ms: 100.0,
            hop_divisor: 4,
            fft_multiplier: 2,
            algorithm: Algorithm::Cdf,
        }
    }
}

/// Ranges for the recognised continuous/stepped parameters (min, max).
/// Values outside are accepted where construction allows them but may
/// degrade quality.
pub fn param_range(key: &str) -> Option<(f64, f64)> {
    match key {
        "sample_rate" => Some((8000.0, 192000.0)),
        "window_ms" => Some((20.0, 200.0)),
        "hop_divisor" => Some((2.0, 8.0)),
        "fft_multiplier" => Some((1.0, 4.0)),
        "k" => Some((0.0, 1.0)),
        _ => None,
    }
}

impl MorphParams {
    /// Parse from JSON. Missing fields get default values.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the fields an engine cannot be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.hop_divisor < 1 {
            return Err(ConfigError::InvalidHopDivisor(self.hop_divisor));
        }
        if self.fft_multiplier < 1 {
            return Err(ConfigError::InvalidFftMultiplier(self.fft_multiplier));
        }
        let samples = (self.window_ms * self.sample_rate / 1000.0).round() as usize;
        if samples < 2 {
            return Err(ConfigError::WindowTooSmall { samples });
        }
        Ok(())
    }
}
