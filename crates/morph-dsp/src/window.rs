//! Analysis windows for the STFT pipeline.
//!
//! The reassignment analyser needs three views of the same Hann window:
//! the window itself, a time-weighted copy (for reassigned times), and
//! its derivative scaled to a per-second rate (for reassigned
//! frequencies).

use std::f64::consts::PI;

/// Hann window, w[n] = 0.5 * (1 - cos(2 pi n / (W - 1))).
pub fn hann(size: usize) -> Vec<f64> {
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos()))
        .collect()
}

/// Time-weighted Hann: w[n] * (n - (W-1)/2) / sample_rate.
///
/// `Re(X_t/X)` of a spectrum analysed with this window is the reassigned
/// time offset from the frame centre, in seconds.
pub fn hann_time_weighted(size: usize, sample_rate: f64) -> Vec<f64> {
    let center = (size - 1) as f64 / 2.0;
    hann(size)
        .iter()
        .enumerate()
        .map(|(i, w)| w * (i as f64 - center) / sample_rate)
        .collect()
}

/// Hann derivative as a per-second rate: dw/dn * sample_rate.
///
/// `-Im(X_d/X) / (2 pi)` of a spectrum analysed with this window is the
/// reassigned frequency offset from the bin centre.
pub fn hann_derivative(size: usize, sample_rate: f64) -> Vec<f64> {
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| PI / denom * (2.0 * PI * i as f64 / denom).sin() * sample_rate)
        .collect()
}
