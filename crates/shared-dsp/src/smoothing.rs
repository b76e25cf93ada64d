//! Exponential parameter smoothing.
//!
//! Ramps a control value toward its target to avoid zipper noise when a
//! parameter jumps. `sample_rate` is the rate at which `next()` will be
//! called; the morph engine drives one smoother per blend parameter at
//! its hop rate.

/// Smoothed parameter with exponential ramp.
pub struct SmoothedParam {
    current: f64,
    target: f64,
    /// Coefficient per update: `current += coeff * (target - current)`
    coeff: f64,
}

impl SmoothedParam {
    /// Create a new smoothed parameter.
    ///
    /// `ramp_ms` — time to reach ~63% of target (one time constant).
    /// `sample_rate` — update rate of `next()` in Hz.
    pub fn new(initial: f64, ramp_ms: f64, sample_rate: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: ramp_coeff(ramp_ms, sample_rate),
        }
    }

    /// Set a new target value.
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Get next smoothed value.
    #[inline]
    pub fn next(&mut self) -> f64 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    /// Current value without advancing.
    pub fn value(&self) -> f64 {
        self.current
    }

    /// Snap to a value immediately (e.g. on reset).
    pub fn reset(&mut self, value: f64) {
        self.current = value;
        self.target = value;
    }

    /// Check if smoothing is still active.
    pub fn is_smoothing(&self) -> bool {
        (self.current - self.target).abs() > 1e-8
    }

    /// Update ramp time (e.g. if the update rate changes).
    pub fn set_ramp(&mut self, ramp_ms: f64, sample_rate: f64) {
        self.coeff = ramp_coeff(ramp_ms, sample_rate);
    }
}

fn ramp_coeff(ramp_ms: f64, sample_rate: f64) -> f64 {
    let updates = (ramp_ms / 1000.0) * sample_rate;
    if updates <= 1.0 {
        // Ramp shorter than one update interval: track instantly.
        1.0
    } else {
        1.0 - (-1.0_f64 / updates).exp()
    }
}
