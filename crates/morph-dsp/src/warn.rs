//! Diagnostic sink for non-fatal processing anomalies.
//!
//! The engine never aborts on bad numbers; it skips the offending
//! contribution and reports it here. Sinks are injected at construction
//! (default: no-op). Warnings carry no payload so the audio thread never
//! formats or allocates.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Non-fatal anomaly kinds surfaced during processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// NaN or Inf in a host input buffer; sample treated as zero.
    NonFiniteInput,
    /// Spectrum magnitude sum below the numerical floor.
    NearSilentSpectrum,
    /// Transported mass below the floor but positive; scale clamped.
    SmallMass,
    /// Non-finite phase state or phase shift; contribution skipped.
    NonFinitePhase,
    /// Non-finite scale or carrier frequency; mass placement skipped.
    NonFiniteMass,
    /// Interpolated carrier below 30 Hz; contribution attenuated.
    LowFrequency,
    /// Interpolated magnitudes exceeded the transported energy budget.
    EnergyClamp,
    /// Non-finite synthesis sample clamped to zero.
    NonFiniteSynthesis,
}

impl Warning {
    pub fn describe(self) -> &'static str {
        match self {
            Warning::NonFiniteInput => "non-finite input sample",
            Warning::NearSilentSpectrum => "near-silent spectrum",
            Warning::SmallMass => "very small transported mass",
            Warning::NonFinitePhase => "non-finite phase",
            Warning::NonFiniteMass => "non-finite mass placement",
            Warning::LowFrequency => "very low interpolated frequency",
            Warning::EnergyClamp => "interpolated energy clamped",
            Warning::NonFiniteSynthesis => "non-finite synthesis sample",
        }
    }

    pub(crate) const COUNT: usize = 8;

    fn index(self) -> usize {
        match self {
            Warning::NonFiniteInput => 0,
            Warning::NearSilentSpectrum => 1,
            Warning::SmallMass => 2,
            Warning::NonFinitePhase => 3,
            Warning::NonFiniteMass => 4,
            Warning::LowFrequency => 5,
            Warning::EnergyClamp => 6,
            Warning::NonFiniteSynthesis => 7,
        }
    }
}

/// Receiver for processing warnings.
pub trait WarnSink: Send + Sync {
    fn warn(&self, warning: Warning);
}

/// Discards all warnings (the default).
pub struct NullSink;

impl WarnSink for NullSink {
    fn warn(&self, _warning: Warning) {}
}

/// Writes one line per warning to stderr. Not real-time safe; intended
/// for offline tools and debugging.
pub struct StderrSink;

impl WarnSink for StderrSink {
    fn warn(&self, warning: Warning) {
        eprintln!("[morph] warning: {}", warning.describe());
    }
}

/// Counts warnings per kind; real-time safe.
#[derive(Default)]
pub struct CountingSink {
    counts: [AtomicUsize; Warning::COUNT],
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occurrences of one warning kind.
    pub fn count(&self, warning: Warning) -> usize {
        self.counts[warning.index()].load(Ordering::Relaxed)
    }

    /// Total warnings of all kinds.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

impl WarnSink for CountingSink {
    fn warn(&self, warning: Warning) {
        self.counts[warning.index()].fetch_add(1, Ordering::Relaxed);
    }
}
