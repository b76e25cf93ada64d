//! Spectral interpolation between two analysed frames.
//!
//! Both interpolators consume a frame pair and a blend k in [0, 1] and
//! emit a synthesised complex spectrum, carrying persistent per-bin phase
//! state across frames. When one side is near-silent the transport
//! machinery is bypassed and the audible side is scaled directly.
//!
//! CDF variant: move each source bin toward its transport target,
//! spreading magnitude linearly over the two nearest output bins and
//! blending phases by magnitude weight.
//!
//! Reassignment variant: move whole masses, re-centre them on the
//! rounded interpolated bin, rotate their phases to a propagated carrier
//! phase, and commit next-frame phases where a placement dominates the
//! output bin's amplitude envelope.

use num_complex::Complex;
use std::f64::consts::PI;

use crate::spectral::FrameSpectrum;
use crate::transport::{cdf_transport_map, group_spectrum, transport_plan, SpectralMass, TransportStep};
use crate::warn::{WarnSink, Warning};
use crate::EPS;

/// Carriers below this are attenuated to keep DC-adjacent bins from
/// receiving nonsense phase.
const LOW_FREQ_CUTOFF_HZ: f64 = 30.0;

/// CDF-variant interpolator: transport map over bins, persistent output
/// phases. All scratch is sized at construction.
pub struct CdfInterpolator {
    bins: usize,
    mag_x: Vec<f64>,
    mag_y: Vec<f64>,
    phase_x: Vec<f64>,
    phase_y: Vec<f64>,
    cdf_x: Vec<f64>,
    cdf_y: Vec<f64>,
    map: Vec<usize>,
    mag_out: Vec<f64>,
    phase_out: Vec<f64>,
    weight_sum: Vec<f64>,
    phase_num: Vec<f64>,
    /// Persistent phase state, one entry per bin.
    pub phases: Vec<f64>,
}

impl CdfInterpolator {
    pub fn new(bins: usize) -> Self {
        Self {
            bins,
            mag_x: vec![0.0; bins],
            mag_y: vec![0.0; bins],
            phase_x: vec![0.0; bins],
            phase_y: vec![0.0; bins],
            cdf_x: vec![0.0; bins],
            cdf_y: vec![0.0; bins],
            map: vec![0; bins],
            mag_out: vec![0.0; bins],
            phase_out: vec![0.0; bins],
            weight_sum: vec![0.0; bins],
            phase_num: vec![0.0; bins],
            phases: vec![0.0; bins],
        }
    }

    pub fn reset(&mut self) {
        self.phases.fill(0.0);
    }

    /// Blend `x` (k=0) toward `y` (k=1) into `out`.
    pub fn interpolate(
        &mut self,
        x: &FrameSpectrum,
        y: &FrameSpectrum,
        k: f64,
        out: &mut [Complex<f64>],
        sink: &dyn WarnSink,
    ) {
        let bins = self.bins;
        for i in 0..bins {
            self.mag_x[i] = x.values[i].norm();
            self.mag_y[i] = y.values[i].norm();
            self.phase_x[i] = x.values[i].arg();
            self.phase_y[i] = y.values[i].arg();
        }
        let sum_x: f64 = self.mag_x.iter().sum();
        let sum_y: f64 = self.mag_y.iter().sum();

        // Silent-input shortcut: scale the audible side instead of
        // transporting against noise-floor mass.
        if sum_x < EPS && sum_y < EPS {
            out.fill(Complex::new(0.0, 0.0));
            return;
        }
        if sum_x < EPS {
            sink.warn(Warning::NearSilentSpectrum);
            for i in 0..bins {
                out[i] = y.values[i] * k;
                if self.mag_y[i] > 0.0 {
                    self.phases[i] = self.phase_y[i];
                }
            }
            return;
        }
        if sum_y < EPS {
            sink.warn(Warning::NearSilentSpectrum);
            for i in 0..bins {
                out[i] = x.values[i] * (1.0 - k);
                if self.mag_x[i] > 0.0 {
                    self.phases[i] = self.phase_x[i];
                }
            }
            return;
        }

        cdf_transport_map(
            &self.mag_x,
            &self.mag_y,
            &mut self.cdf_x,
            &mut self.cdf_y,
            &mut self.map,
        );

        self.mag_out.fill(0.0);
        self.phase_num.fill(0.0);
        self.weight_sum.fill(EPS);

        for i in 0..bins {
            let j = self.map[i];
            let pos = (1.0 - k) * i as f64 + k * j as f64;
            let mag = (1.0 - k) * self.mag_x[i] + k * self.mag_y[j];

            let lo = (pos.floor() as usize).min(bins - 1);
            let hi = (pos.ceil() as usize).min(bins - 1);
            let frac = pos - pos.floor();

            let w_lo = (1.0 - frac) * mag;
            self.mag_out[lo] += w_lo;
            self.weight_sum[lo] += w_lo;
            self.phase_num[lo] += w_lo * self.phase_x[i];

            if hi != lo {
                let w_hi = frac * mag;
                self.mag_out[hi] += w_hi;
                self.weight_sum[hi] += w_hi;
                self.phase_num[hi] += w_hi * self.phase_x[i];
            }
        }

        // Keep the transported energy within the blended input budget;
        // many-to-one maps would otherwise multiply target mass.
        let total: f64 = self.mag_out.iter().sum();
        let budget = (1.0 - k) * sum_x + k * sum_y;
        if total > budget + EPS {
            sink.warn(Warning::EnergyClamp);
            let scale = budget / total;
            for m in self.mag_out.iter_mut() {
                *m *= scale;
            }
        }

        for i in 0..bins {
            self.phase_out[i] = if self.weight_sum[i] > EPS {
                self.phase_num[i] / self.weight_sum[i]
            } else {
                self.phase_y[i]
            };
            out[i] = Complex::from_polar(self.mag_out[i], self.phase_out[i]);
        }
        self.phases.copy_from_slice(&self.phase_out);
    }
}

/// Reassignment-variant interpolator: mass transport with propagated
/// carrier phases.
pub struct ReassignInterpolator {
    bins: usize,
    /// Analysis window length in seconds; sets the per-frame phase advance.
    window_secs: f64,
    left_masses: Vec<SpectralMass>,
    right_masses: Vec<SpectralMass>,
    plan: Vec<TransportStep>,
    amplitudes: Vec<f64>,
    next_phases: Vec<f64>,
    /// Carrier frequency committed per output bin (diagnostic track).
    pub freq_out: Vec<f64>,
    /// Persistent phase state, one entry per bin.
    pub phases: Vec<f64>,
}

impl ReassignInterpolator {
    pub fn new(bins: usize, window_secs: f64) -> Self {
        Self {
            bins,
            window_secs,
            // A mass needs at least two bins between rising edges, plus
            // one trailing atom; the plan emits at most L + R steps.
            left_masses: Vec::with_capacity(bins / 2 + 2),
            right_masses: Vec::with_capacity(bins / 2 + 2),
            plan: Vec::with_capacity(bins + 4),
            amplitudes: vec![0.0; bins],
            next_phases: vec![0.0; bins],
            freq_out: vec![0.0; bins],
            phases: vec![0.0; bins],
        }
    }

    pub fn reset(&mut self) {
        self.phases.fill(0.0);
    }

    /// Blend `left` (k=0) toward `right` (k=1) into `out`.
    pub fn interpolate(
        &mut self,
        left: &FrameSpectrum,
        right: &FrameSpectrum,
        k: f64,
        out: &mut [Complex<f64>],
        sink: &dyn WarnSink,
    ) {
        let bins = self.bins;
        let left_sum = left.total_magnitude();
        let right_sum = right.total_magnitude();

        if left_sum < EPS && right_sum < EPS {
            out.fill(Complex::new(0.0, 0.0));
            return;
        }
        if left_sum < EPS {
            sink.warn(Warning::NearSilentSpectrum);
            self.scale_single_side(right, k, out);
            return;
        }
        if right_sum < EPS {
            sink.warn(Warning::NearSilentSpectrum);
            self.scale_single_side(left, 1.0 - k, out);
            return;
        }

        group_spectrum(left, &mut self.left_masses, sink);
        group_spectrum(right, &mut self.right_masses, sink);
        transport_plan(&self.left_masses, &self.right_masses, &mut self.plan);

        out.fill(Complex::new(0.0, 0.0));
        self.amplitudes.fill(0.0);
        self.next_phases.fill(0.0);
        self.freq_out.fill(0.0);

        for t in 0..self.plan.len() {
            let step = self.plan[t];
            let lm = self.left_masses[step.left];
            let rm = self.right_masses[step.right];

            // Rounded interpolated centre, then the effective blend that
            // rounding implies.
            let bi = ((1.0 - k) * lm.center_bin as f64 + k * rm.center_bin as f64).round()
                as usize;
            let k_rounded = if lm.center_bin != rm.center_bin {
                (bi as f64 - lm.center_bin as f64)
                    / (rm.center_bin as f64 - lm.center_bin as f64)
            } else {
                k
            };
            let freq = (1.0 - k_rounded) * left.freq_reassigned[lm.center_bin]
                + k_rounded * right.freq_reassigned[rm.center_bin];

            // Invalid phase state must not poison subsequent frames.
            if !self.phases[bi].is_finite() {
                sink.warn(Warning::NonFinitePhase);
                self.phases[bi] = 0.0;
            }

            // Advance the carrier to the frame centre, then to the next
            // frame; the pi * bin terms account for the centred window.
            let half_window = freq * self.window_secs / 2.0;
            let center_phase = self.phases[bi] + half_window / 2.0 - PI * bi as f64;
            let next_phase = center_phase + half_window / 2.0 + PI * bi as f64;

            let left_scale = if lm.mass > EPS {
                (1.0 - k) * step.mass / lm.mass
            } else if lm.mass > 0.0 {
                sink.warn(Warning::SmallMass);
                1.0 - k
            } else {
                0.0
            };
            let right_scale = if rm.mass > EPS {
                k * step.mass / rm.mass
            } else if rm.mass > 0.0 {
                sink.warn(Warning::SmallMass);
                k
            } else {
                0.0
            };

            self.place_mass(&lm, bi, left_scale, freq, center_phase, left, out, next_phase, sink);
            self.place_mass(&rm, bi, right_scale, freq, center_phase, right, out, next_phase, sink);
        }

        self.phases.copy_from_slice(&self.next_phases);
    }

    /// Shortcut output for a silent opposite side: scaled copy plus a
    /// phase update from the audible spectrum.
    fn scale_single_side(&mut self, side: &FrameSpectrum, scale: f64, out: &mut [Complex<f64>]) {
        for i in 0..self.bins {
            out[i] = side.values[i] * scale;
            let mag = side.values[i].norm();
            if mag > 0.0 {
                self.phases[i] =
                    side.values[i].arg() + side.freq_reassigned[i] * self.window_secs / 2.0;
            }
        }
    }

    /// Copy one mass into the output, shifted so its centre lands on
    /// `center_bin`, phases rotated onto the propagated carrier.
    #[allow(clippy::too_many_arguments)]
    fn place_mass(
        &mut self,
        mass: &SpectralMass,
        center_bin: usize,
        scale: f64,
        freq: f64,
        center_phase: f64,
        input: &FrameSpectrum,
        out: &mut [Complex<f64>],
        next_phase: f64,
        sink: &dyn WarnSink,
    ) {
        if !scale.is_finite() || scale < 0.0 || !freq.is_finite() {
            sink.warn(Warning::NonFiniteMass);
            return;
        }

        let mut scale = scale;
        let hz = (freq / (2.0 * PI)).abs();
        if hz < LOW_FREQ_CUTOFF_HZ {
            let attenuation = (hz / LOW_FREQ_CUTOFF_HZ).powi(2);
            scale *= attenuation;
            if attenuation < 0.5 && scale > 0.001 {
                sink.warn(Warning::LowFrequency);
            }
        }

        let phase_shift = center_phase - input.values[mass.center_bin].arg();
        if !phase_shift.is_finite() {
            sink.warn(Warning::NonFinitePhase);
            return;
        }

        for i in mass.left_bin..mass.right_bin {
            let shifted = i as i64 + center_bin as i64 - mass.center_bin as i64;
            if shifted < 0 || shifted >= self.bins as i64 {
                continue;
            }
            let new_i = shifted as usize;

            let phase = phase_shift + input.values[i].arg();
            let mag = scale * input.values[i].norm();
            if !mag.is_finite() || !phase.is_finite() {
                sink.warn(Warning::NonFiniteMass);
                continue;
            }

            out[new_i] += Complex::from_polar(mag, phase);

            if mag > self.amplitudes[new_i] {
                self.amplitudes[new_i] = mag;
                if next_phase.is_finite() {
                    self.next_phases[new_i] = next_phase;
                } else {
                    sink.warn(Warning::NonFinitePhase);
                }
                self.freq_out[new_i] = freq;
            }
        }
    }
}
