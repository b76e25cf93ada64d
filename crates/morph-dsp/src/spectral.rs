//! Spectral analysis and synthesis around realfft.
//!
//! Analysis: window the frame, zero-pad to the FFT length centre-aligned,
//! run one (CDF) or three (Reassignment) real-to-complex transforms.
//! Synthesis: complex-to-real transform, extract the centred window-length
//! segment, apply the 1/N normalisation realfft leaves out.
//!
//! Plans and scratch buffers are built once and owned here; nothing on
//! the analysis/synthesis path allocates.

use num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::window;
use crate::EPS;

/// One analysed frame: complex bin values plus per-bin frequency tracks.
///
/// `freq` holds the bin centre frequencies `2 pi i sr / N`. For the CDF
/// variant `freq_reassigned` stays equal to `freq`; the reassignment
/// analyser overwrites it with the instantaneous-frequency estimate.
pub struct FrameSpectrum {
    pub values: Vec<Complex<f64>>,
    pub freq: Vec<f64>,
    pub freq_reassigned: Vec<f64>,
    /// Reassigned time offset from the frame centre, in seconds.
    pub time_reassigned: Vec<f64>,
}

impl FrameSpectrum {
    pub fn new(bins: usize, fft_size: usize, sample_rate: f64) -> Self {
        let freq: Vec<f64> = (0..bins)
            .map(|i| 2.0 * PI * i as f64 * sample_rate / fft_size as f64)
            .collect();
        Self {
            values: vec![Complex::new(0.0, 0.0); bins],
            freq_reassigned: freq.clone(),
            freq,
            time_reassigned: vec![0.0; bins],
        }
    }

    pub fn bins(&self) -> usize {
        self.values.len()
    }

    /// Sum of bin magnitudes.
    pub fn total_magnitude(&self) -> f64 {
        self.values.iter().map(|v| v.norm()).sum()
    }
}

/// Windowed forward transform(s) of an analysis frame.
pub struct SpectralAnalyzer {
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    window_t: Vec<f64>,
    window_d: Vec<f64>,
    reassign: bool,
    window_size: usize,
    pad: usize,
    input: Vec<f64>,
    scratch: Vec<Complex<f64>>,
    spec_t: Vec<Complex<f64>>,
    spec_d: Vec<Complex<f64>>,
}

impl SpectralAnalyzer {
    /// Build an analyser. With `reassign` set, the time-weighted and
    /// derivative windows are prepared and `analyze` fills the
    /// reassigned-frequency and reassigned-time tracks.
    pub fn new(window_size: usize, fft_size: usize, sample_rate: f64, reassign: bool) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = fft.make_scratch_vec();
        let bins = fft_size / 2 + 1;
        let (window_t, window_d, spec_t, spec_d) = if reassign {
            (
                window::hann_time_weighted(window_size, sample_rate),
                window::hann_derivative(window_size, sample_rate),
                vec![Complex::new(0.0, 0.0); bins],
                vec![Complex::new(0.0, 0.0); bins],
            )
        } else {
            (Vec::new(), Vec::new(), Vec::new(), Vec::new())
        };
        Self {
            fft,
            window: window::hann(window_size),
            window_t,
            window_d,
            reassign,
            window_size,
            pad: (fft_size - window_size) / 2,
            input: vec![0.0; fft_size],
            scratch,
            spec_t,
            spec_d,
        }
    }

    fn transform(&mut self, frame: &[f64], win: usize, out: &mut [Complex<f64>]) {
        self.input.fill(0.0);
        let window = match win {
            1 => &self.window_t,
            2 => &self.window_d,
            _ => &self.window,
        };
        for i in 0..self.window_size {
            self.input[self.pad + i] = frame[i] * window[i];
        }
        self.fft
            .process_with_scratch(&mut self.input, out, &mut self.scratch)
            .unwrap();
    }

    /// Analyse one frame into `out`.
    pub fn analyze(&mut self, frame: &[f64], out: &mut FrameSpectrum) {
        let mut values = std::mem::take(&mut out.values);
        self.transform(frame, 0, &mut values);
        out.values = values;

        if !self.reassign {
            return;
        }

        let mut spec_t = std::mem::take(&mut self.spec_t);
        let mut spec_d = std::mem::take(&mut self.spec_d);
        self.transform(frame, 1, &mut spec_t);
        self.transform(frame, 2, &mut spec_d);

        for i in 0..out.bins() {
            let x = out.values[i];
            if x.norm() > EPS {
                out.freq_reassigned[i] = out.freq[i] - (spec_d[i] / x).im / (2.0 * PI);
                out.time_reassigned[i] = (spec_t[i] / x).re;
            } else {
                out.freq_reassigned[i] = out.freq[i];
                out.time_reassigned[i] = 0.0;
            }
        }
        self.spec_t = spec_t;
        self.spec_d = spec_d;
    }
}

/// Inverse transform back to a window-length time frame.
pub struct Synthesizer {
    ifft: Arc<dyn ComplexToReal<f64>>,
    spec: Vec<Complex<f64>>,
    time: Vec<f64>,
    scratch: Vec<Complex<f64>>,
    window_size: usize,
    fft_size: usize,
    pad: usize,
}

impl Synthesizer {
    pub fn new(window_size: usize, fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let ifft = planner.plan_fft_inverse(fft_size);
        let scratch = ifft.make_scratch_vec();
        Self {
            spec: vec![Complex::new(0.0, 0.0); fft_size / 2 + 1],
            time: vec![0.0; fft_size],
            scratch,
            ifft,
            window_size,
            fft_size,
            pad: (fft_size - window_size) / 2,
        }
    }

    /// Inverse transform `spectrum` and write the centred W samples of
    /// the result into `frame_out`, divided by the FFT length.
    pub fn synthesize(&mut self, spectrum: &[Complex<f64>], frame_out: &mut [f64]) {
        self.spec.copy_from_slice(spectrum);
        // realfft requires DC and Nyquist bins to have zero imaginary part
        self.spec[0].im = 0.0;
        let last = self.spec.len() - 1;
        self.spec[last].im = 0.0;

        self.ifft
            .process_with_scratch(&mut self.spec, &mut self.time, &mut self.scratch)
            .unwrap();

        // realfft inverse does not normalize
        let norm = 1.0 / self.fft_size as f64;
        for i in 0..self.window_size {
            frame_out[i] = self.time[self.pad + i] * norm;
        }
    }
}
