//! Streaming morph engines.
//!
//! Pipeline per engine: framing buffer -> spectral analysis (main and
//! sidechain) -> transport plan -> spectral interpolation -> overlap-add.
//! The two algorithm variants are independent engine kinds behind a thin
//! dispatcher enum, so the hot path stays monomorphic.
//!
//! `process` is allocation-free and total: construction builds every FFT
//! plan and scratch buffer, and reconfiguration rebuilds them (off the
//! audio thread).

use num_complex::Complex;
use std::sync::Arc;

use shared_dsp::SmoothedParam;

use crate::error::ConfigError;
use crate::framer::Framer;
use crate::interpolate::{CdfInterpolator, ReassignInterpolator};
use crate::ola::OverlapAdd;
use crate::params::{Algorithm, MorphParams};
use crate::spectral::{FrameSpectrum, SpectralAnalyzer, Synthesizer};
use crate::warn::{NullSink, WarnSink, Warning};
use crate::window;

/// Blend smoothing time constant. Applied at the hop rate; constant-k
/// streams are unaffected.
const K_RAMP_MS: f64 = 15.0;

/// Sizes derived from [`MorphParams`]; recomputed on every
/// reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Analysis window W in samples, rounded up to a multiple of 2D.
    pub window_size: usize,
    /// Hop H: W/D for CDF, W/(2D) for Reassignment.
    pub hop_size: usize,
    /// FFT length N = nextPow2(W) * M.
    pub fft_size: usize,
    /// Bin count B = N/2 + 1.
    pub bins: usize,
}

impl Layout {
    pub fn derive(params: &MorphParams) -> Result<Layout, ConfigError> {
        params.validate()?;
        let raw = (params.window_ms * params.sample_rate / 1000.0).round() as usize;
        let d = params.hop_divisor as usize;
        let align = 2 * d;
        let window_size = raw + (align - raw % align) % align;
        let hop_size = match params.algorithm {
            Algorithm::Cdf => window_size / d,
            Algorithm::Reassignment => window_size / (2 * d),
        };
        let fft_size = window_size.next_power_of_two() * params.fft_multiplier as usize;
        Ok(Layout {
            window_size,
            hop_size,
            fft_size,
            bins: fft_size / 2 + 1,
        })
    }
}

/// CDF-variant engine: one FFT per input per frame, bin-level transport.
pub struct CdfEngine {
    params: MorphParams,
    layout: Layout,
    window: Vec<f64>,
    framer: Framer,
    analyzer: SpectralAnalyzer,
    synth: Synthesizer,
    main_spec: FrameSpectrum,
    side_spec: FrameSpectrum,
    interp: CdfInterpolator,
    out_spec: Vec<Complex<f64>>,
    frame_main: Vec<f64>,
    frame_side: Vec<f64>,
    synth_frame: Vec<f64>,
    ola: OverlapAdd,
    k_smooth: SmoothedParam,
    k_primed: bool,
    sink: Arc<dyn WarnSink>,
}

impl CdfEngine {
    pub fn new(params: &MorphParams) -> Result<Self, ConfigError> {
        Self::with_sink(params, Arc::new(NullSink))
    }

    pub fn with_sink(params: &MorphParams, sink: Arc<dyn WarnSink>) -> Result<Self, ConfigError> {
        let mut params = params.clone();
        params.algorithm = Algorithm::Cdf;
        let layout = Layout::derive(&params)?;
        let win = window::hann(layout.window_size);
        let weights: Vec<f64> = win.iter().map(|w| w * w).collect();
        let hop_rate = params.sample_rate / layout.hop_size as f64;
        Ok(Self {
            window: win,
            framer: Framer::new(layout.window_size, layout.hop_size),
            analyzer: SpectralAnalyzer::new(
                layout.window_size,
                layout.fft_size,
                params.sample_rate,
                false,
            ),
            synth: Synthesizer::new(layout.window_size, layout.fft_size),
            main_spec: FrameSpectrum::new(layout.bins, layout.fft_size, params.sample_rate),
            side_spec: FrameSpectrum::new(layout.bins, layout.fft_size, params.sample_rate),
            interp: CdfInterpolator::new(layout.bins),
            out_spec: vec![Complex::new(0.0, 0.0); layout.bins],
            frame_main: vec![0.0; layout.window_size],
            frame_side: vec![0.0; layout.window_size],
            synth_frame: vec![0.0; layout.window_size],
            ola: OverlapAdd::new(layout.window_size, layout.hop_size, &weights),
            k_smooth: SmoothedParam::new(0.0, K_RAMP_MS, hop_rate),
            k_primed: false,
            params,
            layout,
            sink,
        })
    }

    pub fn params(&self) -> &MorphParams {
        &self.params
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Delay between an input sample entering `process` and its
    /// contribution first appearing in the output: one analysis window
    /// minus one sample, constant between configuration changes.
    pub fn latency_samples(&self) -> usize {
        self.layout.window_size - 1
    }

    /// Morph `main_in` toward `sidechain_in` into `out`. All slices must
    /// have equal length; `k` is clamped to [0, 1].
    pub fn process(&mut self, main_in: &[f32], sidechain_in: &[f32], out: &mut [f32], k: f32) {
        debug_assert_eq!(main_in.len(), out.len());
        debug_assert_eq!(sidechain_in.len(), out.len());
        self.set_blend(k);
        for ((&m, &s), o) in main_in.iter().zip(sidechain_in).zip(out.iter_mut()) {
            *o = self.step(m, s);
        }
    }

    /// In-place variant of [`CdfEngine::process`]: `main_io` is consumed
    /// as the main input and overwritten with the output.
    pub fn process_in_place(&mut self, main_io: &mut [f32], sidechain_in: &[f32], k: f32) {
        debug_assert_eq!(sidechain_in.len(), main_io.len());
        self.set_blend(k);
        for (m, &s) in main_io.iter_mut().zip(sidechain_in) {
            *m = self.step(*m, s);
        }
    }

    pub fn reset(&mut self) {
        self.framer.reset();
        self.ola.reset();
        self.interp.reset();
        self.k_smooth.reset(0.0);
        self.k_primed = false;
    }

    /// Rebuilds all derived state; allocates, so keep it off the audio
    /// thread. Window duration, hop divisor and FFT multiplier are
    /// preserved.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<(), ConfigError> {
        let mut params = self.params.clone();
        params.sample_rate = sample_rate;
        *self = Self::with_sink(&params, Arc::clone(&self.sink))?;
        Ok(())
    }

    pub fn set_window_ms(&mut self, window_ms: f64) -> Result<(), ConfigError> {
        let mut params = self.params.clone();
        params.window_ms = window_ms;
        *self = Self::with_sink(&params, Arc::clone(&self.sink))?;
        Ok(())
    }

    fn set_blend(&mut self, k: f32) {
        let k = (k as f64).clamp(0.0, 1.0);
        if !self.k_primed {
            self.k_smooth.reset(k);
            self.k_primed = true;
        }
        self.k_smooth.set_target(k);
    }

    #[inline]
    fn sanitize(&self, x: f32) -> f64 {
        if x.is_finite() {
            x as f64
        } else {
            self.sink.warn(Warning::NonFiniteInput);
            0.0
        }
    }

    #[inline]
    fn step(&mut self, main: f32, side: f32) -> f32 {
        let m = self.sanitize(main);
        let s = self.sanitize(side);
        if self.framer.push(m, s) {
            self.process_hop();
        }
        self.ola.pop() as f32
    }

    fn process_hop(&mut self) {
        let k = self.k_smooth.next();
        self.framer
            .frames_into(&mut self.frame_main, &mut self.frame_side);
        self.analyzer.analyze(&self.frame_main, &mut self.main_spec);
        self.analyzer.analyze(&self.frame_side, &mut self.side_spec);
        self.interp.interpolate(
            &self.main_spec,
            &self.side_spec,
            k,
            &mut self.out_spec,
            self.sink.as_ref(),
        );
        self.synth.synthesize(&self.out_spec, &mut self.synth_frame);
        // Synthesis window for the overlap-add; clamp anything the
        // interpolator let through.
        for (v, &w) in self.synth_frame.iter_mut().zip(&self.window) {
            *v *= w;
            if !v.is_finite() {
                *v = 0.0;
                self.sink.warn(Warning::NonFiniteSynthesis);
            }
        }
        self.ola.add_frame(&self.synth_frame);
    }
}

/// Reassignment-variant engine: three FFTs per input per frame, mass
/// transport with phase propagation.
pub struct ReassignmentEngine {
    params: MorphParams,
    layout: Layout,
    framer: Framer,
    analyzer: SpectralAnalyzer,
    synth: Synthesizer,
    main_spec: FrameSpectrum,
    side_spec: FrameSpectrum,
    interp: ReassignInterpolator,
    out_spec: Vec<Complex<f64>>,
    frame_main: Vec<f64>,
    frame_side: Vec<f64>,
    synth_frame: Vec<f64>,
    ola: OverlapAdd,
    k_smooth: SmoothedParam,
    k_primed: bool,
    sink: Arc<dyn WarnSink>,
}

impl ReassignmentEngine {
    pub fn new(params: &MorphParams) -> Result<Self, ConfigError> {
        Self::with_sink(params, Arc::new(NullSink))
    }

    pub fn with_sink(params: &MorphParams, sink: Arc<dyn WarnSink>) -> Result<Self, ConfigError> {
        let mut params = params.clone();
        params.algorithm = Algorithm::Reassignment;
        let layout = Layout::derive(&params)?;
        // No synthesis window on this variant: the overlap sum of the
        // analysis Hann alone normalises the hop overlap.
        let weights = window::hann(layout.window_size);
        let window_secs = layout.window_size as f64 / params.sample_rate;
        let hop_rate = params.sample_rate / layout.hop_size as f64;
        Ok(Self {
            framer: Framer::new(layout.window_size, layout.hop_size),
            analyzer: SpectralAnalyzer::new(
                layout.window_size,
                layout.fft_size,
                params.sample_rate,
                true,
            ),
            synth: Synthesizer::new(layout.window_size, layout.fft_size),
            main_spec: FrameSpectrum::new(layout.bins, layout.fft_size, params.sample_rate),
            side_spec: FrameSpectrum::new(layout.bins, layout.fft_size, params.sample_rate),
            interp: ReassignInterpolator::new(layout.bins, window_secs),
            out_spec: vec![Complex::new(0.0, 0.0); layout.bins],
            frame_main: vec![0.0; layout.window_size],
            frame_side: vec![0.0; layout.window_size],
            synth_frame: vec![0.0; layout.window_size],
            ola: OverlapAdd::new(layout.window_size, layout.hop_size, &weights),
            k_smooth: SmoothedParam::new(0.0, K_RAMP_MS, hop_rate),
            k_primed: false,
            params,
            layout,
            sink,
        })
    }

    pub fn params(&self) -> &MorphParams {
        &self.params
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// See [`CdfEngine::latency_samples`].
    pub fn latency_samples(&self) -> usize {
        self.layout.window_size - 1
    }

    pub fn process(&mut self, main_in: &[f32], sidechain_in: &[f32], out: &mut [f32], k: f32) {
        debug_assert_eq!(main_in.len(), out.len());
        debug_assert_eq!(sidechain_in.len(), out.len());
        self.set_blend(k);
        for ((&m, &s), o) in main_in.iter().zip(sidechain_in).zip(out.iter_mut()) {
            *o = self.step(m, s);
        }
    }

    pub fn process_in_place(&mut self, main_io: &mut [f32], sidechain_in: &[f32], k: f32) {
        debug_assert_eq!(sidechain_in.len(), main_io.len());
        self.set_blend(k);
        for (m, &s) in main_io.iter_mut().zip(sidechain_in) {
            *m = self.step(*m, s);
        }
    }

    pub fn reset(&mut self) {
        self.framer.reset();
        self.ola.reset();
        self.interp.reset();
        self.k_smooth.reset(0.0);
        self.k_primed = false;
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<(), ConfigError> {
        let mut params = self.params.clone();
        params.sample_rate = sample_rate;
        *self = Self::with_sink(&params, Arc::clone(&self.sink))?;
        Ok(())
    }

    pub fn set_window_ms(&mut self, window_ms: f64) -> Result<(), ConfigError> {
        let mut params = self.params.clone();
        params.window_ms = window_ms;
        *self = Self::with_sink(&params, Arc::clone(&self.sink))?;
        Ok(())
    }

    fn set_blend(&mut self, k: f32) {
        let k = (k as f64).clamp(0.0, 1.0);
        if !self.k_primed {
            self.k_smooth.reset(k);
            self.k_primed = true;
        }
        self.k_smooth.set_target(k);
    }

    #[inline]
    fn sanitize(&self, x: f32) -> f64 {
        if x.is_finite() {
            x as f64
        } else {
            self.sink.warn(Warning::NonFiniteInput);
            0.0
        }
    }

    #[inline]
    fn step(&mut self, main: f32, side: f32) -> f32 {
        let m = self.sanitize(main);
        let s = self.sanitize(side);
        if self.framer.push(m, s) {
            self.process_hop();
        }
        self.ola.pop() as f32
    }

    fn process_hop(&mut self) {
        let k = self.k_smooth.next();
        self.framer
            .frames_into(&mut self.frame_main, &mut self.frame_side);
        self.analyzer.analyze(&self.frame_main, &mut self.main_spec);
        self.analyzer.analyze(&self.frame_side, &mut self.side_spec);
        self.interp.interpolate(
            &self.main_spec,
            &self.side_spec,
            k,
            &mut self.out_spec,
            self.sink.as_ref(),
        );
        self.synth.synthesize(&self.out_spec, &mut self.synth_frame);
        for v in self.synth_frame.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
                self.sink.warn(Warning::NonFiniteSynthesis);
            }
        }
        self.ola.add_frame(&self.synth_frame);
    }
}

/// Algorithm dispatcher. Selection happens once, at construction or
/// explicit reconfiguration; processing delegates to the chosen engine.
pub enum MorphEngine {
    Cdf(CdfEngine),
    Reassignment(ReassignmentEngine),
}

impl MorphEngine {
    pub fn new(params: &MorphParams) -> Result<Self, ConfigError> {
        Self::with_sink(params, Arc::new(NullSink))
    }

    pub fn with_sink(params: &MorphParams, sink: Arc<dyn WarnSink>) -> Result<Self, ConfigError> {
        Ok(match params.algorithm {
            Algorithm::Cdf => MorphEngine::Cdf(CdfEngine::with_sink(params, sink)?),
            Algorithm::Reassignment => {
                MorphEngine::Reassignment(ReassignmentEngine::with_sink(params, sink)?)
            }
        })
    }

    pub fn params(&self) -> &MorphParams {
        match self {
            MorphEngine::Cdf(e) => e.params(),
            MorphEngine::Reassignment(e) => e.params(),
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            MorphEngine::Cdf(e) => e.layout(),
            MorphEngine::Reassignment(e) => e.layout(),
        }
    }

    pub fn latency_samples(&self) -> usize {
        match self {
            MorphEngine::Cdf(e) => e.latency_samples(),
            MorphEngine::Reassignment(e) => e.latency_samples(),
        }
    }

    pub fn process(&mut self, main_in: &[f32], sidechain_in: &[f32], out: &mut [f32], k: f32) {
        match self {
            MorphEngine::Cdf(e) => e.process(main_in, sidechain_in, out, k),
            MorphEngine::Reassignment(e) => e.process(main_in, sidechain_in, out, k),
        }
    }

    pub fn process_in_place(&mut self, main_io: &mut [f32], sidechain_in: &[f32], k: f32) {
        match self {
            MorphEngine::Cdf(e) => e.process_in_place(main_io, sidechain_in, k),
            MorphEngine::Reassignment(e) => e.process_in_place(main_io, sidechain_in, k),
        }
    }

    pub fn reset(&mut self) {
        match self {
            MorphEngine::Cdf(e) => e.reset(),
            MorphEngine::Reassignment(e) => e.reset(),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<(), ConfigError> {
        match self {
            MorphEngine::Cdf(e) => e.set_sample_rate(sample_rate),
            MorphEngine::Reassignment(e) => e.set_sample_rate(sample_rate),
        }
    }

    pub fn set_window_ms(&mut self, window_ms: f64) -> Result<(), ConfigError> {
        match self {
            MorphEngine::Cdf(e) => e.set_window_ms(window_ms),
            MorphEngine::Reassignment(e) => e.set_window_ms(window_ms),
        }
    }

    /// Switch algorithm variants; rebuilds the engine.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) -> Result<(), ConfigError> {
        if self.params().algorithm == algorithm {
            return Ok(());
        }
        let mut params = self.params().clone();
        params.algorithm = algorithm;
        let sink = match self {
            MorphEngine::Cdf(e) => Arc::clone(&e.sink),
            MorphEngine::Reassignment(e) => Arc::clone(&e.sink),
        };
        *self = Self::with_sink(&params, sink)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warn::CountingSink;
    use rand::prelude::*;
    use std::f64::consts::PI;

    const SR: f64 = 44100.0;

    fn params(algorithm: Algorithm, window_ms: f64) -> MorphParams {
        MorphParams {
            sample_rate: SR,
            window_ms,
            hop_divisor: 4,
            fft_multiplier: 2,
            algorithm,
        }
    }

    fn sine(freq: f64, amp: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (amp * (2.0 * PI * freq * i as f64 / SR).sin()) as f32)
            .collect()
    }

    fn chirp(f0: f64, f1: f64, amp: f64, n: usize) -> Vec<f32> {
        let dur = n as f64 / SR;
        (0..n)
            .map(|i| {
                let t = i as f64 / SR;
                let phase = 2.0 * PI * (f0 * t + (f1 - f0) / (2.0 * dur) * t * t);
                (amp * phase.sin()) as f32
            })
            .collect()
    }

    fn noise(n: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect()
    }

    fn run(engine: &mut MorphEngine, main: &[f32], side: &[f32], k: f32, block: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; main.len()];
        let mut pos = 0;
        while pos < main.len() {
            let end = (pos + block).min(main.len());
            let (m, s) = (&main[pos..end], &side[pos..end]);
            let mut o = vec![0.0f32; end - pos];
            engine.process(m, s, &mut o, k);
            out[pos..end].copy_from_slice(&o);
            pos = end;
        }
        out
    }

    fn rms(x: &[f32]) -> f64 {
        (x.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>() / x.len().max(1) as f64).sqrt()
    }

    fn zero_crossings(x: &[f32]) -> usize {
        x.windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count()
    }

    #[test]
    fn layout_and_latency() {
        let engine = MorphEngine::new(&params(Algorithm::Cdf, 100.0)).unwrap();
        let layout = engine.layout();
        // 100 ms at 44.1k = 4410 samples, rounded up to a multiple of 8
        assert_eq!(layout.window_size, 4416);
        assert_eq!(layout.hop_size, 1104);
        assert_eq!(layout.fft_size, 16384);
        assert_eq!(layout.bins, 8193);
        assert_eq!(engine.latency_samples(), 4415);

        let engine = MorphEngine::new(&params(Algorithm::Reassignment, 100.0)).unwrap();
        assert_eq!(engine.layout().window_size, 4416);
        assert_eq!(engine.layout().hop_size, 552);
        assert_eq!(engine.latency_samples(), 4415);
    }

    #[test]
    fn construction_rejects_bad_configs() {
        let mut p = params(Algorithm::Cdf, 100.0);
        p.sample_rate = -1.0;
        assert!(MorphEngine::new(&p).is_err());

        let mut p = params(Algorithm::Cdf, 100.0);
        p.window_ms = 0.01;
        assert!(matches!(
            MorphEngine::new(&p),
            Err(ConfigError::WindowTooSmall { .. })
        ));
    }

    #[test]
    fn cdf_k0_reconstructs_delayed_main() {
        let n = (SR as usize) / 2;
        let main = sine(440.0, 0.5, n);
        let silence = vec![0.0f32; n];
        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let lat = engine.latency_samples();
        let w = engine.layout().window_size;
        let out = run(&mut engine, &main, &silence, 0.0, 512);

        // Warm-up emits silence
        assert!(out[..lat].iter().all(|&x| x.abs() < 1e-9));

        // After warm-up: main delayed by the reported latency, to well
        // below -40 dB error
        let start = lat + w;
        let err: Vec<f32> = (start..n).map(|p| out[p] - main[p - lat]).collect();
        let signal_rms = rms(&main[start - lat..n - lat]);
        assert!(
            rms(&err) / signal_rms < 0.01,
            "reconstruction error {} dB",
            20.0 * (rms(&err) / signal_rms).log10()
        );
    }

    #[test]
    fn reassignment_k0_reconstructs_against_silence() {
        let n = (SR as usize) / 2;
        let main = sine(440.0, 0.5, n);
        let silence = vec![0.0f32; n];
        let mut engine = MorphEngine::new(&params(Algorithm::Reassignment, 50.0)).unwrap();
        let lat = engine.latency_samples();
        let w = engine.layout().window_size;
        let out = run(&mut engine, &main, &silence, 0.0, 512);

        let start = lat + w;
        let err: Vec<f32> = (start..n).map(|p| out[p] - main[p - lat]).collect();
        let signal_rms = rms(&main[start - lat..n - lat]);
        assert!(
            rms(&err) / signal_rms < 0.01,
            "reconstruction error {} dB",
            20.0 * (rms(&err) / signal_rms).log10()
        );
    }

    #[test]
    fn silent_main_scales_sidechain_by_k() {
        for alg in [Algorithm::Cdf, Algorithm::Reassignment] {
            let n = (SR as usize) / 2;
            let silence = vec![0.0f32; n];
            let side = sine(554.37, 0.5, n);
            let mut engine = MorphEngine::new(&params(alg, 50.0)).unwrap();
            let lat = engine.latency_samples();
            let w = engine.layout().window_size;
            let out = run(&mut engine, &silence, &side, 0.7, 256);

            let start = lat + w;
            let err: Vec<f32> = (start..n)
                .map(|p| out[p] - 0.7 * side[p - lat])
                .collect();
            let signal_rms = rms(&side[start - lat..n - lat]) * 0.7;
            assert!(
                rms(&err) / signal_rms < 0.01,
                "{alg:?}: error {} dB",
                20.0 * (rms(&err) / signal_rms).log10()
            );
        }
    }

    #[test]
    fn buffer_size_invariance() {
        for alg in [Algorithm::Cdf, Algorithm::Reassignment] {
            let n = (SR as usize) / 4;
            let main = noise(n, 1);
            let side = noise(n, 2);

            let mut reference = MorphEngine::new(&params(alg, 50.0)).unwrap();
            let expected = run(&mut reference, &main, &side, 0.3, n);

            for &block in &[32usize, 64, 128, 256, 512, 1024, 2048, 7, 123] {
                let mut engine = MorphEngine::new(&params(alg, 50.0)).unwrap();
                let got = run(&mut engine, &main, &side, 0.3, block);
                assert_eq!(expected, got, "{alg:?} block {block}");
            }
        }
    }

    #[test]
    fn random_buffer_sizes_match_single_call() {
        let n = (SR as usize) / 2;
        let main = noise(n, 10);
        let side = noise(n, 11);
        let mut reference = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let expected = run(&mut reference, &main, &side, 0.3, n);

        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let mut out = vec![0.0f32; n];
        let mut pos = 0;
        while pos < n {
            let block = rng.gen_range(1..=4096).min(n - pos);
            let mut o = vec![0.0f32; block];
            engine.process(&main[pos..pos + block], &side[pos..pos + block], &mut o, 0.3);
            out[pos..pos + block].copy_from_slice(&o);
            pos += block;
        }
        assert_eq!(expected, out);

        // I1/I2 on the same run: finite, bounded by inputs + 3 dB
        let peak_in = main
            .iter()
            .chain(&side)
            .fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(out.iter().all(|x| x.is_finite()));
        let peak_out = out.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak_out <= peak_in * 1.45, "{peak_out} vs {peak_in}");
    }

    #[test]
    fn reset_restores_initial_state() {
        let n = (SR as usize) / 4;
        let main = noise(n, 3);
        let side = noise(n, 4);
        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let first = run(&mut engine, &main, &side, 0.5, 512);
        engine.reset();
        let second = run(&mut engine, &main, &side, 0.5, 512);
        assert_eq!(first, second);
    }

    #[test]
    fn non_finite_inputs_do_not_poison_output() {
        let n = (SR as usize) / 4;
        let mut main = noise(n, 5);
        let side = noise(n, 6);
        for i in (0..n).step_by(997) {
            main[i] = f32::NAN;
        }
        main[1234] = f32::INFINITY;

        let sink = Arc::new(CountingSink::new());
        for alg in [Algorithm::Cdf, Algorithm::Reassignment] {
            let shared: Arc<dyn WarnSink> = sink.clone();
            let mut engine = MorphEngine::with_sink(&params(alg, 50.0), shared).unwrap();
            let out = run(&mut engine, &main, &side, 0.4, 512);
            assert!(out.iter().all(|x| x.is_finite()), "{alg:?}");
        }
        assert!(sink.count(Warning::NonFiniteInput) > 0);
    }

    #[test]
    fn two_tone_morph_sits_between_endpoints() {
        // 440 Hz main against 554.37 Hz sidechain at k = 0.5: the output
        // zero-crossing rate must land between the endpoint rates.
        let n = SR as usize;
        let main = sine(440.0, 0.5, n);
        let side = sine(554.37, 0.5, n);
        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 100.0)).unwrap();
        let out = run(&mut engine, &main, &side, 0.5, 512);

        let start = 2 * engine.layout().window_size;
        let steady = &out[start..];
        let secs = steady.len() as f64 / SR;
        let rate = zero_crossings(steady) as f64 / secs;
        assert!(
            rate > 2.0 * 450.0 && rate < 2.0 * 545.0,
            "zero-crossing rate {rate}"
        );

        // Bounded amplitude with 3 dB slack (I2)
        let peak = steady.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak <= 0.5 * 1.45, "peak {peak}");
        assert!(rms(steady) > 0.02, "morph output should carry energy");
    }

    #[test]
    fn opposing_chirps_meet_in_the_middle() {
        // Chirp up vs chirp down at k = 0.5: near the quarter point the
        // inputs sit at ~575 Hz and ~1525 Hz; the morph stays near the
        // 1050 Hz midpoint.
        let n = SR as usize;
        let main = chirp(100.0, 2000.0, 0.5, n);
        let side = chirp(2000.0, 100.0, 0.5, n);
        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let lat = engine.latency_samples();
        let out = run(&mut engine, &main, &side, 0.5, 512);

        let start = lat + n / 4;
        let window = &out[start..start + 8820];
        let rate = zero_crossings(window) as f64 / 0.2;
        assert!(
            rate > 2.0 * 600.0 && rate < 2.0 * 1500.0,
            "zero-crossing rate {rate}"
        );
    }

    #[test]
    fn swapping_inputs_and_inverting_k_is_symmetric() {
        // Exact on the silent-shortcut path; statistical (level and
        // pitch) when both sides are audible.
        let n = (SR as usize) / 2;
        let silence = vec![0.0f32; n];
        let side = sine(554.37, 0.5, n);

        let mut a = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let out_a = run(&mut a, &silence, &side, 0.7, 512);
        let mut b = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let out_b = run(&mut b, &side, &silence, 0.3, 512);
        let start = 2 * a.layout().window_size;
        let err: Vec<f32> = (start..n).map(|p| out_a[p] - out_b[p]).collect();
        assert!(rms(&err) / rms(&out_a[start..]).max(1e-12) < 0.01);

        let main = sine(440.0, 0.5, n);
        let mut c = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let out_c = run(&mut c, &main, &side, 0.5, 512);
        let mut d = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let out_d = run(&mut d, &side, &main, 0.5, 512);
        let (rc, rd) = (rms(&out_c[start..]), rms(&out_d[start..]));
        assert!(rc / rd < 2.0 && rd / rc < 2.0, "rms {rc} vs {rd}");
        let (zc, zd) = (
            zero_crossings(&out_c[start..]),
            zero_crossings(&out_d[start..]),
        );
        let ratio = zc as f64 / zd.max(1) as f64;
        assert!((0.8..1.25).contains(&ratio), "crossings {zc} vs {zd}");
    }

    #[test]
    fn dc_input_does_not_blow_up() {
        let n = (SR as usize) / 2;
        let main = vec![0.5f32; n];
        let side = vec![0.5f32; n];
        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let out = run(&mut engine, &main, &side, 0.5, 512);
        assert!(out.iter().all(|x| x.is_finite()));
        let start = 2 * engine.layout().window_size;
        assert!(rms(&out[start..]) / rms(&main[start..]) <= 2.0);
    }

    #[test]
    fn impulse_through_reassignment_stays_bounded() {
        let n = (SR as usize) / 4;
        let mut main = vec![0.0f32; n];
        main[1000] = 1.0;
        let side = vec![0.0f32; n];
        let mut engine = MorphEngine::new(&params(Algorithm::Reassignment, 50.0)).unwrap();
        let out = run(&mut engine, &main, &side, 0.5, 512);
        assert!(out.iter().all(|x| x.is_finite()));
        assert!(out.iter().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn silence_then_sine_starts_cleanly() {
        let half = (SR as usize) / 2;
        let mut main = vec![0.0f32; half];
        main.extend(sine(440.0, 0.5, half));
        let n = main.len();
        let silence = vec![0.0f32; n];

        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let lat = engine.latency_samples();
        let w = engine.layout().window_size;
        let out = run(&mut engine, &main, &silence, 0.0, 512);

        // Nothing before the sine can reach the output
        assert!(out[..half].iter().all(|&x| x.abs() < 1e-9));

        // Steady region reconstructs the delayed sine
        let start = half + lat + w;
        let err: Vec<f32> = (start..n).map(|p| out[p] - main[p - lat]).collect();
        let signal_rms = rms(&main[start - lat..n - lat]);
        assert!(rms(&err) / signal_rms < 0.01);
    }

    #[test]
    fn sample_rate_change_rebuilds_cleanly() {
        let block = vec![0.0f32; 512];
        let mut out = vec![0.0f32; 512];
        let mut engine = MorphEngine::new(&MorphParams {
            hop_divisor: 8,
            ..params(Algorithm::Cdf, 100.0)
        })
        .unwrap();
        engine.process(&block, &block, &mut out, 0.5);
        assert!(out.iter().all(|x| x.is_finite()));

        engine.set_sample_rate(48000.0).unwrap();
        // Hop divisor and FFT multiplier survive the rebuild
        assert_eq!(engine.params().hop_divisor, 8);
        assert_eq!(engine.params().fft_multiplier, 2);
        assert_eq!(engine.params().sample_rate, 48000.0);

        engine.process(&block, &block, &mut out, 0.5);
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn algorithm_switch_rebuilds() {
        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let cdf_hop = engine.layout().hop_size;
        engine.set_algorithm(Algorithm::Reassignment).unwrap();
        assert_eq!(engine.params().algorithm, Algorithm::Reassignment);
        assert_eq!(engine.layout().hop_size, cdf_hop / 2);

        let block = sine(440.0, 0.3, 1024);
        let mut out = vec![0.0f32; 1024];
        engine.process(&block, &block, &mut out, 0.5);
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn in_place_matches_out_of_place() {
        let n = (SR as usize) / 4;
        let main = sine(330.0, 0.4, n);
        let side = sine(660.0, 0.4, n);

        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let expected = run(&mut engine, &main, &side, 0.5, 512);

        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();
        let mut buf = main.clone();
        let mut pos = 0;
        while pos < n {
            let end = (pos + 512).min(n);
            let mut chunk = buf[pos..end].to_vec();
            engine.process_in_place(&mut chunk, &side[pos..end], 0.5);
            buf[pos..end].copy_from_slice(&chunk);
            pos = end;
        }
        assert_eq!(expected, buf);
    }

    #[test]
    fn reassignment_morph_of_two_tones_is_stable() {
        let n = SR as usize;
        let main = sine(440.0, 0.5, n);
        let side = sine(554.37, 0.5, n);
        let mut engine = MorphEngine::new(&params(Algorithm::Reassignment, 100.0)).unwrap();
        let out = run(&mut engine, &main, &side, 0.5, 512);

        assert!(out.iter().all(|x| x.is_finite()));
        let start = 2 * engine.layout().window_size;
        let steady = &out[start..];
        let peak = steady.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak <= 0.5 * 1.45, "peak {peak}");
        assert!(rms(steady) > 1e-3, "morph output should carry energy");
    }

    #[test]
    fn blend_jumps_stay_finite() {
        let n = (SR as usize) / 4;
        let main = sine(440.0, 0.5, n);
        let side = sine(880.0, 0.5, n);
        let mut engine = MorphEngine::new(&params(Algorithm::Cdf, 50.0)).unwrap();

        let mut out = Vec::with_capacity(2 * n);
        for k in [0.0f32, 1.0] {
            let mut o = vec![0.0f32; n];
            engine.process(&main, &side, &mut o, k);
            out.extend(o);
        }
        assert!(out.iter().all(|x| x.is_finite()));
    }
}
