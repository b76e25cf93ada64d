//! Real-time spectral morphing between two audio streams.
//!
//! Blends a main and a sidechain stream by optimal transport of spectral
//! mass: a partial at one frequency slides toward its counterpart as the
//! blend moves from 0 to 1, instead of crossfading in amplitude. Two
//! engine kinds share one streaming STFT skeleton:
//!
//!   CDF          -- 1-D transport by cumulative-distribution inversion
//!                   over bin magnitudes; one FFT per frame.
//!   Reassignment -- spectral reassignment (three FFTs per frame),
//!                   partial-centred mass grouping, monotone mass
//!                   transport, phase-propagating resynthesis.
//!
//! Entry point: [`MorphEngine`]. Hosts feed arbitrarily sized sample
//! buffers; the engine maintains overlap-add state internally and emits
//! exactly as many samples as it consumes, with a constant reported
//! latency.

pub mod engine;
pub mod error;
pub mod framer;
pub mod interpolate;
pub mod ola;
pub mod params;
pub mod spectral;
pub mod transport;
pub mod warn;
pub mod window;

pub use engine::{CdfEngine, Layout, MorphEngine, ReassignmentEngine};
pub use error::ConfigError;
pub use params::{param_range, Algorithm, MorphParams};
pub use warn::{CountingSink, NullSink, StderrSink, WarnSink, Warning};

/// Numerical floor shared by the planners and interpolators.
pub const EPS: f64 = 1e-10;
