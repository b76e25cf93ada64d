//! Shared real-time DSP utilities for the morph workspace.
//!
//! Small, allocation-free-after-construction building blocks used by both
//! the engine crate and the CLI: a circular sample buffer, running
//! RMS/peak metrics, and exponential parameter smoothing.

pub mod metrics;
pub mod ring_buffer;
pub mod smoothing;

pub use metrics::{MetricsSnapshot, RunningMetrics};
pub use ring_buffer::RingBuffer;
pub use smoothing::SmoothedParam;
