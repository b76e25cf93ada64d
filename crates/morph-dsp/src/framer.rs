//! Input framing for the streaming STFT.
//!
//! Accumulates the main and sidechain streams sample by sample and
//! signals when a full hop has arrived. Frames are the last W samples of
//! each stream in chronological order; regions not yet filled by input
//! read as zeros.

use shared_dsp::RingBuffer;

pub struct Framer {
    main: RingBuffer,
    sidechain: RingBuffer,
    hop: usize,
    since_hop: usize,
}

impl Framer {
    pub fn new(window: usize, hop: usize) -> Self {
        Self {
            main: RingBuffer::new(window),
            sidechain: RingBuffer::new(window),
            hop,
            since_hop: 0,
        }
    }

    /// Push one sample pair. Returns true when a new analysis frame is
    /// due (a full hop has accumulated since the last one).
    #[inline]
    pub fn push(&mut self, main: f64, sidechain: f64) -> bool {
        self.main.push(main);
        self.sidechain.push(sidechain);
        self.since_hop += 1;
        if self.since_hop >= self.hop {
            self.since_hop = 0;
            true
        } else {
            false
        }
    }

    /// Copy the current analysis frame pair (the last W samples of each
    /// stream, oldest first).
    pub fn frames_into(&self, main: &mut [f64], sidechain: &mut [f64]) {
        self.main.latest_into(main);
        self.sidechain.latest_into(sidechain);
    }

    pub fn reset(&mut self) {
        self.main.clear();
        self.sidechain.clear();
        self.since_hop = 0;
    }
}
