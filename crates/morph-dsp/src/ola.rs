//! Overlap-add output assembly.
//!
//! Synthesized frames are accumulated into a circular buffer starting at
//! the current read position; each output sample is read once, its slot
//! zeroed, and the position advanced. Frames land every hop, so every
//! contribution to a given output slot shares the same frame offset
//! residue mod hop; dividing contributions by the per-residue overlap
//! sum of the synthesis weights makes the steady-state gain exactly one.

pub struct OverlapAdd {
    buf: Vec<f64>,
    read_pos: usize,
    /// Overlap sum of the synthesis weights per frame-offset residue.
    norm: Vec<f64>,
    hop: usize,
}

impl OverlapAdd {
    /// `weights[j]` is the total synthesis weight the pipeline applies at
    /// frame offset `j`: Hann squared where a synthesis window is used on
    /// top of the analysis window, plain Hann otherwise.
    pub fn new(window: usize, hop: usize, weights: &[f64]) -> Self {
        let mut norm = vec![0.0; hop];
        for (j, &w) in weights.iter().enumerate() {
            norm[j % hop] += w;
        }
        for n in norm.iter_mut() {
            if *n < 1e-8 {
                *n = 1.0;
            }
        }
        Self {
            buf: vec![0.0; 2 * window],
            read_pos: 0,
            norm,
            hop,
        }
    }

    /// Accumulate one synthesized frame starting at the current read
    /// position.
    pub fn add_frame(&mut self, frame: &[f64]) {
        let len = self.buf.len();
        for (j, &v) in frame.iter().enumerate() {
            self.buf[(self.read_pos + j) % len] += v / self.norm[j % self.hop];
        }
    }

    /// Emit one output sample and clear its slot.
    #[inline]
    pub fn pop(&mut self) -> f64 {
        let v = self.buf[self.read_pos];
        self.buf[self.read_pos] = 0.0;
        self.read_pos = (self.read_pos + 1) % self.buf.len();
        v
    }

    pub fn reset(&mut self) {
        self.buf.fill(0.0);
        self.read_pos = 0;
    }
}
