//! Fixed-size circular audio buffer.
//!
//! Serves two roles in the workspace: sample accumulation for the STFT
//! framer (via [`RingBuffer::latest_into`]) and rolling output capture
//! that can be dumped to WAV for offline inspection.

/// Circular buffer storing the most recent `capacity` samples.
pub struct RingBuffer {
    data: Vec<f64>,
    write_pos: usize,
    filled: bool,
}

impl RingBuffer {
    /// Create a ring buffer with given capacity in samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            write_pos: 0,
            filled: false,
        }
    }

    /// Create a ring buffer sized for `duration_secs` at `sample_rate`.
    pub fn with_duration(duration_secs: f64, sample_rate: u32) -> Self {
        Self::new(((duration_secs * sample_rate as f64) as usize).max(1))
    }

    /// Write one sample.
    #[inline]
    pub fn push(&mut self, sample: f64) {
        self.data[self.write_pos] = sample;
        self.write_pos += 1;
        if self.write_pos >= self.data.len() {
            self.write_pos = 0;
            self.filled = true;
        }
    }

    /// Write a slice of samples.
    pub fn push_slice(&mut self, samples: &[f64]) {
        for &s in samples {
            self.push(s);
        }
    }

    /// Number of valid samples available.
    pub fn len(&self) -> usize {
        if self.filled {
            self.data.len()
        } else {
            self.write_pos
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.filled && self.write_pos == 0
    }

    /// Copy the most recent `out.len()` samples into `out` in
    /// chronological order, zero-filling the front when fewer samples
    /// have been written. Does not allocate.
    pub fn latest_into(&self, out: &mut [f64]) {
        let n = out.len();
        let have = self.len().min(n);
        let lead = n - have;
        out[..lead].fill(0.0);

        let cap = self.data.len();
        let start = (self.write_pos + cap - have) % cap;
        for (i, slot) in out[lead..].iter_mut().enumerate() {
            *slot = self.data[(start + i) % cap];
        }
    }

    /// Read all valid samples in chronological order.
    pub fn read(&self) -> Vec<f64> {
        if self.filled {
            let mut out = Vec::with_capacity(self.data.len());
            out.extend_from_slice(&self.data[self.write_pos..]);
            out.extend_from_slice(&self.data[..self.write_pos]);
            out
        } else {
            self.data[..self.write_pos].to_vec()
        }
    }

    /// Dump contents to a WAV file.
    pub fn dump_to_wav(&self, path: &str, sample_rate: u32) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in self.read() {
            writer.write_sample(sample as f32)?;
        }
        writer.finalize()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
        self.filled = false;
    }
}
