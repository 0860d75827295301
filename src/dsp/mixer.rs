//! Mixer — Sums voice outputs, applies master gain and a soft clipper, and
//! writes the result to stereo output buffers.

/// A summing mixer over a mono scratch buffer sized once at `prepare`.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    buffer: Vec<f64>,
    len: usize,
}

impl Mixer {
    pub fn new(max_block_size: usize) -> Self {
        Mixer {
            master_gain: 0.8,
            buffer: vec![0.0; max_block_size],
            len: 0,
        }
    }

    /// Largest block the scratch buffer holds.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Zero the first `num_samples` samples and return them for summing.
    /// `num_samples` is clamped to the capacity.
    pub fn clear(&mut self, num_samples: usize) -> &mut [f64] {
        self.len = num_samples.min(self.buffer.len());
        let active = &mut self.buffer[..self.len];
        active.fill(0.0);
        active
    }

    /// Processed sample at `index`: master gain then soft clip.
    #[inline]
    fn output(&self, index: usize) -> f64 {
        self.buffer
            .get(index)
            .map_or(0.0, |&s| soft_clip(s * self.master_gain))
    }

    /// Write the mix to both channels of a planar stereo pair.
    pub fn write_planar(&self, left: &mut [f32], right: &mut [f32]) {
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate().take(self.len) {
            let s = self.output(i) as f32;
            *l = s;
            *r = s;
        }
    }

    /// Write the mix to an interleaved stereo buffer (`L R L R ...`).
    pub fn write_interleaved(&self, out: &mut [f32]) {
        for (i, frame) in out.chunks_exact_mut(2).enumerate().take(self.len) {
            let s = self.output(i) as f32;
            frame[0] = s;
            frame[1] = s;
        }
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}
