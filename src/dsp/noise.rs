//! White and pink noise for the exciter.
//!
//! Pink noise uses the Voss-McCartney algorithm: seven octave rows, each
//! refreshed at half the rate of the previous one, summed with a fresh white
//! sample. The sum is scaled so its RMS matches the white source, which keeps
//! the exciter level stable as the colour control moves.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PINK_ROWS: usize = 7;

/// Seeded noise generator blending white and pink noise.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: StdRng,
    rows: [f64; PINK_ROWS],
    running_sum: f64,
    counter: u32,
    /// White (0.0) to pink (1.0).
    color: f64,
}

impl NoiseSource {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows: [f64; PINK_ROWS] = std::array::from_fn(|_| rng.gen_range(-1.0..1.0));
        let running_sum = rows.iter().sum();
        NoiseSource {
            rng,
            rows,
            running_sum,
            counter: 0,
            color: 0.0,
        }
    }

    pub fn set_color(&mut self, color: f64) {
        if color.is_finite() {
            self.color = color.clamp(0.0, 1.0);
        }
    }

    pub fn color(&self) -> f64 {
        self.color
    }

    /// Uniform white noise in [-1, 1).
    #[inline]
    pub fn white(&mut self) -> f64 {
        self.rng.gen_range(-1.0..1.0)
    }

    /// Pink noise with roughly the RMS of [`NoiseSource::white`].
    #[inline]
    pub fn pink(&mut self) -> f64 {
        self.counter = self.counter.wrapping_add(1);
        let row = self.counter.trailing_zeros() as usize;
        if row < PINK_ROWS {
            let fresh = self.white();
            self.running_sum += fresh - self.rows[row];
            self.rows[row] = fresh;
        }
        let white = self.white();
        (self.running_sum + white) / ((PINK_ROWS + 1) as f64).sqrt()
    }

    /// Blend of white and pink according to the colour control.
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        if self.color <= 0.0 {
            return self.white();
        }
        if self.color >= 1.0 {
            return self.pink();
        }
        let white = self.white();
        let pink = self.pink();
        (1.0 - self.color) * white + self.color * pink
    }
}
