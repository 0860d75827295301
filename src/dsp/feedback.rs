//! Feedback loop — a saturating fractional delay that recirculates the
//! resonator output into the resonator input.
//!
//! The loop is a ring buffer with explicit index arithmetic. The value fed
//! back into the bank is stored here and read on the *next* sample, which is
//! the one-sample lag that breaks the cycle.

use crate::params::ParameterSet;

/// Longest supported delay; the buffer is sized for it at construction.
pub const MAX_DELAY_MS: f64 = 200.0;
pub const MIN_DELAY_MS: f64 = 1.0;
pub const MAX_AMOUNT: f64 = 0.95;
pub const MIN_SATURATION: f64 = 1.0;
pub const MAX_SATURATION: f64 = 10.0;

/// Bounded, saturating feedback path of a modal voice.
#[derive(Debug, Clone)]
pub struct FeedbackLoop {
    buffer: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,

    /// Recirculation gain [0, 0.95].
    amount: f64,
    /// Drive into the tanh stage [1, 10].
    saturation: f64,
    /// Saturated/dry blend [0, 1].
    mix: f64,
    /// Delay in (fractional) samples.
    delay_samples: f64,

    /// `amount × blended` from the previous sample.
    recirculation: f64,
}

impl FeedbackLoop {
    /// Allocates a buffer for [`MAX_DELAY_MS`] at `sample_rate`.
    pub fn new(sample_rate: f64) -> Self {
        let buffer_size = (sample_rate * MAX_DELAY_MS / 1000.0).ceil() as usize + 2;
        let mut fb = FeedbackLoop {
            buffer: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            amount: 0.0,
            saturation: MIN_SATURATION,
            mix: 0.0,
            delay_samples: 0.0,
            recirculation: 0.0,
        };
        fb.set_delay_ms(10.0);
        fb
    }

    pub fn apply_params(&mut self, params: &ParameterSet) {
        self.set_amount(params.feedback_amount);
        self.set_saturation(params.feedback_saturation);
        self.set_mix(params.feedback_mix);
        self.set_delay_ms(params.feedback_delay_time);
    }

    pub fn set_amount(&mut self, amount: f64) {
        self.amount = if amount.is_finite() { amount.clamp(0.0, MAX_AMOUNT) } else { 0.0 };
    }

    pub fn set_saturation(&mut self, saturation: f64) {
        self.saturation = if saturation.is_finite() {
            saturation.clamp(MIN_SATURATION, MAX_SATURATION)
        } else {
            MIN_SATURATION
        };
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = if mix.is_finite() { mix.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn set_delay_ms(&mut self, ms: f64) {
        let ms = if ms.is_finite() { ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS) } else { MIN_DELAY_MS };
        let max_samples = (self.buffer.len() - 2) as f64;
        self.delay_samples = (ms * self.sample_rate / 1000.0).clamp(1.0, max_samples);
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn saturation(&self) -> f64 {
        self.saturation
    }

    pub fn delay_samples(&self) -> f64 {
        self.delay_samples
    }

    /// Value to add to the resonator input on this sample.
    #[inline]
    pub fn recirculation(&self) -> f64 {
        self.recirculation
    }

    /// Feed one resonator output sample through the loop.
    ///
    /// Returns `mix × tanh(delayed × saturation) + (1 − mix) × tanh(input)`.
    /// The dry term passes through the same soft limiter so the returned
    /// value, and with it the recirculation, is bounded by 1 for any input.
    #[inline]
    pub fn process_sample(&mut self, resonator_output: f64) -> f64 {
        self.buffer[self.write_pos] = resonator_output;
        let delayed = self.read_delayed();
        self.write_pos = (self.write_pos + 1) % self.buffer.len();

        let saturated = (delayed * self.saturation).tanh();
        let blended = self.mix * saturated + (1.0 - self.mix) * resonator_output.tanh();
        self.recirculation = self.amount * blended;
        blended
    }

    /// Zero the buffer and the lagged value without reallocating.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.recirculation = 0.0;
    }

    /// Linear interpolation `delay_samples` behind the write cursor.
    #[inline]
    fn read_delayed(&self) -> f64 {
        let len = self.buffer.len();
        let mut read = self.write_pos as f64 - self.delay_samples;
        if read < 0.0 {
            read += len as f64;
        }
        let i0 = (read as usize).min(len - 1);
        let frac = read - i0 as f64;
        let i1 = (i0 + 1) % len;
        self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac
    }
}
