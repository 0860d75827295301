//! Waveguide string — a Karplus-Strong delay-line string coupled to a small
//! resonant body.
//!
//! The exciter burst is injected into a recirculating delay line one period
//! long. A one-pole low-pass in the loop models frequency-dependent loss
//! (`resonator_brightness`) and the loop gain is derived from the same T60
//! as the modal bank (`resonator_decay`), so presets translate between the
//! two models. Three fixed [`ModalFilter`] body modes colour the output.

use crate::params::ParameterSet;

use super::modal::ModalFilter;

/// Lowest playable pitch; the delay line is sized for it.
pub const MIN_STRING_FREQUENCY: f64 = 20.0;
/// Loop gain ceiling, keeps the string strictly decaying.
const MAX_LOOP_GAIN: f64 = 0.9999;
/// Upper bound on the loss filter pole.
const MAX_DAMPING: f64 = 0.6;

/// Body modes: (frequency Hz, T60 s, level).
const BODY_MODES: [(f64, f64, f64); 3] = [(112.0, 0.12, 0.5), (247.0, 0.08, 0.35), (498.0, 0.05, 0.25)];
const BODY_MIX: f64 = 0.3;

/// Delay-line string with a modal body.
#[derive(Debug, Clone)]
pub struct WaveguideString {
    line: Vec<f64>,
    write_pos: usize,
    /// Delay read offset in fractional samples.
    delay: f64,
    loop_gain: f64,
    damping: f64,
    loss_state: f64,
    body: [ModalFilter; 3],
    body_gain: [f64; 3],

    frequency: f64,
    t60: f64,
    sample_rate: f64,
}

impl WaveguideString {
    /// Allocates a delay line long enough for [`MIN_STRING_FREQUENCY`].
    pub fn new(sample_rate: f64) -> Self {
        let len = (sample_rate / MIN_STRING_FREQUENCY).ceil() as usize + 2;
        let mut body: [ModalFilter; 3] = Default::default();
        let mut body_gain = [0.0; 3];
        for (i, &(freq, t60, level)) in BODY_MODES.iter().enumerate() {
            if body[i].configure(freq, t60, sample_rate) {
                body_gain[i] = level * body[i].unity_scale();
            }
        }
        let mut string = WaveguideString {
            line: vec![0.0; len],
            write_pos: 0,
            delay: 2.0,
            loop_gain: 0.0,
            damping: 0.0,
            loss_state: 0.0,
            body,
            body_gain,
            frequency: 220.0,
            t60: 1.0,
            sample_rate,
        };
        string.update_loop();
        string
    }

    pub fn apply_params(&mut self, params: &ParameterSet) {
        let damping = MAX_DAMPING * (1.0 - params.resonator_brightness.clamp(0.0, 1.0));
        let t60 = params.resonator_t60();
        if damping != self.damping || t60 != self.t60 {
            self.damping = damping;
            self.t60 = t60;
            self.update_loop();
        }
    }

    pub fn set_frequency(&mut self, hz: f64) {
        let nyquist = 0.45 * self.sample_rate;
        self.frequency = if hz.is_finite() {
            hz.clamp(MIN_STRING_FREQUENCY, nyquist)
        } else {
            MIN_STRING_FREQUENCY
        };
        self.update_loop();
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn loop_gain(&self) -> f64 {
        self.loop_gain
    }

    fn update_loop(&mut self) {
        let period = self.sample_rate / self.frequency;
        // The loss filter adds phase delay at low frequencies.
        let filter_delay = self.damping / (1.0 - self.damping);
        let max_delay = (self.line.len() - 2) as f64;
        self.delay = (period - filter_delay).clamp(2.0, max_delay);

        // Gain per trip so the loop falls 60 dB in t60 seconds.
        let trips = self.t60 * self.frequency;
        self.loop_gain = 0.001_f64.powf(1.0 / trips.max(1.0)).min(MAX_LOOP_GAIN);
    }

    /// Inject one exciter sample and return the string + body output.
    #[inline]
    pub fn process_sample(&mut self, excitation: f64) -> f64 {
        let delayed = self.read_delayed();
        self.loss_state = self.damping * self.loss_state + (1.0 - self.damping) * delayed;
        let string_out = self.loss_state;

        self.line[self.write_pos] = (excitation + self.loop_gain * string_out).tanh();
        self.write_pos = (self.write_pos + 1) % self.line.len();

        let mut body_out = 0.0;
        for (mode, &gain) in self.body.iter_mut().zip(self.body_gain.iter()) {
            body_out += mode.process_sample(string_out * gain);
        }
        (1.0 - BODY_MIX) * string_out + BODY_MIX * body_out
    }

    /// Zero the line, loss filter and body without reallocating.
    pub fn reset(&mut self) {
        self.line.fill(0.0);
        self.write_pos = 0;
        self.loss_state = 0.0;
        for mode in self.body.iter_mut() {
            mode.reset();
        }
    }

    #[inline]
    fn read_delayed(&self) -> f64 {
        let len = self.line.len();
        let mut read = self.write_pos as f64 - self.delay;
        if read < 0.0 {
            read += len as f64;
        }
        let i0 = (read as usize).min(len - 1);
        let frac = read - i0 as f64;
        let i1 = (i0 + 1) % len;
        self.line[i0] * (1.0 - frac) + self.line[i1] * frac
    }
}
