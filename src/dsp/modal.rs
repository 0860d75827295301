//! Modal filter — a two-pole resonator modelling one vibrational mode.

use std::f64::consts::PI;

/// Bias folded into the recursive state to keep it out of the denormal range.
/// Its sign alternates every sample, so it averages out instead of leaving DC.
pub const DENORMAL_BIAS: f64 = 1e-10;
/// Shortest and longest decay times accepted by [`ModalFilter::configure`].
pub const MIN_T60: f64 = 0.001;
pub const MAX_T60: f64 = 60.0;
/// Pole radius ceiling. Keeps `r < 1` for every clamped input.
pub const MAX_POLE_RADIUS: f64 = 0.999_999;
/// Highest mode frequency, as a fraction of the sample rate.
pub const NYQUIST_GUARD: f64 = 0.45;

/// `ln(0.001)`: a T60 decay is a 60 dB drop.
const LN_MINUS_60_DB: f64 = -6.907_755_278_982_137;

/// A single resonant mode.
///
/// Implements the Direct Form II Transposed structure with
/// `b0 = 1 - r`, `a1 = -2r·cos(ω0·T)`, `a2 = r²`.
#[derive(Debug, Clone, Default)]
pub struct ModalFilter {
    b0: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    s1: f64,
    s2: f64,

    /// Sign of the next bias sample.
    bias_negative: bool,

    radius: f64,
    /// Reciprocal of the filter's gain at its centre frequency.
    unity_scale: f64,
}

impl ModalFilter {
    pub fn new() -> Self {
        ModalFilter::default()
    }

    /// Derive coefficients from a mode frequency and decay time.
    ///
    /// T60 is clamped to `[MIN_T60, MAX_T60]`. A frequency outside
    /// `(0, NYQUIST_GUARD · sample_rate]` is rejected: the filter is silenced
    /// and `false` is returned.
    pub fn configure(&mut self, frequency_hz: f64, t60_seconds: f64, sample_rate_hz: f64) -> bool {
        let valid = frequency_hz.is_finite()
            && sample_rate_hz.is_finite()
            && sample_rate_hz > 0.0
            && frequency_hz > 0.0
            && frequency_hz <= NYQUIST_GUARD * sample_rate_hz;
        if !valid {
            self.silence();
            return false;
        }

        let t60 = if t60_seconds.is_finite() {
            t60_seconds.clamp(MIN_T60, MAX_T60)
        } else {
            MAX_T60
        };
        let r = (LN_MINUS_60_DB / (t60 * sample_rate_hz)).exp().min(MAX_POLE_RADIUS);
        let w0 = 2.0 * PI * frequency_hz / sample_rate_hz;

        self.radius = r;
        self.b0 = 1.0 - r;
        self.a1 = -2.0 * r * w0.cos();
        self.a2 = r * r;

        // |H(e^{jω0})| = b0 / |1 + a1·e^{-jω0} + a2·e^{-2jω0}|
        let re = 1.0 + self.a1 * w0.cos() + self.a2 * (2.0 * w0).cos();
        let im = self.a1 * w0.sin() + self.a2 * (2.0 * w0).sin();
        let peak = self.b0 / (re * re + im * im).sqrt();
        self.unity_scale = if peak.is_finite() && peak > 0.0 { 1.0 / peak } else { 0.0 };
        true
    }

    /// Process one sample.
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let bias = if self.bias_negative { -DENORMAL_BIAS } else { DENORMAL_BIAS };
        self.bias_negative = !self.bias_negative;
        let y = x * self.b0 + self.s1;
        self.s1 = self.s2 - self.a1 * y + bias;
        self.s2 = -self.a2 * y;
        y
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
        self.bias_negative = false;
    }

    /// Pole radius `r` of the current configuration.
    pub fn pole_radius(&self) -> f64 {
        self.radius
    }

    /// Input gain that gives this mode unity gain at its centre frequency.
    pub fn unity_scale(&self) -> f64 {
        self.unity_scale
    }

    fn silence(&mut self) {
        self.b0 = 0.0;
        self.a1 = 0.0;
        self.a2 = 0.0;
        self.radius = 0.0;
        self.unity_scale = 0.0;
        self.reset();
    }
}
