//! Post filter — two-pole state-variable low-pass (trapezoidal integration).
//!
//! Uses Andrew Simper's topology-preserving transform. The state is held as
//! integrator equivalents (`ic1eq`, `ic2eq`), so cutoff and resonance can
//! change between blocks without a discontinuity in the output.

use std::f64::consts::PI;

use crate::params::ParameterSet;

/// Lowest and highest cutoff reachable from the normalised control.
pub const MIN_CUTOFF_HZ: f64 = 20.0;
pub const MAX_CUTOFF_HZ: f64 = 20000.0;
/// Cutoff ceiling as a fraction of the sample rate.
const CUTOFF_GUARD: f64 = 0.45;

/// Map a normalised cutoff [0, 1] to Hz on an exponential scale.
pub fn cutoff_to_hz(normalized: f64) -> f64 {
    let c = normalized.clamp(0.0, 1.0);
    MIN_CUTOFF_HZ * (MAX_CUTOFF_HZ / MIN_CUTOFF_HZ).powf(c)
}

/// Map a normalised resonance [0, 1] to the SVF damping `k = 1/Q`.
pub fn resonance_to_damping(resonance: f64) -> f64 {
    2.0 - 1.9 * resonance.clamp(0.0, 1.0)
}

/// Resonant low-pass applied to each voice's resonator + feedback sum.
#[derive(Debug, Clone)]
pub struct PostFilter {
    cutoff: f64,
    resonance: f64,

    a1: f64,
    a2: f64,
    a3: f64,
    k: f64,

    ic1eq: f64,
    ic2eq: f64,

    sample_rate: f64,
}

impl PostFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut f = PostFilter {
            cutoff: 1.0,
            resonance: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            k: 2.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    pub fn apply_params(&mut self, params: &ParameterSet) {
        self.set(params.filter_cutoff, params.filter_resonance);
    }

    /// Set normalised cutoff and resonance. Coefficients are only recomputed
    /// when a value actually changes.
    pub fn set(&mut self, cutoff: f64, resonance: f64) {
        let cutoff = if cutoff.is_finite() { cutoff.clamp(0.0, 1.0) } else { self.cutoff };
        let resonance = if resonance.is_finite() { resonance.clamp(0.0, 1.0) } else { self.resonance };
        if cutoff != self.cutoff || resonance != self.resonance {
            self.cutoff = cutoff;
            self.resonance = resonance;
            self.update_coefficients();
        }
    }

    /// Effective cutoff in Hz after the Nyquist guard.
    pub fn cutoff_hz(&self) -> f64 {
        cutoff_to_hz(self.cutoff).min(CUTOFF_GUARD * self.sample_rate)
    }

    fn update_coefficients(&mut self) {
        let g = (PI * self.cutoff_hz() / self.sample_rate).tan();
        self.k = resonance_to_damping(self.resonance);
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    /// Process a single sample, returning the low-pass output.
    #[inline]
    pub fn process_sample(&mut self, v0: f64) -> f64 {
        let v3 = v0 - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        v2
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_peak(f: &mut PostFilter, freq: f64, sr: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..(sr as usize / 2) {
            let x = (2.0 * PI * freq * i as f64 / sr).sin();
            let y = f.process_sample(x);
            if i > sr as usize / 4 {
                max_out = max_out.max(y.abs());
            }
        }
        max_out
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut f = PostFilter::new(44100.0);
        f.set(0.5, 0.0);
        let mut output = 0.0;
        for _ in 0..5000 {
            output = f.process_sample(1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let sr = 44100.0;
        let mut f = PostFilter::new(sr);
        f.set(0.23, 0.0); // ~ 97 Hz
        assert!(f.cutoff_hz() < 120.0);
        let out = sine_peak(&mut f, 10000.0, sr);
        assert!(out < 0.01, "Cutoff near 100 Hz should strongly attenuate 10 kHz, got {out}");
    }

    #[test]
    fn resonance_boosts_cutoff_region() {
        let sr = 48000.0;
        let mut flat = PostFilter::new(sr);
        flat.set(0.5, 0.0);
        let fc = flat.cutoff_hz();
        let mut peaky = PostFilter::new(sr);
        peaky.set(0.5, 1.0);
        let a = sine_peak(&mut flat, fc, sr);
        let b = sine_peak(&mut peaky, fc, sr);
        assert!(b > a * 4.0, "Resonance should boost the cutoff ({a} vs {b})");
    }

    #[test]
    fn cutoff_is_guarded_below_nyquist() {
        let f = PostFilter::new(22050.0);
        assert!(f.cutoff_hz() <= 0.45 * 22050.0);
    }

    #[test]
    fn coefficient_change_is_continuous() {
        let sr = 48000.0;
        let mut f = PostFilter::new(sr);
        f.set(0.9, 0.3);
        let mut prev = 0.0;
        for i in 0..4800 {
            let x = (2.0 * PI * 220.0 * i as f64 / sr).sin();
            prev = f.process_sample(x);
        }
        f.set(0.4, 0.6);
        let next = f.process_sample((2.0 * PI * 220.0 * 4800.0 / sr).sin());
        assert!((next - prev).abs() < 0.1, "Jump after retune: {prev} -> {next}");
    }

    #[test]
    fn output_finite() {
        let mut f = PostFilter::new(44100.0);
        f.set(1.0, 1.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            assert!(f.process_sample(input).is_finite(), "Filter output not finite at sample {i}");
        }
    }
}
