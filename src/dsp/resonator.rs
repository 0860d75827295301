//! Resonator bank — parallel modal filters with equal-power normalisation.
//!
//! Every mode is driven by the same input. Its input gain combines two
//! factors: the reciprocal of the filter's peak gain (so each mode rings at
//! unity gain at its own centre frequency) and a normalised amplitude whose
//! squares sum to one across the enabled modes. With a flat brightness that
//! amplitude is exactly `1/sqrt(n)`, and the bank's output energy for a
//! broadband input stays put as the mode count changes.

use serde::{Deserialize, Serialize};

use super::modal::ModalFilter;

pub const MIN_MODES: usize = 4;
pub const MAX_MODES: usize = 64;
/// A mode stops being processed once its envelope is 60 dB below its peak.
pub const MODE_SLEEP_RATIO: f64 = 0.001;
/// Input magnitude below which the bank treats its input as silent.
const SILENT_INPUT: f64 = 1e-9;
/// Modes below this frequency are disabled.
const MIN_MODE_FREQUENCY: f64 = 20.0;

/// The first 64 primes, used for the inharmonic layout.
const PRIMES: [u16; MAX_MODES] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199, 211, 223, 227, 229, 233, 239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307,
    311,
];

/// How mode frequencies are laid out relative to the fundamental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeDistribution {
    /// Integer multiples: 1, 2, 3, ...
    #[default]
    Harmonic,
    /// `sqrt(p / 2)` for the i-th prime `p`: 1, 1.22, 1.58, 1.87, ...
    Inharmonic,
    /// Logarithmic spacing, one semitone apart.
    Natural,
}

impl ModeDistribution {
    /// Frequency ratio of mode `index` (0-based) to the fundamental.
    pub fn ratio(self, index: usize) -> f64 {
        match self {
            ModeDistribution::Harmonic => (index + 1) as f64,
            ModeDistribution::Inharmonic => {
                let p = PRIMES[index.min(MAX_MODES - 1)] as f64;
                (p / 2.0).sqrt()
            }
            ModeDistribution::Natural => 2.0_f64.powf(index as f64 / 12.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Mode {
    filter: ModalFilter,
    /// Normalised target amplitude.
    amplitude: f64,
    /// `amplitude` times the filter's unity-gain scale.
    input_gain: f64,
    enabled: bool,
    /// Peak-hold envelope decaying at the pole radius.
    envelope: f64,
    /// Largest envelope value since the last reset.
    peak: f64,
    asleep: bool,
}

/// A bank of up to [`MAX_MODES`] modal filters summed in parallel.
#[derive(Debug, Clone)]
pub struct ResonatorBank {
    modes: Vec<Mode>,
    mode_count: usize,
    distribution: ModeDistribution,
    brightness: f64,
    t60: f64,
    fundamental: f64,
    sample_rate: f64,
}

impl ResonatorBank {
    /// Allocates storage for [`MAX_MODES`] modes. Nothing allocates afterwards.
    pub fn new(sample_rate: f64) -> Self {
        let mut bank = ResonatorBank {
            modes: vec![Mode::default(); MAX_MODES],
            mode_count: 16,
            distribution: ModeDistribution::Harmonic,
            brightness: 0.5,
            t60: 1.0,
            fundamental: 220.0,
            sample_rate,
        };
        bank.update_modes();
        bank
    }

    /// Set every control at once, recomputing coefficients a single time.
    ///
    /// State is reset only when the mode count changes.
    pub fn configure(
        &mut self,
        fundamental_hz: f64,
        distribution: ModeDistribution,
        mode_count: usize,
        brightness: f64,
        t60_seconds: f64,
    ) {
        let count = mode_count.clamp(MIN_MODES, MAX_MODES);
        let count_changed = count != self.mode_count;
        self.fundamental = fundamental_hz;
        self.distribution = distribution;
        self.mode_count = count;
        if brightness.is_finite() {
            self.brightness = brightness.clamp(0.0, 1.0);
        }
        self.t60 = t60_seconds;
        self.update_modes();
        if count_changed {
            self.reset();
        }
    }

    /// Change the number of modes. Control rate: resets the bank state.
    pub fn set_mode_count(&mut self, n: usize) {
        self.mode_count = n.clamp(MIN_MODES, MAX_MODES);
        self.update_modes();
        self.reset();
    }

    pub fn set_distribution(&mut self, distribution: ModeDistribution) {
        if distribution != self.distribution {
            self.distribution = distribution;
            self.update_modes();
        }
    }

    pub fn set_brightness(&mut self, brightness: f64) {
        if brightness.is_finite() {
            self.brightness = brightness.clamp(0.0, 1.0);
        }
        self.update_modes();
    }

    pub fn set_decay(&mut self, t60_seconds: f64) {
        self.t60 = t60_seconds;
        self.update_modes();
    }

    pub fn set_fundamental(&mut self, hz: f64) {
        self.fundamental = hz;
        self.update_modes();
    }

    pub fn mode_count(&self) -> usize {
        self.mode_count
    }

    /// Modes that fell inside the playable frequency range.
    pub fn enabled_mode_count(&self) -> usize {
        self.active_modes().iter().filter(|m| m.enabled).count()
    }

    /// Enabled modes that are still being processed.
    pub fn awake_mode_count(&self) -> usize {
        self.active_modes()
            .iter()
            .filter(|m| m.enabled && !m.asleep)
            .count()
    }

    /// Normalised amplitude of mode `index`, or 0 outside the active range.
    pub fn mode_amplitude(&self, index: usize) -> f64 {
        self.active_modes().get(index).map_or(0.0, |m| m.amplitude)
    }

    /// Process one sample through every enabled mode and sum the results.
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let input_active = x.abs() > SILENT_INPUT;
        let mut sum = 0.0;
        for mode in self.modes[..self.mode_count].iter_mut() {
            if !mode.enabled || (mode.asleep && !input_active) {
                continue;
            }
            let y = mode.filter.process_sample(x * mode.input_gain);
            let magnitude = y.abs();
            mode.envelope = if magnitude > mode.envelope {
                magnitude
            } else {
                mode.envelope * mode.filter.pole_radius()
            };
            if mode.envelope > mode.peak {
                mode.peak = mode.envelope;
            }
            mode.asleep = mode.envelope <= mode.peak * MODE_SLEEP_RATIO;
            sum += y;
        }
        sum
    }

    /// Zero every mode's state. Coefficients are kept.
    pub fn reset(&mut self) {
        for mode in self.modes.iter_mut() {
            mode.filter.reset();
            mode.envelope = 0.0;
            mode.peak = 0.0;
            mode.asleep = false;
        }
    }

    fn active_modes(&self) -> &[Mode] {
        &self.modes[..self.mode_count]
    }

    fn update_modes(&mut self) {
        let tilt = -2.0 * (1.0 - self.brightness);
        let mut weight_sq = 0.0;
        for (i, mode) in self.modes[..self.mode_count].iter_mut().enumerate() {
            let ratio = self.distribution.ratio(i);
            let freq = self.fundamental * ratio;
            let freq = if freq >= MIN_MODE_FREQUENCY { freq } else { 0.0 };
            mode.enabled = mode.filter.configure(freq, self.t60, self.sample_rate);
            mode.amplitude = if mode.enabled { ratio.powf(tilt) } else { 0.0 };
            weight_sq += mode.amplitude * mode.amplitude;
        }

        let norm = if weight_sq > 0.0 { 1.0 / weight_sq.sqrt() } else { 0.0 };
        for mode in self.modes[..self.mode_count].iter_mut() {
            mode.amplitude *= norm;
            mode.input_gain = mode.amplitude * mode.filter.unity_scale();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::noise::NoiseSource;

    const SR: f64 = 48000.0;

    fn noise_rms(bank: &mut ResonatorBank, seconds: f64) -> f64 {
        let mut noise = NoiseSource::new(1234);
        let warmup = (0.25 * SR) as usize;
        let total = (seconds * SR) as usize;
        let mut sum_sq = 0.0;
        for i in 0..total {
            let y = bank.process_sample(noise.white());
            if i >= warmup {
                sum_sq += y * y;
            }
        }
        (sum_sq / (total - warmup) as f64).sqrt()
    }

    #[test]
    fn equal_power_across_mode_counts() {
        let mut reference = ResonatorBank::new(SR);
        reference.configure(110.0, ModeDistribution::Harmonic, 4, 1.0, 0.1);
        let base = noise_rms(&mut reference, 4.0);
        assert!(base > 0.0);

        for n in [8, 16, 32, 64] {
            let mut bank = ResonatorBank::new(SR);
            bank.configure(110.0, ModeDistribution::Harmonic, n, 1.0, 0.1);
            let rms = noise_rms(&mut bank, 4.0);
            let deviation = (rms / base - 1.0).abs();
            assert!(
                deviation < 0.1,
                "RMS at {n} modes deviates {:.1}% from 4 modes",
                deviation * 100.0
            );
        }
    }

    #[test]
    fn flat_brightness_gives_inverse_sqrt_amplitudes() {
        let mut bank = ResonatorBank::new(SR);
        bank.configure(100.0, ModeDistribution::Harmonic, 16, 1.0, 1.0);
        for i in 0..16 {
            assert!((bank.mode_amplitude(i) - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn amplitudes_have_unit_energy() {
        let mut bank = ResonatorBank::new(SR);
        for brightness in [0.0, 0.3, 1.0] {
            bank.configure(50.0, ModeDistribution::Inharmonic, 32, brightness, 1.0);
            let energy: f64 = (0..32).map(|i| bank.mode_amplitude(i).powi(2)).sum();
            assert!((energy - 1.0).abs() < 1e-9, "energy {energy} at brightness {brightness}");
        }
    }

    #[test]
    fn low_brightness_favours_low_modes() {
        let mut bank = ResonatorBank::new(SR);
        bank.configure(100.0, ModeDistribution::Harmonic, 8, 0.0, 1.0);
        assert!(bank.mode_amplitude(0) > bank.mode_amplitude(7) * 10.0);
    }

    #[test]
    fn mode_count_is_clamped() {
        let mut bank = ResonatorBank::new(SR);
        bank.set_mode_count(1);
        assert_eq!(bank.mode_count(), MIN_MODES);
        bank.set_mode_count(1000);
        assert_eq!(bank.mode_count(), MAX_MODES);
    }

    #[test]
    fn set_mode_count_silences_ringing_modes() {
        let mut bank = ResonatorBank::new(SR);
        bank.configure(220.0, ModeDistribution::Harmonic, 8, 0.5, 2.0);
        bank.process_sample(1.0);
        for _ in 0..100 {
            bank.process_sample(0.0);
        }
        assert!(bank.process_sample(0.0).abs() > 0.0, "Bank should still ring");

        bank.set_mode_count(12);
        assert_eq!(bank.process_sample(0.0), 0.0, "Changing the mode count resets state");
        bank.set_mode_count(12);
        assert_eq!(bank.process_sample(0.0), 0.0);
    }

    #[test]
    fn sleeping_modes_do_not_change_the_output() {
        let count = 8;
        let t60 = 0.2;
        let mut bank = ResonatorBank::new(SR);
        bank.configure(220.0, ModeDistribution::Harmonic, count, 0.0, t60);

        // The same modes, always processed.
        let mut reference: Vec<(ModalFilter, f64)> = (0..count)
            .map(|i| {
                let mut f = ModalFilter::new();
                f.configure(220.0 * ModeDistribution::Harmonic.ratio(i), t60, SR);
                let gain = bank.mode_amplitude(i) * f.unity_scale();
                (f, gain)
            })
            .collect();

        let mut noise = NoiseSource::new(77);
        let mut peak = 0.0_f64;
        let mut max_diff = 0.0_f64;
        for i in 0..(2.0 * SR) as usize {
            let x = if i < 480 { noise.white() } else { 0.0 };
            let y = bank.process_sample(x);
            let expected: f64 = reference.iter_mut().map(|(f, g)| f.process_sample(x * *g)).sum();
            peak = peak.max(expected.abs());
            max_diff = max_diff.max((y - expected).abs());
        }
        assert_eq!(bank.awake_mode_count(), 0, "Every mode should be asleep by the end");
        assert!(
            max_diff <= 2e-3 * peak,
            "Skipping changed the output by {max_diff} against a peak of {peak}"
        );
    }

    #[test]
    fn distributions() {
        assert_eq!(ModeDistribution::Harmonic.ratio(0), 1.0);
        assert_eq!(ModeDistribution::Harmonic.ratio(4), 5.0);
        assert!((ModeDistribution::Inharmonic.ratio(0) - 1.0).abs() < 1e-12);
        assert!((ModeDistribution::Natural.ratio(12) - 2.0).abs() < 1e-12);
        for d in [
            ModeDistribution::Harmonic,
            ModeDistribution::Inharmonic,
            ModeDistribution::Natural,
        ] {
            for i in 1..MAX_MODES {
                assert!(d.ratio(i) > d.ratio(i - 1), "{d:?} ratios must increase");
            }
        }
    }

    #[test]
    fn modes_above_nyquist_are_disabled() {
        let mut bank = ResonatorBank::new(SR);
        bank.configure(2000.0, ModeDistribution::Harmonic, 64, 1.0, 1.0);
        // 0.45 * 48000 = 21600 Hz → harmonics 1..=10 remain.
        assert_eq!(bank.enabled_mode_count(), 10);
        for i in 0..10 {
            assert!((bank.mode_amplitude(i) - 1.0 / 10.0_f64.sqrt()).abs() < 1e-12);
        }
        assert_eq!(bank.mode_amplitude(20), 0.0);
    }

    #[test]
    fn set_distribution_relays_out_modes() {
        let mut bank = ResonatorBank::new(SR);
        bank.configure(2000.0, ModeDistribution::Harmonic, 64, 1.0, 1.0);
        assert_eq!(bank.enabled_mode_count(), 10);
        // sqrt(p / 2) stays under the guard for the first 51 primes.
        bank.set_distribution(ModeDistribution::Inharmonic);
        assert_eq!(bank.enabled_mode_count(), 51);
        let energy: f64 = (0..64).map(|i| bank.mode_amplitude(i).powi(2)).sum();
        assert!((energy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn decayed_modes_fall_asleep() {
        let mut bank = ResonatorBank::new(SR);
        bank.configure(220.0, ModeDistribution::Harmonic, 8, 0.5, 0.05);
        bank.process_sample(1.0);
        assert_eq!(bank.awake_mode_count(), 8);
        for _ in 0..(SR as usize / 2) {
            bank.process_sample(0.0);
        }
        assert_eq!(bank.awake_mode_count(), 0, "Modes should sleep after 10 × T60");
        let y = bank.process_sample(0.0);
        assert_eq!(y, 0.0);

        // New input wakes them again.
        let y = bank.process_sample(1.0);
        assert!(y.abs() > 0.0);
        assert_eq!(bank.awake_mode_count(), 8);
    }

    #[test]
    fn set_decay_keeps_ringing() {
        let mut bank = ResonatorBank::new(SR);
        bank.configure(220.0, ModeDistribution::Harmonic, 4, 0.5, 2.0);
        bank.process_sample(1.0);
        for _ in 0..100 {
            bank.process_sample(0.0);
        }
        bank.set_decay(1.0);
        let mut energy = 0.0;
        for _ in 0..100 {
            energy += bank.process_sample(0.0).powi(2);
        }
        assert!(energy > 0.0, "Changing decay should not reset the bank");
    }
}
