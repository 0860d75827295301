//! Exciter — a coloured noise burst shaped by its own ADSR.

use crate::params::ParameterSet;

use super::envelope::Envelope;
use super::noise::NoiseSource;

/// Energy source for a voice.
#[derive(Debug, Clone)]
pub struct Exciter {
    pub envelope: Envelope,
    noise: NoiseSource,
    /// Output gain [0, 1].
    pub gain: f64,
    velocity: f64,
}

impl Exciter {
    /// `seed` selects the noise sequence, so voices do not play in unison.
    pub fn new(sample_rate: f64, seed: u64) -> Self {
        Exciter {
            envelope: Envelope::new(sample_rate),
            noise: NoiseSource::new(seed),
            gain: 1.0,
            velocity: 0.0,
        }
    }

    /// Pull the exciter's slice of the parameter snapshot.
    pub fn apply_params(&mut self, params: &ParameterSet) {
        self.envelope.set_adsr(
            params.exciter_attack,
            params.exciter_decay,
            params.exciter_sustain,
            params.exciter_release,
        );
        self.noise.set_color(params.exciter_noise_color);
        let gain = params.exciter_gain;
        self.gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.0 };
    }

    /// Start a burst. The envelope restarts from zero.
    pub fn trigger(&mut self, velocity: f64) {
        self.velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 0.0 };
        self.envelope.reset();
        self.envelope.gate_on();
    }

    pub fn release(&mut self) {
        self.envelope.gate_off();
    }

    /// Stop immediately.
    pub fn reset(&mut self) {
        self.envelope.reset();
        self.velocity = 0.0;
    }

    /// `noise × envelope × gain × velocity`.
    #[inline]
    pub fn process_sample(&mut self) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        let env = self.envelope.next_sample();
        self.noise.next_sample() * env * self.gain * self.velocity
    }

    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burst_params() -> ParameterSet {
        ParameterSet {
            exciter_attack: 0.001,
            exciter_decay: 0.01,
            exciter_sustain: 0.0,
            exciter_release: 0.01,
            exciter_gain: 1.0,
            ..ParameterSet::default()
        }
    }

    #[test]
    fn silent_until_triggered() {
        let mut ex = Exciter::new(48000.0, 1);
        ex.apply_params(&burst_params());
        for _ in 0..100 {
            assert_eq!(ex.process_sample(), 0.0);
        }
    }

    #[test]
    fn burst_is_finite_in_length() {
        let mut ex = Exciter::new(48000.0, 1);
        ex.apply_params(&burst_params());
        ex.trigger(1.0);

        let mut energy = 0.0;
        for _ in 0..4800 {
            let s = ex.process_sample();
            assert!(s.abs() < 1.6, "Burst sample out of range: {s}");
            energy += s * s;
        }
        assert!(energy > 0.0, "Burst should carry energy");

        // Sustain 0: the decayed envelope sits at zero until released.
        ex.release();
        for _ in 0..1000 {
            ex.process_sample();
        }
        assert!(ex.is_finished());
        assert_eq!(ex.process_sample(), 0.0);
    }

    #[test]
    fn velocity_scales_output() {
        let params = burst_params();
        let mut loud = Exciter::new(48000.0, 9);
        let mut soft = Exciter::new(48000.0, 9);
        loud.apply_params(&params);
        soft.apply_params(&params);
        loud.trigger(1.0);
        soft.trigger(0.25);
        for _ in 0..500 {
            let a = loud.process_sample();
            let b = soft.process_sample();
            assert!((a * 0.25 - b).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_gain_is_silent() {
        let mut ex = Exciter::new(48000.0, 2);
        ex.apply_params(&ParameterSet {
            exciter_gain: 0.0,
            ..burst_params()
        });
        ex.trigger(1.0);
        for _ in 0..1000 {
            assert_eq!(ex.process_sample(), 0.0);
        }
    }
}
