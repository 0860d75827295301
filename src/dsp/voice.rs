//! Voice — one note instance: exciter, physical model, post filter and
//! amplitude envelope, wrapped in an `Idle → Active → Releasing` lifecycle.

use crate::config::{EngineConfig, VoiceModel};
use crate::params::ParameterSet;

use super::envelope::Envelope;
use super::exciter::Exciter;
use super::feedback::FeedbackLoop;
use super::filter::PostFilter;
use super::resonator::{ModeDistribution, ResonatorBank};
use super::string::WaveguideString;

/// Makeup gain for the modal path. Unity-peak modes driven by a short burst
/// sit well below full scale.
const MODAL_OUTPUT_GAIN: f64 = 16.0;
const STRING_OUTPUT_GAIN: f64 = 0.5;
/// Time constant of the output level follower.
const LEVEL_SMOOTHING_SECONDS: f64 = 0.05;

/// Convert a MIDI note number to frequency.
///
/// `tuning_pitch` is the frequency of A4 (MIDI 69).
/// Formula: `tuning_pitch * 2^((midi - 69) / 12)`
pub fn midi_to_frequency(midi: u8, tuning_pitch: f64) -> f64 {
    tuning_pitch * 2.0_f64.powf((midi as f64 - 69.0) / 12.0)
}

/// Lifecycle of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Not processed. Buffers are kept but inert.
    Idle,
    /// Note held.
    Active,
    /// Note released; tail ringing out.
    Releasing,
}

/// The sound-producing model behind a voice.
#[derive(Debug, Clone)]
enum Source {
    Modal {
        bank: ResonatorBank,
        feedback: FeedbackLoop,
    },
    String(WaveguideString),
}

impl Source {
    fn reset(&mut self) {
        match self {
            Source::Modal { bank, feedback } => {
                bank.reset();
                feedback.clear();
            }
            Source::String(string) => string.reset(),
        }
    }

    #[inline]
    fn process_sample(&mut self, excitation: f64) -> f64 {
        match self {
            Source::Modal { bank, feedback } => {
                // The loop value was computed on the previous sample.
                let resonated = bank.process_sample(excitation + feedback.recirculation());
                feedback.process_sample(resonated);
                (resonated + feedback.recirculation()) * MODAL_OUTPUT_GAIN
            }
            Source::String(string) => string.process_sample(excitation) * STRING_OUTPUT_GAIN,
        }
    }
}

/// A single polyphonic voice.
#[derive(Debug, Clone)]
pub struct Voice {
    exciter: Exciter,
    source: Source,
    filter: PostFilter,
    amp: Envelope,

    state: VoiceState,
    note: u8,
    velocity: f64,
    frequency: f64,
    trigger_age: u64,
    sustain_held: bool,

    /// Samples spent in `Releasing`.
    release_counter: usize,
    max_release_samples: usize,
    /// Smoothed mean-square of the voice output.
    mean_square: f64,
    level_coeff: f64,
    silence_threshold_sq: f64,

    distribution: ModeDistribution,
    tuning_pitch: f64,
    params: ParameterSet,
}

impl Voice {
    /// Allocates every buffer the voice will ever use. `seed` picks the
    /// exciter's noise sequence.
    pub fn new(sample_rate: f64, config: &EngineConfig, seed: u64) -> Self {
        let source = match config.model {
            VoiceModel::Modal => Source::Modal {
                bank: ResonatorBank::new(sample_rate),
                feedback: FeedbackLoop::new(sample_rate),
            },
            VoiceModel::String => Source::String(WaveguideString::new(sample_rate)),
        };
        let threshold = config.silence_threshold();
        let mut voice = Voice {
            exciter: Exciter::new(sample_rate, seed),
            source,
            filter: PostFilter::new(sample_rate),
            amp: Envelope::new(sample_rate),
            state: VoiceState::Idle,
            note: 0,
            velocity: 0.0,
            frequency: midi_to_frequency(60, config.tuning_pitch),
            trigger_age: 0,
            sustain_held: false,
            release_counter: 0,
            max_release_samples: (config.max_release_seconds * sample_rate) as usize,
            mean_square: 0.0,
            level_coeff: (-1.0 / (LEVEL_SMOOTHING_SECONDS * sample_rate)).exp(),
            silence_threshold_sq: threshold * threshold,
            distribution: config.distribution,
            tuning_pitch: config.tuning_pitch,
            params: ParameterSet::default(),
        };
        voice.configure_all();
        voice
    }

    /// Apply a parameter snapshot. Values are clamped into range first, and
    /// components are only touched when their slice of the snapshot changed.
    pub fn apply_params(&mut self, params: &ParameterSet) {
        let params = &params.clamped();
        if *params == self.params {
            return;
        }
        let resonator_changed = params.resonator_mode_count != self.params.resonator_mode_count
            || params.resonator_brightness != self.params.resonator_brightness
            || params.resonator_decay != self.params.resonator_decay;
        self.params = *params;

        self.exciter.apply_params(params);
        self.filter.apply_params(params);
        self.amp
            .set_adsr(params.amp_attack, params.amp_decay, params.amp_sustain, params.amp_release);
        match &mut self.source {
            Source::Modal { bank, feedback } => {
                feedback.apply_params(params);
                if resonator_changed {
                    bank.configure(
                        self.frequency,
                        self.distribution,
                        params.mode_count(),
                        params.resonator_brightness,
                        params.resonator_t60(),
                    );
                }
            }
            Source::String(string) => string.apply_params(params),
        }
    }

    fn configure_all(&mut self) {
        let params = self.params;
        self.exciter.apply_params(&params);
        self.filter.apply_params(&params);
        self.amp
            .set_adsr(params.amp_attack, params.amp_decay, params.amp_sustain, params.amp_release);
        match &mut self.source {
            Source::Modal { bank, feedback } => {
                feedback.apply_params(&params);
                bank.configure(
                    self.frequency,
                    self.distribution,
                    params.mode_count(),
                    params.resonator_brightness,
                    params.resonator_t60(),
                );
            }
            Source::String(string) => {
                string.apply_params(&params);
                string.set_frequency(self.frequency);
            }
        }
    }

    /// Start a note. All state is reset; nothing is allocated.
    pub fn trigger(&mut self, note: u8, velocity: f64, age: u64) {
        self.note = note.min(127);
        self.velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 0.0 };
        self.trigger_age = age;
        self.sustain_held = false;
        self.release_counter = 0;
        self.mean_square = 0.0;
        self.frequency = midi_to_frequency(self.note, self.tuning_pitch);

        match &mut self.source {
            Source::Modal { bank, .. } => bank.set_fundamental(self.frequency),
            Source::String(string) => string.set_frequency(self.frequency),
        }
        self.source.reset();
        self.filter.reset();
        self.amp.reset();
        self.amp.gate_on();
        self.exciter.trigger(self.velocity);
        self.state = VoiceState::Active;
    }

    /// Enter the release phase. The resonator and loop keep ringing.
    pub fn release(&mut self) {
        if self.state != VoiceState::Active {
            return;
        }
        self.state = VoiceState::Releasing;
        self.sustain_held = false;
        self.release_counter = 0;
        self.exciter.release();
        self.amp.gate_off();
    }

    /// Hard stop: straight to `Idle` with all state cleared.
    pub fn kill(&mut self) {
        self.state = VoiceState::Idle;
        self.sustain_held = false;
        self.mean_square = 0.0;
        self.exciter.reset();
        self.amp.reset();
        self.source.reset();
        self.filter.reset();
    }

    /// Add this voice's output into `out`.
    ///
    /// Returns `true` if the voice retired to `Idle` during this call.
    pub fn render(&mut self, out: &mut [f64]) -> bool {
        if self.state == VoiceState::Idle {
            return false;
        }
        for sample in out.iter_mut() {
            let excitation = self.exciter.process_sample();
            let raw = self.source.process_sample(excitation);
            let y = self.filter.process_sample(raw) * self.amp.next_sample();
            self.mean_square += (1.0 - self.level_coeff) * (y * y - self.mean_square);
            *sample += y;
        }

        if self.state == VoiceState::Releasing {
            self.release_counter += out.len();
            if self.should_retire() {
                self.kill();
                return true;
            }
        }
        false
    }

    fn should_retire(&self) -> bool {
        self.amp.is_finished()
            || self.release_counter >= self.max_release_samples
            || (self.exciter.is_finished() && self.mean_square < self.silence_threshold_sq)
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == VoiceState::Idle
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn trigger_age(&self) -> u64 {
        self.trigger_age
    }

    pub fn sustain_held(&self) -> bool {
        self.sustain_held
    }

    /// Defer a note-off until the sustain pedal lifts.
    pub fn hold_for_sustain(&mut self) {
        if self.state == VoiceState::Active {
            self.sustain_held = true;
        }
    }

    /// RMS of the recent output.
    pub fn level(&self) -> f64 {
        self.mean_square.sqrt()
    }
}
