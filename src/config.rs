//! Engine-level configuration fixed at `prepare()` time.

use serde::{Deserialize, Serialize};

use crate::dsp::resonator::ModeDistribution;

/// Largest voice pool the engine supports.
pub const MAX_VOICES: usize = 16;

/// Which physical model every voice of the pool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceModel {
    /// Exciter → resonator bank → saturating feedback loop.
    #[default]
    Modal,
    /// Delay-line string coupled to a small resonant body.
    String,
}

/// Configuration for the engine and its voice pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Polyphony, clamped to `[1, MAX_VOICES]`.
    pub max_voices: usize,
    pub model: VoiceModel,
    /// Mode frequency layout of the resonator bank.
    pub distribution: ModeDistribution,
    /// Gain applied to the voice sum before the output soft clipper.
    pub master_gain: f64,
    /// Releasing voices whose smoothed output falls below this level retire.
    pub silence_threshold_db: f64,
    /// Upper bound on a voice's time in the releasing state.
    pub max_release_seconds: f64,
    /// Frequency of A4 in Hz.
    pub tuning_pitch: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_voices: MAX_VOICES,
            model: VoiceModel::Modal,
            distribution: ModeDistribution::Harmonic,
            master_gain: 0.8,
            silence_threshold_db: -90.0,
            max_release_seconds: 12.0,
            tuning_pitch: 440.0,
        }
    }
}

impl EngineConfig {
    /// Copy with every field forced into its valid range.
    pub fn sanitized(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
        EngineConfig {
            max_voices: self.max_voices.clamp(1, MAX_VOICES),
            model: self.model,
            distribution: self.distribution,
            master_gain: finite_or(self.master_gain, defaults.master_gain).clamp(0.0, 4.0),
            silence_threshold_db: finite_or(self.silence_threshold_db, defaults.silence_threshold_db)
                .clamp(-160.0, -20.0),
            max_release_seconds: finite_or(self.max_release_seconds, defaults.max_release_seconds)
                .clamp(0.01, 60.0),
            tuning_pitch: finite_or(self.tuning_pitch, defaults.tuning_pitch).clamp(400.0, 480.0),
        }
    }

    /// Silence threshold as a linear amplitude.
    pub fn silence_threshold(&self) -> f64 {
        10.0_f64.powf(self.silence_threshold_db / 20.0)
    }
}
