//! Flat parameter contract shared by every voice.
//!
//! A [`ParameterSet`] is a plain `Copy` value: the audio thread takes one
//! snapshot per block and hands it to every voice by reference. The control
//! thread publishes new values through [`SharedParameters`], one atomic per
//! scalar, so a reader sees either the old or the new value of each key and
//! never a torn one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Number of keys in the parameter contract.
pub const PARAM_COUNT: usize = 19;

/// Identifier of one entry of the parameter contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    ExciterNoiseColor,
    ExciterGain,
    ExciterAttack,
    ExciterDecay,
    ExciterSustain,
    ExciterRelease,
    ResonatorModeCount,
    ResonatorBrightness,
    ResonatorDecay,
    FeedbackAmount,
    FeedbackDelayTime,
    FeedbackSaturation,
    FeedbackMix,
    FilterCutoff,
    FilterResonance,
    AmpAttack,
    AmpDecay,
    AmpSustain,
    AmpRelease,
}

impl ParamId {
    /// All keys, in contract order.
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::ExciterNoiseColor,
        ParamId::ExciterGain,
        ParamId::ExciterAttack,
        ParamId::ExciterDecay,
        ParamId::ExciterSustain,
        ParamId::ExciterRelease,
        ParamId::ResonatorModeCount,
        ParamId::ResonatorBrightness,
        ParamId::ResonatorDecay,
        ParamId::FeedbackAmount,
        ParamId::FeedbackDelayTime,
        ParamId::FeedbackSaturation,
        ParamId::FeedbackMix,
        ParamId::FilterCutoff,
        ParamId::FilterResonance,
        ParamId::AmpAttack,
        ParamId::AmpDecay,
        ParamId::AmpSustain,
        ParamId::AmpRelease,
    ];

    /// Position of this key in [`ParamId::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Flat key used by presets and hosts.
    pub fn key(self) -> &'static str {
        match self {
            ParamId::ExciterNoiseColor => "exciter_noise_color",
            ParamId::ExciterGain => "exciter_gain",
            ParamId::ExciterAttack => "exciter_attack",
            ParamId::ExciterDecay => "exciter_decay",
            ParamId::ExciterSustain => "exciter_sustain",
            ParamId::ExciterRelease => "exciter_release",
            ParamId::ResonatorModeCount => "resonator_mode_count",
            ParamId::ResonatorBrightness => "resonator_brightness",
            ParamId::ResonatorDecay => "resonator_decay",
            ParamId::FeedbackAmount => "feedback_amount",
            ParamId::FeedbackDelayTime => "feedback_delay_time",
            ParamId::FeedbackSaturation => "feedback_saturation",
            ParamId::FeedbackMix => "feedback_mix",
            ParamId::FilterCutoff => "filter_cutoff",
            ParamId::FilterResonance => "filter_resonance",
            ParamId::AmpAttack => "amp_attack",
            ParamId::AmpDecay => "amp_decay",
            ParamId::AmpSustain => "amp_sustain",
            ParamId::AmpRelease => "amp_release",
        }
    }

    pub fn from_key(key: &str) -> Option<ParamId> {
        ParamId::ALL.iter().copied().find(|id| id.key() == key)
    }

    /// Valid `(min, max)` range. Values outside it are clamped, never rejected.
    pub fn range(self) -> (f64, f64) {
        match self {
            ParamId::ExciterAttack | ParamId::ExciterDecay => (0.0, 5.0),
            ParamId::ExciterRelease => (0.0, 10.0),
            ParamId::ResonatorModeCount => (4.0, 64.0),
            ParamId::FeedbackAmount => (0.0, 0.95),
            ParamId::FeedbackDelayTime => (1.0, 200.0),
            ParamId::FeedbackSaturation => (1.0, 10.0),
            ParamId::AmpAttack | ParamId::AmpDecay => (0.0, 5.0),
            ParamId::AmpRelease => (0.0, 10.0),
            _ => (0.0, 1.0),
        }
    }

    /// Clamp `value` into range. Non-finite input falls back to the default.
    pub fn clamp(self, value: f64) -> f64 {
        if !value.is_finite() {
            return ParameterSet::default().get(self);
        }
        let (lo, hi) = self.range();
        let v = value.clamp(lo, hi);
        if self == ParamId::ResonatorModeCount {
            v.round()
        } else {
            v
        }
    }
}

/// The complete set of 19 control parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    pub exciter_noise_color: f64,
    pub exciter_gain: f64,
    pub exciter_attack: f64,
    pub exciter_decay: f64,
    pub exciter_sustain: f64,
    pub exciter_release: f64,
    pub resonator_mode_count: f64,
    pub resonator_brightness: f64,
    pub resonator_decay: f64,
    pub feedback_amount: f64,
    /// Delay time in milliseconds.
    pub feedback_delay_time: f64,
    pub feedback_saturation: f64,
    pub feedback_mix: f64,
    pub filter_cutoff: f64,
    pub filter_resonance: f64,
    pub amp_attack: f64,
    pub amp_decay: f64,
    pub amp_sustain: f64,
    pub amp_release: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet {
            exciter_noise_color: 0.3,
            exciter_gain: 0.8,
            exciter_attack: 0.001,
            exciter_decay: 0.05,
            exciter_sustain: 0.0,
            exciter_release: 0.05,
            resonator_mode_count: 16.0,
            resonator_brightness: 0.5,
            resonator_decay: 0.5,
            feedback_amount: 0.3,
            feedback_delay_time: 10.0,
            feedback_saturation: 2.0,
            feedback_mix: 0.3,
            filter_cutoff: 0.8,
            filter_resonance: 0.2,
            amp_attack: 0.005,
            amp_decay: 0.3,
            amp_sustain: 0.8,
            amp_release: 0.5,
        }
    }
}

impl ParameterSet {
    pub fn get(&self, id: ParamId) -> f64 {
        match id {
            ParamId::ExciterNoiseColor => self.exciter_noise_color,
            ParamId::ExciterGain => self.exciter_gain,
            ParamId::ExciterAttack => self.exciter_attack,
            ParamId::ExciterDecay => self.exciter_decay,
            ParamId::ExciterSustain => self.exciter_sustain,
            ParamId::ExciterRelease => self.exciter_release,
            ParamId::ResonatorModeCount => self.resonator_mode_count,
            ParamId::ResonatorBrightness => self.resonator_brightness,
            ParamId::ResonatorDecay => self.resonator_decay,
            ParamId::FeedbackAmount => self.feedback_amount,
            ParamId::FeedbackDelayTime => self.feedback_delay_time,
            ParamId::FeedbackSaturation => self.feedback_saturation,
            ParamId::FeedbackMix => self.feedback_mix,
            ParamId::FilterCutoff => self.filter_cutoff,
            ParamId::FilterResonance => self.filter_resonance,
            ParamId::AmpAttack => self.amp_attack,
            ParamId::AmpDecay => self.amp_decay,
            ParamId::AmpSustain => self.amp_sustain,
            ParamId::AmpRelease => self.amp_release,
        }
    }

    /// Set a value, clamped into the key's range.
    pub fn set(&mut self, id: ParamId, value: f64) {
        let v = id.clamp(value);
        let slot = match id {
            ParamId::ExciterNoiseColor => &mut self.exciter_noise_color,
            ParamId::ExciterGain => &mut self.exciter_gain,
            ParamId::ExciterAttack => &mut self.exciter_attack,
            ParamId::ExciterDecay => &mut self.exciter_decay,
            ParamId::ExciterSustain => &mut self.exciter_sustain,
            ParamId::ExciterRelease => &mut self.exciter_release,
            ParamId::ResonatorModeCount => &mut self.resonator_mode_count,
            ParamId::ResonatorBrightness => &mut self.resonator_brightness,
            ParamId::ResonatorDecay => &mut self.resonator_decay,
            ParamId::FeedbackAmount => &mut self.feedback_amount,
            ParamId::FeedbackDelayTime => &mut self.feedback_delay_time,
            ParamId::FeedbackSaturation => &mut self.feedback_saturation,
            ParamId::FeedbackMix => &mut self.feedback_mix,
            ParamId::FilterCutoff => &mut self.filter_cutoff,
            ParamId::FilterResonance => &mut self.filter_resonance,
            ParamId::AmpAttack => &mut self.amp_attack,
            ParamId::AmpDecay => &mut self.amp_decay,
            ParamId::AmpSustain => &mut self.amp_sustain,
            ParamId::AmpRelease => &mut self.amp_release,
        };
        *slot = v;
    }

    /// Look up a value by its flat key.
    pub fn get_named(&self, key: &str) -> Option<f64> {
        ParamId::from_key(key).map(|id| self.get(id))
    }

    /// Set a value by its flat key. Returns `false` for an unknown key.
    pub fn set_named(&mut self, key: &str, value: f64) -> bool {
        match ParamId::from_key(key) {
            Some(id) => {
                self.set(id, value);
                true
            }
            None => {
                tracing::debug!("ignoring unknown parameter key '{key}'");
                false
            }
        }
    }

    /// Copy with every value clamped into range.
    pub fn clamped(&self) -> ParameterSet {
        let mut out = *self;
        for id in ParamId::ALL {
            out.set(id, self.get(id));
        }
        out
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        ParamId::ALL
            .iter()
            .map(|&id| (id.key().to_string(), self.get(id)))
            .collect()
    }

    /// Build from a flat map. Missing keys keep their defaults and unknown
    /// keys are ignored.
    pub fn from_map(map: &BTreeMap<String, f64>) -> ParameterSet {
        let mut params = ParameterSet::default();
        for (key, &value) in map {
            params.set_named(key, value);
        }
        params
    }

    /// Number of resonator modes as an integer in `[4, 64]`.
    pub fn mode_count(&self) -> usize {
        ParamId::ResonatorModeCount.clamp(self.resonator_mode_count) as usize
    }

    /// Resonator T60 in seconds: `resonator_decay` 0..1 maps to 50 ms..10 s.
    pub fn resonator_t60(&self) -> f64 {
        let d = ParamId::ResonatorDecay.clamp(self.resonator_decay);
        0.05 * 200.0_f64.powf(d)
    }
}

/// Lock-free home for the current [`ParameterSet`].
///
/// Each scalar lives in its own `AtomicU64` holding the `f64` bit pattern.
#[derive(Debug)]
pub struct SharedParameters {
    values: [AtomicU64; PARAM_COUNT],
}

impl SharedParameters {
    pub fn new(initial: &ParameterSet) -> Self {
        let shared = SharedParameters {
            values: std::array::from_fn(|_| AtomicU64::new(0)),
        };
        shared.store(initial);
        shared
    }

    /// Publish a complete set. Values are clamped before they are stored.
    pub fn store(&self, params: &ParameterSet) {
        for id in ParamId::ALL {
            self.store_value(id, params.get(id));
        }
    }

    /// Publish a single value.
    pub fn store_value(&self, id: ParamId, value: f64) {
        self.values[id.index()].store(id.clamp(value).to_bits(), Ordering::Relaxed);
    }

    /// Read every scalar once. Wait-free.
    pub fn snapshot(&self) -> ParameterSet {
        let mut out = ParameterSet::default();
        for id in ParamId::ALL {
            out.set(id, f64::from_bits(self.values[id.index()].load(Ordering::Relaxed)));
        }
        out
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        SharedParameters::new(&ParameterSet::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nineteen_unique_keys() {
        let mut keys: Vec<&str> = ParamId::ALL.iter().map(|id| id.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), PARAM_COUNT);
        for (i, id) in ParamId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(ParamId::from_key(id.key()), Some(*id));
        }
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut p = ParameterSet::default();
        p.set(ParamId::FeedbackAmount, 3.0);
        p.set(ParamId::FeedbackSaturation, 100.0);
        p.set(ParamId::ResonatorModeCount, 200.0);
        p.set(ParamId::FeedbackDelayTime, 0.0);
        assert_eq!(p.feedback_amount, 0.95);
        assert_eq!(p.feedback_saturation, 10.0);
        assert_eq!(p.resonator_mode_count, 64.0);
        assert_eq!(p.feedback_delay_time, 1.0);
    }

    #[test]
    fn mode_count_rounds() {
        let mut p = ParameterSet::default();
        p.set(ParamId::ResonatorModeCount, 7.6);
        assert_eq!(p.mode_count(), 8);
        p.resonator_mode_count = 1.0;
        assert_eq!(p.mode_count(), 4, "raw field below range still reads clamped");
    }

    #[test]
    fn non_finite_falls_back_to_default() {
        let mut p = ParameterSet::default();
        p.set(ParamId::FilterCutoff, f64::NAN);
        assert_eq!(p.filter_cutoff, ParameterSet::default().filter_cutoff);
    }

    #[test]
    fn unknown_key_is_reported() {
        let mut p = ParameterSet::default();
        assert!(!p.set_named("exciter_volume", 0.5));
        assert!(p.set_named("exciter_gain", 0.25));
        assert_eq!(p.get_named("exciter_gain"), Some(0.25));
        assert_eq!(p.get_named("nope"), None);
    }

    #[test]
    fn json_round_trip_preserves_all_keys() {
        let mut p = ParameterSet::default();
        for (i, id) in ParamId::ALL.iter().enumerate() {
            let (lo, hi) = id.range();
            p.set(*id, lo + (hi - lo) * (i as f64 + 1.0) / 23.0);
        }
        let json = serde_json::to_string(&p).unwrap();
        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        for id in ParamId::ALL {
            assert!(
                (p.get(id) - back.get(id)).abs() < 1e-6,
                "{} changed in round trip",
                id.key()
            );
        }
    }

    #[test]
    fn map_round_trip() {
        let mut p = ParameterSet::default();
        p.feedback_mix = 0.9;
        p.amp_release = 2.5;
        let map = p.to_map();
        assert_eq!(map.len(), PARAM_COUNT);
        assert_eq!(ParameterSet::from_map(&map), p);
    }

    #[test]
    fn missing_json_keys_take_defaults() {
        let p: ParameterSet = serde_json::from_str(r#"{"feedback_mix": 0.75}"#).unwrap();
        assert_eq!(p.feedback_mix, 0.75);
        assert_eq!(p.amp_sustain, ParameterSet::default().amp_sustain);
    }

    #[test]
    fn shared_snapshot_sees_published_values() {
        let shared = SharedParameters::default();
        assert_eq!(shared.snapshot(), ParameterSet::default());

        shared.store_value(ParamId::FilterCutoff, 0.25);
        shared.store_value(ParamId::FeedbackAmount, 5.0);
        let snap = shared.snapshot();
        assert_eq!(snap.filter_cutoff, 0.25);
        assert_eq!(snap.feedback_amount, 0.95);
    }

    #[test]
    fn t60_mapping_endpoints() {
        let mut p = ParameterSet::default();
        p.resonator_decay = 0.0;
        assert!((p.resonator_t60() - 0.05).abs() < 1e-12);
        p.resonator_decay = 1.0;
        assert!((p.resonator_t60() - 10.0).abs() < 1e-9);
    }
}
