//! Preset record and factory presets.
//!
//! A preset is a named, versioned [`ParameterSet`] plus descriptive
//! metadata, exchanged as JSON. The engine never touches the filesystem;
//! hosts hand it decoded presets or JSON strings.

use serde::{Deserialize, Serialize};

use crate::error::PresetError;
use crate::params::ParameterSet;

/// Newest preset format this crate reads and the one it writes.
pub const PRESET_FORMAT_VERSION: u32 = 1;

// ── Preset Record ───────────────────────────────────────────

/// A complete patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Format version. Missing means the current version.
    #[serde(default = "current_version")]
    pub version: u32,
    /// Human-readable name (e.g., "Glass Bell").
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: PresetCategory,
    /// Searchable tags (e.g., ["metallic", "long"]).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Missing keys take their defaults.
    #[serde(default)]
    pub parameters: ParameterSet,
}

fn current_version() -> u32 {
    PRESET_FORMAT_VERSION
}

/// Preset categories. Unknown categories decode as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetCategory {
    Percussion,
    Bowed,
    Plucked,
    Pad,
    Texture,
    #[default]
    #[serde(other)]
    Other,
}

impl Preset {
    /// A preset with default parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Preset {
            version: PRESET_FORMAT_VERSION,
            name: name.into(),
            author: String::new(),
            description: String::new(),
            category: PresetCategory::Other,
            tags: Vec::new(),
            parameters: ParameterSet::default(),
        }
    }

    /// Decode and validate a preset. Parameter values are clamped into range.
    pub fn from_json(json: &str) -> Result<Preset, PresetError> {
        let mut preset: Preset = serde_json::from_str(json)?;
        preset.validate()?;
        preset.parameters = preset.parameters.clamped();
        Ok(preset)
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the fields a loader relies on.
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.version > PRESET_FORMAT_VERSION {
            return Err(PresetError::UnsupportedVersion {
                found: self.version,
                supported: PRESET_FORMAT_VERSION,
            });
        }
        if self.name.trim().is_empty() {
            return Err(PresetError::EmptyName);
        }
        Ok(())
    }
}

// ── Factory Presets ─────────────────────────────────────────

/// Identifiers of the built-in presets, in display order.
pub const FACTORY_PRESET_IDS: [&str; 4] = ["init", "bell", "bowed_metal", "plucked_string"];

/// Look up a built-in preset by identifier.
pub fn factory_preset(id: &str) -> Option<Preset> {
    let preset = match id {
        "init" => Preset {
            description: "Default parameters.".into(),
            ..Preset::new("Init")
        },
        "bell" => Preset {
            description: "Bright struck bell with a long ring.".into(),
            category: PresetCategory::Percussion,
            tags: vec!["metallic".into(), "long".into()],
            parameters: ParameterSet {
                exciter_noise_color: 0.1,
                exciter_gain: 1.0,
                exciter_attack: 0.0005,
                exciter_decay: 0.01,
                exciter_release: 0.01,
                resonator_mode_count: 32.0,
                resonator_brightness: 0.8,
                resonator_decay: 0.8,
                feedback_amount: 0.1,
                feedback_mix: 0.2,
                filter_cutoff: 0.95,
                filter_resonance: 0.1,
                amp_attack: 0.001,
                amp_decay: 2.0,
                amp_sustain: 0.6,
                amp_release: 3.0,
                ..ParameterSet::default()
            },
            ..Preset::new("Bell")
        },
        "bowed_metal" => Preset {
            description: "Sustained bowed plate driven through a hot feedback loop.".into(),
            category: PresetCategory::Bowed,
            tags: vec!["metallic".into(), "sustain".into(), "drone".into()],
            parameters: ParameterSet {
                exciter_noise_color: 0.7,
                exciter_gain: 0.6,
                exciter_attack: 0.3,
                exciter_decay: 0.5,
                exciter_sustain: 0.5,
                exciter_release: 0.8,
                resonator_mode_count: 48.0,
                resonator_brightness: 0.6,
                resonator_decay: 0.7,
                feedback_amount: 0.8,
                feedback_delay_time: 23.0,
                feedback_saturation: 4.0,
                feedback_mix: 0.6,
                filter_cutoff: 0.7,
                filter_resonance: 0.35,
                amp_attack: 0.4,
                amp_decay: 0.5,
                amp_sustain: 0.9,
                amp_release: 2.0,
                ..ParameterSet::default()
            },
            ..Preset::new("Bowed Metal")
        },
        "plucked_string" => Preset {
            description: "Short, dark pluck.".into(),
            category: PresetCategory::Plucked,
            tags: vec!["short".into(), "string".into()],
            parameters: ParameterSet {
                exciter_noise_color: 0.4,
                exciter_gain: 0.9,
                exciter_attack: 0.0005,
                exciter_decay: 0.008,
                exciter_release: 0.005,
                resonator_mode_count: 24.0,
                resonator_brightness: 0.35,
                resonator_decay: 0.4,
                feedback_amount: 0.05,
                filter_cutoff: 0.65,
                filter_resonance: 0.15,
                amp_attack: 0.001,
                amp_decay: 0.8,
                amp_sustain: 0.0,
                amp_release: 0.3,
                ..ParameterSet::default()
            },
            ..Preset::new("Plucked String")
        },
        _ => return None,
    };
    Some(Preset {
        author: "Aether".into(),
        ..preset
    })
}

/// Every built-in preset.
pub fn factory_presets() -> Vec<Preset> {
    FACTORY_PRESET_IDS
        .iter()
        .filter_map(|id| factory_preset(id))
        .collect()
}
