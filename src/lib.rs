pub mod config;
pub mod dsp;
pub mod error;
pub mod params;
pub mod preset;

pub use crate::config::{EngineConfig, VoiceModel};
pub use crate::dsp::engine::{Engine, NoteEvent, NoteEventKind};
pub use crate::error::{AetherError, PresetError};
pub use crate::params::{ParamId, ParameterSet, SharedParameters};
pub use crate::preset::Preset;

use crate::dsp::renderer::NoteRender;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Events queued from JS between two `process` calls. The queue never grows
/// past this; see [`AetherEngine::queue`].
const PENDING_EVENT_CAPACITY: usize = 256;

/// WASM-exposed: return the aether-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: the built-in presets as an array of preset objects.
#[wasm_bindgen]
pub fn factory_presets() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&preset::factory_presets())
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: default parameters as a flat `{ key: value }` object.
#[wasm_bindgen]
pub fn default_parameters() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&ParameterSet::default().to_map())
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

fn render_request(note: u8, velocity: f64, hold_seconds: f64, tail_seconds: f64) -> NoteRender {
    NoteRender {
        note,
        velocity,
        hold_seconds,
        tail_seconds,
    }
}

/// WASM-exposed: render one note of a JSON preset to a WAV byte array.
#[wasm_bindgen]
pub fn render_preset_wav(
    preset_json: &str,
    sample_rate: u32,
    note: u8,
    velocity: f64,
    hold_seconds: f64,
    tail_seconds: f64,
) -> Result<Vec<u8>, JsValue> {
    let preset = Preset::from_json(preset_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let request = render_request(note, velocity, hold_seconds, tail_seconds);
    dsp::renderer::render_note_wav(&preset, &EngineConfig::default(), sample_rate, &request)
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render one note of a JSON preset to interleaved stereo f32
/// samples.
#[wasm_bindgen]
pub fn render_preset_samples(
    preset_json: &str,
    sample_rate: u32,
    note: u8,
    velocity: f64,
    hold_seconds: f64,
    tail_seconds: f64,
) -> Result<Vec<f32>, JsValue> {
    let preset = Preset::from_json(preset_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let request = render_request(note, velocity, hold_seconds, tail_seconds);
    dsp::renderer::render_note(&preset, &EngineConfig::default(), sample_rate, &request)
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed real-time engine for an AudioWorklet.
///
/// Note calls are queued and applied at the start of the next `process`.
#[wasm_bindgen]
pub struct AetherEngine {
    engine: Engine,
    pending: Vec<NoteEvent>,
}

#[wasm_bindgen]
impl AetherEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64, max_block_size: usize, max_voices: usize) -> AetherEngine {
        let mut engine = Engine::new(EngineConfig {
            max_voices,
            ..EngineConfig::default()
        });
        engine.prepare(sample_rate, max_block_size);
        AetherEngine {
            engine,
            pending: Vec::with_capacity(PENDING_EVENT_CAPACITY),
        }
    }

    pub fn note_on(&mut self, note: u8, velocity: f64) {
        self.queue(NoteEvent::note_on(0, note, velocity));
    }

    pub fn note_off(&mut self, note: u8) {
        self.queue(NoteEvent::note_off(0, note));
    }

    pub fn set_sustain(&mut self, down: bool) {
        self.queue(NoteEvent::sustain(0, down));
    }

    pub fn all_notes_off(&mut self) {
        self.queue(NoteEvent::all_notes_off(0));
    }

    pub fn panic(&mut self) {
        self.queue(NoteEvent::panic(0));
    }

    /// Set one parameter by key. Returns `false` for an unknown key.
    pub fn set_parameter(&mut self, key: &str, value: f64) -> bool {
        self.engine.set_parameter(key, value)
    }

    /// Load a JSON preset. On error the current parameters are kept.
    pub fn load_preset(&mut self, preset_json: &str) -> Result<(), JsValue> {
        self.engine
            .load_preset_json(preset_json)
            .map(|_| ())
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Render one planar stereo block.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.engine.process_block(&self.pending, left, right);
        self.pending.clear();
    }

    pub fn active_voices(&self) -> usize {
        self.engine.active_voice_count()
    }
}

impl AetherEngine {
    /// Queue an event without allocating. A panic supersedes everything
    /// queued before it; any other event is dropped once the queue is full.
    fn queue(&mut self, event: NoteEvent) {
        if let NoteEventKind::Panic = event.kind {
            self.pending.clear();
        }
        if self.pending.len() < PENDING_EVENT_CAPACITY {
            self.pending.push(event);
        } else {
            tracing::debug!(?event, "event queue full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_never_grows_past_capacity() {
        let mut synth = AetherEngine::new(48000.0, 128, 4);
        let allocated = synth.pending.capacity();
        for i in 0..(PENDING_EVENT_CAPACITY * 4) {
            synth.note_on((i % 128) as u8, 0.5);
        }
        assert_eq!(synth.pending.len(), PENDING_EVENT_CAPACITY);
        assert_eq!(synth.pending.capacity(), allocated, "Queue must not reallocate");

        let mut left = vec![0.0_f32; 128];
        let mut right = vec![0.0_f32; 128];
        synth.process(&mut left, &mut right);
        assert!(synth.pending.is_empty());
        assert_eq!(synth.active_voices(), 4);
    }

    #[test]
    fn panic_goes_through_a_full_queue() {
        let mut synth = AetherEngine::new(48000.0, 128, 4);
        for _ in 0..PENDING_EVENT_CAPACITY {
            synth.note_on(60, 1.0);
        }
        synth.panic();
        assert_eq!(synth.pending.len(), 1);

        let mut left = vec![1.0_f32; 128];
        let mut right = vec![1.0_f32; 128];
        synth.process(&mut left, &mut right);
        assert_eq!(synth.active_voices(), 0);
        assert!(left.iter().all(|&s| s == 0.0));
    }
}
