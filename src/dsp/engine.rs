//! Audio Engine — the real-time boundary of the synthesizer.
//!
//! `prepare()` allocates every buffer once. `process_block()` then reads one
//! parameter snapshot, applies timestamped note events at their sample
//! offsets and renders the voice pool into planar or interleaved stereo
//! `f32` output. Nothing on that path allocates, locks, logs or fails.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::AetherError;
use crate::params::{ParamId, ParameterSet, SharedParameters};
use crate::preset::Preset;

use super::mixer::Mixer;
use super::voice_manager::VoiceManager;

const MIN_SAMPLE_RATE: f64 = 8000.0;
const MAX_SAMPLE_RATE: f64 = 384000.0;

/// What a [`NoteEvent`] does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEventKind {
    /// Velocity 0 is treated as a note-off.
    NoteOn { note: u8, velocity: f64 },
    NoteOff { note: u8 },
    /// Sustain pedal down (`true`) or up.
    Sustain(bool),
    AllNotesOff,
    Panic,
}

/// A note event, timestamped in frames from the start of the block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub offset: usize,
    pub kind: NoteEventKind,
}

impl NoteEvent {
    pub fn note_on(offset: usize, note: u8, velocity: f64) -> Self {
        NoteEvent {
            offset,
            kind: NoteEventKind::NoteOn { note, velocity },
        }
    }

    pub fn note_off(offset: usize, note: u8) -> Self {
        NoteEvent {
            offset,
            kind: NoteEventKind::NoteOff { note },
        }
    }

    pub fn sustain(offset: usize, down: bool) -> Self {
        NoteEvent {
            offset,
            kind: NoteEventKind::Sustain(down),
        }
    }

    pub fn all_notes_off(offset: usize) -> Self {
        NoteEvent {
            offset,
            kind: NoteEventKind::AllNotesOff,
        }
    }

    pub fn panic(offset: usize) -> Self {
        NoteEvent {
            offset,
            kind: NoteEventKind::Panic,
        }
    }
}

/// Output layout handed to the renderer.
enum Output<'a> {
    Planar(&'a mut [f32], &'a mut [f32]),
    Interleaved(&'a mut [f32]),
}

impl Output<'_> {
    fn frames(&self) -> usize {
        match self {
            Output::Planar(left, right) => left.len().min(right.len()),
            Output::Interleaved(out) => out.len() / 2,
        }
    }

    fn write(&mut self, mixer: &Mixer, start: usize, end: usize) {
        match self {
            Output::Planar(left, right) => {
                mixer.write_planar(&mut left[start..end], &mut right[start..end])
            }
            Output::Interleaved(out) => mixer.write_interleaved(&mut out[start * 2..end * 2]),
        }
    }

    /// Zero whatever lies past `frames`: the longer planar channel, or the
    /// unpaired last sample of an odd interleaved buffer.
    fn clear_tail(&mut self, frames: usize) {
        match self {
            Output::Planar(left, right) => {
                left[frames..].fill(0.0);
                right[frames..].fill(0.0);
            }
            Output::Interleaved(out) => out[frames * 2..].fill(0.0),
        }
    }

    fn silence(&mut self) {
        match self {
            Output::Planar(left, right) => {
                left.fill(0.0);
                right.fill(0.0);
            }
            Output::Interleaved(out) => out.fill(0.0),
        }
    }
}

/// Everything allocated by `prepare()`.
#[derive(Debug)]
struct Prepared {
    voices: VoiceManager,
    mixer: Mixer,
}

/// The synthesizer engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    shared: Arc<SharedParameters>,
    prepared: Option<Prepared>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine {
            config: config.sanitized(),
            shared: Arc::new(SharedParameters::default()),
            prepared: None,
        }
    }

    /// Allocate the voice pool and mix buffer for `sample_rate` and blocks of
    /// up to `max_block_size` frames. Longer blocks are rendered in chunks.
    ///
    /// Calling it again discards every sounding voice.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        let sample_rate = if sample_rate.is_finite() {
            sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
        } else {
            48000.0
        };
        let max_block_size = max_block_size.max(1);

        let mut voices = VoiceManager::new(sample_rate, &self.config);
        voices.apply_params(&self.shared.snapshot());
        let mut mixer = Mixer::new(max_block_size);
        mixer.master_gain = self.config.master_gain;

        tracing::info!(
            sample_rate,
            max_block_size,
            voices = voices.max_voices(),
            model = ?self.config.model,
            "engine prepared"
        );
        self.prepared = Some(Prepared { voices, mixer });
    }

    /// Publish a complete parameter set. Takes effect at the next block.
    pub fn set_parameters(&self, params: &ParameterSet) {
        self.shared.store(params);
    }

    /// Publish a single parameter by key. Returns `false` for an unknown key.
    pub fn set_parameter(&self, key: &str, value: f64) -> bool {
        match ParamId::from_key(key) {
            Some(id) => {
                self.shared.store_value(id, value);
                true
            }
            None => {
                tracing::debug!("ignoring unknown parameter key '{key}'");
                false
            }
        }
    }

    /// Current parameters as the audio thread will see them.
    pub fn parameters(&self) -> ParameterSet {
        self.shared.snapshot()
    }

    /// Shared handle a control thread can write into while audio runs.
    pub fn parameter_handle(&self) -> Arc<SharedParameters> {
        Arc::clone(&self.shared)
    }

    /// Apply a preset's parameters. An invalid preset leaves the current
    /// parameters untouched.
    pub fn load_preset(&self, preset: &Preset) -> Result<(), AetherError> {
        if let Err(e) = preset.validate() {
            tracing::warn!(preset = %preset.name, "rejected preset: {e}");
            return Err(e.into());
        }
        self.set_parameters(&preset.parameters);
        tracing::info!(preset = %preset.name, "preset loaded");
        Ok(())
    }

    /// Decode and apply a JSON preset. On failure the current parameters are
    /// kept.
    pub fn load_preset_json(&self, json: &str) -> Result<Preset, AetherError> {
        match Preset::from_json(json) {
            Ok(preset) => {
                self.load_preset(&preset)?;
                Ok(preset)
            }
            Err(e) => {
                tracing::warn!("could not decode preset: {e}");
                Err(e.into())
            }
        }
    }

    /// Voices not currently idle.
    pub fn active_voice_count(&self) -> usize {
        self.prepared.as_ref().map_or(0, |p| p.voices.active_count())
    }

    pub fn voice_manager(&self) -> Option<&VoiceManager> {
        self.prepared.as_ref().map(|p| &p.voices)
    }

    /// Render one block to planar stereo. The block length is the shorter
    /// of the two channels.
    pub fn process_block(&mut self, events: &[NoteEvent], left: &mut [f32], right: &mut [f32]) {
        self.process(events, Output::Planar(left, right));
    }

    /// Render one block to interleaved stereo (`L R L R ...`).
    pub fn process_interleaved(&mut self, events: &[NoteEvent], out: &mut [f32]) {
        self.process(events, Output::Interleaved(out));
    }

    fn process(&mut self, events: &[NoteEvent], mut output: Output<'_>) {
        let Some(prepared) = self.prepared.as_mut() else {
            output.silence();
            return;
        };
        let params = self.shared.snapshot();
        prepared.voices.apply_params(&params);

        let frames = output.frames();
        output.clear_tail(frames);
        let mut cursor = 0;
        for event in events {
            // Offsets only move forward; anything past the end lands on it.
            let at = event.offset.clamp(cursor, frames);
            prepared.render(&mut output, cursor, at);
            prepared.apply_event(event.kind);
            cursor = at;
        }
        prepared.render(&mut output, cursor, frames);
    }
}

impl Prepared {
    fn apply_event(&mut self, kind: NoteEventKind) {
        match kind {
            NoteEventKind::NoteOn { note, velocity } if velocity > 0.0 => {
                self.voices.note_on(note, velocity);
            }
            NoteEventKind::NoteOn { note, .. } | NoteEventKind::NoteOff { note } => {
                self.voices.note_off(note)
            }
            NoteEventKind::Sustain(down) => self.voices.set_sustain(down),
            NoteEventKind::AllNotesOff => self.voices.all_notes_off(),
            NoteEventKind::Panic => self.voices.panic(),
        }
    }

    /// Render frames `[start, end)` in chunks no larger than the mix buffer.
    fn render(&mut self, output: &mut Output<'_>, start: usize, end: usize) {
        let chunk = self.mixer.capacity();
        let mut pos = start;
        while pos < end {
            let n = (end - pos).min(chunk);
            let buf = self.mixer.clear(n);
            self.voices.render(buf);
            output.write(&self.mixer, pos, pos + n);
            pos += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(max_voices: usize) -> Engine {
        let mut engine = Engine::new(EngineConfig {
            max_voices,
            ..EngineConfig::default()
        });
        engine.prepare(48000.0, 256);
        engine
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0_f32, |p, s| p.max(s.abs()))
    }

    #[test]
    fn unprepared_engine_outputs_silence() {
        let mut engine = Engine::new(EngineConfig::default());
        let mut left = vec![1.0; 64];
        let mut right = vec![1.0; 64];
        engine.process_block(&[NoteEvent::note_on(0, 60, 1.0)], &mut left, &mut right);
        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn note_starts_at_its_offset() {
        let mut engine = prepared(4);
        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        engine.process_block(&[NoteEvent::note_on(100, 60, 1.0)], &mut left, &mut right);
        assert!(left[..100].iter().all(|&s| s == 0.0), "Nothing before the offset");
        assert!(peak(&left[100..]) > 0.0, "Sound after the offset");
        assert_eq!(left, right);
    }

    #[test]
    fn out_of_range_offsets_are_clamped() {
        let mut engine = prepared(4);
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        let events = [NoteEvent::note_on(30, 60, 1.0), NoteEvent::note_on(10, 64, 1.0), NoteEvent::note_on(1000, 67, 1.0)];
        engine.process_block(&events, &mut left, &mut right);
        assert_eq!(engine.active_voice_count(), 3, "No event may be dropped");
        assert!(left[..30].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn long_blocks_are_chunked() {
        let mut engine = prepared(2);
        let mut left = vec![0.0; 1000];
        let mut right = vec![0.0; 1000];
        engine.process_block(&[NoteEvent::note_on(0, 60, 1.0)], &mut left, &mut right);
        assert!(peak(&left[800..]) > 0.0, "Frames past the first chunk must be rendered");
        assert!(left.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn velocity_zero_is_note_off() {
        let mut engine = prepared(4);
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        engine.process_block(
            &[NoteEvent::note_on(0, 60, 1.0), NoteEvent::note_on(10, 60, 0.0)],
            &mut left,
            &mut right,
        );
        let vm = engine.voice_manager().unwrap();
        let slot = vm.slot_for(60).unwrap();
        assert_eq!(vm.voice(slot).unwrap().state(), crate::dsp::voice::VoiceState::Releasing);
    }

    #[test]
    fn parameters_apply_at_next_block() {
        let engine = prepared(1);
        let mut params = ParameterSet::default();
        params.filter_cutoff = 0.1;
        engine.parameter_handle().store(&params);
        assert_eq!(engine.parameters().filter_cutoff, 0.1);
    }

    #[test]
    fn bad_preset_keeps_parameters() {
        let engine = prepared(1);
        let mut params = ParameterSet::default();
        params.feedback_amount = 0.7;
        engine.set_parameters(&params);
        assert!(engine.load_preset_json("{ not json").is_err());
        assert_eq!(engine.parameters().feedback_amount, 0.7);
    }

    #[test]
    fn unpaired_frames_are_zeroed() {
        let mut engine = prepared(2);
        let mut left = vec![0.5; 64];
        let mut right = vec![0.5; 80];
        engine.process_block(&[NoteEvent::note_on(0, 60, 1.0)], &mut left, &mut right);
        assert!(peak(&right[..64]) > 0.0);
        assert!(right[64..].iter().all(|&s| s == 0.0), "Extra right frames must be zeroed");

        let mut inter = vec![0.5; 129];
        engine.process_interleaved(&[], &mut inter);
        assert_eq!(inter[128], 0.0, "Odd trailing sample must be zeroed");
    }

    #[test]
    fn interleaved_matches_planar() {
        let mut a = prepared(2);
        let mut b = prepared(2);
        let events = [NoteEvent::note_on(5, 69, 0.9)];
        let mut left = vec![0.0; 128];
        let mut right = vec![0.0; 128];
        let mut inter = vec![0.0; 256];
        a.process_block(&events, &mut left, &mut right);
        b.process_interleaved(&events, &mut inter);
        for i in 0..128 {
            assert_eq!(inter[2 * i], left[i]);
            assert_eq!(inter[2 * i + 1], right[i]);
        }
    }
}
