//! Voice manager — fixed pool of voices with note tracking, least-recently
//! triggered stealing and a sustain pedal.
//!
//! The pool and the note→slot map are sized once. `note_on` always finds a
//! voice: a voice already playing the note is retriggered, then the
//! lowest-index idle voice is claimed, and when none is idle the voice with
//! the smallest trigger age is stolen.

use crate::config::EngineConfig;
use crate::params::ParameterSet;

use super::voice::Voice;

const NOTE_COUNT: usize = 128;
const SEED_BASE: u64 = 0x5EED_0000;

/// Polyphonic voice pool.
#[derive(Debug, Clone)]
pub struct VoiceManager {
    voices: Vec<Voice>,
    /// Slot currently owning each MIDI note. Never points at an idle voice.
    note_map: [Option<u8>; NOTE_COUNT],
    /// Incremented on every note-on.
    age: u64,
    sustain: bool,
}

impl VoiceManager {
    /// Allocate `config.max_voices` voices (clamped to the supported range).
    pub fn new(sample_rate: f64, config: &EngineConfig) -> Self {
        let config = config.sanitized();
        let voices = (0..config.max_voices)
            .map(|i| Voice::new(sample_rate, &config, SEED_BASE + i as u64))
            .collect();
        VoiceManager {
            voices,
            note_map: [None; NOTE_COUNT],
            age: 0,
            sustain: false,
        }
    }

    pub fn max_voices(&self) -> usize {
        self.voices.len()
    }

    /// Push a parameter snapshot to every voice.
    pub fn apply_params(&mut self, params: &ParameterSet) {
        for voice in self.voices.iter_mut() {
            voice.apply_params(params);
        }
    }

    /// Start `note` and return the slot that plays it.
    pub fn note_on(&mut self, note: u8, velocity: f64) -> usize {
        let note = note.min(127);
        self.age += 1;

        let slot = match self.slot_for(note) {
            Some(slot) => slot,
            None => self.claim_slot(),
        };
        self.voices[slot].trigger(note, velocity, self.age);
        self.note_map[note as usize] = Some(slot as u8);
        slot
    }

    /// Lowest-index idle voice, or steal the least recently triggered one.
    fn claim_slot(&mut self) -> usize {
        if let Some(slot) = self.voices.iter().position(Voice::is_idle) {
            return slot;
        }
        let slot = self
            .voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.trigger_age())
            .map_or(0, |(i, _)| i);
        self.unmap(slot);
        self.voices[slot].kill();
        slot
    }

    /// Release `note`, or defer the release while the pedal is down.
    pub fn note_off(&mut self, note: u8) {
        let Some(slot) = self.slot_for(note) else {
            return;
        };
        let voice = &mut self.voices[slot];
        if self.sustain {
            voice.hold_for_sustain();
        } else {
            voice.release();
        }
    }

    /// Pedal down defers note-offs; pedal up releases every held voice.
    pub fn set_sustain(&mut self, down: bool) {
        self.sustain = down;
        if !down {
            for voice in self.voices.iter_mut().filter(|v| v.sustain_held()) {
                voice.release();
            }
        }
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    /// Release every sounding voice. Tails ring out normally.
    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.release();
        }
    }

    /// Silence everything immediately and forget all notes and the pedal.
    pub fn panic(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.kill();
        }
        self.note_map = [None; NOTE_COUNT];
        self.sustain = false;
    }

    /// Slot currently playing `note`.
    pub fn slot_for(&self, note: u8) -> Option<usize> {
        self.note_map
            .get(note as usize)
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Voices not in the idle state.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_idle()).count()
    }

    pub fn voice(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    /// Add every sounding voice into `out`, retiring voices that finished.
    pub fn render(&mut self, out: &mut [f64]) {
        for slot in 0..self.voices.len() {
            if self.voices[slot].render(out) {
                self.unmap(slot);
            }
        }
    }

    fn unmap(&mut self, slot: usize) {
        let note = self.voices[slot].note() as usize;
        if self.note_map[note] == Some(slot as u8) {
            self.note_map[note] = None;
        }
    }
}
