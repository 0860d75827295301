//! Offline renderer — plays a single note through a fresh engine and returns
//! the result as samples or as a WAV byte buffer.

use crate::config::EngineConfig;
use crate::error::AetherError;
use crate::preset::Preset;

use super::engine::{Engine, NoteEvent};

/// Block size used for offline rendering.
pub const RENDER_BLOCK_SIZE: usize = 512;
/// Longest hold or tail accepted, in seconds.
const MAX_RENDER_SECONDS: f64 = 60.0;

/// One note to render offline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteRender {
    /// MIDI note number.
    pub note: u8,
    /// Velocity [0, 1].
    pub velocity: f64,
    /// Time between note-on and note-off.
    pub hold_seconds: f64,
    /// Time rendered after the note-off.
    pub tail_seconds: f64,
}

impl Default for NoteRender {
    fn default() -> Self {
        NoteRender {
            note: 60,
            velocity: 0.8,
            hold_seconds: 1.0,
            tail_seconds: 1.0,
        }
    }
}

fn seconds_to_frames(seconds: f64, sample_rate: u32) -> usize {
    let s = if seconds.is_finite() { seconds.clamp(0.0, MAX_RENDER_SECONDS) } else { 0.0 };
    (s * sample_rate as f64).round() as usize
}

/// Render `request` with `preset` to interleaved stereo f32 samples.
pub fn render_note(
    preset: &Preset,
    config: &EngineConfig,
    sample_rate: u32,
    request: &NoteRender,
) -> Result<Vec<f32>, AetherError> {
    let mut engine = Engine::new(*config);
    engine.load_preset(preset)?;
    engine.prepare(sample_rate as f64, RENDER_BLOCK_SIZE);

    let hold = seconds_to_frames(request.hold_seconds, sample_rate);
    let total = hold + seconds_to_frames(request.tail_seconds, sample_rate);
    let mut out = vec![0.0_f32; total * 2];

    let mut events = Vec::with_capacity(2);
    let mut start = 0;
    for block in out.chunks_mut(RENDER_BLOCK_SIZE * 2) {
        let frames = block.len() / 2;
        events.clear();
        if start == 0 {
            events.push(NoteEvent::note_on(0, request.note, request.velocity));
        }
        if (start..start + frames).contains(&hold) {
            events.push(NoteEvent::note_off(hold - start, request.note));
        }
        engine.process_interleaved(&events, block);
        start += frames;
    }
    tracing::debug!(preset = %preset.name, frames = total, "rendered note");
    Ok(out)
}

/// Render `request` with `preset` to a 16-bit stereo PCM WAV file.
pub fn render_note_wav(
    preset: &Preset,
    config: &EngineConfig,
    sample_rate: u32,
    request: &NoteRender,
) -> Result<Vec<u8>, AetherError> {
    let samples = render_note(preset, config, sample_rate, request)?;
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    Ok(encode_wav(&pcm, sample_rate, 2))
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::factory_preset;

    fn short_note() -> NoteRender {
        NoteRender {
            note: 60,
            velocity: 1.0,
            hold_seconds: 0.25,
            tail_seconds: 0.25,
        }
    }

    #[test]
    fn wav_header_valid() {
        let preset = factory_preset("init").unwrap();
        let wav = render_note_wav(&preset, &EngineConfig::default(), 22050, &short_note()).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 22050);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
    }

    #[test]
    fn wav_size_correct() {
        let preset = factory_preset("init").unwrap();
        let wav = render_note_wav(&preset, &EngineConfig::default(), 22050, &short_note()).unwrap();

        // 0.5 s at 22050 Hz = 11025 frames * 2 channels * 2 bytes
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 44100);
        assert_eq!(wav.len(), 44 + 44100);
    }

    #[test]
    fn rendered_note_is_audible_and_bounded() {
        let preset = factory_preset("bell").unwrap();
        let samples = render_note(&preset, &EngineConfig::default(), 48000, &short_note()).unwrap();
        assert_eq!(samples.len(), 24000 * 2);
        let peak = samples.iter().fold(0.0_f32, |p, s| p.max(s.abs()));
        assert!(peak > 1e-3, "Rendered note should be audible, peak {peak}");
        assert!(peak < 1.0);
        assert!(samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn invalid_preset_is_an_error() {
        let preset = Preset::new("");
        assert!(render_note(&preset, &EngineConfig::default(), 48000, &short_note()).is_err());
    }

    #[test]
    fn non_finite_durations_render_nothing() {
        let preset = factory_preset("init").unwrap();
        let request = NoteRender {
            hold_seconds: f64::NAN,
            tail_seconds: -1.0,
            ..short_note()
        };
        let samples = render_note(&preset, &EngineConfig::default(), 48000, &request).unwrap();
        assert!(samples.is_empty());
    }
}
