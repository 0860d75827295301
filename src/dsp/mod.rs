//! DSP Engine — Pure Rust physical-modeling synthesis.
//!
//! Leaves first: a single modal filter, the resonator bank built from them,
//! the noise exciter, the saturating feedback loop, the post filter and the
//! ADSR envelope. `voice` combines them (or the waveguide string) into one
//! note, `voice_manager` runs the polyphonic pool and `engine` is the
//! block-based audio boundary. `renderer` drives the engine offline.

pub mod engine;
pub mod envelope;
pub mod exciter;
pub mod feedback;
pub mod filter;
pub mod mixer;
pub mod modal;
pub mod noise;
pub mod renderer;
pub mod resonator;
pub mod string;
pub mod voice;
pub mod voice_manager;
