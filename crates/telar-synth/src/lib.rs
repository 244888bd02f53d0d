//! Telar Synth - the dynamic synthesis graph engine.
//!
//! A voice is assembled at build time from oscillators, modulation
//! producers, effect chains, and named-port modulation routes, then rendered
//! block by block at the oversampled internal rate. The [`Synthesizer`]
//! owns the voice pool, the shared master buffers and chains, and the
//! final half-band decimation back to the host rate.
//!
//! # Core Abstractions
//!
//! - [`Oscillator`] / [`Effect`] / [`ModulationProducer`] - the three
//!   polymorphic roles of the graph, each exposing named modulation ports
//! - [`Modulation`] - one named-port route, applied additively with
//!   rate conversion
//! - [`EffectChain`] - ordered effects with automatic buffer wiring
//! - [`Voice`] - one monophonic unit: graph objects + portamento + the
//!   Idle/Active/Releasing state machine
//! - [`Synthesizer`] - voice pool, MIDI allocation and stealing, 2×
//!   oversampled rendering, single-point decimation
//!
//! Graph construction allocates and is not real-time safe; it must finish
//! before the first `process_block`. The per-block path never allocates.

pub mod chain;
pub mod diffusion;
pub mod distortion;
pub mod effect;
pub mod envelope;
pub mod filter_effect;
pub mod modulation;
pub mod oscillator;
pub mod producer;
pub mod sine_osc;
pub mod synth;
pub mod voice;
pub mod waveform_osc;
pub mod zdf_filter;

pub use chain::EffectChain;
pub use diffusion::DiffusionEffect;
pub use distortion::DistortionEffect;
pub use effect::Effect;
pub use envelope::BasicEnvelope;
pub use filter_effect::FilterEffect;
pub use modulation::{ModTarget, Modulation, apply_modulation};
pub use oscillator::{OSC_PORT_NAMES, Oscillator, PORT_AMPLITUDE, PORT_PITCH};
pub use producer::ModulationProducer;
pub use sine_osc::SineOscillator;
pub use synth::Synthesizer;
pub use voice::{Voice, VoiceOutput, VoiceState};
pub use waveform_osc::WaveformOscillator;
pub use zdf_filter::ZdfFilter;
