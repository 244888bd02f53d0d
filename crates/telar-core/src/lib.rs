//! Telar Core - runtime substrate for the scripted synthesis graph
//!
//! This crate provides the pieces every other telar crate builds on: the
//! buffer/object model the routing engine flows through, the per-engine
//! [`Context`], waveform resources, and the numeric collaborators (FFT
//! brickwall helper, half-band decimator, biquad, modulated delay line).
//!
//! # Core Abstractions
//!
//! ## Buffer & Object Model
//!
//! - [`SignalBuffer`] - multi-channel sample container with per-channel
//!   update-rate ("division") and provenance id
//! - [`ObjectId`] / [`ChainIndex`] / [`ObjectKind`] - uniform handles for
//!   every addressable graph object
//! - [`Context`] - per-engine state: rates, block size, id allocators,
//!   resource manager, FFT helper
//!
//! ## Numeric Collaborators
//!
//! - [`WaveformFft`] - fixed-size FFT pair for brickwall re-band-limiting
//! - [`HalfbandDecimator`] - polyphase two-path IIR half-band 2:1 decimator,
//!   coefficients designed once from attenuation + transition bandwidth
//! - [`Biquad`] - Direct-Form-I biquad with RBJ cookbook coefficients
//! - [`ModDelayLine`] - circular delay line with sine-LFO-modulated read tap
//!
//! # Design Principles
//!
//! - **Real-time safe**: buffers resize only during `prepare()`; the
//!   per-block path never allocates
//! - **Owned containers**: graph objects live in arenas and are addressed
//!   by lightweight ids, never by raw owning pointers

pub mod biquad;
pub mod context;
pub mod delay;
pub mod error;
pub mod fft;
pub mod halfband;
pub mod math;
pub mod object;
pub mod resource;
pub mod signal;

pub use biquad::{Biquad, BiquadKind};
pub use context::{AudioQuality, Context};
pub use delay::ModDelayLine;
pub use error::BuildError;
pub use fft::{BrickwallScratch, WaveformFft};
pub use halfband::{HalfbandDecimator, design_halfband_coefs};
pub use math::{hz_to_midi_note, midi_note_to_hz};
pub use object::{ChainIndex, ObjectId, ObjectKind};
pub use resource::{ResourceId, ResourceManager, WAVEFORM_LENGTH};
pub use signal::{SignalBuffer, SignalKind};
