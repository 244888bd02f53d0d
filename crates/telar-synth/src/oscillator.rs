//! The oscillator role of the synthesis graph.
//!
//! Oscillators read their named modulation ports from a control
//! [`SignalBuffer`] (one channel per port) and *accumulate* into an audio
//! output buffer, so several oscillators can share one buffer.

use telar_core::SignalBuffer;

/// Port index of the pitch channel (fractional MIDI note numbers).
pub const PORT_PITCH: usize = 0;
/// Port index of the amplitude channel (linear gain).
pub const PORT_AMPLITUDE: usize = 1;

/// Modulation ports every oscillator variant declares, in channel order.
pub const OSC_PORT_NAMES: &[&str] = &["pitch", "amplitude"];

/// A polymorphic oscillator.
///
/// `process_block` renders `n_frames` samples starting at `frame_offset`
/// within the current block, reading ports division-aware and adding into
/// `output`.
pub trait Oscillator {
    /// Render one (sub-)block.
    fn process_block(
        &mut self,
        mods: &SignalBuffer,
        output: &mut SignalBuffer,
        n_frames: usize,
        frame_offset: usize,
    );

    /// React to a change of the internal sample rate.
    fn on_sample_rate_change(&mut self, rate: f32);

    /// Declared modulation port names; the index is the port's channel.
    fn port_names(&self) -> &'static [&'static str] {
        OSC_PORT_NAMES
    }

    /// Offset added to the pitch port, in MIDI note numbers.
    fn set_frequency_offset(&mut self, semitones: f32);
}
