//! The effect role of the synthesis graph.

use telar_core::SignalBuffer;

/// A polymorphic audio effect living inside an [`EffectChain`](crate::EffectChain).
///
/// Effects read an audio input buffer and their named modulation ports
/// (one control channel per port, zeroed at block start and filled by the
/// routing pass) and write an output buffer. Input and output are distinct
/// buffers wired by the owning chain.
pub trait Effect {
    /// Process one (sub-)block starting at `frame_offset`.
    fn process_block(
        &mut self,
        audio_in: &SignalBuffer,
        mods: &SignalBuffer,
        output: &mut SignalBuffer,
        n_frames: usize,
        frame_offset: usize,
    );

    /// React to a change of the internal sample rate.
    fn on_sample_rate_change(&mut self, rate: f32);

    /// Declared modulation port names; the index is the port's channel.
    fn port_names(&self) -> &'static [&'static str];
}
