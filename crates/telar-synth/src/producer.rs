//! The modulation producer role of the synthesis graph.

use telar_core::SignalBuffer;

/// Anything that produces a modulation signal (envelope, LFO, ...).
///
/// Producers write their declared output channels into an owned control
/// buffer each block; the routing pass then adds those values onto the
/// destination ports.
pub trait ModulationProducer {
    /// Render one (sub-)block into `output`, honoring channel divisions.
    fn process_block(&mut self, output: &mut SignalBuffer, n_frames: usize, frame_offset: usize);

    /// Restart from the beginning of the producer's cycle (note on).
    fn retrigger(&mut self);

    /// Enter the release phase (note off).
    fn release(&mut self);

    /// True while the producer still emits non-zero output.
    fn is_active(&self) -> bool;

    /// React to a change of the internal sample rate.
    fn on_sample_rate_change(&mut self, rate: f32);

    /// Declared output port names; the index is the output channel.
    fn output_names(&self) -> &'static [&'static str];
}
