//! The call contract between a scripted construction routine and the engine.
//!
//! The scripting language itself is an external collaborator; the engine
//! only requires the two entry points below. Anything implementing
//! [`VoiceScript`] can drive a [`Program`](crate::Program) — the bundled
//! [`PatchScript`](crate::PatchScript) text format is one such
//! implementation, and hosts embedding a full scripting VM provide their
//! own.

use telar_core::BuildError;

use crate::builder::VoiceBuilder;

/// A scripted voice-construction routine.
///
/// `build_voice` is invoked once per pool slot against a fresh
/// [`VoiceBuilder`]; it must issue the same synthesizer-level calls in the
/// same order on every invocation (the builder replays shared creations by
/// position so the master graph is built exactly once).
pub trait VoiceScript {
    /// Number of voices the pool should hold. Zero leaves the engine
    /// silent.
    fn num_voices(&self) -> usize;

    /// Populate one template voice through the builder surface.
    ///
    /// An error aborts the whole build; the engine never keeps a
    /// partially applied graph.
    fn build_voice(&self, builder: &mut VoiceBuilder<'_>) -> Result<(), BuildError>;
}
