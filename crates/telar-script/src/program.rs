//! The build driver: runs a script once per pool slot.

use telar_core::BuildError;
use telar_synth::Synthesizer;

use crate::builder::{SharedGraph, VoiceBuilder};
use crate::script::VoiceScript;

/// Owns a voice-construction script and instantiates its template voice
/// into a synthesizer's pool.
pub struct Program {
    script: Box<dyn VoiceScript>,
    rng: fastrand::Rng,
}

impl Program {
    /// Wrap a script for building.
    pub fn new(script: Box<dyn VoiceScript>) -> Self {
        Self {
            script,
            rng: fastrand::Rng::new(),
        }
    }

    /// Wrap a script with a fixed seed for the per-voice random detune
    /// draws.
    pub fn with_seed(script: Box<dyn VoiceScript>, seed: u64) -> Self {
        Self {
            script,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Pool size the script asks for.
    pub fn num_voices(&self) -> usize {
        self.script.num_voices()
    }

    /// Build one voice per pool slot into `synth`.
    ///
    /// The script runs once per slot against a fresh [`VoiceBuilder`];
    /// synthesizer-level creations from the first run are replayed on the
    /// later ones. Not real-time safe; must finish before the first
    /// `process_block`. On error the pool is left partially filled — the
    /// caller is expected to discard the synthesizer.
    pub fn build_voices(&mut self, synth: &mut Synthesizer) -> Result<(), BuildError> {
        let n = self.script.num_voices();
        let mut shared = SharedGraph::new();
        for slot in 0..n {
            let mut builder = VoiceBuilder::new(synth, &mut shared, &mut self.rng);
            self.script.build_voice(&mut builder)?;
            let voice = builder.finish();
            synth.push_voice(voice);
            shared.next_build();
            tracing::debug!(slot, "voice built");
        }
        tracing::info!(voices = n, "graph built from script");
        Ok(())
    }
}
