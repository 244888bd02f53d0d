//! The host-facing engine facade.
//!
//! [`ScriptSynth`] bundles a [`Program`] with the [`Synthesizer`] it
//! builds, and forwards the audio-path calls. A failed script load or
//! graph build is recoverable: the engine keeps running with zero voices
//! (silent output) and a new script can be loaded; it never keeps a
//! partially applied graph.

use std::path::Path;

use telar_synth::Synthesizer;

use crate::error::ScriptError;
use crate::patch::PatchScript;
use crate::program::Program;

/// A synthesizer driven by a voice-construction script.
pub struct ScriptSynth {
    synth: Synthesizer,
    program: Option<Program>,
}

impl ScriptSynth {
    /// An engine with no script: zero voices, silent output.
    pub fn new() -> Self {
        Self {
            synth: Synthesizer::new(),
            program: None,
        }
    }

    /// Create an engine from patch text. Load failure is logged and
    /// leaves the engine silent.
    pub fn from_script_text(text: &str) -> Self {
        let mut engine = Self::new();
        if let Err(e) = engine.load_script_text(text) {
            tracing::warn!(error = %e, "script load failed; engine stays silent");
        }
        engine
    }

    /// Create an engine from a patch file. Load failure is logged and
    /// leaves the engine silent.
    pub fn from_script_file(path: impl AsRef<Path>) -> Self {
        let mut engine = Self::new();
        if let Err(e) = engine.load_script_file(path.as_ref()) {
            tracing::warn!(error = %e, "script load failed; engine stays silent");
        }
        engine
    }

    /// Parse patch text and rebuild the voice pool from it.
    pub fn load_script_text(&mut self, text: &str) -> Result<(), ScriptError> {
        let patch = PatchScript::parse(text)?;
        self.load_program(Program::new(Box::new(patch)))
    }

    /// Read and load a patch file.
    pub fn load_script_file(&mut self, path: impl AsRef<Path>) -> Result<(), ScriptError> {
        let text = std::fs::read_to_string(path)?;
        self.load_script_text(&text)
    }

    /// Rebuild the engine from an already-wrapped script.
    ///
    /// The new graph is built into a fresh synthesizer and only swapped in
    /// when the whole build succeeds; on failure the engine is reset to
    /// zero voices.
    pub fn load_program(&mut self, mut program: Program) -> Result<(), ScriptError> {
        let mut synth = Synthesizer::new();
        match program.build_voices(&mut synth) {
            Ok(()) => {
                self.synth = synth;
                self.program = Some(program);
                Ok(())
            }
            Err(e) => {
                self.synth = Synthesizer::new();
                self.program = None;
                Err(e.into())
            }
        }
    }

    /// Size buffers and design filters for the host's block layout. Must
    /// complete before the first `process_block`; not real-time safe.
    pub fn prepare(&mut self, n_channels: usize, n_frames: usize, sample_rate: f32) {
        self.synth.prepare(n_channels, n_frames, sample_rate);
    }

    /// Forward a note-on / note-off to the voice pool.
    pub fn process_midi_event(&mut self, note: u8, is_note_on: bool) {
        self.synth.process_midi_event(note, is_note_on);
    }

    /// Render one host block into `outputs` (one slice per channel).
    pub fn process_block(&mut self, outputs: &mut [&mut [f32]]) {
        self.synth.process_block(outputs);
    }

    /// Pool size the loaded script asks for; zero when no script is
    /// loaded.
    pub fn num_voices_defined(&self) -> usize {
        self.program.as_ref().map_or(0, Program::num_voices)
    }

    /// The engine's synthesizer.
    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synth
    }

    /// Mutable access to the engine's synthesizer.
    pub fn synthesizer_mut(&mut self) -> &mut Synthesizer {
        &mut self.synth
    }
}

impl Default for ScriptSynth {
    fn default() -> Self {
        Self::new()
    }
}
