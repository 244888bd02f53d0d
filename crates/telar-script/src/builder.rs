//! The fixed operation surface a scripted routine builds voices through.
//!
//! A [`VoiceBuilder`] is an explicit construction context handed into
//! every [`VoiceScript::build_voice`](crate::VoiceScript::build_voice)
//! invocation. It borrows the synthesizer (for the shared half of the
//! graph) and owns the voice under construction; there is no process-wide
//! "current program" or "current voice" lookup, so several engines can
//! build concurrently.
//!
//! The script runs once per pool slot, but synthesizer-level objects —
//! master buffers, master chains, effects inside master chains, waveform
//! resources — must exist exactly once. The builder records those
//! creations in call order on the first run and replays them by position
//! on every later run, returning the already-created id.

use telar_core::{BuildError, ChainIndex, Context, ObjectId, ObjectKind, ResourceId};
use telar_synth::{EffectChain, Synthesizer, Voice};

/// Synthesizer-level creations recorded on the first voice build,
/// replayed by per-kind position on subsequent builds.
#[derive(Debug, Default)]
pub(crate) struct SharedGraph {
    buffers: Vec<ObjectId>,
    chains: Vec<ChainIndex>,
    effects: Vec<ObjectId>,
    resources: Vec<ResourceId>,
    replaying: bool,
    buffer_cursor: usize,
    chain_cursor: usize,
    effect_cursor: usize,
    resource_cursor: usize,
}

impl SharedGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rewind the cursors for the next voice build; every build after the
    /// first replays the log.
    pub(crate) fn next_build(&mut self) {
        self.replaying = true;
        self.buffer_cursor = 0;
        self.chain_cursor = 0;
        self.effect_cursor = 0;
        self.resource_cursor = 0;
    }

    fn replay_buffer(&mut self) -> Option<ObjectId> {
        if !self.replaying {
            return None;
        }
        let id = self.buffers.get(self.buffer_cursor).copied()?;
        self.buffer_cursor += 1;
        Some(id)
    }

    fn replay_chain(&mut self) -> Option<ChainIndex> {
        if !self.replaying {
            return None;
        }
        let idx = self.chains.get(self.chain_cursor).copied()?;
        self.chain_cursor += 1;
        Some(idx)
    }

    fn replay_effect(&mut self) -> Option<ObjectId> {
        if !self.replaying {
            return None;
        }
        let id = self.effects.get(self.effect_cursor).copied()?;
        self.effect_cursor += 1;
        Some(id)
    }

    fn replay_resource(&mut self) -> Option<ResourceId> {
        if !self.replaying {
            return None;
        }
        let id = self.resources.get(self.resource_cursor).copied()?;
        self.resource_cursor += 1;
        Some(id)
    }
}

/// Construction context for one voice build.
pub struct VoiceBuilder<'a> {
    synth: &'a mut Synthesizer,
    shared: &'a mut SharedGraph,
    rng: &'a mut fastrand::Rng,
    voice: Voice,
}

impl<'a> VoiceBuilder<'a> {
    pub(crate) fn new(
        synth: &'a mut Synthesizer,
        shared: &'a mut SharedGraph,
        rng: &'a mut fastrand::Rng,
    ) -> Self {
        let voice = Voice::new(synth.context().internal_rate());
        Self {
            synth,
            shared,
            rng,
            voice,
        }
    }

    pub(crate) fn finish(self) -> Voice {
        self.voice
    }

    /// Id of the implicit master output buffer every engine starts with.
    pub fn master_buffer_id(&self) -> ObjectId {
        self.synth.master_buffer_id()
    }

    // ------------------------------------------------------------------
    // Oscillators and producers (voice level)
    // ------------------------------------------------------------------

    /// Add a sine oscillator; optionally assign its output buffer at once.
    /// Amplitude must lie in [0, 1].
    pub fn add_sine_osc(
        &mut self,
        n_channels: usize,
        amplitude: f32,
        buffer: Option<ObjectId>,
    ) -> Result<ObjectId, BuildError> {
        let osc = self
            .voice
            .add_sine_oscillator(self.synth.context_mut(), n_channels, amplitude)?;
        if let Some(buf) = buffer {
            self.voice.assign_oscillator_buffer(osc, buf)?;
        }
        Ok(osc)
    }

    /// Add a waveform oscillator reading `waveform`; optionally assign its
    /// output buffer at once. Amplitude must lie in [0, 1].
    pub fn add_waveform_osc(
        &mut self,
        n_channels: usize,
        waveform: ResourceId,
        amplitude: f32,
        buffer: Option<ObjectId>,
    ) -> Result<ObjectId, BuildError> {
        let osc = self.voice.add_waveform_oscillator(
            self.synth.context_mut(),
            n_channels,
            waveform,
            amplitude,
        )?;
        if let Some(buf) = buffer {
            self.voice.assign_oscillator_buffer(osc, buf)?;
        }
        Ok(osc)
    }

    /// Create a single-cycle sawtooth waveform resource (shared across
    /// voices; created once).
    pub fn create_sawtooth_waveform(&mut self) -> ResourceId {
        if let Some(id) = self.shared.replay_resource() {
            return id;
        }
        let id = self.synth.context_mut().resources.create_sawtooth();
        self.shared.resources.push(id);
        id
    }

    /// Add a basic ADSR envelope producer. `adsr` is
    /// [attack, decay, sustain, release] in seconds (sustain is a level);
    /// defaults apply when omitted.
    pub fn add_basic_envelope(&mut self, adsr: Option<[f32; 4]>) -> ObjectId {
        self.voice.add_basic_envelope(self.synth.context_mut(), adsr)
    }

    // ------------------------------------------------------------------
    // Buffers and routing
    // ------------------------------------------------------------------

    /// Add a voice-owned audio buffer.
    pub fn add_voice_audio_buffer(&mut self, n_channels: usize) -> ObjectId {
        self.voice.add_audio_buffer(self.synth.context_mut(), n_channels)
    }

    /// Add a synthesizer-level audio buffer (shared; created once).
    pub fn add_audio_buffer(&mut self, n_channels: usize) -> ObjectId {
        if let Some(id) = self.shared.replay_buffer() {
            return id;
        }
        let id = self.synth.add_master_buffer(n_channels);
        self.shared.buffers.push(id);
        id
    }

    /// Point an oscillator's output at a voice audio buffer.
    pub fn assign_oscillator_audio_buffer(
        &mut self,
        osc: ObjectId,
        buffer: ObjectId,
    ) -> Result<(), BuildError> {
        self.voice.assign_oscillator_buffer(osc, buffer)
    }

    /// Register a modulation route by port names. The destination may be
    /// an oscillator or an effect in a voice-level or master chain.
    pub fn add_modulation(
        &mut self,
        source: ObjectId,
        source_port: &str,
        target: ObjectId,
        target_port: &str,
        amount: f32,
        centered: bool,
    ) -> Result<(), BuildError> {
        self.voice.add_modulation(
            source,
            source_port,
            target,
            target_port,
            amount,
            centered,
            self.synth.master_chains(),
        )
    }

    /// Route a voice buffer into a master buffer; `master` defaults to the
    /// implicit master output buffer.
    pub fn add_voice_output(
        &mut self,
        buffer: ObjectId,
        master: Option<ObjectId>,
    ) -> Result<(), BuildError> {
        let master = master.unwrap_or_else(|| self.synth.master_buffer_id());
        if !self.synth.has_master_buffer(master) {
            return Err(BuildError::AudioBufferNotFound(master));
        }
        self.voice.add_output(buffer, master)
    }

    /// Mark a synthesizer-level buffer as one of the engine's output sum
    /// sources.
    pub fn add_buffer_to_master(&mut self, buffer: ObjectId) -> Result<(), BuildError> {
        self.synth.assign_output_buffer(buffer)
    }

    // ------------------------------------------------------------------
    // Effect chains
    // ------------------------------------------------------------------

    /// Add a voice-level effect chain between two voice buffers.
    pub fn add_voice_effect_chain(
        &mut self,
        n_channels: usize,
        input: ObjectId,
        output: ObjectId,
    ) -> Result<ChainIndex, BuildError> {
        self.voice
            .add_effect_chain(self.synth.context_mut(), n_channels, input, output)
    }

    /// Add a synthesizer-level effect chain between two master buffers
    /// (shared; created once).
    pub fn add_effect_chain(
        &mut self,
        n_channels: usize,
        input: ObjectId,
        output: ObjectId,
    ) -> Result<ChainIndex, BuildError> {
        if let Some(idx) = self.shared.replay_chain() {
            return Ok(idx);
        }
        let idx = self.synth.add_master_chain(n_channels, input, output)?;
        self.shared.chains.push(idx);
        Ok(idx)
    }

    fn add_chain_effect<F>(&mut self, chain: ChainIndex, add: F) -> Result<ObjectId, BuildError>
    where
        F: FnOnce(&mut EffectChain, &mut Context) -> Result<ObjectId, BuildError>,
    {
        if chain.is_master() {
            if let Some(id) = self.shared.replay_effect() {
                return Ok(id);
            }
            let (chain_ref, ctx) = self
                .synth
                .master_chain_with_context(chain)
                .ok_or(BuildError::EffectChainNotFound(chain))?;
            let id = add(chain_ref, ctx)?;
            self.shared.effects.push(id);
            Ok(id)
        } else {
            let ctx = self.synth.context_mut();
            let chain_ref = self
                .voice
                .chain_mut(chain)
                .ok_or(BuildError::EffectChainNotFound(chain))?;
            add(chain_ref, ctx)
        }
    }

    /// Append a filter effect with typed parameters to a chain.
    pub fn add_filter_effect(
        &mut self,
        chain: ChainIndex,
        kind: &str,
        cutoff: f32,
        resonance: f32,
    ) -> Result<ObjectId, BuildError> {
        self.add_chain_effect(chain, |c, ctx| c.add_filter(ctx, kind, cutoff, resonance))
    }

    /// Append a filter effect from a JSON parameter payload.
    pub fn add_filter_effect_json(
        &mut self,
        chain: ChainIndex,
        json: &str,
    ) -> Result<ObjectId, BuildError> {
        self.add_chain_effect(chain, |c, ctx| c.add_filter_json(ctx, json))
    }

    /// Append a distortion effect from a JSON parameter payload.
    pub fn add_distortion_effect_json(
        &mut self,
        chain: ChainIndex,
        json: &str,
    ) -> Result<ObjectId, BuildError> {
        self.add_chain_effect(chain, |c, ctx| c.add_distortion_json(ctx, json))
    }

    /// Append a frequency-diffusion effect from a JSON parameter payload.
    pub fn add_diffusion_effect_json(
        &mut self,
        chain: ChainIndex,
        json: &str,
    ) -> Result<ObjectId, BuildError> {
        self.add_chain_effect(chain, |c, ctx| c.add_diffusion_json(ctx, json))
    }

    // ------------------------------------------------------------------
    // Voice-wide settings
    // ------------------------------------------------------------------

    /// Set glide time (seconds) and whether glide also applies to a voice
    /// that was not already sounding.
    pub fn set_portamento(&mut self, time_seconds: f32, always_glide: bool) {
        self.voice.set_portamento(time_seconds, always_glide);
    }

    /// Give this voice a random pitch offset drawn uniformly from
    /// [−semitones, +semitones].
    pub fn set_voice_rand_detune(&mut self, semitones: f32) {
        let offset = (self.rng.f32() * 2.0 - 1.0) * semitones;
        self.voice.set_detune_offset(offset);
    }

    /// Fixed pitch offset for one oscillator, in MIDI note numbers.
    pub fn set_oscillator_frequency_offset(
        &mut self,
        osc: ObjectId,
        semitones: f32,
    ) -> Result<(), BuildError> {
        self.voice.set_oscillator_frequency_offset(osc, semitones)
    }

    /// Script-visible tag of whatever `id` names, searching the voice
    /// under construction first, then the shared graph.
    pub fn object_type(&self, id: ObjectId) -> &'static str {
        let kind = self.voice.object_kind(id);
        if kind == ObjectKind::Undefined {
            return self.synth.object_kind(id).tag();
        }
        kind.tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_env() -> (Synthesizer, SharedGraph, fastrand::Rng) {
        let mut synth = Synthesizer::new();
        synth.context_mut().max_frames = 128;
        (synth, SharedGraph::new(), fastrand::Rng::with_seed(7))
    }

    #[test]
    fn shared_objects_replay_by_position() {
        let (mut synth, mut shared, mut rng) = build_env();

        let mut first = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        let saw_a = first.create_sawtooth_waveform();
        let buf_a = first.add_audio_buffer(2);
        let chain_a = first.add_effect_chain(2, buf_a, buf_a).unwrap();
        let fx_a = first
            .add_distortion_effect_json(chain_a, "{}")
            .unwrap();
        drop(first.finish());

        shared.next_build();
        let mut second = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        assert_eq!(second.create_sawtooth_waveform(), saw_a);
        assert_eq!(second.add_audio_buffer(2), buf_a);
        assert_eq!(second.add_effect_chain(2, buf_a, buf_a).unwrap(), chain_a);
        assert_eq!(
            second.add_distortion_effect_json(chain_a, "{}").unwrap(),
            fx_a
        );
        drop(second.finish());

        // Still exactly one master chain beyond none, one extra buffer
        assert_eq!(synth.master_chains().len(), 1);
    }

    #[test]
    fn voice_objects_are_not_deduplicated() {
        let (mut synth, mut shared, mut rng) = build_env();

        let mut first = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        let osc_a = first.add_sine_osc(2, 0.5, None).unwrap();
        drop(first.finish());

        shared.next_build();
        let mut second = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        let osc_b = second.add_sine_osc(2, 0.5, None).unwrap();
        assert_ne!(osc_a, osc_b);
    }

    #[test]
    fn voice_output_defaults_to_the_implicit_master() {
        let (mut synth, mut shared, mut rng) = build_env();
        let master = synth.master_buffer_id();

        let mut builder = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        let buf = builder.add_voice_audio_buffer(2);
        builder.add_voice_output(buf, None).unwrap();
        let voice = builder.finish();
        assert_eq!(voice.outputs()[0].master, master);
    }

    #[test]
    fn voice_output_rejects_unknown_master() {
        let (mut synth, mut shared, mut rng) = build_env();
        let mut builder = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        let buf = builder.add_voice_audio_buffer(2);
        let err = builder
            .add_voice_output(buf, Some(ObjectId(4242)))
            .unwrap_err();
        assert_eq!(err, BuildError::AudioBufferNotFound(ObjectId(4242)));
    }

    #[test]
    fn rand_detune_stays_inside_the_spread() {
        let (mut synth, mut shared, mut rng) = build_env();
        for _ in 0..32 {
            let mut builder = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
            builder.set_voice_rand_detune(0.25);
            let voice = builder.finish();
            assert!(voice.detune_offset().abs() <= 0.25);
        }
    }

    #[test]
    fn object_type_spans_voice_and_shared_graph() {
        let (mut synth, mut shared, mut rng) = build_env();
        let mut builder = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        let osc = builder.add_sine_osc(1, 0.5, None).unwrap();
        let master_buf = builder.add_audio_buffer(1);
        let env = builder.add_basic_envelope(None);

        assert_eq!(builder.object_type(osc), "oscillator");
        assert_eq!(builder.object_type(master_buf), "audio_buffer");
        assert_eq!(builder.object_type(env), "modulation_producer");
        assert_eq!(builder.object_type(ObjectId(9999)), "undefined");
    }

    #[test]
    fn chain_effect_requires_an_existing_chain() {
        let (mut synth, mut shared, mut rng) = build_env();
        let mut builder = VoiceBuilder::new(&mut synth, &mut shared, &mut rng);
        let err = builder
            .add_filter_effect(ChainIndex(3), "lowpass", 800.0, 0.5)
            .unwrap_err();
        assert_eq!(err, BuildError::EffectChainNotFound(ChainIndex(3)));
        let err = builder
            .add_filter_effect(ChainIndex(-3), "lowpass", 800.0, 0.5)
            .unwrap_err();
        assert_eq!(err, BuildError::EffectChainNotFound(ChainIndex(-3)));
    }
}
