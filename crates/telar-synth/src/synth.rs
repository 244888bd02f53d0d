//! The polyphonic synthesizer: voice pool, master graph, oversampling.
//!
//! Every voice and every master chain runs at `sample_rate × oversampling`;
//! the host-rate output is produced by exactly one 2:1 half-band
//! decimation per output channel at the very end of the block. The
//! decimation filter doubles as the output anti-aliasing filter.

use telar_core::{
    BuildError, ChainIndex, Context, HalfbandDecimator, ObjectId, ObjectKind, SignalBuffer,
    SignalKind, design_halfband_coefs,
};

use crate::chain::EffectChain;
use crate::modulation::{ModTarget, apply_modulation};
use crate::voice::{Voice, VoiceState};

/// Voice pool plus the shared (master) half of the graph.
pub struct Synthesizer {
    context: Context,
    voices: Vec<Voice>,
    master_buffers: Vec<SignalBuffer>,
    master_chains: Vec<EffectChain>,
    output_assignments: Vec<ObjectId>,
    master_buffer_id: ObjectId,
    decimators: Vec<HalfbandDecimator>,
    oversampled_mix: SignalBuffer,
}

impl Synthesizer {
    /// Create a synthesizer with an implicit stereo master buffer that is
    /// pre-assigned as an engine output.
    pub fn new() -> Self {
        let mut context = Context::new();
        let master_buffer_id = context.next_object_id();
        let mut master = SignalBuffer::new(SignalKind::Audio, 0, 2);
        master.set_id(master_buffer_id);
        Self {
            context,
            voices: Vec::new(),
            master_buffers: vec![master],
            master_chains: Vec::new(),
            output_assignments: vec![master_buffer_id],
            master_buffer_id,
            decimators: Vec::new(),
            oversampled_mix: SignalBuffer::new(SignalKind::Audio, 0, 0),
        }
    }

    /// Shared engine state.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the shared engine state (build phase).
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Id of the implicit master output buffer.
    pub fn master_buffer_id(&self) -> ObjectId {
        self.master_buffer_id
    }

    // ------------------------------------------------------------------
    // Construction surface (build phase only)
    // ------------------------------------------------------------------

    /// Create a synthesizer-level audio buffer.
    pub fn add_master_buffer(&mut self, n_channels: usize) -> ObjectId {
        let id = self.context.next_object_id();
        let mut buf = SignalBuffer::new(SignalKind::Audio, self.context.max_frames, n_channels);
        buf.set_id(id);
        self.master_buffers.push(buf);
        id
    }

    /// Create a master effect chain between two master buffers.
    pub fn add_master_chain(
        &mut self,
        n_channels: usize,
        input: ObjectId,
        output: ObjectId,
    ) -> Result<ChainIndex, BuildError> {
        for id in [input, output] {
            if !self.master_buffers.iter().any(|b| b.id() == id) {
                return Err(BuildError::AudioBufferNotFound(id));
            }
        }
        let object_id = self.context.next_object_id();
        let index = self.context.next_master_chain_index();
        self.master_chains
            .push(EffectChain::new(object_id, index, n_channels, input, output));
        Ok(index)
    }

    /// Look up a master chain.
    pub fn master_chain_mut(&mut self, index: ChainIndex) -> Option<&mut EffectChain> {
        self.master_chains.iter_mut().find(|c| c.index() == index)
    }

    /// Look up a master chain together with the context, for chain
    /// construction calls that need both.
    pub fn master_chain_with_context(
        &mut self,
        index: ChainIndex,
    ) -> Option<(&mut EffectChain, &mut Context)> {
        let chain = self.master_chains.iter_mut().find(|c| c.index() == index)?;
        Some((chain, &mut self.context))
    }

    /// All master chains (read access, e.g. for modulation resolution).
    pub fn master_chains(&self) -> &[EffectChain] {
        &self.master_chains
    }

    /// True when `id` names a synthesizer-level audio buffer.
    pub fn has_master_buffer(&self, id: ObjectId) -> bool {
        self.master_buffers.iter().any(|b| b.id() == id)
    }

    /// Mark a master buffer as one of the engine's output sum sources.
    pub fn assign_output_buffer(&mut self, id: ObjectId) -> Result<(), BuildError> {
        if !self.master_buffers.iter().any(|b| b.id() == id) {
            return Err(BuildError::AudioBufferNotFound(id));
        }
        if !self.output_assignments.contains(&id) {
            self.output_assignments.push(id);
        }
        Ok(())
    }

    /// Install a built voice into the pool.
    pub fn push_voice(&mut self, voice: Voice) {
        self.voices.push(voice);
        self.context.n_voices = self.voices.len();
    }

    /// Drop every voice (e.g. after a failed build).
    pub fn clear_voices(&mut self) {
        self.voices.clear();
        self.context.n_voices = 0;
    }

    /// The voice pool.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Mutable access to the voice pool.
    pub fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    /// Number of voices in the pool.
    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    /// Resolve what kind of object `id` names anywhere in the engine.
    pub fn object_kind(&self, id: ObjectId) -> ObjectKind {
        if self.master_buffers.iter().any(|b| b.id() == id) {
            return ObjectKind::AudioBuffer;
        }
        for chain in &self.master_chains {
            if chain.object_id() == id {
                return ObjectKind::EffectChain;
            }
            if chain.has_effect(id) {
                return ObjectKind::Effect;
            }
        }
        for voice in &self.voices {
            let kind = voice.object_kind(id);
            if kind != ObjectKind::Undefined {
                return kind;
            }
        }
        ObjectKind::Undefined
    }

    // ------------------------------------------------------------------
    // Host surface
    // ------------------------------------------------------------------

    /// Size every buffer for `n_frames` host frames, propagate rates, and
    /// design the decimation filter. Must complete before the first
    /// `process_block`; not real-time safe.
    pub fn prepare(&mut self, n_channels: usize, n_frames: usize, sample_rate: f32) {
        self.context.sample_rate = sample_rate;
        self.context.max_frames = n_frames * self.context.oversampling;
        let internal_frames = self.context.max_frames;
        let internal_rate = self.context.internal_rate();

        for buf in &mut self.master_buffers {
            let channels = buf.num_channels();
            buf.resize(channels, internal_frames);
        }
        self.oversampled_mix.resize(n_channels, internal_frames);
        for chain in &mut self.master_chains {
            chain.resize_buffers(internal_frames);
            chain.set_sample_rate(internal_rate);
        }
        for voice in &mut self.voices {
            voice.prepare(internal_frames, internal_rate);
        }

        let (attenuation, transition) = self.context.quality.halfband_spec();
        let coefs = design_halfband_coefs(attenuation, transition);
        self.decimators = (0..n_channels)
            .map(|_| {
                let mut d = HalfbandDecimator::new();
                d.set_coefficients(&coefs);
                d
            })
            .collect();

        tracing::info!(
            sample_rate,
            n_channels,
            n_frames,
            oversampling = self.context.oversampling,
            halfband_sections = coefs.len(),
            voices = self.voices.len(),
            "engine prepared"
        );
    }

    /// Note-on / note-off entry point.
    ///
    /// Note-on activates the first idle voice, stealing the voice with the
    /// highest age (ties to scan order) when none is idle. Note-off
    /// releases every active voice holding the note.
    pub fn process_midi_event(&mut self, note: u8, is_note_on: bool) {
        if is_note_on {
            if let Some(voice) = self.voices.iter_mut().find(|v| !v.is_playing()) {
                voice.activate(note);
                return;
            }
            let mut oldest: Option<usize> = None;
            let mut best_age = 0_u64;
            for (i, voice) in self.voices.iter().enumerate() {
                if oldest.is_none() || voice.voice_age() > best_age {
                    best_age = voice.voice_age();
                    oldest = Some(i);
                }
            }
            if let Some(i) = oldest {
                tracing::debug!(
                    note,
                    stolen_from = self.voices[i].current_midi_note(),
                    age = best_age,
                    "voice stolen"
                );
                self.voices[i].activate(note);
            }
        } else {
            for voice in &mut self.voices {
                if voice.state() == VoiceState::Active && voice.current_midi_note() == note {
                    voice.deactivate();
                }
            }
        }
    }

    /// Render one host block into `outputs` (one slice per channel).
    pub fn process_block(&mut self, outputs: &mut [&mut [f32]]) {
        let n_frames = outputs.iter().map(|o| o.len()).min().unwrap_or(0);
        if n_frames == 0 {
            return;
        }
        let n_internal = (n_frames * self.context.oversampling).min(self.context.max_frames);
        if n_internal == 0 {
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            return;
        }

        for buf in &mut self.master_buffers {
            buf.zero();
        }
        for chain in &mut self.master_chains {
            chain.begin_block();
            chain.zero_control_buffers();
        }

        for vi in 0..self.voices.len() {
            if !self.voices[vi].is_playing() {
                continue;
            }
            {
                let voice = &mut self.voices[vi];
                voice.begin_block();
                voice.process_block(n_internal);
                voice.bump_age();
            }

            let voice = &self.voices[vi];
            for route in voice.outputs() {
                let Some(src) = voice.buffer(route.source) else {
                    continue;
                };
                if let Some(dst) = self
                    .master_buffers
                    .iter_mut()
                    .find(|b| b.id() == route.master)
                {
                    dst.accumulate_from(src);
                }
            }
            // Routes landing on master-chain effects are applied here;
            // the voice cannot reach chains it does not own.
            for m in voice.modulations() {
                let ModTarget::ChainEffect {
                    chain,
                    effect_index,
                    port,
                    ..
                } = m.target
                else {
                    continue;
                };
                if !chain.is_master() {
                    continue;
                }
                let Some(src) = voice.producer_output(m.source) else {
                    continue;
                };
                let Some(c) = self.master_chains.iter_mut().find(|c| c.index() == chain) else {
                    continue;
                };
                let Some(buf) = c.mod_buffer_mut(effect_index) else {
                    continue;
                };
                apply_modulation(src, m.source_port, buf, port, m.amount, m.centered, n_internal, 0);
            }
        }

        for ci in 0..self.master_chains.len() {
            let in_id = self.master_chains[ci].input_id();
            let out_id = self.master_chains[ci].output_id();
            let in_idx = self.master_buffers.iter().position(|b| b.id() == in_id);
            let out_idx = self.master_buffers.iter().position(|b| b.id() == out_id);
            let (Some(ii), Some(oi)) = (in_idx, out_idx) else {
                continue;
            };
            let chain = &mut self.master_chains[ci];
            if ii == oi {
                chain.process_block_in_place(&mut self.master_buffers[ii], n_internal);
            } else if ii < oi {
                let (head, tail) = self.master_buffers.split_at_mut(oi);
                chain.process_block(&head[ii], &mut tail[0], n_internal);
            } else {
                let (head, tail) = self.master_buffers.split_at_mut(ii);
                chain.process_block(&tail[0], &mut head[oi], n_internal);
            }
        }

        self.oversampled_mix.zero();
        for id in &self.output_assignments {
            if let Some(buf) = self.master_buffers.iter().find(|b| b.id() == *id) {
                self.oversampled_mix.accumulate_from(buf);
            }
        }

        for (c, out) in outputs.iter_mut().enumerate() {
            let Some(decimator) = self.decimators.get_mut(c) else {
                out.fill(0.0);
                continue;
            };
            let Some(mix) = self.oversampled_mix.channel(c) else {
                out.fill(0.0);
                continue;
            };
            decimator.process_block(out, &mix[..n_internal.min(mix.len())]);
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}
