//! Ordered effect pipelines with automatic buffer wiring.
//!
//! A chain owns its effects plus one control buffer and one inter-effect
//! audio buffer per effect. The external input and output buffers belong
//! to the chain's owner (voice or synthesizer), which resolves them by id
//! and passes them in at process time. Effect `i` reads effect `i−1`'s
//! output; the first effect reads the chain input, the last writes the
//! chain output. An empty chain copies input to output.

use telar_core::{BuildError, ChainIndex, Context, ObjectId, SignalBuffer, SignalKind};

use crate::diffusion::DiffusionEffect;
use crate::distortion::DistortionEffect;
use crate::effect::Effect;
use crate::filter_effect::FilterEffect;

struct EffectSlot {
    id: ObjectId,
    effect: Box<dyn Effect>,
    mod_buffer: SignalBuffer,
    out_buffer: SignalBuffer,
}

/// An ordered pipeline of effects.
pub struct EffectChain {
    object_id: ObjectId,
    index: ChainIndex,
    n_channels: usize,
    input_id: ObjectId,
    output_id: ObjectId,
    slots: Vec<EffectSlot>,
    input_scratch: SignalBuffer,
    frame_offset: usize,
}

impl EffectChain {
    /// Create an empty chain reading `input_id` and writing `output_id`.
    pub fn new(
        object_id: ObjectId,
        index: ChainIndex,
        n_channels: usize,
        input_id: ObjectId,
        output_id: ObjectId,
    ) -> Self {
        Self {
            object_id,
            index,
            n_channels,
            input_id,
            output_id,
            slots: Vec::new(),
            input_scratch: SignalBuffer::new(SignalKind::Audio, 0, n_channels),
            frame_offset: 0,
        }
    }

    /// The chain's own object id.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// The chain's signed index.
    pub fn index(&self) -> ChainIndex {
        self.index
    }

    /// Channel count every effect in the chain processes.
    pub fn num_channels(&self) -> usize {
        self.n_channels
    }

    /// Id of the external input buffer.
    pub fn input_id(&self) -> ObjectId {
        self.input_id
    }

    /// Id of the external output buffer.
    pub fn output_id(&self) -> ObjectId {
        self.output_id
    }

    /// Number of effects in the chain.
    pub fn num_effects(&self) -> usize {
        self.slots.len()
    }

    /// True when `id` names an effect in this chain.
    pub fn has_effect(&self, id: ObjectId) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    /// Position of effect `id` within the chain.
    pub fn effect_index_of(&self, id: ObjectId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    /// Resolve a port name on the effect at `effect_index`.
    pub fn port_index(&self, effect_index: usize, name: &str) -> Option<usize> {
        self.slots
            .get(effect_index)?
            .effect
            .port_names()
            .iter()
            .position(|&p| p == name)
    }

    /// Control buffer of the effect at `effect_index`, for the routing pass.
    pub fn mod_buffer_mut(&mut self, effect_index: usize) -> Option<&mut SignalBuffer> {
        self.slots.get_mut(effect_index).map(|s| &mut s.mod_buffer)
    }

    fn push_effect(&mut self, ctx: &mut Context, effect: Box<dyn Effect>) -> ObjectId {
        let id = ctx.next_object_id();
        let n_ports = effect.port_names().len();
        let mut mod_buffer = SignalBuffer::new(SignalKind::Control, ctx.max_frames, n_ports);
        mod_buffer.set_id(ctx.next_object_id());
        let mut out_buffer = SignalBuffer::new(SignalKind::Audio, ctx.max_frames, self.n_channels);
        out_buffer.set_id(ctx.next_object_id());
        self.slots.push(EffectSlot {
            id,
            effect,
            mod_buffer,
            out_buffer,
        });
        id
    }

    /// Append a filter effect with typed parameters.
    pub fn add_filter(
        &mut self,
        ctx: &mut Context,
        kind: &str,
        frequency: f32,
        resonance: f32,
    ) -> Result<ObjectId, BuildError> {
        let fx = FilterEffect::new(
            kind,
            self.n_channels,
            ctx.internal_rate(),
            frequency,
            resonance,
        )?;
        Ok(self.push_effect(ctx, Box::new(fx)))
    }

    /// Append a filter effect from a JSON parameter payload.
    pub fn add_filter_json(&mut self, ctx: &mut Context, json: &str) -> Result<ObjectId, BuildError> {
        let fx = FilterEffect::from_json(json, self.n_channels, ctx.internal_rate())
            .inspect_err(|e| tracing::warn!(chain = self.index.0, error = %e, "filter params rejected"))?;
        Ok(self.push_effect(ctx, Box::new(fx)))
    }

    /// Append a distortion effect from a JSON parameter payload.
    pub fn add_distortion_json(
        &mut self,
        ctx: &mut Context,
        json: &str,
    ) -> Result<ObjectId, BuildError> {
        let fx = DistortionEffect::from_json(json, self.n_channels)
            .inspect_err(|e| tracing::warn!(chain = self.index.0, error = %e, "distortion params rejected"))?;
        Ok(self.push_effect(ctx, Box::new(fx)))
    }

    /// Append a diffusion effect from a JSON parameter payload.
    pub fn add_diffusion_json(
        &mut self,
        ctx: &mut Context,
        json: &str,
    ) -> Result<ObjectId, BuildError> {
        let fx = DiffusionEffect::from_json(json, self.n_channels, ctx.internal_rate())
            .inspect_err(|e| tracing::warn!(chain = self.index.0, error = %e, "diffusion params rejected"))?;
        Ok(self.push_effect(ctx, Box::new(fx)))
    }

    /// Run every effect in order, `input` → ... → `output`.
    pub fn process_block(
        &mut self,
        input: &SignalBuffer,
        output: &mut SignalBuffer,
        n_frames: usize,
    ) {
        if self.slots.is_empty() {
            for c in 0..self.n_channels {
                let Some(src) = input.channel(c) else { continue };
                let end = (self.frame_offset + n_frames).min(src.len());
                let Some(dst) = output.channel_mut(c) else {
                    continue;
                };
                let end = end.min(dst.len());
                if self.frame_offset < end {
                    dst[self.frame_offset..end].copy_from_slice(&src[self.frame_offset..end]);
                }
            }
            self.frame_offset += n_frames;
            return;
        }

        let last = self.slots.len() - 1;
        for i in 0..self.slots.len() {
            let (before, rest) = self.slots.split_at_mut(i);
            let slot = &mut rest[0];
            let audio_in: &SignalBuffer = if i == 0 {
                input
            } else {
                &before[i - 1].out_buffer
            };
            if i == last {
                slot.effect
                    .process_block(audio_in, &slot.mod_buffer, output, n_frames, self.frame_offset);
            } else {
                slot.effect.process_block(
                    audio_in,
                    &slot.mod_buffer,
                    &mut slot.out_buffer,
                    n_frames,
                    self.frame_offset,
                );
            }
        }
        self.frame_offset += n_frames;
    }

    /// Run the chain when its input and output resolve to the same buffer.
    ///
    /// The input is staged through an owned scratch copy first.
    pub fn process_block_in_place(&mut self, io: &mut SignalBuffer, n_frames: usize) {
        let mut scratch = core::mem::take(&mut self.input_scratch);
        scratch.copy_from(io);
        self.process_block(&scratch, io, n_frames);
        self.input_scratch = scratch;
    }

    /// Reset the intra-block offset (start of a host block).
    pub fn begin_block(&mut self) {
        self.frame_offset = 0;
    }

    /// Reallocate internal buffers for a new block length. Control-channel
    /// divisions survive; audio buffers come back zeroed at division 1.
    pub fn resize_buffers(&mut self, n_frames: usize) {
        for slot in &mut self.slots {
            for ch in 0..slot.mod_buffer.num_channels() {
                let division = slot.mod_buffer.division(ch);
                let source = slot.mod_buffer.source_id(ch);
                slot.mod_buffer
                    .set_channel(ch, n_frames / division, division, source);
            }
            let channels = slot.out_buffer.num_channels();
            slot.out_buffer.resize(channels, n_frames);
        }
        self.input_scratch.resize(self.n_channels, n_frames);
    }

    /// Zero every effect's control buffer (block-begin pass; the routing
    /// engine accumulates onto these).
    pub fn zero_control_buffers(&mut self) {
        for slot in &mut self.slots {
            slot.mod_buffer.zero();
        }
    }

    /// Propagate a sample-rate change to every effect.
    pub fn set_sample_rate(&mut self, rate: f32) {
        for slot in &mut self.slots {
            slot.effect.on_sample_rate_change(rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx(max_frames: usize) -> Context {
        let mut ctx = Context::new();
        ctx.sample_rate = 48_000.0;
        ctx.max_frames = max_frames;
        ctx
    }

    fn audio_with(value: f32, n: usize, channels: usize) -> SignalBuffer {
        let mut buf = SignalBuffer::new(SignalKind::Audio, n, channels);
        for c in 0..channels {
            buf.set_constant(c, value);
        }
        buf
    }

    #[test]
    fn empty_chain_is_pass_through() {
        let n = 64;
        let mut chain = EffectChain::new(ObjectId(100), ChainIndex(0), 2, ObjectId(1), ObjectId(2));
        let input = audio_with(0.7, n, 2);
        let mut output = SignalBuffer::new(SignalKind::Audio, n, 2);
        chain.begin_block();
        chain.process_block(&input, &mut output, n);
        for c in 0..2 {
            assert!(output.channel(c).unwrap().iter().all(|&s| s == 0.7));
        }
    }

    #[test]
    fn effects_wire_in_series() {
        let n = 64;
        let mut ctx = test_ctx(n);
        let mut chain = EffectChain::new(ObjectId(100), ChainIndex(0), 1, ObjectId(1), ObjectId(2));
        // Two dry distortions with gains 2 and 3: series gain 6
        chain
            .add_distortion_json(&mut ctx, r#"{"mix": 0.0, "output_gain": 2.0}"#)
            .unwrap();
        chain
            .add_distortion_json(&mut ctx, r#"{"mix": 0.0, "output_gain": 3.0}"#)
            .unwrap();

        let input = audio_with(0.1, n, 1);
        let mut output = SignalBuffer::new(SignalKind::Audio, n, 1);
        chain.begin_block();
        chain.process_block(&input, &mut output, n);
        assert!(
            output
                .channel(0)
                .unwrap()
                .iter()
                .all(|&s| (s - 0.6).abs() < 1e-5),
            "series gain should multiply"
        );
    }

    #[test]
    fn effect_lookup_by_id() {
        let mut ctx = test_ctx(32);
        let mut chain = EffectChain::new(ObjectId(100), ChainIndex(0), 1, ObjectId(1), ObjectId(2));
        let filter = chain.add_filter(&mut ctx, "lowpass", 800.0, 0.5).unwrap();
        let dist = chain.add_distortion_json(&mut ctx, "{}").unwrap();

        assert_eq!(chain.effect_index_of(filter), Some(0));
        assert_eq!(chain.effect_index_of(dist), Some(1));
        assert!(chain.effect_index_of(ObjectId(999)).is_none());
        assert_eq!(chain.port_index(0, "cutoff"), Some(0));
        assert_eq!(chain.port_index(1, "output_gain"), Some(2));
        assert_eq!(chain.port_index(1, "cutoff"), None);
    }

    #[test]
    fn in_place_processing_matches_separate_buffers() {
        let n = 32;
        let mut ctx = test_ctx(n);
        let mut chain = EffectChain::new(ObjectId(100), ChainIndex(0), 1, ObjectId(1), ObjectId(1));
        chain
            .add_distortion_json(&mut ctx, r#"{"mix": 0.0, "output_gain": 2.0}"#)
            .unwrap();
        chain.resize_buffers(n);

        let mut io = audio_with(0.25, n, 1);
        chain.begin_block();
        chain.process_block_in_place(&mut io, n);
        assert!(io.channel(0).unwrap().iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn resize_preserves_control_divisions() {
        let mut ctx = test_ctx(16);
        let mut chain = EffectChain::new(ObjectId(100), ChainIndex(0), 1, ObjectId(1), ObjectId(2));
        chain.add_filter(&mut ctx, "lowpass", 500.0, 0.5).unwrap();
        chain.mod_buffer_mut(0).unwrap().set_division(1, 4);

        chain.resize_buffers(64);
        let mods = chain.mod_buffer_mut(0).unwrap();
        assert_eq!(mods.division(1), 4);
        assert_eq!(mods.channel_len(1), 16);
        assert_eq!(mods.channel_len(0), 64);
    }
}
