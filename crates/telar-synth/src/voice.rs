//! One monophonic synthesis unit.
//!
//! A voice owns its oscillators, modulation producers, audio buffers,
//! voice-level effect chains, and the modulation routes connecting them.
//! Per block it seeds the oscillator pitch/amplitude ports from the note
//! state (pitch glides per sample), applies the registered modulations,
//! runs oscillators and chains, and — while releasing — watches its routed
//! output buffers for a full block of silence to return to idle.

use telar_core::{
    BuildError, ChainIndex, Context, ObjectId, ObjectKind, ResourceId, SignalBuffer, SignalKind,
};

use crate::chain::EffectChain;
use crate::envelope::BasicEnvelope;
use crate::modulation::{ModTarget, Modulation, apply_modulation};
use crate::oscillator::{Oscillator, PORT_AMPLITUDE, PORT_PITCH};
use crate::producer::ModulationProducer;
use crate::sine_osc::SineOscillator;
use crate::waveform_osc::WaveformOscillator;

/// Peak level below which a full releasing block counts as silent.
pub const SILENCE_THRESHOLD: f32 = 1e-4;

/// Reallocate a control buffer for a new block length, preserving each
/// channel's division and provenance.
fn resize_control(buf: &mut SignalBuffer, n_frames: usize) {
    for ch in 0..buf.num_channels() {
        let division = buf.division(ch);
        let source = buf.source_id(ch);
        buf.set_channel(ch, (n_frames / division).max(1), division, source);
    }
}

/// Voice lifecycle states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Not sounding; available for allocation.
    #[default]
    Idle,
    /// Holding a note.
    Active,
    /// Note released; waiting for the output to fall silent.
    Releasing,
}

/// Routing entry: a voice buffer accumulated into a master buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceOutput {
    /// Voice-level source buffer.
    pub source: ObjectId,
    /// Master buffer the source is summed into.
    pub master: ObjectId,
}

struct OscSlot {
    id: ObjectId,
    osc: Box<dyn Oscillator>,
    mod_buffer: SignalBuffer,
    amplitude: f32,
    out_buffer: Option<ObjectId>,
}

struct ProducerSlot {
    id: ObjectId,
    producer: Box<dyn ModulationProducer>,
    out_buffer: SignalBuffer,
}

/// One voice of the polyphonic pool.
pub struct Voice {
    state: VoiceState,
    midi_note: u8,
    current_note: f32,
    target_note: f32,
    portamento_time: f32,
    portamento_g: f32,
    always_glide: bool,
    detune_offset: f32,
    voice_age: u64,
    should_retrigger: bool,
    frame_offset: usize,
    internal_rate: f32,

    oscillators: Vec<OscSlot>,
    producers: Vec<ProducerSlot>,
    audio_buffers: Vec<SignalBuffer>,
    chains: Vec<EffectChain>,
    modulations: Vec<Modulation>,
    outputs: Vec<VoiceOutput>,
}

impl Voice {
    /// Create an empty voice rendering at `internal_rate`.
    pub fn new(internal_rate: f32) -> Self {
        Self {
            state: VoiceState::Idle,
            midi_note: 0,
            current_note: 60.0,
            target_note: 60.0,
            portamento_time: 0.0,
            portamento_g: 1.0,
            always_glide: false,
            detune_offset: 0.0,
            voice_age: 0,
            should_retrigger: false,
            frame_offset: 0,
            internal_rate,
            oscillators: Vec::new(),
            producers: Vec::new(),
            audio_buffers: Vec::new(),
            chains: Vec::new(),
            modulations: Vec::new(),
            outputs: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Construction surface (build phase only; allocates)
    // ------------------------------------------------------------------

    /// Add a sine oscillator. Amplitude must lie in [0, 1].
    pub fn add_sine_oscillator(
        &mut self,
        ctx: &mut Context,
        n_channels: usize,
        amplitude: f32,
    ) -> Result<ObjectId, BuildError> {
        if !(0.0..=1.0).contains(&amplitude) {
            return Err(BuildError::AmplitudeOutOfRange(amplitude));
        }
        let osc = SineOscillator::new(n_channels, ctx.internal_rate());
        Ok(self.push_oscillator(ctx, Box::new(osc), amplitude))
    }

    /// Add a waveform oscillator reading `resource`. Amplitude in [0, 1].
    pub fn add_waveform_oscillator(
        &mut self,
        ctx: &mut Context,
        n_channels: usize,
        resource: ResourceId,
        amplitude: f32,
    ) -> Result<ObjectId, BuildError> {
        if !(0.0..=1.0).contains(&amplitude) {
            return Err(BuildError::AmplitudeOutOfRange(amplitude));
        }
        let osc = WaveformOscillator::new(ctx, n_channels, resource)?;
        Ok(self.push_oscillator(ctx, Box::new(osc), amplitude))
    }

    fn push_oscillator(
        &mut self,
        ctx: &mut Context,
        osc: Box<dyn Oscillator>,
        amplitude: f32,
    ) -> ObjectId {
        let id = ctx.next_object_id();
        let n_ports = osc.port_names().len();
        let mut mod_buffer = SignalBuffer::new(SignalKind::Control, ctx.max_frames, n_ports);
        mod_buffer.set_id(ctx.next_object_id());
        self.oscillators.push(OscSlot {
            id,
            osc,
            mod_buffer,
            amplitude,
            out_buffer: None,
        });
        id
    }

    /// Add a basic ADSR envelope producer. `adsr` is
    /// [attack, decay, sustain, release]; defaults apply when omitted.
    pub fn add_basic_envelope(&mut self, ctx: &mut Context, adsr: Option<[f32; 4]>) -> ObjectId {
        let rate = ctx.internal_rate();
        let env = match adsr {
            Some([a, d, s, r]) => BasicEnvelope::with_adsr(rate, a, d, s, r),
            None => BasicEnvelope::new(rate),
        };
        let id = ctx.next_object_id();
        let n_outputs = env.output_names().len();
        let mut out_buffer = SignalBuffer::new(SignalKind::Control, ctx.max_frames, n_outputs);
        out_buffer.set_id(ctx.next_object_id());
        self.producers.push(ProducerSlot {
            id,
            producer: Box::new(env),
            out_buffer,
        });
        id
    }

    /// Add a voice-owned audio buffer.
    pub fn add_audio_buffer(&mut self, ctx: &mut Context, n_channels: usize) -> ObjectId {
        let id = ctx.next_object_id();
        let mut buf = SignalBuffer::new(SignalKind::Audio, ctx.max_frames, n_channels);
        buf.set_id(id);
        self.audio_buffers.push(buf);
        id
    }

    /// Point an oscillator's output at a voice audio buffer.
    pub fn assign_oscillator_buffer(
        &mut self,
        osc: ObjectId,
        buffer: ObjectId,
    ) -> Result<(), BuildError> {
        if !self.audio_buffers.iter().any(|b| b.id() == buffer) {
            return Err(BuildError::AudioBufferNotFound(buffer));
        }
        let slot = self
            .oscillators
            .iter_mut()
            .find(|o| o.id == osc)
            .ok_or(BuildError::OscillatorNotFound(osc))?;
        slot.out_buffer = Some(buffer);
        Ok(())
    }

    /// Create a voice-level effect chain between two voice buffers.
    pub fn add_effect_chain(
        &mut self,
        ctx: &mut Context,
        n_channels: usize,
        input: ObjectId,
        output: ObjectId,
    ) -> Result<ChainIndex, BuildError> {
        for id in [input, output] {
            if !self.audio_buffers.iter().any(|b| b.id() == id) {
                return Err(BuildError::AudioBufferNotFound(id));
            }
        }
        let object_id = ctx.next_object_id();
        let index = ctx.next_voice_chain_index();
        self.chains
            .push(EffectChain::new(object_id, index, n_channels, input, output));
        Ok(index)
    }

    /// Look up a voice-level chain.
    pub fn chain_mut(&mut self, index: ChainIndex) -> Option<&mut EffectChain> {
        self.chains.iter_mut().find(|c| c.index() == index)
    }

    /// Register a modulation route by port names.
    ///
    /// `master_chains` is searched after the voice's own objects so routes
    /// may land on effects in synthesizer-level chains. Name resolution
    /// happens here, once; failure adds nothing to the route list.
    pub fn add_modulation(
        &mut self,
        source: ObjectId,
        source_port: &str,
        dest: ObjectId,
        dest_port: &str,
        amount: f32,
        centered: bool,
        master_chains: &[EffectChain],
    ) -> Result<(), BuildError> {
        let producer = self
            .producers
            .iter()
            .find(|p| p.id == source)
            .ok_or(BuildError::ModulationSourceNotFound(source))?;
        let source_port = producer
            .producer
            .output_names()
            .iter()
            .position(|&n| n == source_port)
            .ok_or_else(|| BuildError::ModulationSourceParamNotFound(source_port.to_owned()))?;

        let target = self.resolve_target(dest, dest_port, master_chains)?;
        self.modulations.push(Modulation {
            source,
            source_port,
            target,
            amount,
            centered,
        });
        Ok(())
    }

    fn resolve_target(
        &self,
        dest: ObjectId,
        dest_port: &str,
        master_chains: &[EffectChain],
    ) -> Result<ModTarget, BuildError> {
        if let Some(osc) = self.oscillators.iter().find(|o| o.id == dest) {
            let port = osc
                .osc
                .port_names()
                .iter()
                .position(|&n| n == dest_port)
                .ok_or_else(|| {
                    BuildError::ModulationDestinationParamNotFound(dest_port.to_owned())
                })?;
            return Ok(ModTarget::Oscillator { id: dest, port });
        }
        for chain in self.chains.iter().chain(master_chains.iter()) {
            if let Some(effect_index) = chain.effect_index_of(dest) {
                let port = chain.port_index(effect_index, dest_port).ok_or_else(|| {
                    BuildError::ModulationDestinationParamNotFound(dest_port.to_owned())
                })?;
                return Ok(ModTarget::ChainEffect {
                    chain: chain.index(),
                    effect_index,
                    id: dest,
                    port,
                });
            }
        }
        Err(BuildError::ModulationDestinationNotFound(dest))
    }

    /// Route a voice buffer into a master buffer.
    pub fn add_output(&mut self, source: ObjectId, master: ObjectId) -> Result<(), BuildError> {
        if !self.audio_buffers.iter().any(|b| b.id() == source) {
            return Err(BuildError::AudioBufferNotFound(source));
        }
        self.outputs.push(VoiceOutput { source, master });
        Ok(())
    }

    /// Set glide time (seconds) and whether glide applies even to a voice
    /// that was not already sounding.
    pub fn set_portamento(&mut self, time_seconds: f32, always_glide: bool) {
        self.portamento_time = time_seconds;
        self.always_glide = always_glide;
        self.update_portamento_coeff();
    }

    /// Fixed per-voice pitch offset in semitones (random detune).
    pub fn set_detune_offset(&mut self, semitones: f32) {
        self.detune_offset = semitones;
    }

    /// The fixed per-voice pitch offset, in semitones.
    pub fn detune_offset(&self) -> f32 {
        self.detune_offset
    }

    /// Per-oscillator pitch offset in MIDI note numbers.
    pub fn set_oscillator_frequency_offset(
        &mut self,
        osc: ObjectId,
        semitones: f32,
    ) -> Result<(), BuildError> {
        let slot = self
            .oscillators
            .iter_mut()
            .find(|o| o.id == osc)
            .ok_or(BuildError::OscillatorNotFound(osc))?;
        slot.osc.set_frequency_offset(semitones);
        Ok(())
    }

    /// Resolve what kind of object `id` names inside this voice.
    pub fn object_kind(&self, id: ObjectId) -> ObjectKind {
        if self.oscillators.iter().any(|o| o.id == id) {
            return ObjectKind::Oscillator;
        }
        if self.producers.iter().any(|p| p.id == id) {
            return ObjectKind::ModulationProducer;
        }
        if self.audio_buffers.iter().any(|b| b.id() == id) {
            return ObjectKind::AudioBuffer;
        }
        for chain in &self.chains {
            if chain.object_id() == id {
                return ObjectKind::EffectChain;
            }
            if chain.has_effect(id) {
                return ObjectKind::Effect;
            }
        }
        ObjectKind::Undefined
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Begin (or steal into) a note.
    pub fn activate(&mut self, note: u8) {
        let was_holding = self.state == VoiceState::Active;
        self.voice_age = 0;
        self.should_retrigger = true;
        self.target_note = f32::from(note);
        let glide = self.always_glide || was_holding;
        if !glide || self.portamento_time <= 0.0 {
            self.current_note = f32::from(note);
        }
        self.midi_note = note;
        self.state = VoiceState::Active;
        self.update_portamento_coeff();
    }

    /// Release the held note; the voice keeps sounding until silent.
    pub fn deactivate(&mut self) {
        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
            for p in &mut self.producers {
                p.producer.release();
            }
        }
    }

    /// True while the voice occupies a pool slot (Active or Releasing).
    pub fn is_playing(&self) -> bool {
        self.state != VoiceState::Idle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// The MIDI note this voice was last activated with.
    pub fn current_midi_note(&self) -> u8 {
        self.midi_note
    }

    /// The glided note value, in fractional MIDI notes.
    pub fn current_note(&self) -> f32 {
        self.current_note
    }

    /// Blocks rendered since the last activation.
    pub fn voice_age(&self) -> u64 {
        self.voice_age
    }

    /// Count one rendered block toward this voice's age.
    pub fn bump_age(&mut self) {
        self.voice_age += 1;
    }

    /// Number of oscillators owned by this voice.
    pub fn num_oscillators(&self) -> usize {
        self.oscillators.len()
    }

    /// Registered modulation routes.
    pub fn modulations(&self) -> &[Modulation] {
        &self.modulations
    }

    /// Registered output routes.
    pub fn outputs(&self) -> &[VoiceOutput] {
        &self.outputs
    }

    /// Look up a voice buffer by id.
    pub fn buffer(&self, id: ObjectId) -> Option<&SignalBuffer> {
        self.audio_buffers.iter().find(|b| b.id() == id)
    }

    fn update_portamento_coeff(&mut self) {
        self.portamento_g = if self.portamento_time <= 0.0 {
            1.0
        } else {
            (1.0 - libm::expf(-1.0 / (self.portamento_time * self.internal_rate))).clamp(0.0, 1.0)
        };
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Resize every owned buffer for a new internal block length and
    /// propagate the internal rate. Build/prepare phase only.
    pub fn prepare(&mut self, n_frames: usize, internal_rate: f32) {
        self.internal_rate = internal_rate;
        for slot in &mut self.oscillators {
            resize_control(&mut slot.mod_buffer, n_frames);
            slot.osc.on_sample_rate_change(internal_rate);
        }
        for p in &mut self.producers {
            resize_control(&mut p.out_buffer, n_frames);
            p.producer.on_sample_rate_change(internal_rate);
        }
        for buf in &mut self.audio_buffers {
            let channels = buf.num_channels();
            buf.resize(channels, n_frames);
        }
        for chain in &mut self.chains {
            chain.resize_buffers(n_frames);
            chain.set_sample_rate(internal_rate);
        }
        self.update_portamento_coeff();
    }

    /// Reset intra-block offsets at the start of a host block.
    pub fn begin_block(&mut self) {
        self.frame_offset = 0;
        for chain in &mut self.chains {
            chain.begin_block();
        }
    }

    /// Render one (sub-)block of `n_frames` internal-rate samples.
    pub fn process_block(&mut self, n_frames: usize) {
        if self.state == VoiceState::Idle || n_frames == 0 {
            return;
        }

        for buf in &mut self.audio_buffers {
            buf.zero();
        }

        self.seed_oscillator_ports(n_frames);

        for chain in &mut self.chains {
            chain.zero_control_buffers();
        }

        if self.should_retrigger {
            for p in &mut self.producers {
                p.producer.retrigger();
            }
            self.should_retrigger = false;
        }
        for p in &mut self.producers {
            p.producer
                .process_block(&mut p.out_buffer, n_frames, self.frame_offset);
        }

        self.apply_modulations(n_frames);

        for si in 0..self.oscillators.len() {
            let Some(buf_id) = self.oscillators[si].out_buffer else {
                continue;
            };
            let Some(bi) = self.audio_buffers.iter().position(|b| b.id() == buf_id) else {
                continue;
            };
            let slot = &mut self.oscillators[si];
            slot.osc.process_block(
                &slot.mod_buffer,
                &mut self.audio_buffers[bi],
                n_frames,
                self.frame_offset,
            );
        }

        for ci in 0..self.chains.len() {
            let in_id = self.chains[ci].input_id();
            let out_id = self.chains[ci].output_id();
            let in_idx = self.audio_buffers.iter().position(|b| b.id() == in_id);
            let out_idx = self.audio_buffers.iter().position(|b| b.id() == out_id);
            let (Some(ii), Some(oi)) = (in_idx, out_idx) else {
                continue;
            };
            let chain = &mut self.chains[ci];
            if ii == oi {
                chain.process_block_in_place(&mut self.audio_buffers[ii], n_frames);
            } else if ii < oi {
                let (head, tail) = self.audio_buffers.split_at_mut(oi);
                chain.process_block(&head[ii], &mut tail[0], n_frames);
            } else {
                let (head, tail) = self.audio_buffers.split_at_mut(ii);
                chain.process_block(&tail[0], &mut head[oi], n_frames);
            }
        }

        if self.state == VoiceState::Releasing {
            let mut peak = 0.0_f32;
            for out in &self.outputs {
                if let Some(buf) = self.audio_buffers.iter().find(|b| b.id() == out.source) {
                    peak = peak.max(buf.peak());
                }
            }
            if peak <= SILENCE_THRESHOLD {
                self.state = VoiceState::Idle;
            }
        }

        self.frame_offset += n_frames;
    }

    /// Seed pitch (glided per sample, plus the voice detune offset) and
    /// amplitude ports from the note state.
    fn seed_oscillator_ports(&mut self, n_frames: usize) {
        let retain = 1.0 - self.portamento_g;
        let target = self.target_note;
        let start_note = self.current_note;
        let detune = self.detune_offset;
        let frame_offset = self.frame_offset;

        for slot in &mut self.oscillators {
            let division = slot.mod_buffer.division(PORT_PITCH);
            if let Some(pitch) = slot.mod_buffer.channel_mut(PORT_PITCH) {
                let mut note = start_note;
                for i in 0..n_frames {
                    if i % division == 0 {
                        let idx = (i + frame_offset) / division;
                        if idx < pitch.len() {
                            pitch[idx] = note + detune;
                        }
                    }
                    note = target + (note - target) * retain;
                }
            }
            slot.mod_buffer.set_constant(PORT_AMPLITUDE, slot.amplitude);
        }

        let factor = libm::powf(retain, n_frames as f32);
        self.current_note = target + (start_note - target) * factor;
    }

    /// Apply every registered route whose destination lives in this voice.
    fn apply_modulations(&mut self, n_frames: usize) {
        for m in &self.modulations {
            let Some(src) = self.producers.iter().find(|p| p.id == m.source) else {
                continue;
            };
            match m.target {
                ModTarget::Oscillator { id, port } => {
                    let Some(dst) = self.oscillators.iter_mut().find(|o| o.id == id) else {
                        continue;
                    };
                    apply_modulation(
                        &src.out_buffer,
                        m.source_port,
                        &mut dst.mod_buffer,
                        port,
                        m.amount,
                        m.centered,
                        n_frames,
                        self.frame_offset,
                    );
                }
                ModTarget::ChainEffect {
                    chain,
                    effect_index,
                    port,
                    ..
                } => {
                    // Master-chain destinations are applied by the
                    // synthesizer, which owns those chains.
                    if chain.is_master() {
                        continue;
                    }
                    let Some(c) = self.chains.iter_mut().find(|c| c.index() == chain) else {
                        continue;
                    };
                    let Some(buf) = c.mod_buffer_mut(effect_index) else {
                        continue;
                    };
                    apply_modulation(
                        &src.out_buffer,
                        m.source_port,
                        buf,
                        port,
                        m.amount,
                        m.centered,
                        n_frames,
                        self.frame_offset,
                    );
                }
            }
        }
    }

    /// Producer output buffer for `source`, for master-chain routing.
    pub fn producer_output(&self, source: ObjectId) -> Option<&SignalBuffer> {
        self.producers
            .iter()
            .find(|p| p.id == source)
            .map(|p| &p.out_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f32 = 96_000.0;

    fn ctx(max_frames: usize) -> Context {
        let mut ctx = Context::new();
        ctx.sample_rate = RATE / 2.0;
        ctx.max_frames = max_frames;
        ctx
    }

    fn simple_voice(ctx: &mut Context, n_frames: usize) -> (Voice, ObjectId, ObjectId) {
        let mut voice = Voice::new(ctx.internal_rate());
        let osc = voice.add_sine_oscillator(ctx, 2, 0.8).unwrap();
        let buf = voice.add_audio_buffer(ctx, 2);
        voice.assign_oscillator_buffer(osc, buf).unwrap();
        voice.add_output(buf, ObjectId(0)).unwrap();
        voice.prepare(n_frames, ctx.internal_rate());
        (voice, osc, buf)
    }

    #[test]
    fn amplitude_range_is_enforced() {
        let mut ctx = ctx(64);
        let mut voice = Voice::new(ctx.internal_rate());
        assert_eq!(
            voice.add_sine_oscillator(&mut ctx, 2, 1.5).unwrap_err(),
            BuildError::AmplitudeOutOfRange(1.5)
        );
        assert_eq!(
            voice.add_sine_oscillator(&mut ctx, 2, -0.1).unwrap_err(),
            BuildError::AmplitudeOutOfRange(-0.1)
        );
        assert!(voice.add_sine_oscillator(&mut ctx, 2, 1.0).is_ok());
    }

    #[test]
    fn active_voice_renders_into_its_buffer() {
        let n = 256;
        let mut ctx = ctx(n);
        let (mut voice, _, buf) = simple_voice(&mut ctx, n);

        voice.activate(69);
        voice.begin_block();
        voice.process_block(n);

        let peak = voice.buffer(buf).unwrap().peak();
        assert!(peak > 0.1, "active voice should sound, peak {}", peak);
    }

    #[test]
    fn idle_voice_is_silent_and_skipped() {
        let n = 128;
        let mut ctx = ctx(n);
        let (mut voice, _, _) = simple_voice(&mut ctx, n);
        voice.begin_block();
        voice.process_block(n);
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn portamento_snaps_with_zero_time() {
        let n = 64;
        let mut ctx = ctx(n);
        let (mut voice, _, _) = simple_voice(&mut ctx, n);
        voice.set_portamento(0.0, true);

        voice.activate(60);
        voice.begin_block();
        voice.process_block(n);
        voice.activate(72);
        voice.begin_block();
        voice.process_block(1);
        assert_eq!(voice.current_note(), 72.0);
    }

    #[test]
    fn portamento_converges_monotonically() {
        let n = 128;
        let mut ctx = ctx(n);
        let (mut voice, _, _) = simple_voice(&mut ctx, n);
        let glide_seconds = 0.01;
        voice.set_portamento(glide_seconds, true);

        voice.activate(60);
        voice.begin_block();
        voice.process_block(n);
        assert_eq!(voice.current_note(), 60.0);

        voice.activate(72);
        let mut last = voice.current_note();
        let blocks_for_10x = (10.0 * glide_seconds * RATE) as usize / n + 1;
        for _ in 0..blocks_for_10x {
            voice.begin_block();
            voice.process_block(n);
            let now = voice.current_note();
            assert!(now >= last - 1e-5, "glide must be monotonic: {} -> {}", last, now);
            assert!(now <= 72.0 + 1e-5);
            last = now;
        }
        assert!(
            (voice.current_note() - 72.0).abs() < 0.01,
            "after 10x glide time current_note is {}",
            voice.current_note()
        );
    }

    #[test]
    fn modulation_source_not_found_leaves_list_unchanged() {
        let n = 64;
        let mut ctx = ctx(n);
        let (mut voice, osc, _) = simple_voice(&mut ctx, n);

        let err = voice
            .add_modulation(ObjectId(999), "output", osc, "pitch", 1.0, false, &[])
            .unwrap_err();
        assert_eq!(err, BuildError::ModulationSourceNotFound(ObjectId(999)));
        assert!(voice.modulations().is_empty());
    }

    #[test]
    fn modulation_port_names_are_validated() {
        let n = 64;
        let mut ctx = ctx(n);
        let (mut voice, osc, _) = simple_voice(&mut ctx, n);
        let env = voice.add_basic_envelope(&mut ctx, None);

        let err = voice
            .add_modulation(env, "wrong", osc, "pitch", 1.0, false, &[])
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::ModulationSourceParamNotFound("wrong".to_owned())
        );

        let err = voice
            .add_modulation(env, "output", osc, "wobble", 1.0, false, &[])
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::ModulationDestinationParamNotFound("wobble".to_owned())
        );

        let err = voice
            .add_modulation(env, "output", ObjectId(998), "pitch", 1.0, false, &[])
            .unwrap_err();
        assert_eq!(err, BuildError::ModulationDestinationNotFound(ObjectId(998)));

        assert!(voice.modulations().is_empty());
        voice
            .add_modulation(env, "output", osc, "amplitude", 0.5, false, &[])
            .unwrap();
        assert_eq!(voice.modulations().len(), 1);
    }

    #[test]
    fn envelope_modulates_amplitude() {
        let n = 512;
        let mut ctx = ctx(n);
        let mut voice = Voice::new(ctx.internal_rate());
        let osc = voice.add_sine_oscillator(&mut ctx, 1, 0.0).unwrap();
        let buf = voice.add_audio_buffer(&mut ctx, 1);
        voice.assign_oscillator_buffer(osc, buf).unwrap();
        voice.add_output(buf, ObjectId(0)).unwrap();
        // Amplitude comes only from the envelope route
        let env = voice.add_basic_envelope(&mut ctx, Some([0.0001, 0.01, 1.0, 0.01]));
        voice
            .add_modulation(env, "output", osc, "amplitude", 1.0, false, &[])
            .unwrap();
        voice.prepare(n, ctx.internal_rate());

        voice.activate(69);
        voice.begin_block();
        voice.process_block(n);
        let peak = voice.buffer(buf).unwrap().peak();
        assert!(peak > 0.5, "envelope should open the amplitude, peak {}", peak);
    }

    #[test]
    fn release_to_silence_reaches_idle_exactly_once() {
        let n = 256;
        let mut ctx = ctx(n);
        let mut voice = Voice::new(ctx.internal_rate());
        let osc = voice.add_sine_oscillator(&mut ctx, 1, 0.0).unwrap();
        let buf = voice.add_audio_buffer(&mut ctx, 1);
        voice.assign_oscillator_buffer(osc, buf).unwrap();
        voice.add_output(buf, ObjectId(0)).unwrap();
        // Zero sustain: the envelope decays to nothing while held
        let env = voice.add_basic_envelope(&mut ctx, Some([0.001, 0.005, 0.0, 0.002]));
        voice
            .add_modulation(env, "output", osc, "amplitude", 1.0, false, &[])
            .unwrap();
        voice.prepare(n, ctx.internal_rate());

        voice.activate(60);
        voice.begin_block();
        voice.process_block(n);
        assert_eq!(voice.state(), VoiceState::Active);

        voice.deactivate();
        assert_eq!(voice.state(), VoiceState::Releasing);

        let mut transitions = 0;
        for _ in 0..50 {
            let before = voice.state();
            voice.begin_block();
            voice.process_block(n);
            if before == VoiceState::Releasing && voice.state() == VoiceState::Idle {
                transitions += 1;
            }
            if voice.state() == VoiceState::Idle {
                break;
            }
        }
        assert_eq!(transitions, 1, "exactly one Releasing -> Idle transition");
        assert!(!voice.is_playing());
    }

    #[test]
    fn stolen_voice_reports_new_note() {
        let n = 64;
        let mut ctx = ctx(n);
        let (mut voice, _, _) = simple_voice(&mut ctx, n);
        voice.activate(60);
        voice.bump_age();
        voice.activate(67);
        assert_eq!(voice.current_midi_note(), 67);
        assert_eq!(voice.voice_age(), 0);
        assert!(voice.is_playing());
    }

    #[test]
    fn object_kinds_resolve() {
        let n = 32;
        let mut ctx = ctx(n);
        let mut voice = Voice::new(ctx.internal_rate());
        let osc = voice.add_sine_oscillator(&mut ctx, 1, 0.5).unwrap();
        let buf = voice.add_audio_buffer(&mut ctx, 1);
        let env = voice.add_basic_envelope(&mut ctx, None);
        let chain = voice.add_effect_chain(&mut ctx, 1, buf, buf).unwrap();
        let chain_object = voice.chain_mut(chain).unwrap().object_id();
        let fx = voice
            .chain_mut(chain)
            .unwrap()
            .add_distortion_json(&mut ctx, "{}")
            .unwrap();

        assert_eq!(voice.object_kind(osc), ObjectKind::Oscillator);
        assert_eq!(voice.object_kind(buf), ObjectKind::AudioBuffer);
        assert_eq!(voice.object_kind(env), ObjectKind::ModulationProducer);
        assert_eq!(voice.object_kind(fx), ObjectKind::Effect);
        assert_eq!(voice.object_kind(chain_object), ObjectKind::EffectChain);
        assert_eq!(voice.object_kind(ObjectId(12345)), ObjectKind::Undefined);
    }
}
