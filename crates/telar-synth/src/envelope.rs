//! Linear-segment ADSR envelope producer.

use telar_core::SignalBuffer;

use crate::producer::ModulationProducer;

const OUTPUT_NAMES: &[&str] = &["output"];

/// ADSR envelope stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Output is zero.
    #[default]
    Idle,
    /// Ramping up toward 1.
    Attack,
    /// Falling toward the sustain level.
    Decay,
    /// Holding the sustain level.
    Sustain,
    /// Falling from the release level toward zero.
    Release,
}

/// Linear ADSR generator writing output channel 0.
///
/// Times are in seconds; the sustain level in [0, 1]. Release ramps down
/// from whatever level the envelope held when released.
pub struct BasicEnvelope {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    sample_rate: f32,
    stage: EnvelopeStage,
    level: f32,
    release_level: f32,
}

impl BasicEnvelope {
    /// Default envelope: 10 ms attack, 100 ms decay, 0.4 sustain,
    /// 200 ms release.
    pub fn new(sample_rate: f32) -> Self {
        Self::with_adsr(sample_rate, 0.01, 0.1, 0.4, 0.2)
    }

    /// Envelope with explicit attack/decay/sustain/release.
    pub fn with_adsr(sample_rate: f32, attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
            sample_rate: sample_rate.max(1.0),
            stage: EnvelopeStage::Idle,
            level: 0.0,
            release_level: 0.0,
        }
    }

    /// Current stage.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current output level.
    pub fn level(&self) -> f32 {
        self.level
    }

    #[inline]
    fn advance(&mut self, rate: f32) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                self.level += 1.0 / (self.attack * rate).max(1.0);
                self.release_level = self.level;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= (1.0 - self.sustain) / (self.decay * rate).max(1.0);
                self.release_level = self.level;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.sustain;
                self.release_level = self.level;
            }
            EnvelopeStage::Release => {
                self.level -= self.release_level / (self.release * rate).max(1.0);
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }
}

impl ModulationProducer for BasicEnvelope {
    fn process_block(&mut self, output: &mut SignalBuffer, n_frames: usize, frame_offset: usize) {
        let division = output.division(0);
        // The stored channel runs `division` times slower than audio rate.
        let rate = self.sample_rate / division as f32;
        let Some(out) = output.channel_mut(0) else {
            return;
        };
        let start = frame_offset / division;
        let slots = n_frames / division;
        for slot in out.iter_mut().skip(start).take(slots) {
            *slot = self.advance(rate);
        }
    }

    fn retrigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.level = 0.0;
    }

    fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.release_level = self.level;
            self.stage = EnvelopeStage::Release;
        }
    }

    fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    fn on_sample_rate_change(&mut self, rate: f32) {
        self.sample_rate = rate.max(1.0);
    }

    fn output_names(&self) -> &'static [&'static str] {
        OUTPUT_NAMES
    }
}
