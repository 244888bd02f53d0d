//! Handles for addressable graph objects.
//!
//! Every oscillator, effect, modulation producer, audio buffer, and effect
//! chain carries an [`ObjectId`] unique for the lifetime of one engine
//! instance. Effect chains are additionally addressed by a signed
//! [`ChainIndex`]: negative values are synthesizer-level (master) chains,
//! non-negative values are voice-level chains — two disjoint id spaces
//! sharing one signed type.

use core::fmt;

/// Unique handle identifying any addressable graph object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Signed index addressing an effect chain.
///
/// Voice-level chains count up from 0; master chains count down from −1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChainIndex(pub i32);

impl ChainIndex {
    /// True for synthesizer-level (master) chains.
    pub fn is_master(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ChainIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain[{}]", self.0)
    }
}

/// The variant an [`ObjectId`] resolves to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectKind {
    /// An oscillator owned by a voice.
    Oscillator,
    /// An effect inside an effect chain.
    Effect,
    /// A modulation producer (envelope, LFO, ...).
    ModulationProducer,
    /// A voice- or synthesizer-level audio buffer.
    AudioBuffer,
    /// An effect chain.
    EffectChain,
    /// Id not registered anywhere.
    #[default]
    Undefined,
}

impl ObjectKind {
    /// Script-visible tag for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            ObjectKind::Oscillator => "oscillator",
            ObjectKind::Effect => "effect",
            ObjectKind::ModulationProducer => "modulation_producer",
            ObjectKind::AudioBuffer => "audio_buffer",
            ObjectKind::EffectChain => "effect_chain",
            ObjectKind::Undefined => "undefined",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_index_sign_split() {
        assert!(ChainIndex(-1).is_master());
        assert!(ChainIndex(-7).is_master());
        assert!(!ChainIndex(0).is_master());
        assert!(!ChainIndex(3).is_master());
    }

    #[test]
    fn object_kind_tags() {
        assert_eq!(ObjectKind::Oscillator.tag(), "oscillator");
        assert_eq!(ObjectKind::Undefined.tag(), "undefined");
    }
}
