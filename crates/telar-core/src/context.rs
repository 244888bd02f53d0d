//! Per-engine shared state.
//!
//! One [`Context`] exists per synthesizer instance. It hands out object
//! ids and chain indices during the construction phase, records the rates
//! and block size chosen at `prepare()`, and owns the collaborators every
//! graph object needs (waveform resources, the FFT brickwall helper).
//!
//! There is no process-wide instance: the context is an ordinary owned
//! value, borrowed down the call tree, so several engines can coexist and
//! construction is re-entrant.

use std::sync::Arc;

use crate::fft::WaveformFft;
use crate::object::{ChainIndex, ObjectId};
use crate::resource::{ResourceManager, WAVEFORM_LENGTH};

/// Rendering quality, mapped to the half-band decimator design targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AudioQuality {
    /// 60 dB stopband, wide transition band — cheapest.
    Low,
    /// 80 dB stopband, moderate transition band.
    Medium,
    /// 96 dB stopband, narrow transition band.
    #[default]
    High,
}

impl AudioQuality {
    /// Half-band design targets: (stopband attenuation dB, transition bw).
    pub fn halfband_spec(self) -> (f64, f64) {
        match self {
            AudioQuality::Low => (60.0, 0.10),
            AudioQuality::Medium => (80.0, 0.05),
            AudioQuality::High => (96.0, 0.01),
        }
    }
}

/// Shared per-engine state and id allocation.
pub struct Context {
    /// Host sample rate in Hz.
    pub sample_rate: f32,
    /// Oversampling factor; all voice/effect DSP runs at
    /// `sample_rate * oversampling`.
    pub oversampling: usize,
    /// Block length at the internal (oversampled) rate.
    pub max_frames: usize,
    /// Number of voices in the pool.
    pub n_voices: usize,
    /// Output quality target.
    pub quality: AudioQuality,
    /// Waveform assets.
    pub resources: ResourceManager,
    /// Shared FFT helper for waveform re-band-limiting.
    pub waveform_fft: Arc<WaveformFft>,

    next_object_id: u32,
    next_voice_chain: i32,
    next_master_chain: i32,
}

impl Context {
    /// Create a context with engine defaults (44.1 kHz, 2× oversampling,
    /// high quality). `prepare()` overwrites the rates and block size.
    pub fn new() -> Self {
        Self {
            sample_rate: 44_100.0,
            oversampling: 2,
            max_frames: 0,
            n_voices: 0,
            quality: AudioQuality::default(),
            resources: ResourceManager::new(),
            waveform_fft: Arc::new(WaveformFft::new(WAVEFORM_LENGTH)),
            next_object_id: 1,
            next_voice_chain: 0,
            next_master_chain: -1,
        }
    }

    /// Rate the voices and effect chains actually run at.
    pub fn internal_rate(&self) -> f32 {
        self.sample_rate * self.oversampling as f32
    }

    /// Allocate the next object id. Monotonic for the context lifetime.
    pub fn next_object_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        id
    }

    /// Allocate the next voice-level chain index (0, 1, 2, ...).
    pub fn next_voice_chain_index(&mut self) -> ChainIndex {
        let idx = ChainIndex(self.next_voice_chain);
        self.next_voice_chain += 1;
        idx
    }

    /// Allocate the next master chain index (−1, −2, ...).
    pub fn next_master_chain_index(&mut self) -> ChainIndex {
        let idx = ChainIndex(self.next_master_chain);
        self.next_master_chain -= 1;
        idx
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_monotonic() {
        let mut ctx = Context::new();
        let a = ctx.next_object_id();
        let b = ctx.next_object_id();
        let c = ctx.next_object_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn chain_index_spaces_are_disjoint() {
        let mut ctx = Context::new();
        assert_eq!(ctx.next_voice_chain_index(), ChainIndex(0));
        assert_eq!(ctx.next_voice_chain_index(), ChainIndex(1));
        assert_eq!(ctx.next_master_chain_index(), ChainIndex(-1));
        assert_eq!(ctx.next_master_chain_index(), ChainIndex(-2));
    }

    #[test]
    fn internal_rate_applies_oversampling() {
        let mut ctx = Context::new();
        ctx.sample_rate = 48_000.0;
        ctx.oversampling = 2;
        assert_eq!(ctx.internal_rate(), 96_000.0);
    }
}
