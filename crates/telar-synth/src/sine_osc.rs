//! Sine oscillator.

use core::f32::consts::TAU;

use telar_core::{SignalBuffer, midi_note_to_hz};

use crate::oscillator::{Oscillator, PORT_AMPLITUDE, PORT_PITCH};

/// Phase-accumulator sine oscillator.
///
/// Pitch and amplitude come entirely from the modulation ports; the voice
/// seeds them from the note state each block before routing runs.
pub struct SineOscillator {
    n_channels: usize,
    sample_rate: f32,
    frequency_offset: f32,
    phase: Vec<f32>,
}

impl SineOscillator {
    /// Create an oscillator with one phase accumulator per channel.
    pub fn new(n_channels: usize, sample_rate: f32) -> Self {
        Self {
            n_channels,
            sample_rate,
            frequency_offset: 0.0,
            phase: vec![0.0; n_channels],
        }
    }
}

impl Oscillator for SineOscillator {
    fn process_block(
        &mut self,
        mods: &SignalBuffer,
        output: &mut SignalBuffer,
        n_frames: usize,
        frame_offset: usize,
    ) {
        let Some(pitch) = mods.channel(PORT_PITCH) else {
            return;
        };
        let Some(amp) = mods.channel(PORT_AMPLITUDE) else {
            return;
        };
        if pitch.is_empty() || amp.is_empty() {
            return;
        }
        let pitch_div = mods.division(PORT_PITCH);
        let amp_div = mods.division(PORT_AMPLITUDE);
        let inv_rate = 1.0 / self.sample_rate;

        for c in 0..self.n_channels {
            let Some(out) = output.channel_mut(c) else {
                continue;
            };
            let mut phase = self.phase[c];
            for i in 0..n_frames {
                let frame = i + frame_offset;
                if frame >= out.len() {
                    break;
                }
                let note = pitch[(frame / pitch_div).min(pitch.len() - 1)];
                let gain = amp[(frame / amp_div).min(amp.len() - 1)];
                let freq = midi_note_to_hz(note + self.frequency_offset);
                phase += freq * inv_rate;
                phase -= libm::floorf(phase);
                out[frame] += gain * libm::sinf(TAU * phase);
            }
            self.phase[c] = phase;
        }
    }

    fn on_sample_rate_change(&mut self, rate: f32) {
        self.sample_rate = rate;
    }

    fn set_frequency_offset(&mut self, semitones: f32) {
        self.frequency_offset = semitones;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telar_core::SignalKind;

    fn mods_for(note: f32, gain: f32, n: usize) -> SignalBuffer {
        let mut mods = SignalBuffer::new(SignalKind::Control, n, 2);
        mods.set_constant(PORT_PITCH, note);
        mods.set_constant(PORT_AMPLITUDE, gain);
        mods
    }

    #[test]
    fn produces_bounded_tone() {
        let n = 512;
        let mut osc = SineOscillator::new(1, 48_000.0);
        let mods = mods_for(69.0, 0.8, n);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        osc.process_block(&mods, &mut out, n, 0);

        let ch = out.channel(0).unwrap();
        let peak = ch.iter().fold(0.0_f32, |a, &s| a.max(s.abs()));
        assert!(peak > 0.5 && peak <= 0.8 + 1e-4, "peak {}", peak);
    }

    #[test]
    fn zero_amplitude_is_silent() {
        let n = 128;
        let mut osc = SineOscillator::new(2, 48_000.0);
        let mods = mods_for(60.0, 0.0, n);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 2);
        osc.process_block(&mods, &mut out, n, 0);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn accumulates_into_output() {
        let n = 64;
        let mut osc = SineOscillator::new(1, 48_000.0);
        let mods = mods_for(69.0, 1.0, n);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        out.set_constant(0, 10.0);
        osc.process_block(&mods, &mut out, n, 0);
        // Existing content is preserved underneath the added tone
        assert!(out.channel(0).unwrap().iter().all(|&s| s > 8.0));
    }

    #[test]
    fn frequency_offset_shifts_pitch() {
        let n = 4800;
        let count_crossings = |buf: &SignalBuffer| {
            buf.channel(0)
                .unwrap()
                .windows(2)
                .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
                .count()
        };

        let mods = mods_for(69.0, 1.0, n);
        let mut plain = SignalBuffer::new(SignalKind::Audio, n, 1);
        let mut osc = SineOscillator::new(1, 48_000.0);
        osc.process_block(&mods, &mut plain, n, 0);

        let mut shifted = SignalBuffer::new(SignalKind::Audio, n, 1);
        let mut osc = SineOscillator::new(1, 48_000.0);
        osc.set_frequency_offset(12.0);
        osc.process_block(&mods, &mut shifted, n, 0);

        let base = count_crossings(&plain);
        let up = count_crossings(&shifted);
        assert!(
            up > base * 3 / 2,
            "one octave up should roughly double crossings: {} vs {}",
            base,
            up
        );
    }
}
