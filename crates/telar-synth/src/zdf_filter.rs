//! Zero-delay-feedback state-variable filter core.
//!
//! Four TPT (topology-preserving transform) integrator stages per channel
//! with a global feedback tap from the last stage. Cutoff modulation is
//! applied in knob space so that equal modulation amounts move the cutoff
//! by equal musical intervals anywhere on the dial.

use core::f32::consts::PI;

use telar_core::SignalBuffer;

/// Lowest frequency the cutoff knob reaches.
pub const MIN_FREQUENCY: f32 = 20.0;
/// Highest frequency the cutoff knob reaches.
pub const MAX_FREQUENCY: f32 = 20_000.0;

/// Base feedback coefficient around the four-stage cascade.
const FEEDBACK_COEFF: f32 = 0.4;

/// Map a knob position in [0, 1] to a cutoff frequency in Hz
/// (exponential dial).
#[inline]
pub fn knob_value_to_frequency(v: f32) -> f32 {
    MIN_FREQUENCY * libm::powf(MAX_FREQUENCY / MIN_FREQUENCY, v)
}

/// Inverse of [`knob_value_to_frequency`].
#[inline]
pub fn frequency_to_knob_value(f: f32) -> f32 {
    libm::logf(f / MIN_FREQUENCY) / libm::logf(MAX_FREQUENCY / MIN_FREQUENCY)
}

/// Four-stage TPT lowpass cascade.
#[derive(Clone, Debug)]
pub struct ZdfFilter {
    n_channels: usize,
    sample_rate: f32,
    cutoff_hz: f32,
    resonance: f32,
    // Integrator states, four per channel
    stages: Vec<[f32; 4]>,
}

impl ZdfFilter {
    /// Create a filter with default cutoff 1 kHz and resonance 0.5.
    pub fn new(n_channels: usize, sample_rate: f32) -> Self {
        Self {
            n_channels,
            sample_rate,
            cutoff_hz: 1_000.0,
            resonance: 0.5,
            stages: vec![[0.0; 4]; n_channels],
        }
    }

    /// Set the nominal cutoff in Hz.
    pub fn set_cutoff(&mut self, hz: f32) {
        self.cutoff_hz = hz.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
    }

    /// Nominal cutoff in Hz.
    pub fn cutoff(&self) -> f32 {
        self.cutoff_hz
    }

    /// Set the nominal resonance in [0, 1].
    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = resonance.clamp(0.0, 1.0);
    }

    /// Nominal resonance.
    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    /// Update the sample rate the integrator gain is derived from.
    pub fn set_sample_rate(&mut self, rate: f32) {
        self.sample_rate = rate.max(1.0);
    }

    /// Clear integrator state.
    pub fn reset(&mut self) {
        self.stages.fill([0.0; 4]);
    }

    /// Run the cascade over a block.
    ///
    /// `cutoff_mods` / `resonance_mods` are the per-sample port values
    /// (knob-space offset and resonance offset); either may be absent.
    #[allow(clippy::too_many_arguments)]
    pub fn process_block(
        &mut self,
        audio_in: &SignalBuffer,
        cutoff_mods: Option<(&[f32], usize)>,
        resonance_mods: Option<(&[f32], usize)>,
        output: &mut SignalBuffer,
        n_frames: usize,
        frame_offset: usize,
    ) {
        let base_knob = frequency_to_knob_value(self.cutoff_hz);

        for c in 0..self.n_channels {
            let Some(input) = audio_in.channel(c) else {
                continue;
            };
            let mut state = self.stages[c];
            let Some(out) = output.channel_mut(c) else {
                continue;
            };

            for i in 0..n_frames {
                let frame = i + frame_offset;
                if frame >= input.len() || frame >= out.len() {
                    break;
                }

                let cutoff_mod = cutoff_mods
                    .map_or(0.0, |(m, d)| m[(frame / d).min(m.len() - 1)]);
                let resonance_mod = resonance_mods
                    .map_or(0.0, |(m, d)| m[(frame / d).min(m.len() - 1)]);

                let fc = knob_value_to_frequency(base_knob + cutoff_mod);
                let g = libm::tanf(PI * (fc / self.sample_rate).clamp(0.0, 0.499));
                let resonance = (self.resonance + resonance_mod).clamp(0.0, 1.0);
                let fb = FEEDBACK_COEFF * resonance;

                let x = input[frame] - fb * state[3];

                let v0 = (x * g + state[0]) / (1.0 + g);
                state[0] = 2.0 * v0 - state[0];
                let v1 = (v0 * g + state[1]) / (1.0 + g);
                state[1] = 2.0 * v1 - state[1];
                let v2 = (v1 * g + state[2]) / (1.0 + g);
                state[2] = 2.0 * v2 - state[2];
                let v3 = (v2 * g + state[3]) / (1.0 + g);
                state[3] = 2.0 * v3 - state[3];

                out[frame] = v3;
            }
            self.stages[c] = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telar_core::SignalKind;

    fn tone(freq: f32, rate: f32, n: usize) -> SignalBuffer {
        let mut buf = SignalBuffer::new(SignalKind::Audio, n, 1);
        let ch = buf.channel_mut(0).unwrap();
        for (i, s) in ch.iter_mut().enumerate() {
            *s = (core::f32::consts::TAU * freq * i as f32 / rate).sin();
        }
        buf
    }

    fn peak_tail(buf: &SignalBuffer) -> f32 {
        let ch = buf.channel(0).unwrap();
        ch[ch.len() / 2..]
            .iter()
            .fold(0.0_f32, |a, &s| a.max(s.abs()))
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn knob_mapping_round_trips(v in 0.0f32..=1.0f32) {
                let back = frequency_to_knob_value(knob_value_to_frequency(v));
                prop_assert!(
                    (back - v).abs() < 1e-4,
                    "knob {} round-tripped to {}",
                    v,
                    back
                );
            }
        }
    }

    #[test]
    fn knob_endpoints() {
        assert!((knob_value_to_frequency(0.0) - MIN_FREQUENCY).abs() < 1e-2);
        assert!((knob_value_to_frequency(1.0) - MAX_FREQUENCY).abs() < 1.0);
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let rate = 96_000.0;
        let n = 4096;
        let mut filter = ZdfFilter::new(1, rate);
        filter.set_cutoff(500.0);

        let input = tone(100.0, rate, n);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        filter.process_block(&input, None, None, &mut out, n, 0);
        let low_peak = peak_tail(&out);

        filter.reset();
        let input = tone(10_000.0, rate, n);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        filter.process_block(&input, None, None, &mut out, n, 0);
        let high_peak = peak_tail(&out);

        assert!(
            low_peak > 0.5 && high_peak < 0.05,
            "low {} high {}",
            low_peak,
            high_peak
        );
    }

    #[test]
    fn stays_finite_at_extremes() {
        let rate = 96_000.0;
        let n = 1024;
        let mut filter = ZdfFilter::new(1, rate);
        filter.set_cutoff(MAX_FREQUENCY);
        filter.set_resonance(1.0);

        let input = tone(15_000.0, rate, n);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        filter.process_block(&input, None, None, &mut out, n, 0);
        assert!(out.channel(0).unwrap().iter().all(|s| s.is_finite()));
    }

    #[test]
    fn cutoff_modulation_is_knob_space() {
        // +0.2 knob from 500 Hz should land on the same frequency as the
        // knob mapping predicts.
        let base = 500.0_f32;
        let knob = frequency_to_knob_value(base);
        let moved = knob_value_to_frequency(knob + 0.2);
        assert!(moved > base * 2.0, "exponential dial moves multiplicatively");
    }
}
