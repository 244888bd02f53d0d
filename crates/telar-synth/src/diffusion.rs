//! Frequency diffusion: allpass phase dispersion.
//!
//! A long cascade of first-order allpass stages whose corner frequencies
//! are spaced logarithmically across the audible band. Each stage delays
//! different frequencies by different amounts, smearing transients without
//! changing the magnitude spectrum.

use core::f32::consts::PI;

use serde::Deserialize;

use telar_core::{BuildError, SignalBuffer};

use crate::effect::Effect;

const PORT_NAMES: &[&str] = &[];

const DEFAULT_STAGES: usize = 96;

#[derive(Debug, Deserialize)]
struct DiffusionParams {
    #[serde(default = "default_stages")]
    stages: usize,
    #[serde(default = "default_freq_min")]
    freq_min: f32,
    #[serde(default = "default_freq_max")]
    freq_max: f32,
}

fn default_stages() -> usize {
    DEFAULT_STAGES
}

fn default_freq_min() -> f32 {
    20.0
}

fn default_freq_max() -> f32 {
    20_000.0
}

/// Allpass-cascade dispersion effect.
pub struct DiffusionEffect {
    n_channels: usize,
    n_stages: usize,
    sample_rate: f32,
    freq_min: f32,
    freq_max: f32,
    // Stage coefficients, shared by all channels
    coefs: Vec<f32>,
    // Stage states, channel-major: state[c * n_stages + s]
    states: Vec<f32>,
}

impl DiffusionEffect {
    /// Create a diffuser with the default 96 stages over 20 Hz–20 kHz.
    pub fn new(n_channels: usize, sample_rate: f32) -> Self {
        Self::with_stages(n_channels, sample_rate, DEFAULT_STAGES, 20.0, 20_000.0)
    }

    /// Create a diffuser with an explicit stage count and dispersion range.
    pub fn with_stages(
        n_channels: usize,
        sample_rate: f32,
        n_stages: usize,
        freq_min: f32,
        freq_max: f32,
    ) -> Self {
        let mut fx = Self {
            n_channels,
            n_stages,
            sample_rate: sample_rate.max(1.0),
            freq_min,
            freq_max,
            coefs: vec![0.0; n_stages],
            states: vec![0.0; n_channels * n_stages],
        };
        fx.recompute_coefficients();
        fx
    }

    /// Create a diffuser from a JSON parameter payload.
    pub fn from_json(json: &str, n_channels: usize, sample_rate: f32) -> Result<Self, BuildError> {
        let params: DiffusionParams = serde_json::from_str(json)
            .map_err(|e| BuildError::InvalidParams(e.to_string()))?;
        if params.stages == 0 {
            return Err(BuildError::InvalidParams(
                "diffusion needs at least one stage".to_owned(),
            ));
        }
        Ok(Self::with_stages(
            n_channels,
            sample_rate,
            params.stages,
            params.freq_min,
            params.freq_max,
        ))
    }

    /// Number of allpass stages per channel.
    pub fn num_stages(&self) -> usize {
        self.n_stages
    }

    // Logarithmically spaced corner frequencies, each mapped to the
    // first-order allpass coefficient a = (tan(pi fc/fs) - 1)/(tan(pi fc/fs) + 1).
    fn recompute_coefficients(&mut self) {
        if self.n_stages == 0 {
            return;
        }
        let log_min = libm::log2f(self.freq_min.max(1.0));
        let log_max = libm::log2f(self.freq_max.max(self.freq_min + 1.0));
        let step = (log_max - log_min) / self.n_stages as f32;
        for (i, coef) in self.coefs.iter_mut().enumerate() {
            let fc = libm::exp2f(log_min + step * i as f32);
            let t = libm::tanf(PI * (fc / self.sample_rate).min(0.499));
            *coef = ((t - 1.0) / (t + 1.0)).clamp(-0.9999, 0.9999);
        }
    }
}

impl Effect for DiffusionEffect {
    fn process_block(
        &mut self,
        audio_in: &SignalBuffer,
        _mods: &SignalBuffer,
        output: &mut SignalBuffer,
        n_frames: usize,
        frame_offset: usize,
    ) {
        for c in 0..self.n_channels {
            let Some(input) = audio_in.channel(c) else {
                continue;
            };
            let Some(out) = output.channel_mut(c) else {
                continue;
            };
            let states = &mut self.states[c * self.n_stages..(c + 1) * self.n_stages];
            for i in 0..n_frames {
                let frame = i + frame_offset;
                if frame >= input.len() || frame >= out.len() {
                    break;
                }
                let mut x = input[frame];
                for (a, z) in self.coefs.iter().zip(states.iter_mut()) {
                    let t = x - *a * *z;
                    let y = *a * t + *z;
                    *z = t;
                    x = y;
                }
                out[frame] = x;
            }
        }
    }

    fn on_sample_rate_change(&mut self, rate: f32) {
        self.sample_rate = rate.max(1.0);
        self.recompute_coefficients();
    }

    fn port_names(&self) -> &'static [&'static str] {
        PORT_NAMES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telar_core::SignalKind;

    #[test]
    fn impulse_energy_is_preserved() {
        let n = 8192;
        let mut fx = DiffusionEffect::new(1, 96_000.0);
        let mut input = SignalBuffer::new(SignalKind::Audio, n, 1);
        input.channel_mut(0).unwrap()[0] = 1.0;
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        fx.process_block(&input, &SignalBuffer::new(SignalKind::Control, 0, 0), &mut out, n, 0);

        // Allpass: total energy unchanged, but no longer a single spike
        let ch = out.channel(0).unwrap();
        let energy: f32 = ch.iter().map(|s| s * s).sum();
        assert!(
            (energy - 1.0).abs() < 0.05,
            "allpass must preserve energy, got {}",
            energy
        );
        let peak = ch.iter().fold(0.0_f32, |a, &s| a.max(s.abs()));
        assert!(peak < 0.9, "impulse should be dispersed, peak {}", peak);
    }

    #[test]
    fn json_stage_count() {
        let fx = DiffusionEffect::from_json(r#"{"stages": 12}"#, 2, 96_000.0).unwrap();
        assert_eq!(fx.num_stages(), 12);
        assert!(DiffusionEffect::from_json(r#"{"stages": 0}"#, 2, 96_000.0).is_err());
    }

    #[test]
    fn output_stays_finite() {
        let n = 1024;
        let mut fx = DiffusionEffect::new(2, 96_000.0);
        let mut input = SignalBuffer::new(SignalKind::Audio, n, 2);
        for c in 0..2 {
            let ch = input.channel_mut(c).unwrap();
            for (i, s) in ch.iter_mut().enumerate() {
                *s = ((i * 37 + c) % 17) as f32 / 17.0 - 0.5;
            }
        }
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 2);
        fx.process_block(&input, &SignalBuffer::new(SignalKind::Control, 0, 0), &mut out, n, 0);
        for c in 0..2 {
            assert!(out.channel(c).unwrap().iter().all(|s| s.is_finite()));
        }
    }
}
