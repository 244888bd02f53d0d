//! Tanh waveshaping distortion.

use serde::Deserialize;

use telar_core::{BuildError, SignalBuffer};

use crate::effect::Effect;

/// Channel index of the drive port.
pub const PORT_DRIVE: usize = 0;
/// Channel index of the mix port.
pub const PORT_MIX: usize = 1;
/// Channel index of the output gain port.
pub const PORT_OUTPUT_GAIN: usize = 2;

const PORT_NAMES: &[&str] = &["drive", "mix", "output_gain"];

#[derive(Debug, Deserialize)]
struct DistortionParams {
    #[serde(default = "default_type")]
    r#type: String,
    #[serde(default = "default_drive")]
    drive: f32,
    #[serde(default = "default_mix")]
    mix: f32,
    #[serde(default = "default_mix")]
    output_gain: f32,
}

fn default_type() -> String {
    "tanh".to_owned()
}

fn default_drive() -> f32 {
    1.0
}

fn default_mix() -> f32 {
    1.0
}

/// `tanh(drive · x)` crossfaded with the dry signal by `mix`, then scaled
/// by `output_gain`. Every parameter is nominal value plus its port value,
/// per sample.
pub struct DistortionEffect {
    n_channels: usize,
    drive: f32,
    mix: f32,
    output_gain: f32,
}

impl DistortionEffect {
    /// Create a distortion with unit drive, full wet, unit output gain.
    pub fn new(n_channels: usize) -> Self {
        Self {
            n_channels,
            drive: 1.0,
            mix: 1.0,
            output_gain: 1.0,
        }
    }

    /// Create a distortion from a JSON parameter payload.
    ///
    /// `type` accepts `tanh` (alias `soft`); anything else is rejected.
    pub fn from_json(json: &str, n_channels: usize) -> Result<Self, BuildError> {
        let params: DistortionParams = serde_json::from_str(json)
            .map_err(|e| BuildError::InvalidParams(e.to_string()))?;
        match params.r#type.to_ascii_lowercase().as_str() {
            "tanh" | "soft" => {}
            other => {
                return Err(BuildError::InvalidParams(format!(
                    "unknown distortion type `{other}`"
                )));
            }
        }
        let mut fx = Self::new(n_channels);
        fx.set_drive(params.drive);
        fx.set_mix(params.mix);
        fx.set_output_gain(params.output_gain);
        Ok(fx)
    }

    /// Set the nominal drive amount.
    pub fn set_drive(&mut self, drive: f32) {
        self.drive = drive;
    }

    /// Set the nominal dry/wet mix in [0, 1].
    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    /// Set the nominal output gain.
    pub fn set_output_gain(&mut self, gain: f32) {
        self.output_gain = gain;
    }

    /// Nominal drive amount.
    pub fn drive(&self) -> f32 {
        self.drive
    }

    /// Nominal mix.
    pub fn mix(&self) -> f32 {
        self.mix
    }

    /// Nominal output gain.
    pub fn output_gain(&self) -> f32 {
        self.output_gain
    }
}

impl Effect for DistortionEffect {
    fn process_block(
        &mut self,
        audio_in: &SignalBuffer,
        mods: &SignalBuffer,
        output: &mut SignalBuffer,
        n_frames: usize,
        frame_offset: usize,
    ) {
        let port = |idx: usize| {
            mods.channel(idx)
                .filter(|m| !m.is_empty())
                .map(|m| (m, mods.division(idx)))
        };
        let drive_mod = port(PORT_DRIVE);
        let mix_mod = port(PORT_MIX);
        let gain_mod = port(PORT_OUTPUT_GAIN);
        let read = |p: Option<(&[f32], usize)>, frame: usize| {
            p.map_or(0.0, |(m, d)| m[(frame / d).min(m.len() - 1)])
        };

        for c in 0..self.n_channels {
            let Some(input) = audio_in.channel(c) else {
                continue;
            };
            let Some(out) = output.channel_mut(c) else {
                continue;
            };
            for i in 0..n_frames {
                let frame = i + frame_offset;
                if frame >= input.len() || frame >= out.len() {
                    break;
                }
                let drive = self.drive + read(drive_mod, frame);
                let mix = (self.mix + read(mix_mod, frame)).clamp(0.0, 1.0);
                let gain = self.output_gain + read(gain_mod, frame);

                let dry = input[frame];
                let wet = libm::tanhf(drive * dry);
                out[frame] = ((1.0 - mix) * dry + mix * wet) * gain;
            }
        }
    }

    fn on_sample_rate_change(&mut self, _rate: f32) {}

    fn port_names(&self) -> &'static [&'static str] {
        PORT_NAMES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telar_core::SignalKind;

    fn no_mods() -> SignalBuffer {
        SignalBuffer::new(SignalKind::Control, 0, 0)
    }

    fn ramp(n: usize) -> SignalBuffer {
        let mut buf = SignalBuffer::new(SignalKind::Audio, n, 1);
        let ch = buf.channel_mut(0).unwrap();
        for (i, s) in ch.iter_mut().enumerate() {
            *s = i as f32 / n as f32 * 2.0 - 1.0;
        }
        buf
    }

    #[test]
    fn dry_mix_is_identity() {
        let n = 64;
        let input = ramp(n);
        let mut fx = DistortionEffect::new(1);
        fx.set_mix(0.0);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        fx.process_block(&input, &no_mods(), &mut out, n, 0);
        for (a, b) in input
            .channel(0)
            .unwrap()
            .iter()
            .zip(out.channel(0).unwrap())
        {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn full_wet_is_bounded_by_tanh() {
        let n = 64;
        let input = ramp(n);
        let mut fx = DistortionEffect::new(1);
        fx.set_drive(10.0);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        fx.process_block(&input, &no_mods(), &mut out, n, 0);
        assert!(out.channel(0).unwrap().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn output_gain_scales() {
        let n = 16;
        let mut input = SignalBuffer::new(SignalKind::Audio, n, 1);
        input.set_constant(0, 0.1);
        let mut fx = DistortionEffect::new(1);
        fx.set_mix(0.0);
        fx.set_output_gain(2.0);
        let mut out = SignalBuffer::new(SignalKind::Audio, n, 1);
        fx.process_block(&input, &no_mods(), &mut out, n, 0);
        assert!(out.channel(0).unwrap().iter().all(|&s| (s - 0.2).abs() < 1e-6));
    }

    #[test]
    fn json_type_validation() {
        assert!(DistortionEffect::from_json(r#"{"type": "tanh"}"#, 1).is_ok());
        assert!(DistortionEffect::from_json(r#"{"type": "cubic"}"#, 1).is_err());
    }

    #[test]
    fn json_defaults() {
        let fx = DistortionEffect::from_json("{}", 2).unwrap();
        assert_eq!(fx.drive(), 1.0);
        assert_eq!(fx.mix(), 1.0);
        assert_eq!(fx.output_gain(), 1.0);
    }
}
