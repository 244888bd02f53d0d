//! Filter effect wrapping the ZDF core.

use serde::Deserialize;

use telar_core::{BuildError, SignalBuffer};

use crate::effect::Effect;
use crate::zdf_filter::ZdfFilter;

/// Channel index of the cutoff port.
pub const PORT_CUTOFF: usize = 0;
/// Channel index of the resonance port.
pub const PORT_RESONANCE: usize = 1;

const PORT_NAMES: &[&str] = &["cutoff", "resonance"];

/// JSON payload accepted by [`FilterEffect::from_json`].
///
/// Unknown keys are ignored; missing keys take the defaults below.
#[derive(Debug, Deserialize)]
struct FilterParams {
    #[serde(default = "default_kind")]
    r#type: String,
    #[serde(default = "default_frequency")]
    frequency: f32,
    #[serde(default = "default_resonance")]
    resonance: f32,
}

fn default_kind() -> String {
    "lowpass".to_owned()
}

fn default_frequency() -> f32 {
    1_000.0
}

fn default_resonance() -> f32 {
    0.5
}

/// Effect adapter around [`ZdfFilter`].
///
/// The cutoff port carries a knob-space offset; the resonance port an
/// offset onto the nominal resonance. Both are read per sample.
#[derive(Debug)]
pub struct FilterEffect {
    filter: ZdfFilter,
}

impl FilterEffect {
    /// Create a filter effect of the named type.
    ///
    /// Only the ZDF lowpass core exists; `lowpass` and `zdf` are accepted.
    pub fn new(
        kind: &str,
        n_channels: usize,
        sample_rate: f32,
        frequency: f32,
        resonance: f32,
    ) -> Result<Self, BuildError> {
        match kind.to_ascii_lowercase().as_str() {
            "lowpass" | "zdf" => {}
            other => {
                return Err(BuildError::InvalidParams(format!(
                    "unknown filter type `{other}`"
                )));
            }
        }
        let mut filter = ZdfFilter::new(n_channels, sample_rate);
        filter.set_cutoff(frequency);
        filter.set_resonance(resonance);
        Ok(Self { filter })
    }

    /// Create a filter effect from a JSON parameter payload.
    pub fn from_json(json: &str, n_channels: usize, sample_rate: f32) -> Result<Self, BuildError> {
        let params: FilterParams = serde_json::from_str(json)
            .map_err(|e| BuildError::InvalidParams(e.to_string()))?;
        Self::new(
            &params.r#type,
            n_channels,
            sample_rate,
            params.frequency,
            params.resonance,
        )
    }

    /// Access the wrapped filter core.
    pub fn filter(&self) -> &ZdfFilter {
        &self.filter
    }

    /// Mutable access to the wrapped filter core.
    pub fn filter_mut(&mut self) -> &mut ZdfFilter {
        &mut self.filter
    }
}

impl Effect for FilterEffect {
    fn process_block(
        &mut self,
        audio_in: &SignalBuffer,
        mods: &SignalBuffer,
        output: &mut SignalBuffer,
        n_frames: usize,
        frame_offset: usize,
    ) {
        let cutoff = mods
            .channel(PORT_CUTOFF)
            .filter(|m| !m.is_empty())
            .map(|m| (m, mods.division(PORT_CUTOFF)));
        let resonance = mods
            .channel(PORT_RESONANCE)
            .filter(|m| !m.is_empty())
            .map(|m| (m, mods.division(PORT_RESONANCE)));
        self.filter
            .process_block(audio_in, cutoff, resonance, output, n_frames, frame_offset);
    }

    fn on_sample_rate_change(&mut self, rate: f32) {
        self.filter.set_sample_rate(rate);
    }

    fn port_names(&self) -> &'static [&'static str] {
        PORT_NAMES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults_and_unknown_keys() {
        let fx = FilterEffect::from_json(r#"{"unknown_key": 3}"#, 2, 96_000.0).unwrap();
        assert!((fx.filter().cutoff() - 1_000.0).abs() < 1e-3);
        assert!((fx.filter().resonance() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn json_overrides() {
        let fx =
            FilterEffect::from_json(r#"{"frequency": 250.0, "resonance": 0.9}"#, 1, 96_000.0)
                .unwrap();
        assert!((fx.filter().cutoff() - 250.0).abs() < 1e-3);
        assert!((fx.filter().resonance() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn malformed_json_is_invalid_params() {
        let err = FilterEffect::from_json("{not json", 1, 96_000.0).unwrap_err();
        assert!(matches!(err, BuildError::InvalidParams(_)));
    }

    #[test]
    fn unknown_type_rejected() {
        let err = FilterEffect::new("comb", 1, 96_000.0, 1_000.0, 0.5).unwrap_err();
        assert!(matches!(err, BuildError::InvalidParams(_)));
    }
}
