//! Waveform oscillator with FFT re-band-limiting.
//!
//! Plays a stored single-cycle waveform through a phase accumulator with
//! linear interpolation. The playback copy is brickwall-filtered so that at
//! most `BINS_ALLOWED_ABOVE_NYQUIST` harmonic bins of headroom remain below
//! Nyquist for the current pitch; the headroom check runs every fourth
//! sample and the filtered copy is cached in between.

use std::sync::Arc;

use telar_core::{
    BrickwallScratch, BuildError, Context, ResourceId, SignalBuffer, WAVEFORM_LENGTH, WaveformFft,
    midi_note_to_hz,
};

use crate::oscillator::{Oscillator, PORT_AMPLITUDE, PORT_PITCH};

/// Harmonic bins a cached playback copy may keep above Nyquist before it is
/// re-band-limited.
const BINS_ALLOWED_ABOVE_NYQUIST: f32 = 5.0;

/// How many samples a headroom verdict stays cached.
const FFT_CHECK_INTERVAL: u32 = 4;

/// Band-limited waveform playback oscillator.
pub struct WaveformOscillator {
    n_channels: usize,
    sample_rate: f32,
    frequency_offset: f32,
    resource: ResourceId,
    source: Vec<f32>,
    playback: Vec<f32>,
    phase: Vec<f32>,
    fft: Arc<WaveformFft>,
    scratch: BrickwallScratch,
    fft_tick: u32,
    bin_cutoff: usize,
}

impl std::fmt::Debug for WaveformOscillator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveformOscillator")
            .field("n_channels", &self.n_channels)
            .field("sample_rate", &self.sample_rate)
            .field("frequency_offset", &self.frequency_offset)
            .field("resource", &self.resource)
            .field("source", &self.source)
            .field("playback", &self.playback)
            .field("phase", &self.phase)
            .field("fft_tick", &self.fft_tick)
            .field("bin_cutoff", &self.bin_cutoff)
            .finish_non_exhaustive()
    }
}

impl WaveformOscillator {
    /// Create an oscillator reading `resource` from the context's resource
    /// manager.
    pub fn new(
        ctx: &Context,
        n_channels: usize,
        resource: ResourceId,
    ) -> Result<Self, BuildError> {
        let source = ctx
            .resources
            .waveform(resource)
            .ok_or(BuildError::WaveformNotFound(resource))?
            .to_vec();
        let fft = Arc::clone(&ctx.waveform_fft);
        let scratch = fft.make_scratch();
        Ok(Self {
            n_channels,
            sample_rate: ctx.internal_rate(),
            frequency_offset: 0.0,
            resource,
            source: source.clone(),
            playback: source,
            phase: vec![0.0; n_channels],
            fft,
            scratch,
            // Force a band-limit pass on the very first sample
            fft_tick: FFT_CHECK_INTERVAL,
            bin_cutoff: 0,
        })
    }

    /// The waveform resource this oscillator reads.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    fn bin_cutoff_for(&self, freq: f32) -> usize {
        let nyquist = self.sample_rate * 0.5;
        (nyquist / freq.max(1.0)) as usize + 1
    }

    fn bins_above_nyquist(&self, freq: f32, cutoff: usize) -> f32 {
        let nyquist = self.sample_rate * 0.5;
        let top = cutoff.saturating_sub(1) as f32 * freq;
        (top - nyquist) / freq.max(1.0)
    }

    fn refresh_band_limit(&mut self, freq: f32) {
        let bins_above = self.bins_above_nyquist(freq, self.bin_cutoff);
        if bins_above < 1.0 || bins_above > BINS_ALLOWED_ABOVE_NYQUIST {
            self.bin_cutoff = self.bin_cutoff_for(freq) + BINS_ALLOWED_ABOVE_NYQUIST as usize;
            self.fft.brickwall(
                &self.source,
                &mut self.playback,
                self.bin_cutoff,
                &mut self.scratch,
            );
        }
    }

    #[inline]
    fn sample_at(&self, phase: f32) -> f32 {
        let pos = phase * WAVEFORM_LENGTH as f32;
        let idx = (pos as usize).min(WAVEFORM_LENGTH - 1);
        let frac = pos - idx as f32;
        let next = (idx + 1) % WAVEFORM_LENGTH;
        self.playback[idx] * (1.0 - frac) + self.playback[next] * frac
    }
}

impl Oscillator for WaveformOscillator {
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
            let mut phase = self.phase[c];
            {
                let Some(out) = output.channel_mut(c) else {
                    continue;
                };
                for i in 0..n_frames {
                    let frame = i + frame_offset;
                    if frame >= out.len() {
                        break;
                    }
                    let note = pitch[(frame / pitch_div).min(pitch.len() - 1)];
                    let freq = midi_note_to_hz(note + self.frequency_offset);

                    if self.fft_tick >= FFT_CHECK_INTERVAL {
                        self.refresh_band_limit(freq);
                        self.fft_tick = 0;
                    }
                    self.fft_tick += 1;

                    phase += freq * inv_rate;
                    phase -= libm::floorf(phase);
                    let gain = amp[(frame / amp_div).min(amp.len() - 1)];
                    out[frame] += gain * self.sample_at(phase);
                }
            }
            self.phase[c] = phase;
        }
    }

    fn on_sample_rate_change(&mut self, rate: f32) {
        self.sample_rate = rate;
        // Invalidate the cached band limit; the next sample re-checks.
        self.fft_tick = FFT_CHECK_INTERVAL;
        self.bin_cutoff = 0;
    }

    fn set_frequency_offset(&mut self, semitones: f32) {
        self.frequency_offset = semitones;
    }
}
