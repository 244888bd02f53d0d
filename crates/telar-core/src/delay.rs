//! Modulated circular-buffer delay line.
//!
//! The read tap wobbles around the nominal delay, driven by an internal
//! sine LFO, and fractional positions are resolved with linear
//! interpolation.

use core::f32::consts::TAU;

/// Delay line with a sine-LFO-modulated read position.
#[derive(Clone, Debug)]
pub struct ModDelayLine {
    buffer: Vec<f32>,
    write_index: usize,
    delay_samples: f32,
    sample_rate: f32,
    lfo_phase: f32,
    lfo_rate_hz: f32,
    mod_depth: f32,
}

impl ModDelayLine {
    /// Create a delay line holding up to `max_delay_samples` samples.
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(2)],
            write_index: 0,
            delay_samples: max_delay_samples.max(2) as f32 - 1.0,
            sample_rate: 44_100.0,
            lfo_phase: 0.0,
            lfo_rate_hz: 1.5,
            mod_depth: 0.0,
        }
    }

    /// Set the nominal delay in samples (clamped to the buffer length).
    pub fn set_delay_samples(&mut self, delay: f32) {
        self.delay_samples = delay.clamp(1.0, self.buffer.len() as f32 - 1.0);
    }

    /// Set the LFO excursion around the nominal delay, in samples.
    pub fn set_mod_depth(&mut self, samples: f32) {
        self.mod_depth = samples.max(0.0);
    }

    /// Set the modulation LFO rate in Hz.
    pub fn set_lfo_rate(&mut self, hz: f32) {
        self.lfo_rate_hz = hz.max(0.0);
    }

    /// Set the sample rate the LFO increment is derived from.
    pub fn set_sample_rate(&mut self, rate: f32) {
        self.sample_rate = rate.max(1.0);
    }

    /// Clear the buffer and LFO phase.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_index = 0;
        self.lfo_phase = 0.0;
    }

    /// Write one sample and read the modulated, interpolated tap.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        let len = self.buffer.len();
        self.buffer[self.write_index] = input;

        let lfo = libm::sinf(self.lfo_phase);
        let delay =
            (self.delay_samples + lfo * self.mod_depth).clamp(1.0, len as f32 - 1.0);

        let mut read_pos = self.write_index as f32 - delay;
        if read_pos < 0.0 {
            read_pos += len as f32;
        }
        let idx = read_pos as usize;
        let frac = read_pos - idx as f32;
        let next = (idx + 1) % len;
        let out = self.buffer[idx] * (1.0 - frac) + self.buffer[next] * frac;

        self.write_index = (self.write_index + 1) % len;
        self.lfo_phase += TAU * self.lfo_rate_hz / self.sample_rate;
        if self.lfo_phase >= TAU {
            self.lfo_phase -= TAU;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmodulated_integer_delay_is_exact() {
        let mut dl = ModDelayLine::new(64);
        dl.set_delay_samples(10.0);

        let mut outputs = Vec::new();
        for i in 0..30 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            outputs.push(dl.tick(x));
        }
        // Impulse comes back exactly 10 samples later
        for (i, &y) in outputs.iter().enumerate() {
            if i == 10 {
                assert!((y - 1.0).abs() < 1e-6, "expected impulse at 10, got {}", y);
            } else {
                assert!(y.abs() < 1e-6, "unexpected output {} at {}", y, i);
            }
        }
    }

    #[test]
    fn reset_silences() {
        let mut dl = ModDelayLine::new(32);
        dl.set_delay_samples(4.0);
        for _ in 0..32 {
            dl.tick(1.0);
        }
        dl.reset();
        for _ in 0..32 {
            assert_eq!(dl.tick(0.0), 0.0);
        }
    }

    #[test]
    fn modulated_output_stays_finite() {
        let mut dl = ModDelayLine::new(128);
        dl.set_delay_samples(40.0);
        dl.set_mod_depth(20.0);
        dl.set_lfo_rate(3.0);
        dl.set_sample_rate(48_000.0);
        for i in 0..2000 {
            let y = dl.tick((i as f32 * 0.1).sin());
            assert!(y.is_finite());
        }
    }
}
