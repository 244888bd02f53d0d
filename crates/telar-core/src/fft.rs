//! Brickwall re-band-limiting for stored waveforms.
//!
//! Waveform oscillators keep a playback copy of their source waveform with
//! all partials above a bin cutoff removed. [`WaveformFft`] owns the
//! forward/inverse FFT pair (sized once, at engine construction) and
//! performs the zero-out in the frequency domain. Callers own the scratch
//! state so a single helper can sit behind an `Arc` and serve every
//! oscillator without locking.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Fixed-size FFT pair used for brickwall filtering of waveforms.
pub struct WaveformFft {
    len: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch_len: usize,
}

/// Caller-owned scratch for [`WaveformFft::brickwall`].
///
/// Allocated once per user (off the real-time path); reused for every
/// subsequent brickwall pass.
pub struct BrickwallScratch {
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl WaveformFft {
    /// Plan forward/inverse transforms for waveforms of `len` samples.
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            len,
            forward,
            inverse,
            scratch_len,
        }
    }

    /// Transform length in samples.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the transform length is zero (never in practice).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocate scratch sized for this transform.
    pub fn make_scratch(&self) -> BrickwallScratch {
        BrickwallScratch {
            spectrum: vec![Complex::default(); self.len],
            scratch: vec![Complex::default(); self.scratch_len],
        }
    }

    /// Copy `source` into `dest` with every bin at or above `bin_cutoff`
    /// (and its mirrored conjugate) removed.
    ///
    /// `bin_cutoff` counts harmonics: cutoff B keeps bins 0..B. A cutoff of
    /// 0 produces silence; a cutoff at or beyond len/2 passes the waveform
    /// through unchanged apart from FFT round-off.
    pub fn brickwall(
        &self,
        source: &[f32],
        dest: &mut [f32],
        bin_cutoff: usize,
        scratch: &mut BrickwallScratch,
    ) {
        let n = self.len.min(source.len()).min(dest.len());

        for (slot, &s) in scratch.spectrum.iter_mut().zip(source.iter()).take(n) {
            *slot = Complex::new(s, 0.0);
        }
        for slot in scratch.spectrum.iter_mut().skip(n) {
            *slot = Complex::default();
        }

        self.forward
            .process_with_scratch(&mut scratch.spectrum, &mut scratch.scratch);

        // Zero the stopband on both sides of the spectrum. Bin k and bin
        // len-k are a conjugate pair for a real signal; both must go.
        let lo = bin_cutoff.min(self.len);
        let hi = self.len.saturating_sub(bin_cutoff.saturating_sub(1)).max(lo);
        for slot in &mut scratch.spectrum[lo..hi] {
            *slot = Complex::default();
        }

        self.inverse
            .process_with_scratch(&mut scratch.spectrum, &mut scratch.scratch);

        let norm = 1.0 / self.len as f32;
        for (d, s) in dest.iter_mut().zip(scratch.spectrum.iter()).take(n) {
            *d = s.re * norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_partials(len: usize, partials: &[(usize, f32)]) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / len as f32;
                partials
                    .iter()
                    .map(|&(h, a)| a * (core::f32::consts::TAU * h as f32 * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn passthrough_above_all_partials() {
        let fft = WaveformFft::new(256);
        let mut scratch = fft.make_scratch();
        let src = sine_partials(256, &[(1, 1.0), (5, 0.5)]);
        let mut dst = vec![0.0; 256];
        fft.brickwall(&src, &mut dst, 128, &mut scratch);
        for (i, (&a, &b)) in src.iter().zip(dst.iter()).enumerate() {
            assert!(
                (a - b).abs() < 1e-3,
                "sample {} changed: {} vs {}",
                i,
                a,
                b
            );
        }
    }

    #[test]
    fn removes_high_partial() {
        let fft = WaveformFft::new(256);
        let mut scratch = fft.make_scratch();
        // Fundamental plus a partial at bin 40
        let src = sine_partials(256, &[(1, 1.0), (40, 0.8)]);
        let expected = sine_partials(256, &[(1, 1.0)]);
        let mut dst = vec![0.0; 256];
        fft.brickwall(&src, &mut dst, 10, &mut scratch);
        for (i, (&a, &b)) in expected.iter().zip(dst.iter()).enumerate() {
            assert!(
                (a - b).abs() < 1e-3,
                "sample {}: expected {}, got {}",
                i,
                a,
                b
            );
        }
    }

    #[test]
    fn zero_cutoff_silences() {
        let fft = WaveformFft::new(128);
        let mut scratch = fft.make_scratch();
        let src = sine_partials(128, &[(3, 1.0)]);
        let mut dst = vec![1.0; 128];
        fft.brickwall(&src, &mut dst, 0, &mut scratch);
        assert!(dst.iter().all(|s| s.abs() < 1e-4));
    }
}
