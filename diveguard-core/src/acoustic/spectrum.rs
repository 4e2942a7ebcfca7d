//! Welch Power Spectral Density
//!
//! Overlapped, Hann-windowed, averaged periodograms. Averaging K segments cuts
//! the variance of the estimate by roughly K against a single FFT, which keeps
//! the noise floor flat enough for blade-pass peak picking.
//!
//! The same pass accumulates the fourth-order moment per bin, giving the
//! spectral kurtosis estimator
//!
//! ```text
//! SK(f) = (K+1)/(K-1) · (K·S2(f) / S1(f)² − 1)
//! S1 = Σ|X_k(f)|²,  S2 = Σ|X_k(f)|⁴
//! ```
//!
//! Gaussian noise gives SK ≈ 1, stationary tones push SK → 0 and impulsive
//! broadband energy (cavitation collapse) pushes SK above 1.

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// One-sided PSD of a single acoustic window.
#[derive(Debug, Clone)]
pub struct PowerSpectrum {
    /// Bin centre frequencies (Hz), DC to Nyquist
    pub frequencies: Vec<f64>,
    /// Power spectral density per bin (linear, units²/Hz)
    pub power: Vec<f64>,
    /// Spectral kurtosis per bin
    pub spectral_kurtosis: Vec<f64>,
    /// Number of averaged segments
    pub segments: usize,
    /// Bin spacing (Hz)
    pub resolution_hz: f64,
}

impl PowerSpectrum {
    pub fn bin_count(&self) -> usize {
        self.power.len()
    }

    /// Bin index nearest to `freq_hz`, clamped to the spectrum.
    pub fn bin_of(&self, freq_hz: f64) -> usize {
        let idx = (freq_hz / self.resolution_hz).round().max(0.0) as usize;
        idx.min(self.power.len().saturating_sub(1))
    }
}

pub struct WelchEstimator {
    segment_size: usize,
    step: usize,
    window: Vec<f64>,
    window_power: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for WelchEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WelchEstimator")
            .field("segment_size", &self.segment_size)
            .field("step", &self.step)
            .finish()
    }
}

impl WelchEstimator {
    pub fn new(segment_size: usize, overlap: f64) -> Self {
        let segment_size = segment_size.max(8);
        let overlap_len = (segment_size as f64 * overlap.clamp(0.0, 0.9)) as usize;
        let step = (segment_size - overlap_len).max(1);
        let window = hann(segment_size);
        let window_power = window.iter().map(|w| w * w).sum();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(segment_size);

        WelchEstimator {
            segment_size,
            step,
            window,
            window_power,
            fft,
        }
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Number of segments averaged for a buffer of `len` samples.
    pub fn segment_count(&self, len: usize) -> usize {
        if len < self.segment_size {
            0
        } else {
            (len - self.segment_size) / self.step + 1
        }
    }

    /// Estimate the one-sided PSD. `samples` must hold at least one segment;
    /// shorter input yields an empty spectrum.
    pub fn estimate(&self, samples: &[f64], sample_rate_hz: f64) -> PowerSpectrum {
        let n = self.segment_size;
        let bins = n / 2 + 1;
        let segments = self.segment_count(samples.len());
        let resolution_hz = sample_rate_hz / n as f64;

        let mut s1 = vec![0.0f64; bins];
        let mut s2 = vec![0.0f64; bins];
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];

        for seg in 0..segments {
            let chunk = &samples[seg * self.step..seg * self.step + n];
            let mean = chunk.iter().sum::<f64>() / n as f64;

            for ((slot, &x), &w) in buffer.iter_mut().zip(chunk).zip(&self.window) {
                *slot = Complex64::new((x - mean) * w, 0.0);
            }
            self.fft.process(&mut buffer);

            for k in 0..bins {
                let p = buffer[k].norm_sqr();
                s1[k] += p;
                s2[k] += p * p;
            }
        }

        let frequencies = (0..bins).map(|k| k as f64 * resolution_hz).collect();

        if segments == 0 {
            return PowerSpectrum {
                frequencies,
                power: vec![0.0; bins],
                spectral_kurtosis: vec![1.0; bins],
                segments,
                resolution_hz,
            };
        }

        let scale = 1.0 / (sample_rate_hz * self.window_power * segments as f64);
        let power = s1
            .iter()
            .enumerate()
            .map(|(k, &p)| {
                // Fold negative frequencies into the one-sided estimate
                let fold = if k == 0 || k == bins - 1 { 1.0 } else { 2.0 };
                p * scale * fold
            })
            .collect();

        let spectral_kurtosis = s1
            .iter()
            .zip(&s2)
            .map(|(&a, &b)| spectral_kurtosis(a, b, segments))
            .collect();

        PowerSpectrum {
            frequencies,
            power,
            spectral_kurtosis,
            segments,
            resolution_hz,
        }
    }
}

fn spectral_kurtosis(s1: f64, s2: f64, segments: usize) -> f64 {
    if segments < 2 || s1 <= f64::MIN_POSITIVE {
        return 1.0;
    }
    let m = segments as f64;
    let sk = (m + 1.0) / (m - 1.0) * (m * s2 / (s1 * s1) - 1.0);
    if sk.is_finite() {
        sk
    } else {
        1.0
    }
}

/// Periodic Hann window.
fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}
