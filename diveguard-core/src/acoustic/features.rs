//! Spectral feature extraction for propeller signatures.

use serde::{Deserialize, Serialize};

use super::spectrum::{PowerSpectrum, WelchEstimator};
use crate::config::AcousticConfig;
use crate::error::CoreError;

/// Length of the fixed numeric projection handed to classification backends.
pub const FEATURE_DIM: usize = 8;

/// Backends see blade-pass candidates only below this frequency.
pub const LOW_BAND_PEAK_LIMIT_HZ: f64 = 500.0;

const LOW_BAND_EDGE_HZ: f64 = 100.0;
const MID_BAND_EDGE_HZ: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectralPeak {
    pub frequency_hz: f64,
    pub power: f64,
}

/// Frequency-domain description of one acoustic window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Local PSD maxima above the noise floor, ascending frequency
    pub peaks: Vec<SpectralPeak>,
    pub spectral_centroid_hz: f64,
    /// Mean spectral kurtosis over the cavitation band
    pub spectral_kurtosis: f64,
    /// Cavitation-band energy over total energy
    pub cavitation_ratio: f64,
    pub low_band_ratio: f64,
    pub mid_band_ratio: f64,
    pub high_band_ratio: f64,
    pub total_power: f64,
    pub noise_floor: f64,
    pub resolution_hz: f64,
}

impl FeatureVector {
    /// Strongest peak overall.
    pub fn dominant_peak(&self) -> Option<SpectralPeak> {
        self.peaks
            .iter()
            .copied()
            .max_by(|a, b| a.power.total_cmp(&b.power))
    }

    /// Strongest peak below `limit_hz`.
    pub fn dominant_peak_below(&self, limit_hz: f64) -> Option<SpectralPeak> {
        self.peaks
            .iter()
            .copied()
            .filter(|p| p.frequency_hz < limit_hz)
            .max_by(|a, b| a.power.total_cmp(&b.power))
    }

    /// Fixed-shape projection:
    /// `[low_dominant_hz, low_peak_count, centroid_hz, kurtosis, cavitation_ratio,
    ///   low_ratio, mid_ratio, high_ratio]`
    pub fn to_array(&self) -> [f64; FEATURE_DIM] {
        let low_dominant = self
            .dominant_peak_below(LOW_BAND_PEAK_LIMIT_HZ)
            .map(|p| p.frequency_hz)
            .unwrap_or(0.0);
        let low_count = self
            .peaks
            .iter()
            .filter(|p| p.frequency_hz > 0.0 && p.frequency_hz < LOW_BAND_PEAK_LIMIT_HZ)
            .count() as f64;
        [
            low_dominant,
            low_count,
            self.spectral_centroid_hz,
            self.spectral_kurtosis,
            self.cavitation_ratio,
            self.low_band_ratio,
            self.mid_band_ratio,
            self.high_band_ratio,
        ]
    }
}

/// Stateless extractor; one instance can serve any number of windows.
#[derive(Debug)]
pub struct AcousticFeatureExtractor {
    config: AcousticConfig,
    welch: WelchEstimator,
}

impl AcousticFeatureExtractor {
    pub fn new(config: AcousticConfig) -> Self {
        let welch = WelchEstimator::new(config.segment_size, config.overlap);
        AcousticFeatureExtractor { config, welch }
    }

    pub fn config(&self) -> &AcousticConfig {
        &self.config
    }

    /// Extract features from signed 16-bit PCM.
    pub fn extract(&self, buffer: &[i16], sample_rate_hz: f64) -> Result<FeatureVector, CoreError> {
        let samples: Vec<f64> = self
            .recent(buffer)
            .iter()
            .map(|&s| s as f64 / 32768.0)
            .collect();
        self.extract_normalized(&samples, sample_rate_hz)
    }

    /// Extract features from samples already scaled to [-1, 1].
    pub fn extract_normalized(
        &self,
        samples: &[f64],
        sample_rate_hz: f64,
    ) -> Result<FeatureVector, CoreError> {
        if !(sample_rate_hz > 0.0) || !sample_rate_hz.is_finite() {
            return Err(CoreError::InvalidMeasurement(format!(
                "sample rate must be positive, got {}",
                sample_rate_hz
            )));
        }
        let need = self.config.required_samples();
        if samples.len() < need {
            return Err(CoreError::InsufficientData {
                got: samples.len(),
                need,
            });
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(CoreError::InvalidMeasurement(
                "acoustic window contains non-finite samples".into(),
            ));
        }

        let samples = self.recent(samples);
        let spectrum = self.welch.estimate(samples, sample_rate_hz);
        Ok(self.features_from(&spectrum, sample_rate_hz))
    }

    fn recent<'a, T>(&self, buffer: &'a [T]) -> &'a [T] {
        let len = buffer.len();
        if len > self.config.window_size {
            &buffer[len - self.config.window_size..]
        } else {
            buffer
        }
    }

    fn features_from(&self, spectrum: &PowerSpectrum, sample_rate_hz: f64) -> FeatureVector {
        let power = &spectrum.power;
        let freqs = &spectrum.frequencies;
        let total_power: f64 = power.iter().sum();

        let noise_floor = median(power) * self.config.noise_floor_factor;
        let peaks = self.find_peaks(spectrum, noise_floor);

        let spectral_centroid_hz = if total_power > 0.0 {
            freqs.iter().zip(power).map(|(f, p)| f * p).sum::<f64>() / total_power
        } else {
            0.0
        };

        let nyquist = sample_rate_hz / 2.0;
        let band_low = self.config.cavitation_band_low_hz.min(nyquist);
        let band_high = self.config.cavitation_band_high_hz.min(nyquist);
        let in_band = |f: f64| f >= band_low && f <= band_high;

        let band_energy = |pred: &dyn Fn(f64) -> bool| -> f64 {
            freqs
                .iter()
                .zip(power)
                .filter(|(f, _)| pred(**f))
                .map(|(_, p)| p)
                .sum()
        };
        let ratio = |e: f64| if total_power > 0.0 { e / total_power } else { 0.0 };

        let cavitation_ratio = if band_high > band_low {
            ratio(band_energy(&in_band))
        } else {
            0.0
        };
        let low_band_ratio = ratio(band_energy(&|f| f < LOW_BAND_EDGE_HZ));
        let mid_band_ratio = ratio(band_energy(&|f| (LOW_BAND_EDGE_HZ..MID_BAND_EDGE_HZ).contains(&f)));
        let high_band_ratio = ratio(band_energy(&|f| f >= MID_BAND_EDGE_HZ));

        let band_sk: Vec<f64> = freqs
            .iter()
            .zip(&spectrum.spectral_kurtosis)
            .filter(|(f, _)| band_high > band_low && in_band(**f))
            .map(|(_, sk)| *sk)
            .collect();
        let spectral_kurtosis = if band_sk.is_empty() {
            mean(&spectrum.spectral_kurtosis[1..])
        } else {
            mean(&band_sk)
        };

        FeatureVector {
            peaks,
            spectral_centroid_hz,
            spectral_kurtosis,
            cavitation_ratio,
            low_band_ratio,
            mid_band_ratio,
            high_band_ratio,
            total_power,
            noise_floor,
            resolution_hz: spectrum.resolution_hz,
        }
    }

    /// Local maxima above the floor, refined by parabolic interpolation of
    /// log power, strongest `max_peaks` kept.
    fn find_peaks(&self, spectrum: &PowerSpectrum, floor: f64) -> Vec<SpectralPeak> {
        let power = &spectrum.power;
        let mut peaks = Vec::new();

        for k in 1..power.len().saturating_sub(1) {
            let (a, b, c) = (power[k - 1], power[k], power[k + 1]);
            if b <= floor || b <= a || b < c {
                continue;
            }
            let (la, lb, lc) = (ln_floor(a), ln_floor(b), ln_floor(c));
            let denom = la - 2.0 * lb + lc;
            let delta = if denom.abs() > 1e-12 {
                (0.5 * (la - lc) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            peaks.push(SpectralPeak {
                frequency_hz: (k as f64 + delta) * spectrum.resolution_hz,
                power: b,
            });
        }

        peaks.sort_by(|x, y| y.power.total_cmp(&x.power));
        peaks.truncate(self.config.max_peaks);
        peaks.sort_by(|x, y| x.frequency_hz.total_cmp(&y.frequency_hz));
        peaks
    }
}

fn ln_floor(p: f64) -> f64 {
    p.max(1e-300).ln()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[sorted.len() / 2]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
