//! Acoustic Feature Extraction
//!
//! Converts fixed-length hydrophone windows into frequency-domain features:
//!
//! - **spectrum**: Welch PSD and per-bin spectral kurtosis
//! - **features**: peak picking, centroid, band energy ratios
//!
//! Extraction is deterministic and side-effect free; identical windows yield
//! identical feature vectors.

mod features;
mod spectrum;

pub use features::{
    AcousticFeatureExtractor, FeatureVector, SpectralPeak, FEATURE_DIM, LOW_BAND_PEAK_LIMIT_HZ,
};
pub use spectrum::{PowerSpectrum, WelchEstimator};

use serde::{Deserialize, Serialize};

use crate::measurement::AcousticPeak;
use crate::Timestamp;

/// One capture window as delivered by the hydrophone driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticWindow {
    /// Time of the last sample in the window
    pub timestamp: Timestamp,
    pub sample_rate_hz: f64,
    pub samples: Vec<i16>,
    /// Direction of arrival, when the array provides one (absolute, deg)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f64>,
}

impl FeatureVector {
    /// Summarise the window as the soft cue the tracker consumes.
    /// Returns `None` when no peak rose above the noise floor.
    pub fn to_peak_measurement(
        &self,
        timestamp: Timestamp,
        bearing_deg: Option<f64>,
    ) -> Option<AcousticPeak> {
        let dominant = self.dominant_peak()?;
        Some(AcousticPeak {
            timestamp,
            dominant_freq_hz: dominant.frequency_hz,
            power: dominant.power,
            spectral_centroid_hz: self.spectral_centroid_hz,
            bearing_deg,
            bearing_variance: None,
        })
    }
}
