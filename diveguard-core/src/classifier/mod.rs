//! Vessel Signature Classification
//!
//! Maps an acoustic [`FeatureVector`] to a vessel type with confidence,
//! propeller rpm/blade-count estimates and a cavitation level.
//!
//! # Architecture
//!
//! - **backend**: pluggable class-probability models behind
//!   [`ClassificationBackend`] (`signature` rule table, `linear` softmax)
//! - **harmonics**: blade-pass fundamental and harmonic series
//! - **smoothing**: majority vote over recent results per stream
//!
//! The backend shape is checked once at construction; a mismatch there is a
//! startup error rather than a per-window one.

mod backend;
mod harmonics;
mod smoothing;

pub use backend::{build_backend, ClassificationBackend, LinearBackend, SignatureTableBackend};
pub use harmonics::{HarmonicEstimate, HarmonicSearch};
pub use smoothing::ClassificationSmoother;

use serde::{Deserialize, Serialize};

use crate::acoustic::{FeatureVector, FEATURE_DIM};
use crate::config::ClassifierConfig;
use crate::error::CoreError;
use crate::vessel::VesselType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub vessel_type: VesselType,
    /// Probability of the winning class, [0, 1]
    pub confidence: f64,
    /// 0 when no harmonic series was found
    pub rpm_estimate: f64,
    /// 0 when no harmonic series was found
    pub blade_count_estimate: u32,
    /// [0, 1]
    pub cavitation_level: f64,
    /// Estimated blade-pass frequency (Hz), 0 when none
    pub fundamental_hz: f64,
    /// Backend output in backend class order
    pub probabilities: Vec<(VesselType, f64)>,
}

impl ClassificationResult {
    pub fn unknown() -> Self {
        ClassificationResult {
            vessel_type: VesselType::Unknown,
            confidence: 0.0,
            rpm_estimate: 0.0,
            blade_count_estimate: 0,
            cavitation_level: 0.0,
            fundamental_hz: 0.0,
            probabilities: Vec::new(),
        }
    }
}

pub struct SignatureClassifier {
    config: ClassifierConfig,
    backend: Box<dyn ClassificationBackend>,
}

impl std::fmt::Debug for SignatureClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureClassifier")
            .field("backend", &self.backend.name())
            .field("classes", &self.backend.classes())
            .finish()
    }
}

impl SignatureClassifier {
    /// Build with the backend named in `config`.
    pub fn new(config: ClassifierConfig) -> Result<Self, CoreError> {
        let backend = build_backend(&config.backend)?;
        Self::with_backend(config, backend)
    }

    pub fn with_backend(
        config: ClassifierConfig,
        backend: Box<dyn ClassificationBackend>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        if backend.input_dim() != FEATURE_DIM {
            return Err(CoreError::Classification(format!(
                "{} backend takes {} features, extractor produces {}",
                backend.name(),
                backend.input_dim(),
                FEATURE_DIM
            )));
        }
        if backend.classes().is_empty() {
            return Err(CoreError::Classification(format!(
                "{} backend declares no classes",
                backend.name()
            )));
        }
        log::info!(
            "Classifier using {} backend over {:?}",
            backend.name(),
            backend.classes()
        );
        Ok(SignatureClassifier { config, backend })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// A smoother sized from this classifier's configuration.
    pub fn smoother(&self) -> ClassificationSmoother {
        ClassificationSmoother::new(self.config.smoothing_window, self.config.confidence_threshold)
    }

    pub fn classify(&self, features: &FeatureVector) -> Result<ClassificationResult, CoreError> {
        let probabilities = self.backend.infer(&features.to_array())?;
        let classes = self.backend.classes();
        if probabilities.len() != classes.len() {
            return Err(CoreError::Classification(format!(
                "{} backend returned {} probabilities for {} classes",
                self.backend.name(),
                probabilities.len(),
                classes.len()
            )));
        }

        let (best, p) = probabilities
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
        let confidence = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        let vessel_type = if confidence >= self.config.confidence_threshold {
            classes[best]
        } else {
            VesselType::Unknown
        };

        let search = HarmonicSearch {
            cutoff_hz: self.config.fundamental_cutoff_hz,
            tolerance: self.config.harmonic_tolerance,
            min_tolerance_hz: features.resolution_hz,
            max_orders: self.config.max_blade_count,
        };
        let harmonics = search.estimate(&features.peaks);
        let (fundamental_hz, blade_count_estimate, rpm_estimate) = match &harmonics {
            Some(h) => (h.fundamental_hz, h.blade_count, h.rpm),
            None => (0.0, 0, 0.0),
        };

        let cavitation_level = self.cavitation_level(features);

        log::debug!(
            "Classified {} (confidence {:.2}), f0 {:.1} Hz, {} blades, {:.0} rpm, cavitation {:.2}",
            vessel_type,
            confidence,
            fundamental_hz,
            blade_count_estimate,
            rpm_estimate,
            cavitation_level
        );

        Ok(ClassificationResult {
            vessel_type,
            confidence,
            rpm_estimate,
            blade_count_estimate,
            cavitation_level,
            fundamental_hz,
            probabilities: classes.iter().copied().zip(probabilities).collect(),
        })
    }

    fn cavitation_level(&self, features: &FeatureVector) -> f64 {
        let kurtosis =
            ((features.spectral_kurtosis - 1.0) / self.config.kurtosis_scale).clamp(0.0, 1.0);
        let ratio = features.cavitation_ratio.clamp(0.0, 1.0);
        (0.5 * kurtosis + 0.5 * ratio).clamp(0.0, 1.0)
    }
}
