//! Classification backends.
//!
//! A backend maps the fixed feature projection to one probability per class.
//! It must be deterministic and must not keep state between calls, so one
//! instance can be shared by every classification worker.

use crate::acoustic::FEATURE_DIM;
use crate::config::BackendConfig;
use crate::error::CoreError;
use crate::vessel::VesselType;

// Indices into `FeatureVector::to_array`
const IDX_LOW_DOMINANT_HZ: usize = 0;
const IDX_LOW_PEAK_COUNT: usize = 1;
const IDX_CENTROID_HZ: usize = 2;
const IDX_CAVITATION_RATIO: usize = 4;

pub trait ClassificationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Length of the input slice `infer` accepts.
    fn input_dim(&self) -> usize;

    /// Class order of the probability vector.
    fn classes(&self) -> &[VesselType];

    /// Class probabilities for one projected feature vector.
    fn infer(&self, input: &[f64]) -> Result<Vec<f64>, CoreError>;
}

pub fn build_backend(config: &BackendConfig) -> Result<Box<dyn ClassificationBackend>, CoreError> {
    match config {
        BackendConfig::Signature => Ok(Box::new(SignatureTableBackend::new())),
        BackendConfig::Linear { classes, weights, bias } => Ok(Box::new(LinearBackend::new(
            classes.clone(),
            weights.clone(),
            bias.clone(),
        )?)),
    }
}

fn check_dim(backend: &dyn ClassificationBackend, input: &[f64]) -> Result<(), CoreError> {
    if input.len() != backend.input_dim() {
        return Err(CoreError::Classification(format!(
            "{} backend expects {} features, got {}",
            backend.name(),
            backend.input_dim(),
            input.len()
        )));
    }
    Ok(())
}

/// Acoustic signature bands for one vessel type.
#[derive(Debug, Clone, Copy)]
struct Signature {
    vessel: VesselType,
    bpf_hz: (f64, f64),
    centroid_hz: (f64, f64),
    cavitation: CavitationRule,
    harmonics: HarmonicRule,
}

#[derive(Debug, Clone, Copy)]
enum CavitationRule {
    None,
    Above(f64),
    Within(f64, f64),
    Below(f64),
}

#[derive(Debug, Clone, Copy)]
enum HarmonicRule {
    None,
    AtLeast(f64),
    Fewer(f64),
}

const BPF_WEIGHT: f64 = 0.3;
const CENTROID_WEIGHT: f64 = 0.2;
const HARMONIC_WEIGHT: f64 = 0.2;

const SIGNATURES: [Signature; 5] = [
    Signature {
        vessel: VesselType::Ship,
        bpf_hz: (5.0, 15.0),
        centroid_hz: (50.0, 200.0),
        cavitation: CavitationRule::Below(0.1),
        harmonics: HarmonicRule::AtLeast(3.0),
    },
    Signature {
        vessel: VesselType::Submarine,
        bpf_hz: (10.0, 40.0),
        centroid_hz: (100.0, 300.0),
        cavitation: CavitationRule::Above(0.3),
        harmonics: HarmonicRule::None,
    },
    Signature {
        vessel: VesselType::Boat,
        bpf_hz: (50.0, 150.0),
        centroid_hz: (100.0, 500.0),
        cavitation: CavitationRule::Within(0.1, 0.4),
        harmonics: HarmonicRule::None,
    },
    Signature {
        vessel: VesselType::Rov,
        bpf_hz: (200.0, 500.0),
        centroid_hz: (2_000.0, f64::INFINITY),
        cavitation: CavitationRule::None,
        harmonics: HarmonicRule::Fewer(3.0),
    },
    Signature {
        vessel: VesselType::Auv,
        bpf_hz: (20.0, 80.0),
        centroid_hz: (300.0, 1_000.0),
        cavitation: CavitationRule::None,
        harmonics: HarmonicRule::None,
    },
];

impl CavitationRule {
    /// (bonus when matched, bonus available)
    fn score(&self, ratio: f64) -> (f64, f64) {
        match *self {
            CavitationRule::None => (0.0, 0.0),
            CavitationRule::Above(t) => (if ratio > t { 0.3 } else { 0.0 }, 0.3),
            CavitationRule::Within(lo, hi) => {
                (if (lo..=hi).contains(&ratio) { 0.2 } else { 0.0 }, 0.2)
            }
            CavitationRule::Below(t) => (if ratio < t { 0.1 } else { 0.0 }, 0.1),
        }
    }
}

impl HarmonicRule {
    fn score(&self, count: f64) -> (f64, f64) {
        match *self {
            HarmonicRule::None => (0.0, 0.0),
            HarmonicRule::AtLeast(n) => (if count >= n { HARMONIC_WEIGHT } else { 0.0 }, HARMONIC_WEIGHT),
            HarmonicRule::Fewer(n) => (if count < n { HARMONIC_WEIGHT } else { 0.0 }, HARMONIC_WEIGHT),
        }
    }
}

impl Signature {
    /// Fraction of this signature's attainable score that the input matches.
    fn match_fraction(&self, input: &[f64]) -> f64 {
        let in_band = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;

        let bpf = input[IDX_LOW_DOMINANT_HZ];
        let mut score = if bpf > 0.0 && in_band(bpf, self.bpf_hz) { BPF_WEIGHT } else { 0.0 };
        let mut max = BPF_WEIGHT;

        if in_band(input[IDX_CENTROID_HZ], self.centroid_hz) {
            score += CENTROID_WEIGHT;
        }
        max += CENTROID_WEIGHT;

        let (s, m) = self.cavitation.score(input[IDX_CAVITATION_RATIO]);
        score += s;
        max += m;

        let (s, m) = self.harmonics.score(input[IDX_LOW_PEAK_COUNT]);
        score += s;
        max += m;

        score / max
    }
}

/// Rule scoring over the vessel signature table.
///
/// Each class scores the fraction of its signature criteria the features
/// satisfy, squared to sharpen. The unexplained remainder of the best match,
/// `(1 - best)²`, is kept as background mass before normalising, so a weak
/// partial match never reaches a high probability. The returned vector may
/// therefore sum to less than one.
#[derive(Debug)]
pub struct SignatureTableBackend {
    classes: Vec<VesselType>,
}

impl SignatureTableBackend {
    pub fn new() -> Self {
        SignatureTableBackend {
            classes: SIGNATURES.iter().map(|s| s.vessel).collect(),
        }
    }
}

impl Default for SignatureTableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationBackend for SignatureTableBackend {
    fn name(&self) -> &str {
        "signature"
    }

    fn input_dim(&self) -> usize {
        FEATURE_DIM
    }

    fn classes(&self) -> &[VesselType] {
        &self.classes
    }

    fn infer(&self, input: &[f64]) -> Result<Vec<f64>, CoreError> {
        check_dim(self, input)?;
        if input.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::Classification("non-finite feature value".into()));
        }

        let fractions: Vec<f64> = SIGNATURES.iter().map(|s| s.match_fraction(input)).collect();
        let best = fractions.iter().copied().fold(0.0, f64::max);
        let background = (1.0 - best).powi(2);
        // best = 0 leaves background = 1, so total is never zero
        let total: f64 = fractions.iter().map(|f| f * f).sum::<f64>() + background;
        Ok(fractions.into_iter().map(|f| f * f / total).collect())
    }
}

/// Softmax over `W·x + b`, one weight row per class.
#[derive(Debug)]
pub struct LinearBackend {
    classes: Vec<VesselType>,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    input_dim: usize,
}

impl LinearBackend {
    pub fn new(
        classes: Vec<VesselType>,
        weights: Vec<Vec<f64>>,
        bias: Vec<f64>,
    ) -> Result<Self, CoreError> {
        if classes.is_empty() {
            return Err(CoreError::Classification("linear backend has no classes".into()));
        }
        if weights.len() != classes.len() || bias.len() != classes.len() {
            return Err(CoreError::Classification(format!(
                "linear backend: {} classes, {} weight rows, {} biases",
                classes.len(),
                weights.len(),
                bias.len()
            )));
        }
        let input_dim = weights[0].len();
        if weights.iter().any(|row| row.len() != input_dim) {
            return Err(CoreError::Classification(
                "linear backend weight rows differ in length".into(),
            ));
        }
        if weights.iter().flatten().chain(&bias).any(|v| !v.is_finite()) {
            return Err(CoreError::Classification("linear backend has non-finite weights".into()));
        }
        Ok(LinearBackend {
            classes,
            weights,
            bias,
            input_dim,
        })
    }
}

impl ClassificationBackend for LinearBackend {
    fn name(&self) -> &str {
        "linear"
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn classes(&self) -> &[VesselType] {
        &self.classes
    }

    fn infer(&self, input: &[f64]) -> Result<Vec<f64>, CoreError> {
        check_dim(self, input)?;
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();
        Ok(softmax(&logits))
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return vec![1.0 / logits.len() as f64; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}
