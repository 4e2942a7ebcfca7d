//! Core Configuration
//!
//! Read-only settings for every core component, loaded once at startup.
//! The JSON layout uses camelCase keys; every field has a default so a partial
//! document is enough.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::vessel::VesselType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub acoustic: AcousticConfig,
    pub classifier: ClassifierConfig,
    pub tracker: TrackerConfig,
    pub threat: ThreatConfig,
}

impl CoreConfig {
    /// Parse from a JSON document and validate.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: CoreConfig =
            serde_json::from_str(json).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.acoustic.validate()?;
        self.classifier.validate()?;
        self.tracker.validate()?;
        self.threat.validate()
    }
}

/// Acoustic window and spectral estimator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcousticConfig {
    /// Nominal hydrophone sample rate (Hz)
    pub sample_rate_hz: f64,
    /// Samples per window delivered by the capture driver (power of two)
    pub window_size: usize,
    /// Minimum samples for a stable estimate
    pub min_samples: usize,
    /// Welch sub-segment length (power of two)
    pub segment_size: usize,
    /// Welch overlap fraction [0, 0.9]
    pub overlap: f64,
    /// Peak must exceed median PSD times this factor
    pub noise_floor_factor: f64,
    /// Strongest peaks kept in the feature vector
    pub max_peaks: usize,
    /// Cavitation band lower edge (Hz)
    pub cavitation_band_low_hz: f64,
    /// Cavitation band upper edge (Hz), clipped to Nyquist
    pub cavitation_band_high_hz: f64,
}

impl Default for AcousticConfig {
    fn default() -> Self {
        AcousticConfig {
            sample_rate_hz: 48_000.0,
            window_size: 16_384,
            min_samples: 512,
            segment_size: 4096,
            overlap: 0.5,
            noise_floor_factor: 8.0,
            max_peaks: 16,
            cavitation_band_low_hz: 5_000.0,
            cavitation_band_high_hz: 20_000.0,
        }
    }
}

impl AcousticConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(CoreError::InvalidConfig("acoustic.sampleRateHz must be positive".into()));
        }
        if !self.window_size.is_power_of_two() || !self.segment_size.is_power_of_two() {
            return Err(CoreError::InvalidConfig(
                "acoustic.windowSize and acoustic.segmentSize must be powers of two".into(),
            ));
        }
        if self.segment_size > self.window_size {
            return Err(CoreError::InvalidConfig(
                "acoustic.segmentSize must not exceed acoustic.windowSize".into(),
            ));
        }
        if !(0.0..=0.9).contains(&self.overlap) {
            return Err(CoreError::InvalidConfig("acoustic.overlap must be within [0, 0.9]".into()));
        }
        if self.max_peaks == 0 || self.noise_floor_factor < 1.0 {
            return Err(CoreError::InvalidConfig(
                "acoustic.maxPeaks must be > 0 and noiseFloorFactor >= 1".into(),
            ));
        }
        if self.cavitation_band_low_hz >= self.cavitation_band_high_hz {
            return Err(CoreError::InvalidConfig("acoustic cavitation band is empty".into()));
        }
        Ok(())
    }

    /// Shortest buffer accepted by the extractor.
    pub fn required_samples(&self) -> usize {
        self.min_samples.max(self.segment_size)
    }
}

/// Classification backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Rule scoring over the built-in vessel signature table
    Signature,
    /// Softmax over an inline weight matrix (one row per class)
    Linear {
        classes: Vec<VesselType>,
        weights: Vec<Vec<f64>>,
        bias: Vec<f64>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Signature
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    pub backend: BackendConfig,
    /// Below this confidence the result is `unknown`
    pub confidence_threshold: f64,
    /// Fundamental (BPF) candidates must lie below this frequency
    pub fundamental_cutoff_hz: f64,
    /// Relative tolerance for harmonic matching
    pub harmonic_tolerance: f64,
    pub max_blade_count: u32,
    /// SK excess mapped to cavitation level 1.0
    pub kurtosis_scale: f64,
    /// Results kept by the smoother
    pub smoothing_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            backend: BackendConfig::Signature,
            confidence_threshold: 0.6,
            fundamental_cutoff_hz: 1_000.0,
            harmonic_tolerance: 0.03,
            max_blade_count: 8,
            kurtosis_scale: 4.0,
            smoothing_window: 5,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(CoreError::InvalidConfig(
                "classifier.confidenceThreshold must be within [0, 1]".into(),
            ));
        }
        if !(self.fundamental_cutoff_hz > 0.0) || !(self.harmonic_tolerance > 0.0) {
            return Err(CoreError::InvalidConfig(
                "classifier cutoff and harmonic tolerance must be positive".into(),
            ));
        }
        if self.max_blade_count < 2 || self.smoothing_window == 0 || !(self.kurtosis_scale > 0.0) {
            return Err(CoreError::InvalidConfig(
                "classifier.maxBladeCount >= 2, smoothingWindow >= 1, kurtosisScale > 0 required"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Motion model used by the prediction step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionModel {
    ConstantVelocity,
    /// Horizontal coordinated turn at a fixed rate (deg/s, positive clockwise)
    ConstantTurn { turn_rate_dps: f64 },
}

impl Default for MotionModel {
    fn default() -> Self {
        MotionModel::ConstantVelocity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    pub motion_model: MotionModel,
    /// Consecutive associated ranging updates to confirm a contact
    pub confirm_hits: u32,
    /// No ranging update for this long => stale (s)
    pub stale_after_secs: f64,
    /// No ranging update for this long => expired and removed (s)
    pub expire_after_secs: f64,
    /// Squared Mahalanobis gate (3 DOF, 99.5% ≈ 12.84)
    pub gate_mahalanobis_sq: f64,
    /// Prediction step clamp (s)
    pub max_dt_secs: f64,
    /// White-noise acceleration variance (m²/s⁴)
    pub process_noise_accel_var: f64,
    /// Initial velocity variance for a new contact (m²/s²)
    pub initial_velocity_var: f64,
    /// Classification older than this no longer reinforced by acoustic cues (s)
    pub classification_stale_secs: f64,
    /// Half-life of classification confidence once stale (s)
    pub confidence_half_life_secs: f64,
    /// Let bearing-carrying acoustic peaks update geometry when ranging is silent
    pub acoustic_bearing_fallback: bool,
    /// Ranging silence before the acoustic fallback engages (s)
    pub ranging_gap_secs: f64,
    /// Default acoustic bearing variance when the peak carries none (deg²)
    pub acoustic_bearing_variance: f64,
    /// Fused points kept per contact
    pub trail_length: usize,
    /// Closing speed needed to call a contact approaching/receding (m/s)
    pub motion_threshold_mps: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            motion_model: MotionModel::ConstantVelocity,
            confirm_hits: 3,
            stale_after_secs: 5.0,
            expire_after_secs: 30.0,
            gate_mahalanobis_sq: 12.84,
            max_dt_secs: 2.0,
            process_noise_accel_var: 0.5,
            initial_velocity_var: 25.0,
            classification_stale_secs: 10.0,
            confidence_half_life_secs: 10.0,
            acoustic_bearing_fallback: false,
            ranging_gap_secs: 2.0,
            acoustic_bearing_variance: 25.0,
            trail_length: 64,
            motion_threshold_mps: 0.3,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.confirm_hits == 0 {
            return Err(CoreError::InvalidConfig("tracker.confirmHits must be >= 1".into()));
        }
        if !(self.stale_after_secs > 0.0) || self.expire_after_secs <= self.stale_after_secs {
            return Err(CoreError::InvalidConfig(
                "tracker.expireAfterSecs must exceed staleAfterSecs > 0".into(),
            ));
        }
        if !(self.gate_mahalanobis_sq > 0.0) || !(self.max_dt_secs > 0.0) {
            return Err(CoreError::InvalidConfig(
                "tracker gate and maxDtSecs must be positive".into(),
            ));
        }
        if !(self.process_noise_accel_var >= 0.0) || !(self.initial_velocity_var > 0.0) {
            return Err(CoreError::InvalidConfig("tracker noise variances out of range".into()));
        }
        if !(self.confidence_half_life_secs > 0.0) || !(self.acoustic_bearing_variance > 0.0) {
            return Err(CoreError::InvalidConfig(
                "tracker half-life and acoustic bearing variance must be positive".into(),
            ));
        }
        if let MotionModel::ConstantTurn { turn_rate_dps } = self.motion_model {
            if !turn_rate_dps.is_finite() {
                return Err(CoreError::InvalidConfig("tracker turn rate must be finite".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreatConfig {
    /// Closing speeds at or below this are "not approaching" (m/s)
    pub closing_speed_epsilon: f64,
    /// Ascending TTC upper bounds (s) paired with `risk_levels`
    pub ttc_thresholds_secs: Vec<f64>,
    /// Risk for each TTC band; one more entry than thresholds (last = beyond)
    pub risk_levels: Vec<u8>,
    /// Risk offset per vessel type, applied after the TTC table
    pub vessel_adjustments: BTreeMap<VesselType, i32>,
    /// Stage floor `approach` below this distance (m)
    pub approach_floor_m: f64,
    /// Stage floor `critical` below this distance (m)
    pub critical_floor_m: f64,
    /// Stage floor `critical` above this closing speed (m/s)
    pub critical_closing_speed_mps: f64,
    /// Classification older than this is treated as unknown (s)
    pub classification_max_age_secs: f64,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        let mut vessel_adjustments = BTreeMap::new();
        vessel_adjustments.insert(VesselType::Submarine, 2);
        vessel_adjustments.insert(VesselType::Rov, -1);
        ThreatConfig {
            closing_speed_epsilon: 0.1,
            ttc_thresholds_secs: vec![5.0, 15.0, 60.0],
            risk_levels: vec![10, 8, 5, 1],
            vessel_adjustments,
            approach_floor_m: 150.0,
            critical_floor_m: 50.0,
            critical_closing_speed_mps: 5.0,
            classification_max_age_secs: 15.0,
        }
    }
}

impl ThreatConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.risk_levels.len() != self.ttc_thresholds_secs.len() + 1 {
            return Err(CoreError::InvalidConfig(
                "threat.riskLevels needs exactly one more entry than ttcThresholdsSecs".into(),
            ));
        }
        if self.ttc_thresholds_secs.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CoreError::InvalidConfig(
                "threat.ttcThresholdsSecs must be strictly ascending".into(),
            ));
        }
        if self.risk_levels.iter().any(|r| !(1..=10).contains(r)) {
            return Err(CoreError::InvalidConfig("threat.riskLevels must be within 1..=10".into()));
        }
        if self.critical_floor_m > self.approach_floor_m || !(self.closing_speed_epsilon > 0.0) {
            return Err(CoreError::InvalidConfig(
                "threat floors out of order or epsilon not positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = CoreConfig::from_json(
            r#"{
                "tracker": { "confirmHits": 5, "motionModel": { "type": "constant_turn", "turn_rate_dps": 3.0 } },
                "threat": { "vesselAdjustments": { "boat": 1 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.tracker.confirm_hits, 5);
        assert_eq!(
            config.tracker.motion_model,
            MotionModel::ConstantTurn { turn_rate_dps: 3.0 }
        );
        assert_eq!(config.tracker.stale_after_secs, 5.0);
        assert_eq!(config.threat.vessel_adjustments.get(&VesselType::Boat), Some(&1));
        assert_eq!(config.acoustic.window_size, 16_384);
    }

    #[test]
    fn test_linear_backend_json() {
        let config = CoreConfig::from_json(
            r#"{ "classifier": { "backend": {
                "type": "linear",
                "classes": ["ship", "boat"],
                "weights": [[1,0,0,0,0,0,0,0],[0,1,0,0,0,0,0,0]],
                "bias": [0, 0]
            } } }"#,
        )
        .unwrap();
        match config.classifier.backend {
            BackendConfig::Linear { classes, .. } => assert_eq!(classes.len(), 2),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_sections() {
        assert!(CoreConfig::from_json(r#"{ "acoustic": { "windowSize": 1000 } }"#).is_err());
        assert!(CoreConfig::from_json(r#"{ "tracker": { "expireAfterSecs": 1.0 } }"#).is_err());
        assert!(CoreConfig::from_json(r#"{ "threat": { "riskLevels": [10, 5] } }"#).is_err());
        assert!(CoreConfig::from_json("not json").is_err());
    }
}
