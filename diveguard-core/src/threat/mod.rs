//! Threat Assessment
//!
//! Turns a fused contact plus its latest classification into a collision
//! threat record: time to collision, risk level, alert stage, threat
//! probability, recommendation and an evasion advisory.
//!
//! # Architecture
//!
//! Assessment is a pure function of a [`ThreatInput`] and the assessment
//! time. Records are recomputed on every cycle and never mutated.
//!
//! ```text
//! TTC = distance / closing_speed     (closing_speed > ε, else +∞)
//! risk = table(TTC) + vessel adjustment, clamped to [1, 10]
//! stage = distant (1-2) | approach (3-4) | critical (5-10), then safety floors
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use diveguard_core::{ThreatAssessmentEngine, ThreatConfig};
//!
//! let engine = ThreatAssessmentEngine::new(ThreatConfig::default());
//! if let Some(record) = tracker.assess_with(id, &engine, now) {
//!     log::warn!("{}: {}", record.contact_id, record.recommendation);
//! }
//! ```

mod evasion;
mod recommendation;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::config::ThreatConfig;
use crate::measurement::wrap_degrees;
use crate::tracking::{Contact, ContactId, ContactStatus, RelativeMotion};
use crate::vessel::VesselType;
use crate::Timestamp;

pub use evasion::{EvasionAdvice, Urgency};
pub use recommendation::{recommend, Sector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStage {
    Distant,
    Approach,
    Critical,
}

impl AlertStage {
    pub fn from_risk(risk_level: u8) -> Self {
        match risk_level {
            0..=2 => AlertStage::Distant,
            3..=4 => AlertStage::Approach,
            _ => AlertStage::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStage::Distant => "distant",
            AlertStage::Approach => "approach",
            AlertStage::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the engine reads about a contact, captured at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatInput {
    pub contact_id: ContactId,
    pub status: ContactStatus,
    /// Time of the last measurement applied to the state
    pub state_timestamp: Timestamp,
    pub distance_m: f64,
    /// Relative to own heading (deg, [0, 360))
    pub azimuth_deg: f64,
    /// Absolute (deg, [0, 360))
    pub bearing_deg: f64,
    pub elevation_deg: f64,
    /// Positive when approaching (m/s)
    pub closing_speed_mps: f64,
    pub vessel_type: VesselType,
    pub classification_confidence: f64,
    /// Time of the acoustic window the classification was derived from
    pub classification_timestamp: Option<Timestamp>,
    /// Time of the latest acoustic evidence supporting it; drives staleness
    pub classification_refreshed_at: Option<Timestamp>,
    pub motion: RelativeMotion,
}

impl ThreatInput {
    /// Capture `contact` with platform heading `heading_deg`.
    pub fn from_contact(contact: &Contact, heading_deg: f64) -> Self {
        let bearing_deg = contact.bearing_deg();
        let class = contact.classification();
        ThreatInput {
            contact_id: contact.id(),
            status: contact.status(),
            state_timestamp: contact.last_update(),
            distance_m: contact.range_m(),
            azimuth_deg: wrap_degrees(bearing_deg - heading_deg),
            bearing_deg,
            elevation_deg: contact.elevation_deg(),
            closing_speed_mps: contact.closing_speed(),
            vessel_type: class.map_or(VesselType::Unknown, |c| c.vessel_type),
            classification_confidence: class.map_or(0.0, |c| c.confidence),
            classification_timestamp: class.map(|c| c.classified_at),
            classification_refreshed_at: class.map(|c| c.refreshed_at),
            motion: contact.motion(),
        }
    }
}

/// One assessment of one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatRecord {
    pub contact_id: ContactId,
    pub assessed_at: Timestamp,
    pub state_timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_timestamp: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_refreshed_at: Option<Timestamp>,
    pub distance_m: f64,
    pub azimuth_deg: f64,
    pub bearing_deg: f64,
    pub elevation_deg: f64,
    pub closing_speed_mps: f64,
    /// +∞ when not approaching; serialised as `null`
    #[serde(
        serialize_with = "serialize_ttc",
        deserialize_with = "deserialize_ttc"
    )]
    pub time_to_collision_s: f64,
    pub risk_level: u8,
    pub stage: AlertStage,
    /// Vessel type used for the risk adjustment (`unknown` when stale)
    pub vessel_type: VesselType,
    pub classification_confidence: f64,
    pub threat_probability: f64,
    pub recommendation: String,
    pub evasion: EvasionAdvice,
    pub motion: RelativeMotion,
}

impl ThreatRecord {
    pub fn is_approaching(&self) -> bool {
        self.time_to_collision_s.is_finite()
    }
}

fn serialize_ttc<S>(ttc: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if ttc.is_finite() {
        serializer.serialize_some(ttc)
    } else {
        serializer.serialize_none()
    }
}

fn deserialize_ttc<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or(f64::INFINITY))
}

#[derive(Debug, Clone)]
pub struct ThreatAssessmentEngine {
    config: ThreatConfig,
}

impl ThreatAssessmentEngine {
    pub fn new(config: ThreatConfig) -> Self {
        ThreatAssessmentEngine { config }
    }

    pub fn config(&self) -> &ThreatConfig {
        &self.config
    }

    pub fn time_to_collision(&self, distance_m: f64, closing_speed_mps: f64) -> f64 {
        if closing_speed_mps > self.config.closing_speed_epsilon {
            distance_m / closing_speed_mps
        } else {
            f64::INFINITY
        }
    }

    /// Risk from the TTC table, before any vessel adjustment.
    pub fn base_risk(&self, ttc_s: f64) -> u8 {
        let band = self
            .config
            .ttc_thresholds_secs
            .iter()
            .position(|&limit| ttc_s < limit)
            .unwrap_or(self.config.ttc_thresholds_secs.len());
        self.config.risk_levels.get(band).copied().unwrap_or(1)
    }

    pub fn adjusted_risk(&self, base_risk: u8, vessel_type: VesselType) -> u8 {
        let offset = self
            .config
            .vessel_adjustments
            .get(&vessel_type)
            .copied()
            .unwrap_or(0);
        (base_risk as i32 + offset).clamp(1, 10) as u8
    }

    /// Stage from the risk level, raised by the distance and speed floors.
    pub fn stage(&self, risk_level: u8, distance_m: f64, closing_speed_mps: f64) -> AlertStage {
        let mut stage = AlertStage::from_risk(risk_level);
        if distance_m < self.config.approach_floor_m {
            stage = stage.max(AlertStage::Approach);
        }
        if distance_m < self.config.critical_floor_m
            || closing_speed_mps > self.config.critical_closing_speed_mps
        {
            stage = AlertStage::Critical;
        }
        stage
    }

    /// Vessel type to assess with: the classified one while fresh, else unknown.
    pub fn effective_vessel_type(&self, input: &ThreatInput, now: Timestamp) -> VesselType {
        match input.classification_refreshed_at {
            Some(at) if now - at <= self.config.classification_max_age_secs => input.vessel_type,
            _ => VesselType::Unknown,
        }
    }

    pub fn assess_input(&self, input: &ThreatInput, now: Timestamp) -> ThreatRecord {
        let vessel_type = self.effective_vessel_type(input, now);
        let ttc = self.time_to_collision(input.distance_m, input.closing_speed_mps);
        let risk_level = self.adjusted_risk(self.base_risk(ttc), vessel_type);
        let stage = self.stage(risk_level, input.distance_m, input.closing_speed_mps);

        ThreatRecord {
            contact_id: input.contact_id,
            assessed_at: now,
            state_timestamp: input.state_timestamp,
            classification_timestamp: input.classification_timestamp,
            classification_refreshed_at: input.classification_refreshed_at,
            distance_m: input.distance_m,
            azimuth_deg: input.azimuth_deg,
            bearing_deg: input.bearing_deg,
            elevation_deg: input.elevation_deg,
            closing_speed_mps: input.closing_speed_mps,
            time_to_collision_s: ttc,
            risk_level,
            stage,
            vessel_type,
            classification_confidence: if vessel_type.is_known() {
                input.classification_confidence
            } else {
                0.0
            },
            threat_probability: threat_probability(
                ttc,
                input.closing_speed_mps,
                self.config.closing_speed_epsilon,
                self.config.critical_closing_speed_mps,
                vessel_type,
            ),
            recommendation: recommend(
                risk_level,
                input.azimuth_deg,
                vessel_type,
                input.distance_m,
                input.closing_speed_mps,
            ),
            evasion: EvasionAdvice::for_threat(
                risk_level,
                input.azimuth_deg,
                input.bearing_deg,
                input.elevation_deg,
            ),
            motion: input.motion,
        }
    }

    /// Assess a contact directly. The classification confidence is taken
    /// as stored; use `ContactTracker::assess_with` for the decayed value.
    pub fn assess(&self, contact: &Contact, heading_deg: f64, now: Timestamp) -> ThreatRecord {
        self.assess_input(&ThreatInput::from_contact(contact, heading_deg), now)
    }
}

/// Probability in [0, 1] that the contact will actually reach the platform.
pub fn threat_probability(
    ttc_s: f64,
    closing_speed_mps: f64,
    closing_epsilon: f64,
    fast_closing_mps: f64,
    vessel_type: VesselType,
) -> f64 {
    let mut p: f64 = if ttc_s < 5.0 {
        0.95
    } else if ttc_s < 15.0 {
        0.70
    } else if ttc_s < 60.0 {
        0.40
    } else if ttc_s < 300.0 {
        0.10
    } else {
        0.01
    };

    if closing_speed_mps <= closing_epsilon {
        p *= 0.1;
    } else if closing_speed_mps > fast_closing_mps {
        p = (p * 1.5).min(0.99);
    }

    match vessel_type {
        VesselType::Submarine => p = (p * 1.3).min(0.99),
        VesselType::Rov | VesselType::Auv => p *= 0.5,
        _ => {}
    }
    p.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(distance_m: f64, closing_speed_mps: f64, vessel_type: VesselType) -> ThreatInput {
        ThreatInput {
            contact_id: ContactId(1),
            status: ContactStatus::Confirmed,
            state_timestamp: 100.0,
            distance_m,
            azimuth_deg: 10.0,
            bearing_deg: 100.0,
            elevation_deg: 0.0,
            closing_speed_mps,
            vessel_type,
            classification_confidence: 0.8,
            classification_timestamp: Some(96.0),
            classification_refreshed_at: Some(98.0),
            motion: RelativeMotion::Approaching,
        }
    }

    fn engine() -> ThreatAssessmentEngine {
        ThreatAssessmentEngine::new(ThreatConfig::default())
    }

    #[test]
    fn test_close_fast_boat() {
        let record = engine().assess_input(&input(40.0, 6.0, VesselType::Boat), 100.0);
        assert!((record.time_to_collision_s - 40.0 / 6.0).abs() < 1e-9);
        assert_eq!(record.risk_level, 8);
        assert_eq!(record.stage, AlertStage::Critical);
        assert_eq!(record.vessel_type, VesselType::Boat);
        assert!(record.recommendation.contains("collision in 6.7 s"));
    }

    #[test]
    fn test_distant_slow_contact() {
        let record = engine().assess_input(&input(500.0, 0.05, VesselType::Boat), 100.0);
        assert_eq!(record.time_to_collision_s, f64::INFINITY);
        assert!(!record.is_approaching());
        assert_eq!(record.risk_level, 1);
        assert_eq!(record.stage, AlertStage::Distant);
    }

    #[test]
    fn test_submarine_adjustment() {
        let engine = engine();
        let record = engine.assess_input(&input(120.0, 4.0, VesselType::Submarine), 100.0);
        assert!((record.time_to_collision_s - 30.0).abs() < 1e-9);
        assert_eq!(engine.base_risk(record.time_to_collision_s), 5);
        assert_eq!(record.risk_level, 7);
        assert_eq!(record.stage, AlertStage::Critical);
    }

    #[test]
    fn test_rov_adjustment_clamped() {
        let engine = engine();
        assert_eq!(engine.adjusted_risk(1, VesselType::Rov), 1);
        assert_eq!(engine.adjusted_risk(10, VesselType::Submarine), 10);
        assert_eq!(engine.adjusted_risk(8, VesselType::Ship), 8);
    }

    #[test]
    fn test_risk_table_edges() {
        let engine = engine();
        assert_eq!(engine.base_risk(4.99), 10);
        assert_eq!(engine.base_risk(5.0), 8);
        assert_eq!(engine.base_risk(14.9), 8);
        assert_eq!(engine.base_risk(59.9), 5);
        assert_eq!(engine.base_risk(60.0), 1);
        assert_eq!(engine.base_risk(f64::INFINITY), 1);
        assert_eq!(engine.time_to_collision(100.0, 0.1), f64::INFINITY);
        assert_eq!(engine.time_to_collision(100.0, -3.0), f64::INFINITY);
    }

    #[test]
    fn test_safety_floors() {
        let engine = engine();
        // Receding but close
        assert_eq!(engine.stage(1, 45.0, -1.0), AlertStage::Critical);
        assert_eq!(engine.stage(1, 100.0, -1.0), AlertStage::Approach);
        assert_eq!(engine.stage(1, 150.0, -1.0), AlertStage::Distant);
        // Fast closing far away
        assert_eq!(engine.stage(1, 1000.0, 5.5), AlertStage::Critical);
        assert_eq!(engine.stage(4, 1000.0, 5.0), AlertStage::Approach);
    }

    #[test]
    fn test_stale_classification_is_unknown() {
        let engine = engine();
        let mut sub = input(120.0, 4.0, VesselType::Submarine);
        sub.classification_refreshed_at = Some(80.0);
        let record = engine.assess_input(&sub, 100.0);
        assert_eq!(record.vessel_type, VesselType::Unknown);
        assert_eq!(record.risk_level, 5);
        assert_eq!(record.classification_confidence, 0.0);

        sub.classification_refreshed_at = None;
        assert_eq!(engine.assess_input(&sub, 100.0).vessel_type, VesselType::Unknown);

        sub.classification_refreshed_at = Some(85.0);
        assert_eq!(engine.assess_input(&sub, 100.0).vessel_type, VesselType::Submarine);

        // An old window kept fresh by supporting cues still counts
        sub.classification_timestamp = Some(40.0);
        let record = engine.assess_input(&sub, 100.0);
        assert_eq!(record.vessel_type, VesselType::Submarine);
        assert_eq!(record.classification_timestamp, Some(40.0));
        assert_eq!(record.classification_refreshed_at, Some(85.0));
    }

    #[test]
    fn test_assessment_is_pure() {
        let engine = engine();
        let threat = input(75.0, 2.5, VesselType::Ship);
        let first = engine.assess_input(&threat, 100.0);
        let second = engine.assess_input(&threat, 100.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_threat_probability() {
        let p = threat_probability(3.0, 8.0, 0.1, 5.0, VesselType::Submarine);
        assert!((p - 0.99).abs() < 1e-12);
        let p = threat_probability(f64::INFINITY, 0.0, 0.1, 5.0, VesselType::Boat);
        assert!((p - 0.001).abs() < 1e-12);
        let p = threat_probability(30.0, 2.0, 0.1, 5.0, VesselType::Rov);
        assert!((p - 0.2).abs() < 1e-12);
        let p = threat_probability(100.0, 1.0, 0.1, 5.0, VesselType::Ship);
        assert!((p - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_infinite_ttc_serialises_as_null() {
        let record = engine().assess_input(&input(500.0, 0.0, VesselType::Boat), 100.0);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["timeToCollisionS"].is_null());
        assert_eq!(json["stage"], "distant");

        let back: ThreatRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.time_to_collision_s, f64::INFINITY);
    }
}
