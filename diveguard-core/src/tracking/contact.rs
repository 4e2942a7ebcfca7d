//! One tracked contact: filter, lifecycle, classification and history.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::history::{Trail, TrailPoint};
use super::kalman::{ContactFilter, StateCovariance, StateVector};
use super::lifecycle::{ContactStatus, Lifecycle};
use super::motion::RelativeMotion;
use crate::classifier::ClassificationResult;
use crate::config::TrackerConfig;
use crate::measurement::wrap_degrees;
use crate::vessel::VesselType;
use crate::Timestamp;

/// Relative tolerance for matching an acoustic line to a classified harmonic.
const HARMONIC_MATCH_TOLERANCE: f64 = 0.03;
/// Highest harmonic order checked when matching acoustic lines.
const MAX_MATCH_ORDER: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub u64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Latest classification attached to a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationSnapshot {
    pub vessel_type: VesselType,
    /// Confidence when produced
    pub confidence: f64,
    pub blade_pass_hz: f64,
    pub blade_count: u32,
    pub rpm: f64,
    pub cavitation_level: f64,
    /// Time of the window that produced it
    pub classified_at: Timestamp,
    /// Time of the latest acoustic evidence supporting it
    pub refreshed_at: Timestamp,
}

impl ClassificationSnapshot {
    pub fn from_result(result: &ClassificationResult, timestamp: Timestamp) -> Self {
        ClassificationSnapshot {
            vessel_type: result.vessel_type,
            confidence: result.confidence,
            blade_pass_hz: result.fundamental_hz,
            blade_count: result.blade_count_estimate,
            rpm: result.rpm_estimate,
            cavitation_level: result.cavitation_level,
            classified_at: timestamp,
            refreshed_at: timestamp,
        }
    }

    /// Confidence at `now`: held for `stale_after` seconds after the last
    /// refresh, then halved every `half_life` seconds.
    pub fn confidence_at(&self, now: Timestamp, stale_after: f64, half_life: f64) -> f64 {
        let idle = now - self.refreshed_at - stale_after;
        if idle <= 0.0 {
            self.confidence
        } else {
            self.confidence * 0.5f64.powf(idle / half_life)
        }
    }

    /// True when `freq_hz` sits on a harmonic of the classified blade-pass line.
    pub fn matches_harmonic(&self, freq_hz: f64) -> bool {
        if self.blade_pass_hz <= 0.0 || freq_hz <= 0.0 {
            return false;
        }
        let order = (freq_hz / self.blade_pass_hz).round();
        if !(1.0..=MAX_MATCH_ORDER).contains(&order) {
            return false;
        }
        let expected = order * self.blade_pass_hz;
        (freq_hz - expected).abs() <= HARMONIC_MATCH_TOLERANCE * expected
    }
}

/// Acoustic cues credited to a contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticSupport {
    pub cues: u64,
    pub last_cue_at: Option<Timestamp>,
    pub last_dominant_hz: f64,
    pub last_power: f64,
}

#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) id: ContactId,
    pub(crate) filter: ContactFilter,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) created_at: Timestamp,
    /// Last measurement applied to the state
    pub(crate) last_update: Timestamp,
    /// Last ranging measurement applied
    pub(crate) last_ranging: Timestamp,
    pub(crate) classification: Option<ClassificationSnapshot>,
    pub(crate) acoustic: AcousticSupport,
    pub(crate) trail: Trail,
    pub(crate) motion: RelativeMotion,
}

impl Contact {
    pub(crate) fn new(
        id: ContactId,
        filter: ContactFilter,
        timestamp: Timestamp,
        config: &TrackerConfig,
    ) -> Self {
        let mut contact = Contact {
            id,
            filter,
            lifecycle: Lifecycle::new(config.confirm_hits),
            created_at: timestamp,
            last_update: timestamp,
            last_ranging: timestamp,
            classification: None,
            acoustic: AcousticSupport::default(),
            trail: Trail::new(config.trail_length),
            motion: RelativeMotion::Holding,
        };
        contact.record_trail(timestamp);
        contact
    }

    pub fn id(&self) -> ContactId {
        self.id
    }

    pub fn status(&self) -> ContactStatus {
        self.lifecycle.status()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    pub fn last_ranging(&self) -> Timestamp {
        self.last_ranging
    }

    pub fn state(&self) -> &StateVector {
        self.filter.state()
    }

    pub fn covariance(&self) -> &StateCovariance {
        self.filter.covariance()
    }

    pub fn classification(&self) -> Option<&ClassificationSnapshot> {
        self.classification.as_ref()
    }

    pub fn acoustic_support(&self) -> &AcousticSupport {
        &self.acoustic
    }

    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    pub fn motion(&self) -> RelativeMotion {
        self.motion
    }

    pub fn range_m(&self) -> f64 {
        self.filter.position().norm()
    }

    /// Absolute bearing (deg, [0, 360)).
    pub fn bearing_deg(&self) -> f64 {
        let x = self.filter.state();
        wrap_degrees(x[1].atan2(x[0]).to_degrees())
    }

    pub fn elevation_deg(&self) -> f64 {
        let x = self.filter.state();
        x[2].atan2(x[0].hypot(x[1])).to_degrees()
    }

    /// d(range)/dt (m/s, negative = closing).
    pub fn range_rate(&self) -> f64 {
        let p = self.filter.position();
        let r = p.norm();
        if r <= f64::EPSILON {
            return 0.0;
        }
        p.dot(&self.filter.velocity()) / r
    }

    /// Positive when approaching.
    pub fn closing_speed(&self) -> f64 {
        -self.range_rate()
    }

    /// d(bearing)/dt (deg/s, positive = clockwise).
    pub fn bearing_rate_dps(&self) -> f64 {
        let x = self.filter.state();
        let rho2 = x[0] * x[0] + x[1] * x[1];
        if rho2 <= f64::EPSILON {
            return 0.0;
        }
        ((x[0] * x[4] - x[1] * x[3]) / rho2).to_degrees()
    }

    pub fn speed_mps(&self) -> f64 {
        self.filter.velocity().norm()
    }

    pub(crate) fn record_trail(&mut self, timestamp: Timestamp) {
        let p = self.filter.position();
        self.trail.push(TrailPoint {
            timestamp,
            x: p[0],
            y: p[1],
            z: p[2],
            range_m: self.range_m(),
            bearing_deg: self.bearing_deg(),
        });
    }

    pub(crate) fn update_motion(&mut self, threshold_mps: f64) {
        self.motion = self.motion.transition(self.closing_speed(), threshold_mps);
    }

    pub fn snapshot(&self) -> ContactSnapshot {
        let x = self.filter.state();
        ContactSnapshot {
            id: self.id,
            status: self.status(),
            position: [x[0], x[1], x[2]],
            velocity: [x[3], x[4], x[5]],
            range_m: self.range_m(),
            bearing_deg: self.bearing_deg(),
            elevation_deg: self.elevation_deg(),
            range_rate_mps: self.range_rate(),
            bearing_rate_dps: self.bearing_rate_dps(),
            position_sigma_m: self.filter.covariance().fixed_view::<3, 3>(0, 0).trace().max(0.0).sqrt(),
            last_update: self.last_update,
            classification: self.classification.clone(),
            motion: self.motion,
            trail_points: self.trail.len(),
        }
    }
}

/// Serialisable read-only view of a contact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSnapshot {
    pub id: ContactId,
    pub status: ContactStatus,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub range_m: f64,
    pub bearing_deg: f64,
    pub elevation_deg: f64,
    pub range_rate_mps: f64,
    pub bearing_rate_dps: f64,
    /// √trace of the position covariance
    pub position_sigma_m: f64,
    pub last_update: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationSnapshot>,
    pub motion: RelativeMotion,
    pub trail_points: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::kalman::PolarObservation;

    fn snapshot(f0: f64) -> ClassificationSnapshot {
        ClassificationSnapshot {
            vessel_type: VesselType::Boat,
            confidence: 0.8,
            blade_pass_hz: f0,
            blade_count: 3,
            rpm: f0 * 20.0,
            cavitation_level: 0.3,
            classified_at: 10.0,
            refreshed_at: 10.0,
        }
    }

    #[test]
    fn test_contact_id_display() {
        assert_eq!(ContactId(42).to_string(), "C42");
    }

    #[test]
    fn test_confidence_decay() {
        let s = snapshot(100.0);
        assert_eq!(s.confidence_at(15.0, 10.0, 5.0), 0.8);
        assert_eq!(s.confidence_at(20.0, 10.0, 5.0), 0.8);
        assert!((s.confidence_at(25.0, 10.0, 5.0) - 0.4).abs() < 1e-12);
        assert!((s.confidence_at(30.0, 10.0, 5.0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_harmonic_match() {
        let s = snapshot(100.0);
        assert!(s.matches_harmonic(100.0));
        assert!(s.matches_harmonic(301.0));
        assert!(!s.matches_harmonic(150.0));
        assert!(!s.matches_harmonic(40.0));
        assert!(!snapshot(0.0).matches_harmonic(100.0));
    }

    #[test]
    fn test_kinematics() {
        let obs = PolarObservation::from_degrees(100.0, 90.0, 0.0, 1.0, 1.0, 1.0);
        let mut contact = Contact::new(
            ContactId(1),
            ContactFilter::from_polar(&obs, 25.0),
            0.0,
            &TrackerConfig::default(),
        );
        assert!((contact.range_m() - 100.0).abs() < 1e-9);
        assert!((contact.bearing_deg() - 90.0).abs() < 1e-9);
        assert_eq!(contact.trail().len(), 1);
        assert_eq!(contact.status(), ContactStatus::Tentative);

        // Heading straight at the robot from the east at 4 m/s
        let mut x = *contact.filter.state();
        x[4] = -4.0;
        contact.filter = ContactFilter::with_state(x, *contact.filter.covariance());
        assert!((contact.closing_speed() - 4.0).abs() < 1e-9);
        assert!(contact.bearing_rate_dps().abs() < 1e-9);

        contact.update_motion(0.3);
        assert_eq!(contact.motion(), RelativeMotion::Approaching);
    }
}
