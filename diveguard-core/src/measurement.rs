//! Sensor Measurements
//!
//! Timestamped observations from the three sensor modalities. Measurements are
//! plain immutable values; [`Measurement::validate`] is the single admission
//! check applied before anything reaches a contact.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Timestamp;

/// Ranging sensor return (platform-relative bearing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBearing {
    pub timestamp: Timestamp,
    pub range_m: f64,
    /// Relative to the robot's bow, clockwise, [0, 360)
    pub azimuth_deg: f64,
    /// Positive up, [-90, 90]
    pub elevation_deg: f64,
    /// Range variance (m²)
    pub range_variance: f64,
    /// Variance applied to both azimuth and elevation (deg²)
    pub angle_variance: f64,
}

/// Dominant spectral line reported for one acoustic window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticPeak {
    pub timestamp: Timestamp,
    pub dominant_freq_hz: f64,
    pub power: f64,
    pub spectral_centroid_hz: f64,
    /// Direction of arrival, for hydrophone arrays that provide one (absolute, deg)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing_variance: Option<f64>,
}

/// Platform heading from the inertial/compass unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InertialHeading {
    pub timestamp: Timestamp,
    pub heading_deg: f64,
    pub heading_variance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Ranging,
    Acoustic,
    Inertial,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    RangeBearing(RangeBearing),
    AcousticPeak(AcousticPeak),
    InertialHeading(InertialHeading),
}

impl Measurement {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Measurement::RangeBearing(m) => m.timestamp,
            Measurement::AcousticPeak(m) => m.timestamp,
            Measurement::InertialHeading(m) => m.timestamp,
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            Measurement::RangeBearing(_) => Modality::Ranging,
            Measurement::AcousticPeak(_) => Modality::Acoustic,
            Measurement::InertialHeading(_) => Modality::Inertial,
        }
    }

    /// Reject malformed input before it can reach any contact.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_finite("timestamp", self.timestamp())?;
        match self {
            Measurement::RangeBearing(m) => m.validate(),
            Measurement::AcousticPeak(m) => m.validate(),
            Measurement::InertialHeading(m) => m.validate(),
        }
    }
}

impl RangeBearing {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_finite("range", self.range_m)?;
        check_finite("azimuth", self.azimuth_deg)?;
        check_finite("elevation", self.elevation_deg)?;
        if self.range_m <= 0.0 {
            return Err(CoreError::InvalidMeasurement(format!(
                "range must be positive, got {}",
                self.range_m
            )));
        }
        if !(0.0..360.0).contains(&self.azimuth_deg) {
            return Err(CoreError::InvalidMeasurement(format!(
                "azimuth {} outside [0, 360)",
                self.azimuth_deg
            )));
        }
        if !(-90.0..=90.0).contains(&self.elevation_deg) {
            return Err(CoreError::InvalidMeasurement(format!(
                "elevation {} outside [-90, 90]",
                self.elevation_deg
            )));
        }
        check_variance("range variance", self.range_variance)?;
        check_variance("angle variance", self.angle_variance)
    }
}

impl AcousticPeak {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_finite("dominant frequency", self.dominant_freq_hz)?;
        check_finite("power", self.power)?;
        check_finite("spectral centroid", self.spectral_centroid_hz)?;
        if self.dominant_freq_hz < 0.0 || self.power < 0.0 {
            return Err(CoreError::InvalidMeasurement(
                "acoustic peak frequency and power must be non-negative".into(),
            ));
        }
        if let Some(bearing) = self.bearing_deg {
            if !bearing.is_finite() || !(0.0..360.0).contains(&bearing) {
                return Err(CoreError::InvalidMeasurement(format!(
                    "acoustic bearing {} outside [0, 360)",
                    bearing
                )));
            }
        }
        if let Some(var) = self.bearing_variance {
            check_variance("bearing variance", var)?;
        }
        Ok(())
    }
}

impl InertialHeading {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_finite("heading", self.heading_deg)?;
        if !(0.0..360.0).contains(&self.heading_deg) {
            return Err(CoreError::InvalidMeasurement(format!(
                "heading {} outside [0, 360)",
                self.heading_deg
            )));
        }
        check_variance("heading variance", self.heading_variance)
    }
}

fn check_finite(name: &str, value: f64) -> Result<(), CoreError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CoreError::InvalidMeasurement(format!("{} is not finite", name)))
    }
}

fn check_variance(name: &str, value: f64) -> Result<(), CoreError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidMeasurement(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

/// Wrap an angle in degrees to [0, 360).
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
