//! Evasion advisory attached to each threat record. Advisory only: the core
//! never drives thrusters.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::measurement::wrap_degrees;

/// Threats more than this far above or below the horizon get a depth change (deg)
const VERTICAL_ESCAPE_ELEVATION_DEG: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Slow,
    Normal,
    Fast,
    Emergency,
}

impl Urgency {
    pub fn from_risk(risk_level: u8) -> Self {
        match risk_level {
            9.. => Urgency::Emergency,
            7..=8 => Urgency::Fast,
            5..=6 => Urgency::Normal,
            _ => Urgency::Slow,
        }
    }

    /// Thrust as a percentage of maximum.
    pub fn speed_percent(&self) -> u8 {
        match self {
            Urgency::Emergency => 100,
            Urgency::Fast => 80,
            Urgency::Normal => 60,
            Urgency::Slow => 40,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Slow => "slow",
            Urgency::Normal => "normal",
            Urgency::Fast => "fast",
            Urgency::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvasionAdvice {
    /// Course away from the threat, relative to own heading (deg, [0, 360))
    pub relative_heading_deg: f64,
    /// Same course as an absolute bearing (deg, [0, 360))
    pub heading_deg: f64,
    /// Positive = go deeper (m)
    pub depth_change_m: f64,
    /// Positive = nose up (deg)
    pub pitch_deg: f64,
    pub speed_percent: u8,
    pub urgency: Urgency,
}

impl EvasionAdvice {
    /// Turn away from the threat; dive under a threat well above, climb
    /// away from one well below.
    pub fn for_threat(risk_level: u8, azimuth_deg: f64, bearing_deg: f64, elevation_deg: f64) -> Self {
        let (depth_change_m, pitch_deg) = if elevation_deg > VERTICAL_ESCAPE_ELEVATION_DEG {
            (20.0, -10.0)
        } else if elevation_deg < -VERTICAL_ESCAPE_ELEVATION_DEG {
            (-10.0, 10.0)
        } else {
            (0.0, 0.0)
        };
        let urgency = Urgency::from_risk(risk_level);

        EvasionAdvice {
            relative_heading_deg: wrap_degrees(azimuth_deg + 180.0),
            heading_deg: wrap_degrees(bearing_deg + 180.0),
            depth_change_m,
            pitch_deg,
            speed_percent: urgency.speed_percent(),
            urgency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_away() {
        let advice = EvasionAdvice::for_threat(8, 30.0, 120.0, 0.0);
        assert_eq!(advice.relative_heading_deg, 210.0);
        assert_eq!(advice.heading_deg, 300.0);
        assert_eq!(advice.depth_change_m, 0.0);
        assert_eq!(advice.urgency, Urgency::Fast);
        assert_eq!(advice.speed_percent, 80);

        let advice = EvasionAdvice::for_threat(1, 270.0, 270.0, 0.0);
        assert_eq!(advice.relative_heading_deg, 90.0);
        assert_eq!(advice.urgency, Urgency::Slow);
    }

    #[test]
    fn test_vertical_escape() {
        let above = EvasionAdvice::for_threat(10, 0.0, 0.0, 45.0);
        assert_eq!((above.depth_change_m, above.pitch_deg), (20.0, -10.0));
        assert_eq!(above.speed_percent, 100);

        let below = EvasionAdvice::for_threat(5, 0.0, 0.0, -40.0);
        assert_eq!((below.depth_change_m, below.pitch_deg), (-10.0, 10.0));
        assert_eq!(below.urgency, Urgency::Normal);

        let level = EvasionAdvice::for_threat(5, 0.0, 0.0, 30.0);
        assert_eq!(level.depth_change_m, 0.0);
    }

    #[test]
    fn test_urgency_tiers() {
        let tiers: Vec<u8> = (1..=10).map(|r| Urgency::from_risk(r).speed_percent()).collect();
        assert_eq!(tiers, vec![40, 40, 40, 40, 60, 60, 80, 80, 100, 100]);
    }
}
