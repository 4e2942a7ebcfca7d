//! Operator-facing recommendation text.

use crate::measurement::wrap_degrees;
use crate::vessel::VesselType;

/// Sector of a platform-relative azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sector {
    Ahead,
    Starboard,
    Astern,
    Port,
}

impl Sector {
    pub fn from_azimuth(azimuth_deg: f64) -> Self {
        let az = wrap_degrees(azimuth_deg);
        if !(45.0..=315.0).contains(&az) {
            Sector::Ahead
        } else if az < 135.0 {
            Sector::Starboard
        } else if az < 225.0 {
            Sector::Astern
        } else {
            Sector::Port
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Ahead => "ahead",
            Sector::Starboard => "to starboard",
            Sector::Astern => "astern",
            Sector::Port => "to port",
        }
    }
}

/// Recommendation for an assessed contact. Depends on its arguments only.
pub fn recommend(
    risk_level: u8,
    azimuth_deg: f64,
    vessel_type: VesselType,
    distance_m: f64,
    closing_speed_mps: f64,
) -> String {
    let sector = Sector::from_azimuth(azimuth_deg).as_str();
    let vessel = vessel_type.as_str();
    let ttc = if closing_speed_mps > 0.0 {
        distance_m / closing_speed_mps
    } else {
        f64::INFINITY
    };

    match risk_level {
        9.. => format!(
            "CRITICAL: {} {} at {:.0} m closing at {:.1} m/s. Leave the area immediately.",
            vessel.to_uppercase(),
            sector,
            distance_m,
            closing_speed_mps
        ),
        7..=8 if ttc < 10.0 => format!(
            "HIGH RISK: {} {} at {:.0} m, collision in {:.1} s. Evade now.",
            vessel, sector, distance_m, ttc
        ),
        7..=8 => format!(
            "HIGH RISK: {} {} at {:.0} m. Prepare to manoeuvre.",
            vessel, sector, distance_m
        ),
        5..=6 => format!(
            "MEDIUM RISK: {} {} at {:.0} m. Monitor its course.",
            vessel, sector, distance_m
        ),
        3..=4 => format!("LOW RISK: {} {} at {:.0} m. Stay alert.", vessel, sector, distance_m),
        _ => format!("Vessel {} at {:.0} m. No danger.", sector, distance_m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sectors() {
        assert_eq!(Sector::from_azimuth(0.0), Sector::Ahead);
        assert_eq!(Sector::from_azimuth(350.0), Sector::Ahead);
        assert_eq!(Sector::from_azimuth(-20.0), Sector::Ahead);
        assert_eq!(Sector::from_azimuth(90.0), Sector::Starboard);
        assert_eq!(Sector::from_azimuth(180.0), Sector::Astern);
        assert_eq!(Sector::from_azimuth(270.0), Sector::Port);
        assert_eq!(Sector::from_azimuth(315.0), Sector::Port);
    }

    #[test]
    fn test_tiers() {
        let text = recommend(10, 0.0, VesselType::Submarine, 30.0, 8.0);
        assert!(text.starts_with("CRITICAL: SUBMARINE ahead"));

        let text = recommend(8, 90.0, VesselType::Boat, 40.0, 6.0);
        assert!(text.contains("collision in 6.7 s"));
        assert!(text.contains("to starboard"));

        let text = recommend(8, 90.0, VesselType::Boat, 200.0, 6.0);
        assert!(text.contains("Prepare to manoeuvre"));

        assert!(recommend(5, 180.0, VesselType::Ship, 300.0, 1.0).starts_with("MEDIUM RISK"));
        assert!(recommend(3, 270.0, VesselType::Rov, 100.0, 1.0).starts_with("LOW RISK"));
        assert!(recommend(1, 270.0, VesselType::Unknown, 500.0, 0.0).ends_with("No danger."));
    }

    #[test]
    fn test_pure() {
        let a = recommend(7, 12.0, VesselType::Auv, 80.0, 2.0);
        let b = recommend(7, 12.0, VesselType::Auv, 80.0, 2.0);
        assert_eq!(a, b);
    }
}
