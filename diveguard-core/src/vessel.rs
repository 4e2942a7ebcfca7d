//! Vessel categories recognised by the signature classifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VesselType {
    /// Large commercial ship, low BPF
    Ship,
    Submarine,
    /// Small fast surface boat
    Boat,
    /// Another remotely operated vehicle
    Rov,
    Auv,
    Unknown,
}

impl Default for VesselType {
    fn default() -> Self {
        VesselType::Unknown
    }
}

impl VesselType {
    /// Every concrete class, in the order the built-in backends report them.
    pub const CLASSES: [VesselType; 5] = [
        VesselType::Ship,
        VesselType::Submarine,
        VesselType::Boat,
        VesselType::Rov,
        VesselType::Auv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VesselType::Ship => "ship",
            VesselType::Submarine => "submarine",
            VesselType::Boat => "boat",
            VesselType::Rov => "rov",
            VesselType::Auv => "auv",
            VesselType::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != VesselType::Unknown
    }
}

impl fmt::Display for VesselType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VesselType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ship" => Ok(VesselType::Ship),
            "submarine" => Ok(VesselType::Submarine),
            "boat" => Ok(VesselType::Boat),
            "rov" => Ok(VesselType::Rov),
            "auv" => Ok(VesselType::Auv),
            "unknown" => Ok(VesselType::Unknown),
            other => Err(format!("unknown vessel type '{}'", other)),
        }
    }
}
