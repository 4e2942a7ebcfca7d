//! Relative Motion State
//!
//! Classifies a contact as approaching, receding or holding from its closing
//! speed, with hysteresis so a speed hovering near the threshold does not
//! flap between states.

use serde::{Deserialize, Serialize};

/// Fraction of the entry threshold a state must drop below before it is left.
const EXIT_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeMotion {
    Holding,
    Approaching,
    Receding,
}

impl Default for RelativeMotion {
    fn default() -> Self {
        RelativeMotion::Holding
    }
}

impl RelativeMotion {
    /// Next state for closing speed `closing_mps` (positive = approaching).
    ///
    /// Entering a state needs `|closing| > threshold`; leaving it needs the
    /// speed to fall below `threshold · EXIT_RATIO` or to cross into the
    /// opposite state.
    pub fn transition(&self, closing_mps: f64, threshold: f64) -> RelativeMotion {
        let exit = threshold * EXIT_RATIO;
        match self {
            RelativeMotion::Holding => {
                if closing_mps > threshold {
                    RelativeMotion::Approaching
                } else if closing_mps < -threshold {
                    RelativeMotion::Receding
                } else {
                    *self
                }
            }
            RelativeMotion::Approaching => {
                if closing_mps < -threshold {
                    RelativeMotion::Receding
                } else if closing_mps < exit {
                    RelativeMotion::Holding
                } else {
                    *self
                }
            }
            RelativeMotion::Receding => {
                if closing_mps > threshold {
                    RelativeMotion::Approaching
                } else if closing_mps > -exit {
                    RelativeMotion::Holding
                } else {
                    *self
                }
            }
        }
    }

    pub fn is_approaching(&self) -> bool {
        matches!(self, RelativeMotion::Approaching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_approaching() {
        let state = RelativeMotion::Holding;
        assert_eq!(state.transition(0.2, 0.3), RelativeMotion::Holding);
        assert_eq!(state.transition(0.5, 0.3), RelativeMotion::Approaching);
        assert_eq!(state.transition(-0.5, 0.3), RelativeMotion::Receding);
    }

    #[test]
    fn test_hysteresis_holds_state() {
        let state = RelativeMotion::Approaching;
        // Below entry threshold but above exit threshold
        assert_eq!(state.transition(0.2, 0.3), RelativeMotion::Approaching);
        assert_eq!(state.transition(0.1, 0.3), RelativeMotion::Holding);

        let state = RelativeMotion::Receding;
        assert_eq!(state.transition(-0.2, 0.3), RelativeMotion::Receding);
        assert_eq!(state.transition(-0.1, 0.3), RelativeMotion::Holding);
    }

    #[test]
    fn test_direct_reversal() {
        assert_eq!(
            RelativeMotion::Approaching.transition(-2.0, 0.3),
            RelativeMotion::Receding
        );
        assert_eq!(
            RelativeMotion::Receding.transition(2.0, 0.3),
            RelativeMotion::Approaching
        );
    }
}
