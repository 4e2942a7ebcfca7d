//! Majority-vote smoothing of per-window classifications.

use std::collections::{BTreeMap, VecDeque};

use super::ClassificationResult;
use crate::vessel::VesselType;

/// Holds the last N results for one acoustic stream.
///
/// The smoothed type is the majority vote over the window; its confidence is
/// the window mean with non-winning entries counted as zero. An `unknown`
/// latest result is returned unchanged, so smoothing never upgrades it.
#[derive(Debug, Clone)]
pub struct ClassificationSmoother {
    window: usize,
    confidence_threshold: f64,
    history: VecDeque<ClassificationResult>,
}

impl ClassificationSmoother {
    pub fn new(window: usize, confidence_threshold: f64) -> Self {
        let window = window.max(1);
        ClassificationSmoother {
            window,
            confidence_threshold,
            history: VecDeque::with_capacity(window),
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn push(&mut self, result: ClassificationResult) -> ClassificationResult {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(result.clone());

        if result.vessel_type == VesselType::Unknown {
            return result;
        }

        let mut votes: BTreeMap<VesselType, usize> = BTreeMap::new();
        for r in &self.history {
            *votes.entry(r.vessel_type).or_default() += 1;
        }
        let top = votes.values().copied().max().unwrap_or(0);
        // Ties go to the most recent of the tied types
        let winner = self
            .history
            .iter()
            .rev()
            .map(|r| r.vessel_type)
            .find(|t| votes.get(t) == Some(&top))
            .unwrap_or(result.vessel_type);

        let n = self.history.len() as f64;
        let winners: Vec<&ClassificationResult> =
            self.history.iter().filter(|r| r.vessel_type == winner).collect();
        let confidence = winners.iter().map(|r| r.confidence).sum::<f64>() / n;

        let fundamental_hz =
            mean_of(winners.iter().map(|r| r.fundamental_hz).filter(|v| *v > 0.0));
        let blades = mean_of(
            winners
                .iter()
                .filter(|r| r.blade_count_estimate > 0)
                .map(|r| r.blade_count_estimate as f64),
        );
        let cavitation_level = mean_of(winners.iter().map(|r| r.cavitation_level));
        // rpm follows from the smoothed line and blade count, not its own mean
        let blade_count_estimate = blades.round() as u32;
        let rpm_estimate = if blade_count_estimate > 0 && fundamental_hz > 0.0 {
            fundamental_hz * 60.0 / blade_count_estimate as f64
        } else {
            0.0
        };

        let vessel_type = if winner != VesselType::Unknown && confidence >= self.confidence_threshold {
            winner
        } else {
            VesselType::Unknown
        };

        ClassificationResult {
            vessel_type,
            confidence,
            rpm_estimate,
            blade_count_estimate,
            cavitation_level,
            fundamental_hz,
            probabilities: result.probabilities,
        }
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
