//! Contact Trail History
//!
//! Bounded circular buffer of fused positions per contact, for display and
//! for motion analysis over a longer baseline than the filter's velocity.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailPoint {
    pub timestamp: Timestamp,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub range_m: f64,
    /// Absolute bearing (deg)
    pub bearing_deg: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trail {
    points: VecDeque<TrailPoint>,
    #[serde(skip)]
    capacity: usize,
}

impl Trail {
    pub fn new(capacity: usize) -> Self {
        Trail {
            points: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, point: TrailPoint) {
        if self.capacity == 0 {
            return;
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&TrailPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailPoint> {
        self.points.iter()
    }

    /// Mean closing speed over the whole trail (m/s, positive = closing).
    /// `None` with fewer than two points or no elapsed time.
    pub fn mean_closing_speed(&self) -> Option<f64> {
        let first = self.points.front()?;
        let last = self.points.back()?;
        let dt = last.timestamp - first.timestamp;
        if dt <= 0.0 {
            return None;
        }
        Some((first.range_m - last.range_m) / dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp: f64, range_m: f64) -> TrailPoint {
        TrailPoint {
            timestamp,
            x: range_m,
            y: 0.0,
            z: 0.0,
            range_m,
            bearing_deg: 0.0,
        }
    }

    #[test]
    fn test_bounded() {
        let mut trail = Trail::new(3);
        for i in 0..5 {
            trail.push(point(i as f64, 100.0 - i as f64));
        }
        assert_eq!(trail.len(), 3);
        assert_eq!(trail.iter().next().map(|p| p.timestamp), Some(2.0));
        assert_eq!(trail.latest().map(|p| p.timestamp), Some(4.0));
    }

    #[test]
    fn test_mean_closing_speed() {
        let mut trail = Trail::new(10);
        assert_eq!(trail.mean_closing_speed(), None);
        trail.push(point(0.0, 100.0));
        assert_eq!(trail.mean_closing_speed(), None);
        trail.push(point(4.0, 80.0));
        assert_eq!(trail.mean_closing_speed(), Some(5.0));
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut trail = Trail::new(0);
        trail.push(point(0.0, 1.0));
        assert!(trail.is_empty());
    }
}
