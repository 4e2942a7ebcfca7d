//! Heading reference for the relative → absolute bearing transform.

use std::collections::VecDeque;

use crate::measurement::{wrap_degrees, InertialHeading};
use crate::Timestamp;

const HEADING_HISTORY: usize = 256;

/// Bearing rotation applied to a ranging measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCorrection {
    pub heading_deg: f64,
    pub heading_variance: f64,
}

impl FrameCorrection {
    pub const IDENTITY: FrameCorrection = FrameCorrection {
        heading_deg: 0.0,
        heading_variance: 0.0,
    };

    pub fn to_absolute(&self, relative_deg: f64) -> f64 {
        wrap_degrees(relative_deg + self.heading_deg)
    }

    pub fn to_relative(&self, absolute_deg: f64) -> f64 {
        wrap_degrees(absolute_deg - self.heading_deg)
    }
}

/// Recent headings in timestamp order.
#[derive(Debug, Clone, Default)]
pub struct HeadingReference {
    samples: VecDeque<InertialHeading>,
}

impl HeadingReference {
    pub fn new() -> Self {
        HeadingReference {
            samples: VecDeque::with_capacity(HEADING_HISTORY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&InertialHeading> {
        self.samples.back()
    }

    /// Store a heading. Returns false, storing nothing, when it is not newer
    /// than the latest one held.
    pub fn push(&mut self, heading: InertialHeading) -> bool {
        if let Some(last) = self.samples.back() {
            if heading.timestamp <= last.timestamp {
                return false;
            }
        }
        if self.samples.len() == HEADING_HISTORY {
            self.samples.pop_front();
        }
        self.samples.push_back(heading);
        true
    }

    /// Latest heading at or before `timestamp`. Before the first stored
    /// heading the oldest one is used; with no heading at all the frames
    /// coincide.
    pub fn correction_at(&self, timestamp: Timestamp) -> FrameCorrection {
        let sample = self
            .samples
            .iter()
            .rev()
            .find(|h| h.timestamp <= timestamp)
            .or_else(|| self.samples.front());
        match sample {
            Some(h) => FrameCorrection {
                heading_deg: h.heading_deg,
                heading_variance: h.heading_variance,
            },
            None => FrameCorrection::IDENTITY,
        }
    }

    pub fn current(&self) -> FrameCorrection {
        match self.latest() {
            Some(h) => FrameCorrection {
                heading_deg: h.heading_deg,
                heading_variance: h.heading_variance,
            },
            None => FrameCorrection::IDENTITY,
        }
    }
}
