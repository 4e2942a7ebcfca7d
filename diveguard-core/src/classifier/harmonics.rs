//! Blade-pass frequency analysis.
//!
//! A propeller with B blades turning at N rpm radiates a line at
//! BPF = N·B/60 and its integer multiples. The fundamental is the strongest
//! low-frequency peak that carries a harmonic series; a weaker sub-harmonic
//! series that also explains it wins, so the estimate is the lowest strong
//! fundamental.

use serde::{Deserialize, Serialize};

use crate::acoustic::SpectralPeak;

/// Sub-harmonic must carry at least this fraction of the candidate's power.
const SUBHARMONIC_MIN_POWER_RATIO: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicEstimate {
    /// Least-squares fundamental over the matched harmonics (Hz)
    pub fundamental_hz: f64,
    /// Harmonic orders observed (1 = fundamental)
    pub orders: Vec<u32>,
    pub blade_count: u32,
    pub rpm: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct HarmonicSearch {
    pub cutoff_hz: f64,
    /// Relative tolerance on k·f₀
    pub tolerance: f64,
    /// Absolute tolerance floor, normally the spectral resolution
    pub min_tolerance_hz: f64,
    pub max_orders: u32,
}

impl HarmonicSearch {
    pub fn estimate(&self, peaks: &[SpectralPeak]) -> Option<HarmonicEstimate> {
        let mut candidates: Vec<&SpectralPeak> = peaks
            .iter()
            .filter(|p| p.frequency_hz > 0.0 && p.frequency_hz < self.cutoff_hz)
            .collect();
        candidates.sort_by(|a, b| b.power.total_cmp(&a.power));

        let (base, matches) = candidates.iter().find_map(|c| {
            let matches = self.series(peaks, c.frequency_hz);
            (matches.len() >= 2).then_some((**c, matches))
        })?;

        let (_, matches) = (2..=self.max_orders)
            .rev()
            .filter_map(|d| {
                let sub = base.frequency_hz / d as f64;
                let peak = self.nearest(peaks, sub)?;
                if peak.power < base.power * SUBHARMONIC_MIN_POWER_RATIO {
                    return None;
                }
                let series = self.series(peaks, peak.frequency_hz);
                (series.len() >= 2).then_some((peak.frequency_hz, series))
            })
            .next()
            .unwrap_or((base.frequency_hz, matches));

        let num: f64 = matches.iter().map(|(k, f)| *k as f64 * f).sum();
        let den: f64 = matches.iter().map(|(k, _)| (*k as f64).powi(2)).sum();
        let fundamental_hz = num / den;

        let orders: Vec<u32> = matches.iter().map(|(k, _)| *k).collect();
        let blade_count = (orders.len() as u32).min(self.max_orders);
        Some(HarmonicEstimate {
            fundamental_hz,
            rpm: fundamental_hz * 60.0 / blade_count as f64,
            blade_count,
            orders,
        })
    }

    /// Harmonic orders of `f0` present in `peaks`, with the matched frequency.
    fn series(&self, peaks: &[SpectralPeak], f0: f64) -> Vec<(u32, f64)> {
        (1..=self.max_orders)
            .filter_map(|k| {
                self.nearest(peaks, f0 * k as f64)
                    .map(|p| (k, p.frequency_hz))
            })
            .collect()
    }

    fn nearest(&self, peaks: &[SpectralPeak], target: f64) -> Option<SpectralPeak> {
        let tol = (self.tolerance * target).max(self.min_tolerance_hz);
        peaks
            .iter()
            .filter(|p| (p.frequency_hz - target).abs() <= tol)
            .min_by(|a, b| {
                (a.frequency_hz - target)
                    .abs()
                    .total_cmp(&(b.frequency_hz - target).abs())
            })
            .copied()
    }
}
