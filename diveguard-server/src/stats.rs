//! Pipeline counters, updated lock-free from every subsystem.

use atomic_float::AtomicF64;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct PipelineStats {
    measurements_applied: AtomicU64,
    measurements_rejected: AtomicU64,
    measurements_out_of_order: AtomicU64,
    numerical_faults: AtomicU64,
    windows_classified: AtomicU64,
    windows_failed: AtomicU64,
    threats_detected: AtomicU64,
    critical_events: AtomicU64,
    alerts_emitted: AtomicU64,
    alerts_dropped: AtomicU64,
    processing_last_ms: AtomicF64,
    processing_max_ms: AtomicF64,
    processing_total_ms: AtomicF64,
    processing_samples: AtomicU64,
}

/// Drop counters of the sensor queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDrops {
    pub ranging: u64,
    pub acoustic: u64,
    pub cues: u64,
    pub inertial: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub measurements_applied: u64,
    pub measurements_rejected: u64,
    pub measurements_out_of_order: u64,
    pub numerical_faults: u64,
    pub windows_classified: u64,
    pub windows_failed: u64,
    pub threats_detected: u64,
    pub critical_events: u64,
    pub alerts_emitted: u64,
    pub alerts_dropped: u64,
    pub queue_drops: QueueDrops,
    pub processing_last_ms: f64,
    pub processing_max_ms: f64,
    pub processing_mean_ms: f64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) {
        self.measurements_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.measurements_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn out_of_order(&self) {
        self.measurements_out_of_order.fetch_add(1, Ordering::Relaxed);
    }

    pub fn numerical_fault(&self) {
        self.numerical_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn window_classified(&self) {
        self.windows_classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn window_failed(&self) {
        self.windows_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn threat_detected(&self) {
        self.threats_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn critical_event(&self) {
        self.critical_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_emitted(&self) {
        self.alerts_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_dropped(&self) {
        self.alerts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Time spent applying and assessing one measurement.
    pub fn record_processing(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.processing_last_ms.store(ms, Ordering::Relaxed);
        self.processing_total_ms.fetch_add(ms, Ordering::Relaxed);
        self.processing_samples.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .processing_max_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |max| {
                (ms > max).then_some(ms)
            });
    }

    pub fn snapshot(&self, queue_drops: QueueDrops) -> StatsSnapshot {
        let samples = self.processing_samples.load(Ordering::Relaxed);
        let total = self.processing_total_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            measurements_applied: self.measurements_applied.load(Ordering::Relaxed),
            measurements_rejected: self.measurements_rejected.load(Ordering::Relaxed),
            measurements_out_of_order: self.measurements_out_of_order.load(Ordering::Relaxed),
            numerical_faults: self.numerical_faults.load(Ordering::Relaxed),
            windows_classified: self.windows_classified.load(Ordering::Relaxed),
            windows_failed: self.windows_failed.load(Ordering::Relaxed),
            threats_detected: self.threats_detected.load(Ordering::Relaxed),
            critical_events: self.critical_events.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            queue_drops,
            processing_last_ms: self.processing_last_ms.load(Ordering::Relaxed),
            processing_max_ms: self.processing_max_ms.load(Ordering::Relaxed),
            processing_mean_ms: if samples == 0 {
                0.0
            } else {
                total / samples as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_times() {
        let stats = PipelineStats::new();
        stats.record_processing(Duration::from_millis(2));
        stats.record_processing(Duration::from_millis(6));
        stats.record_processing(Duration::from_millis(4));
        let snapshot = stats.snapshot(QueueDrops::default());
        assert!((snapshot.processing_last_ms - 4.0).abs() < 1e-9);
        assert!((snapshot.processing_max_ms - 6.0).abs() < 1e-9);
        assert!((snapshot.processing_mean_ms - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_serialises() {
        let stats = PipelineStats::new();
        stats.threat_detected();
        stats.critical_event();
        stats.alert_dropped();
        let json = serde_json::to_value(stats.snapshot(QueueDrops {
            ranging: 1,
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(json["threatsDetected"], 1);
        assert_eq!(json["criticalEvents"], 1);
        assert_eq!(json["alertsDropped"], 1);
        assert_eq!(json["queueDrops"]["ranging"], 1);
        assert_eq!(json["processingMeanMs"], 0.0);
    }
}
