//! Alert delivery. A sink only renders records; it never feeds back into
//! the core.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use diveguard_core::{AlertStage, ThreatRecord};
use serde::Serialize;

use crate::error::PipelineError;

pub trait AlertSink: Send {
    fn emit(&mut self, record: &ThreatRecord) -> Result<(), PipelineError>;

    fn flush(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Human-readable alerts through the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn emit(&mut self, record: &ThreatRecord) -> Result<(), PipelineError> {
        let ttc = if record.time_to_collision_s.is_finite() {
            format!("{:.1}s", record.time_to_collision_s)
        } else {
            "-".to_string()
        };
        let line = format!(
            "{} [{} risk {}] {:.0} m az {:.0}° ttc {} p={:.2}: {}",
            record.contact_id,
            record.stage,
            record.risk_level,
            record.distance_m,
            record.azimuth_deg,
            ttc,
            record.threat_probability,
            record.recommendation
        );
        match record.stage {
            AlertStage::Critical => log::warn!("{}", line),
            AlertStage::Approach => log::info!("{}", line),
            AlertStage::Distant => log::debug!("{}", line),
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertLine<'a> {
    emitted_at: String,
    #[serde(flatten)]
    record: &'a ThreatRecord,
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path)?;
        log::info!("Writing alerts to {}", path.display());
        Ok(JsonLinesSink::new(BufWriter::new(file)))
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        JsonLinesSink::new(io::stdout())
    }
}

impl<W: Write + Send> AlertSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &ThreatRecord) -> Result<(), PipelineError> {
        let line = AlertLine {
            emitted_at: chrono::Utc::now().to_rfc3339(),
            record,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diveguard_core::{ThreatAssessmentEngine, ThreatConfig, ThreatInput};
    use diveguard_core::{ContactId, ContactStatus, RelativeMotion, VesselType};
    use std::io::{BufRead, BufReader};

    fn record(distance_m: f64, closing: f64) -> ThreatRecord {
        let input = ThreatInput {
            contact_id: ContactId(3),
            status: ContactStatus::Confirmed,
            state_timestamp: 10.0,
            distance_m,
            azimuth_deg: 90.0,
            bearing_deg: 110.0,
            elevation_deg: 0.0,
            closing_speed_mps: closing,
            vessel_type: VesselType::Boat,
            classification_confidence: 0.7,
            classification_timestamp: Some(9.0),
            classification_refreshed_at: Some(9.0),
            motion: RelativeMotion::Approaching,
        };
        ThreatAssessmentEngine::new(ThreatConfig::default()).assess_input(&input, 10.0)
    }

    #[test]
    fn test_json_lines() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(&record(40.0, 6.0)).unwrap();
        sink.emit(&record(800.0, 0.0)).unwrap();
        sink.flush().unwrap();

        let lines: Vec<serde_json::Value> = BufReader::new(sink.into_inner().as_slice())
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["contactId"], 3);
        assert_eq!(lines[0]["stage"], "critical");
        assert_eq!(lines[0]["vesselType"], "boat");
        assert!(lines[0]["emittedAt"].is_string());
        assert!(lines[1]["timeToCollisionS"].is_null());
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut sink = JsonLinesSink::create(&path).unwrap();
        sink.emit(&record(100.0, 2.0)).unwrap();
        sink.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_log_sink_accepts_every_stage() {
        let mut sink = LogSink;
        for (d, c) in [(40.0, 6.0), (120.0, 0.0), (900.0, 0.0)] {
            sink.emit(&record(d, c)).unwrap();
        }
    }
}
