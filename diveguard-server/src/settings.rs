//! Host settings: the core sections plus a `runtime` section, read once from
//! a JSON file at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use diveguard_core::{AlertStage, CoreConfig};

use crate::error::PipelineError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(flatten)]
    pub core: CoreConfig,
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Log,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    pub ranging_queue_capacity: usize,
    pub acoustic_queue_capacity: usize,
    pub cue_queue_capacity: usize,
    pub inertial_queue_capacity: usize,
    /// Longest the fusion loop waits for a missing stream head (ms)
    pub drain_wait_ms: u64,
    pub alert_channel_capacity: usize,
    pub ranging_rate_hz: f64,
    pub acoustic_rate_hz: f64,
    pub inertial_rate_hz: f64,
    /// Simulated seconds per wall-clock second
    pub simulation_speed: f64,
    /// Records below this stage are not delivered to the sink
    pub min_alert_stage: AlertStage,
    pub sink: SinkKind,
    /// JSON-lines output file; stdout when absent
    pub json_path: Option<PathBuf>,
    pub stats_interval_secs: u64,
    pub shutdown_timeout_ms: u64,
    /// Seed for the simulated drivers
    pub seed: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        RuntimeSettings {
            ranging_queue_capacity: 32,
            acoustic_queue_capacity: 4,
            cue_queue_capacity: 16,
            inertial_queue_capacity: 64,
            drain_wait_ms: 50,
            alert_channel_capacity: 32,
            ranging_rate_hz: 2.0,
            acoustic_rate_hz: 2.0,
            inertial_rate_hz: 10.0,
            simulation_speed: 1.0,
            min_alert_stage: AlertStage::Approach,
            sink: SinkKind::Log,
            json_path: None,
            stats_interval_secs: 10,
            shutdown_timeout_ms: 2000,
            seed: 7,
        }
    }
}

impl RuntimeSettings {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let capacities = [
            self.ranging_queue_capacity,
            self.acoustic_queue_capacity,
            self.cue_queue_capacity,
            self.inertial_queue_capacity,
            self.alert_channel_capacity,
        ];
        if capacities.contains(&0) {
            return Err(PipelineError::InvalidSettings(
                "runtime queue capacities must be positive".into(),
            ));
        }
        for (name, rate) in [
            ("rangingRateHz", self.ranging_rate_hz),
            ("acousticRateHz", self.acoustic_rate_hz),
            ("inertialRateHz", self.inertial_rate_hz),
        ] {
            if !(rate > 0.0 && rate <= 1000.0) {
                return Err(PipelineError::InvalidSettings(format!(
                    "runtime.{} must be within (0, 1000], got {}",
                    name, rate
                )));
            }
        }
        if !(self.simulation_speed > 0.0) {
            return Err(PipelineError::InvalidSettings(
                "runtime.simulationSpeed must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Settings, PipelineError> {
        let settings = match path {
            None => {
                log::info!("No settings file given, using defaults");
                Settings::default()
            }
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| PipelineError::SettingsRead(path.to_path_buf(), e))?;
                let settings: Settings = serde_json::from_str(&text)?;
                log::info!("Loaded settings from {}", path.display());
                settings
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.core.validate()?;
        self.runtime.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.runtime.sink, SinkKind::Log);
        assert_eq!(settings.core.tracker.confirm_hits, 3);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "threat": {{ "approachFloorM": 200.0 }},
                "runtime": {{ "sink": "json", "drainWaitMs": 10, "minAlertStage": "critical" }}
            }}"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.core.threat.approach_floor_m, 200.0);
        assert_eq!(settings.core.threat.critical_floor_m, 50.0);
        assert_eq!(settings.runtime.sink, SinkKind::Json);
        assert_eq!(settings.runtime.drain_wait_ms, 10);
        assert_eq!(settings.runtime.min_alert_stage, AlertStage::Critical);
        assert_eq!(settings.runtime.ranging_queue_capacity, 32);
    }

    #[test]
    fn test_rejects_invalid_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "runtime": {{ "cueQueueCapacity": 0 }} }}"#).unwrap();
        assert!(matches!(
            Settings::load(Some(file.path())),
            Err(PipelineError::InvalidSettings(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "threat": {{ "riskLevels": [10, 8] }} }}"#).unwrap();
        assert!(matches!(
            Settings::load(Some(file.path())),
            Err(PipelineError::Core(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/diveguard.json"))).unwrap_err();
        assert!(matches!(err, PipelineError::SettingsRead(_, _)));
    }
}
