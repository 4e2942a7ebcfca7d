use std::io;
use std::path::PathBuf;

use diveguard_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("Cannot read settings {0}: {1}")]
    SettingsRead(PathBuf, io::Error),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("I/O error {0}")]
    Io(#[from] io::Error),
    #[error("JSON error {0}")]
    Json(#[from] serde_json::Error),
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Errors after which the pipeline cannot continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Core(e) => e.is_fatal(),
            _ => true,
        }
    }
}
