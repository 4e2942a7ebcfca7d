//! Error types for the estimation core.
//!
//! Every per-measurement and per-window error is local: it is reported to the
//! caller and never corrupts another contact. Only configuration errors are
//! meant to be fatal, and only at startup.

use thiserror::Error;

use crate::tracking::ContactId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Malformed sensor input (NaN, negative range, angle out of range...).
    /// The measurement is rejected and no contact is touched.
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    /// Acoustic window too short for a stable spectral estimate.
    #[error("insufficient acoustic data: {got} samples, need at least {need}")]
    InsufficientData { got: usize, need: usize },

    /// Feature vector shape does not match the classification backend.
    #[error("classification backend mismatch: {0}")]
    Classification(String),

    /// Covariance update produced non-finite values; the contact was forced stale.
    #[error("numerical instability in contact {contact}: {reason}")]
    NumericalInstability { contact: ContactId, reason: String },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// True for errors that should stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Classification(_) | CoreError::InvalidConfig(_))
    }
}
