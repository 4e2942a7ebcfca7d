//! DiveGuard Core
//!
//! Platform-independent estimation of propeller-driven vessels around an
//! underwater robot. The crate turns raw sensor observations into a per-contact
//! collision threat record. It performs no I/O and spawns no threads; the host
//! process owns queues, timing and alert delivery.
//!
//! # Architecture
//!
//! - **acoustic**: Welch PSD and spectral feature extraction from PCM windows
//! - **classifier**: vessel-type classification backends and blade-pass analysis
//! - **tracking**: per-contact extended Kalman filter, association and lifecycle
//! - **threat**: time-to-collision, risk table, alert stage and recommendations
//!
//! # Usage
//!
//! ```rust,ignore
//! use diveguard_core::{
//!     AcousticFeatureExtractor, ContactTracker, CoreConfig, Measurement,
//!     SignatureClassifier, ThreatAssessmentEngine,
//! };
//!
//! let config = CoreConfig::default();
//! let extractor = AcousticFeatureExtractor::new(config.acoustic.clone());
//! let classifier = SignatureClassifier::new(config.classifier.clone())?;
//! let tracker = ContactTracker::new(config.tracker.clone());
//! let engine = ThreatAssessmentEngine::new(config.threat.clone());
//!
//! let outcome = tracker.ingest(Measurement::RangeBearing(reading))?;
//! if let Some(id) = outcome.contact_id {
//!     if let Some(record) = tracker.assess_with(id, &engine, now) {
//!         renderer.emit(&record);
//!     }
//! }
//! ```

pub mod acoustic;
pub mod classifier;
pub mod config;
pub mod error;
pub mod measurement;
pub mod threat;
pub mod tracking;
pub mod vessel;

pub use acoustic::{AcousticFeatureExtractor, AcousticWindow, FeatureVector, SpectralPeak, FEATURE_DIM};
pub use classifier::{ClassificationBackend, ClassificationResult, ClassificationSmoother, SignatureClassifier};
pub use config::{AcousticConfig, ClassifierConfig, CoreConfig, ThreatConfig, TrackerConfig};
pub use error::CoreError;
pub use measurement::{AcousticPeak, InertialHeading, Measurement, Modality, RangeBearing};
pub use threat::{
    AlertStage, EvasionAdvice, ThreatAssessmentEngine, ThreatInput, ThreatRecord, Urgency,
};
pub use tracking::{
    Contact, ContactId, ContactStatus, ContactTracker, IngestOutcome, LifecycleEvent,
    RelativeMotion, UpdateKind,
};
pub use vessel::VesselType;

/// Timestamps are monotonic seconds shared by every sensor stream.
pub type Timestamp = f64;
