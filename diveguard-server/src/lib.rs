//! DiveGuard Host
//!
//! Runs the core estimators as a long-lived process: sensor drivers feed
//! bounded queues, a fusion subsystem keeps the contact picture current and
//! threat records are rendered by an alert sink.
//!
//! # Architecture
//!
//! - **sources**: driver traits and the simulated drivers
//! - **queue**: drop-oldest sensor queues with async wakeup
//! - **merge**: timestamp-ordered head merge across streams
//! - **pipeline**: classification, fusion and alert subsystems
//! - **sink**: log and JSON-lines alert renderers
//! - **settings**: JSON settings file with core and runtime sections
//! - **stats**: lock-free pipeline counters

pub mod error;
pub mod merge;
pub mod pipeline;
pub mod queue;
pub mod settings;
pub mod sink;
pub mod sources;
pub mod stats;

pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use settings::{RuntimeSettings, Settings, SinkKind};
pub use sources::{Scenario, SensorSuite, SimClock};
