//! Contact Tracking
//!
//! Fuses ranging, acoustic and inertial measurements into per-contact
//! position/velocity estimates.
//!
//! # Architecture
//!
//! - **kalman**: 6-state extended Kalman filter with a polar observation model
//! - **lifecycle**: `tentative → confirmed → stale → expired` state machine
//! - **frame**: heading reference turning platform-relative bearings absolute
//! - **history**: bounded trail of fused positions
//! - **motion**: approaching/receding/holding with hysteresis
//! - **tracker**: association, ordering rules and the concurrent contact map
//!
//! # Usage
//!
//! ```rust,ignore
//! use diveguard_core::{ContactTracker, Measurement, TrackerConfig};
//!
//! let tracker = ContactTracker::new(TrackerConfig::default());
//! let outcome = tracker.ingest(Measurement::RangeBearing(reading))?;
//! for event in tracker.advance(now) {
//!     log::info!("{} is now {}", event.contact_id, event.to);
//! }
//! ```

mod contact;
mod frame;
mod history;
mod kalman;
mod lifecycle;
mod motion;
mod tracker;

pub use contact::{AcousticSupport, ClassificationSnapshot, Contact, ContactId, ContactSnapshot};
pub use frame::{FrameCorrection, HeadingReference};
pub use history::{Trail, TrailPoint};
pub use kalman::{
    process_noise, transition, ContactFilter, FilterFault, PolarObservation, StateCovariance,
    StateVector,
};
pub use lifecycle::{ContactStatus, Lifecycle, LifecycleEvent};
pub use motion::RelativeMotion;
pub use tracker::{ContactTracker, IngestOutcome, UpdateKind};
