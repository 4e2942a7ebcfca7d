//! Multi-contact fusion.
//!
//! Every contact sits behind its own mutex; the map of contacts is behind a
//! read/write lock taken for writing only to insert or remove. Two
//! measurements for different contacts therefore never wait on each other.
//!
//! Association runs against each live contact's prediction at the measurement
//! time: the smallest squared Mahalanobis distance inside the gate wins, and a
//! ranging measurement that gates with nothing spawns a tentative contact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::contact::{ClassificationSnapshot, Contact, ContactId, ContactSnapshot};
use super::frame::HeadingReference;
use super::kalman::{wrap_pi, ContactFilter, FilterFault, PolarObservation};
use super::lifecycle::{ContactStatus, LifecycleEvent};
use crate::classifier::ClassificationResult;
use crate::config::TrackerConfig;
use crate::error::CoreError;
use crate::measurement::{AcousticPeak, InertialHeading, Measurement, RangeBearing};
use crate::threat::{ThreatAssessmentEngine, ThreatInput, ThreatRecord};
use crate::Timestamp;

/// 1-DOF gate for associating a bearing-carrying acoustic cue (3σ).
const BEARING_GATE_SQ: f64 = 9.0;

/// What `ingest` did with a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// New tentative contact from an unassociated ranging measurement
    Created,
    /// Full EKF correction from a ranging measurement
    Corrected,
    /// Bearing-only correction from an acoustic cue
    BearingOnly,
    /// Acoustic bookkeeping only, geometry untouched
    AcousticCue,
    /// Stored in the heading reference
    HeadingReference,
    /// Not newer than what the target already holds; nothing changed
    Dropped,
    /// Acoustic cue with no contact to attach to
    Unassociated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub contact_id: Option<ContactId>,
    pub kind: UpdateKind,
}

impl IngestOutcome {
    fn new(contact_id: Option<ContactId>, kind: UpdateKind) -> Self {
        IngestOutcome { contact_id, kind }
    }

    /// True when a contact's fused state changed.
    pub fn state_changed(&self) -> bool {
        matches!(
            self.kind,
            UpdateKind::Created | UpdateKind::Corrected | UpdateKind::BearingOnly
        )
    }
}

type ContactHandle = Arc<Mutex<Contact>>;

#[derive(Debug)]
pub struct ContactTracker {
    config: TrackerConfig,
    contacts: RwLock<BTreeMap<ContactId, ContactHandle>>,
    heading: RwLock<HeadingReference>,
    next_id: AtomicU64,
    pending_events: Mutex<Vec<LifecycleEvent>>,
}

impl ContactTracker {
    pub fn new(config: TrackerConfig) -> Self {
        ContactTracker {
            config,
            contacts: RwLock::new(BTreeMap::new()),
            heading: RwLock::new(HeadingReference::new()),
            next_id: AtomicU64::new(1),
            pending_events: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Apply one measurement.
    ///
    /// Malformed input is rejected with `InvalidMeasurement` before anything
    /// is touched. A numerical fault restores the contact's pre-update state,
    /// forces it stale and returns `NumericalInstability`; other contacts are
    /// unaffected.
    pub fn ingest(&self, measurement: Measurement) -> Result<IngestOutcome, CoreError> {
        if let Err(e) = measurement.validate() {
            log::warn!("Rejected {:?} measurement: {}", measurement.modality(), e);
            return Err(e);
        }
        match measurement {
            Measurement::RangeBearing(m) => self.ingest_ranging(&m),
            Measurement::AcousticPeak(m) => self.ingest_acoustic(&m, None),
            Measurement::InertialHeading(m) => Ok(self.ingest_heading(&m)),
        }
    }

    /// Apply an acoustic cue together with the classification of the window
    /// that produced it. The result is attached to the contact the cue
    /// reached, `unknown` included, so a held type is replaced as soon as
    /// the classifier stops supporting it.
    pub fn ingest_classified_cue(
        &self,
        peak: AcousticPeak,
        result: &ClassificationResult,
    ) -> Result<IngestOutcome, CoreError> {
        let measurement = Measurement::AcousticPeak(peak);
        if let Err(e) = measurement.validate() {
            log::warn!("Rejected acoustic cue: {}", e);
            return Err(e);
        }
        let outcome = self.ingest_acoustic(&peak, Some(result))?;
        if let (Some(id), true) = (outcome.contact_id, outcome.kind != UpdateKind::Dropped) {
            self.attach_classification(id, result, peak.timestamp);
        }
        Ok(outcome)
    }

    fn ingest_ranging(&self, m: &RangeBearing) -> Result<IngestOutcome, CoreError> {
        let frame = read(&self.heading).correction_at(m.timestamp);
        let obs = PolarObservation::from_degrees(
            m.range_m,
            frame.to_absolute(m.azimuth_deg),
            m.elevation_deg,
            m.range_variance,
            m.angle_variance + frame.heading_variance,
            m.angle_variance,
        );

        let mut best: Option<(f64, ContactHandle)> = None;
        for handle in self.handles() {
            let contact = lock(&handle);
            if !contact.status().is_live() {
                continue;
            }
            let dt = (m.timestamp - contact.last_update).clamp(0.0, self.config.max_dt_secs);
            let predicted = contact.filter.predicted(
                self.config.motion_model,
                dt,
                self.config.process_noise_accel_var,
            );
            match predicted.mahalanobis_sq(&obs) {
                Ok(d2) if d2 <= self.config.gate_mahalanobis_sq => {
                    if best.as_ref().map_or(true, |(b, _)| d2 < *b) {
                        best = Some((d2, Arc::clone(&handle)));
                    }
                }
                Ok(_) => {}
                Err(fault) => log::debug!("{}: not gated ({})", contact.id, fault),
            }
        }

        match best {
            Some((d2, handle)) => self.correct(&handle, &obs, m.timestamp, d2),
            None => Ok(self.spawn(&obs, m.timestamp)),
        }
    }

    fn correct(
        &self,
        handle: &ContactHandle,
        obs: &PolarObservation,
        timestamp: Timestamp,
        d2: f64,
    ) -> Result<IngestOutcome, CoreError> {
        let mut contact = lock(handle);
        let id = contact.id;
        if timestamp <= contact.last_update {
            log::warn!(
                "{}: dropped ranging at {:.3}s, state already at {:.3}s",
                id,
                timestamp,
                contact.last_update
            );
            return Ok(IngestOutcome::new(Some(id), UpdateKind::Dropped));
        }

        let dt = (timestamp - contact.last_update).min(self.config.max_dt_secs);
        let backup = contact.filter.clone();
        contact
            .filter
            .predict(self.config.motion_model, dt, self.config.process_noise_accel_var);
        if let Err(fault) = contact.filter.update(obs) {
            contact.filter = backup;
            return Err(self.instability(&mut contact, timestamp, fault));
        }

        contact.last_update = timestamp;
        contact.last_ranging = timestamp;
        contact.record_trail(timestamp);
        contact.update_motion(self.config.motion_threshold_mps);
        if let Some((from, to)) = contact.lifecycle.hit() {
            log::info!("{}: {} -> {}", id, from, to);
            self.push_event(id, Some(from), to, timestamp);
        }

        log::debug!(
            "{}: corrected (d²={:.2}) range {:.1} m, bearing {:.1}°, closing {:.2} m/s",
            id,
            d2,
            contact.range_m(),
            contact.bearing_deg(),
            contact.closing_speed()
        );
        Ok(IngestOutcome::new(Some(id), UpdateKind::Corrected))
    }

    fn spawn(&self, obs: &PolarObservation, timestamp: Timestamp) -> IngestOutcome {
        let id = ContactId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let filter = ContactFilter::from_polar(obs, self.config.initial_velocity_var);
        let contact = Contact::new(id, filter, timestamp, &self.config);
        log::info!(
            "{}: new tentative contact at {:.1} m, bearing {:.1}°",
            id,
            contact.range_m(),
            contact.bearing_deg()
        );
        write(&self.contacts).insert(id, Arc::new(Mutex::new(contact)));
        self.push_event(id, None, ContactStatus::Tentative, timestamp);
        IngestOutcome::new(Some(id), UpdateKind::Created)
    }

    /// `window_class` is the classification of the window behind the cue,
    /// when known to the caller.
    fn ingest_acoustic(
        &self,
        peak: &AcousticPeak,
        window_class: Option<&ClassificationResult>,
    ) -> Result<IngestOutcome, CoreError> {
        let Some(handle) = self.associate_cue(peak) else {
            log::debug!(
                "Acoustic cue {:.1} Hz at {:.3}s has no contact",
                peak.dominant_freq_hz,
                peak.timestamp
            );
            return Ok(IngestOutcome::new(None, UpdateKind::Unassociated));
        };

        let mut contact = lock(&handle);
        let id = contact.id;
        if contact
            .acoustic
            .last_cue_at
            .map_or(false, |t| peak.timestamp <= t)
        {
            log::warn!("{}: dropped acoustic cue at {:.3}s, out of order", id, peak.timestamp);
            return Ok(IngestOutcome::new(Some(id), UpdateKind::Dropped));
        }

        contact.acoustic.cues += 1;
        contact.acoustic.last_cue_at = Some(peak.timestamp);
        contact.acoustic.last_dominant_hz = peak.dominant_freq_hz;
        contact.acoustic.last_power = peak.power;

        // A cue only supports the held type when its own window agrees with it
        if let Some(class) = contact.classification.as_mut() {
            let agrees = window_class.map_or(true, |r| {
                r.vessel_type.is_known() && r.vessel_type == class.vessel_type
            });
            if agrees
                && class.matches_harmonic(peak.dominant_freq_hz)
                && peak.timestamp > class.refreshed_at
            {
                class.refreshed_at = peak.timestamp;
            }
        }

        let fallback_bearing = peak.bearing_deg.filter(|_| {
            self.config.acoustic_bearing_fallback
                && peak.timestamp - contact.last_ranging >= self.config.ranging_gap_secs
                && peak.timestamp > contact.last_update
        });
        let Some(bearing) = fallback_bearing else {
            return Ok(IngestOutcome::new(Some(id), UpdateKind::AcousticCue));
        };

        let variance = peak
            .bearing_variance
            .unwrap_or(self.config.acoustic_bearing_variance)
            * (PI / 180.0).powi(2);
        let dt = (peak.timestamp - contact.last_update).min(self.config.max_dt_secs);
        let backup = contact.filter.clone();
        contact
            .filter
            .predict(self.config.motion_model, dt, self.config.process_noise_accel_var);
        if let Err(fault) = contact.filter.update_bearing(bearing.to_radians(), variance) {
            contact.filter = backup;
            return Err(self.instability(&mut contact, peak.timestamp, fault));
        }
        contact.last_update = peak.timestamp;
        contact.record_trail(peak.timestamp);
        contact.update_motion(self.config.motion_threshold_mps);
        log::debug!("{}: bearing-only update {:.1}°", id, bearing);
        Ok(IngestOutcome::new(Some(id), UpdateKind::BearingOnly))
    }

    /// By bearing when the cue carries one, otherwise the nearest live contact.
    fn associate_cue(&self, peak: &AcousticPeak) -> Option<ContactHandle> {
        let mut best: Option<(f64, ContactHandle)> = None;
        for handle in self.handles() {
            let contact = lock(&handle);
            if !contact.status().is_live() {
                continue;
            }
            let score = match peak.bearing_deg {
                Some(bearing) => {
                    let Ok((az, az_var)) = contact.filter.azimuth_with_variance() else {
                        continue;
                    };
                    let cue_var = peak
                        .bearing_variance
                        .unwrap_or(self.config.acoustic_bearing_variance)
                        * (PI / 180.0).powi(2);
                    let d2 = wrap_pi(bearing.to_radians() - az).powi(2) / (az_var + cue_var);
                    if d2 > BEARING_GATE_SQ {
                        continue;
                    }
                    d2
                }
                None => contact.range_m(),
            };
            if best.as_ref().map_or(true, |(b, _)| score < *b) {
                best = Some((score, Arc::clone(&handle)));
            }
        }
        best.map(|(_, handle)| handle)
    }

    fn ingest_heading(&self, heading: &InertialHeading) -> IngestOutcome {
        if write(&self.heading).push(*heading) {
            IngestOutcome::new(None, UpdateKind::HeadingReference)
        } else {
            log::warn!("Dropped heading at {:.3}s, out of order", heading.timestamp);
            IngestOutcome::new(None, UpdateKind::Dropped)
        }
    }

    fn instability(&self, contact: &mut Contact, timestamp: Timestamp, fault: FilterFault) -> CoreError {
        log::error!(
            "{}: numerical instability at {:.3}s ({}), state restored and contact forced stale",
            contact.id,
            timestamp,
            fault
        );
        if let Some((from, to)) = contact.lifecycle.mark_stale() {
            self.push_event(contact.id, Some(from), to, timestamp);
        }
        CoreError::NumericalInstability {
            contact: contact.id,
            reason: fault.to_string(),
        }
    }

    /// Attach a classification to the contact its acoustic cue went to.
    /// Returns false when the contact is gone or already holds a newer one.
    pub fn attach_classification(
        &self,
        id: ContactId,
        result: &ClassificationResult,
        timestamp: Timestamp,
    ) -> bool {
        let Some(handle) = read(&self.contacts).get(&id).cloned() else {
            return false;
        };
        let mut contact = lock(&handle);
        if contact
            .classification
            .as_ref()
            .map_or(false, |c| c.classified_at >= timestamp)
        {
            return false;
        }
        let previous = contact.classification.as_ref().map(|c| c.vessel_type);
        if previous != Some(result.vessel_type) {
            log::info!(
                "{}: classified {} (confidence {:.2})",
                id,
                result.vessel_type,
                result.confidence
            );
        }
        contact.classification = Some(ClassificationSnapshot::from_result(result, timestamp));
        true
    }

    /// Time-based lifecycle: stale after `stale_after_secs` without ranging,
    /// expired and removed after `expire_after_secs`. Also returns the
    /// transitions caused by `ingest` since the previous call.
    pub fn advance(&self, now: Timestamp) -> Vec<LifecycleEvent> {
        let mut events = std::mem::take(&mut *lock(&self.pending_events));
        let mut contacts = write(&self.contacts);
        contacts.retain(|id, handle| {
            let mut contact = lock(handle);
            let silent = now - contact.last_ranging;
            if silent >= self.config.expire_after_secs {
                if let Some((from, to)) = contact.lifecycle.expire() {
                    log::info!("{}: {} -> {} after {:.1}s without ranging", id, from, to, silent);
                    events.push(LifecycleEvent {
                        contact_id: *id,
                        from: Some(from),
                        to,
                        timestamp: now,
                    });
                }
                return false;
            }
            if silent >= self.config.stale_after_secs {
                if let Some((from, to)) = contact.lifecycle.mark_stale() {
                    log::info!("{}: {} -> {} after {:.1}s without ranging", id, from, to, silent);
                    events.push(LifecycleEvent {
                        contact_id: *id,
                        from: Some(from),
                        to,
                        timestamp: now,
                    });
                }
            }
            true
        });
        events
    }

    pub fn contact_count(&self) -> usize {
        read(&self.contacts).len()
    }

    pub fn contact_ids(&self) -> Vec<ContactId> {
        read(&self.contacts).keys().copied().collect()
    }

    /// Run `f` on a contact under its lock.
    pub fn with_contact<R>(&self, id: ContactId, f: impl FnOnce(&Contact) -> R) -> Option<R> {
        let handle = read(&self.contacts).get(&id).cloned()?;
        let contact = lock(&handle);
        Some(f(&contact))
    }

    pub fn snapshot(&self, id: ContactId) -> Option<ContactSnapshot> {
        self.with_contact(id, Contact::snapshot)
    }

    /// Snapshots of every contact, by id.
    pub fn snapshots(&self) -> Vec<ContactSnapshot> {
        self.handles().iter().map(|h| lock(h).snapshot()).collect()
    }

    /// Current platform heading (deg), 0 before any heading arrived.
    pub fn heading_deg(&self) -> f64 {
        read(&self.heading).current().heading_deg
    }

    /// Assessment input for a contact, with its classification confidence
    /// decayed to `now`.
    pub fn threat_input(&self, id: ContactId, now: Timestamp) -> Option<ThreatInput> {
        let heading = self.heading_deg();
        self.with_contact(id, |contact| {
            let mut input = ThreatInput::from_contact(contact, heading);
            if let Some(class) = contact.classification() {
                input.classification_confidence = class.confidence_at(
                    now,
                    self.config.classification_stale_secs,
                    self.config.confidence_half_life_secs,
                );
            }
            input
        })
    }

    pub fn assess_with(
        &self,
        id: ContactId,
        engine: &ThreatAssessmentEngine,
        now: Timestamp,
    ) -> Option<ThreatRecord> {
        self.threat_input(id, now)
            .map(|input| engine.assess_input(&input, now))
    }

    fn handles(&self) -> Vec<ContactHandle> {
        read(&self.contacts).values().cloned().collect()
    }

    fn push_event(
        &self,
        contact_id: ContactId,
        from: Option<ContactStatus>,
        to: ContactStatus,
        timestamp: Timestamp,
    ) {
        lock(&self.pending_events).push(LifecycleEvent {
            contact_id,
            from,
            to,
            timestamp,
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(rw: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(rw: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::kalman::StateCovariance;
    use crate::vessel::VesselType;

    fn ranging(timestamp: f64, range_m: f64, azimuth_deg: f64) -> Measurement {
        Measurement::RangeBearing(RangeBearing {
            timestamp,
            range_m,
            azimuth_deg,
            elevation_deg: 0.0,
            range_variance: 1.0,
            angle_variance: 1.0,
        })
    }

    fn cue(timestamp: f64, freq: f64, bearing_deg: Option<f64>) -> Measurement {
        Measurement::AcousticPeak(AcousticPeak {
            timestamp,
            dominant_freq_hz: freq,
            power: 1.0,
            spectral_centroid_hz: 300.0,
            bearing_deg,
            bearing_variance: None,
        })
    }

    fn heading(timestamp: f64, heading_deg: f64) -> Measurement {
        Measurement::InertialHeading(InertialHeading {
            timestamp,
            heading_deg,
            heading_variance: 0.1,
        })
    }

    fn classification(vessel_type: VesselType, f0: f64) -> ClassificationResult {
        ClassificationResult {
            vessel_type,
            confidence: 0.9,
            rpm_estimate: f0 * 20.0,
            blade_count_estimate: 3,
            cavitation_level: 0.2,
            fundamental_hz: f0,
            probabilities: Vec::new(),
        }
    }

    #[test]
    fn test_create_then_confirm() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let first = tracker.ingest(ranging(0.0, 200.0, 30.0)).unwrap();
        assert_eq!(first.kind, UpdateKind::Created);
        let id = first.contact_id.unwrap();

        for i in 1..=3 {
            let out = tracker.ingest(ranging(i as f64, 200.0, 30.0)).unwrap();
            assert_eq!(out, IngestOutcome::new(Some(id), UpdateKind::Corrected));
        }
        assert_eq!(tracker.contact_count(), 1);
        assert_eq!(tracker.snapshot(id).unwrap().status, ContactStatus::Confirmed);

        let events = tracker.advance(3.0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].from, None);
        assert_eq!(events[1].to, ContactStatus::Confirmed);
        assert!(tracker.advance(3.0).is_empty());
    }

    #[test]
    fn test_stationary_convergence() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let id = tracker.ingest(ranging(0.0, 150.0, 60.0)).unwrap().contact_id.unwrap();
        let initial_sigma = tracker.snapshot(id).unwrap().position_sigma_m;
        for i in 1..60 {
            tracker.ingest(ranging(i as f64 * 0.5, 150.0, 60.0)).unwrap();
        }
        let snap = tracker.snapshot(id).unwrap();
        assert!((snap.range_m - 150.0).abs() < 0.5, "range {}", snap.range_m);
        assert!((snap.bearing_deg - 60.0).abs() < 0.5, "bearing {}", snap.bearing_deg);
        assert!(snap.range_rate_mps.abs() < 0.1, "range rate {}", snap.range_rate_mps);
        assert!(snap.position_sigma_m < initial_sigma);
    }

    #[test]
    fn test_separate_contacts() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let a = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id;
        let b = tracker.ingest(ranging(0.1, 400.0, 200.0)).unwrap().contact_id;
        assert_ne!(a, b);
        let again = tracker.ingest(ranging(1.0, 101.0, 10.0)).unwrap();
        assert_eq!(again.contact_id, a);
        assert_eq!(again.kind, UpdateKind::Corrected);
        assert_eq!(tracker.contact_ids().len(), 2);
    }

    #[test]
    fn test_out_of_order_dropped() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let id = tracker.ingest(ranging(5.0, 100.0, 10.0)).unwrap().contact_id;
        tracker.ingest(ranging(6.0, 100.0, 10.0)).unwrap();
        let before = tracker.snapshot(id.unwrap()).unwrap();

        let late = tracker.ingest(ranging(5.5, 100.0, 10.0)).unwrap();
        assert_eq!(late, IngestOutcome::new(id, UpdateKind::Dropped));
        let dup = tracker.ingest(ranging(6.0, 100.0, 10.0)).unwrap();
        assert_eq!(dup.kind, UpdateKind::Dropped);

        assert_eq!(tracker.snapshot(id.unwrap()).unwrap(), before);
        assert_eq!(tracker.contact_count(), 1);
    }

    #[test]
    fn test_invalid_measurement_changes_nothing() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let err = tracker.ingest(ranging(0.0, -5.0, 10.0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMeasurement(_)));
        let err = tracker.ingest(ranging(0.0, f64::NAN, 10.0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMeasurement(_)));
        assert_eq!(tracker.contact_count(), 0);
        assert!(tracker.advance(0.0).is_empty());
    }

    #[test]
    fn test_heading_rotates_bearing() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        tracker.ingest(heading(0.0, 90.0)).unwrap();
        let id = tracker.ingest(ranging(1.0, 100.0, 10.0)).unwrap().contact_id.unwrap();
        let snap = tracker.snapshot(id).unwrap();
        assert!((snap.bearing_deg - 100.0).abs() < 1e-6);

        // The robot turns; the same world target now appears at -80° relative
        tracker.ingest(heading(1.5, 180.0)).unwrap();
        let out = tracker.ingest(ranging(2.0, 100.0, 280.0)).unwrap();
        assert_eq!(out.contact_id, Some(id));
        assert_eq!(out.kind, UpdateKind::Corrected);

        let late_heading = tracker.ingest(heading(1.0, 0.0)).unwrap();
        assert_eq!(late_heading.kind, UpdateKind::Dropped);
        assert_eq!(tracker.heading_deg(), 180.0);
    }

    #[test]
    fn test_acoustic_cue_does_not_move_contact() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        assert_eq!(
            tracker.ingest(cue(0.0, 100.0, None)).unwrap().kind,
            UpdateKind::Unassociated
        );
        let id = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id;
        let before = tracker.snapshot(id.unwrap()).unwrap();

        let out = tracker.ingest(cue(0.5, 100.0, Some(40.0))).unwrap();
        // 30° off with default variances does not gate
        assert_eq!(out.kind, UpdateKind::Unassociated);

        let out = tracker.ingest(cue(0.6, 100.0, Some(11.0))).unwrap();
        assert_eq!(out, IngestOutcome::new(id, UpdateKind::AcousticCue));
        let after = tracker.snapshot(id.unwrap()).unwrap();
        assert_eq!(before.position, after.position);
        assert_eq!(before.last_update, after.last_update);

        let stale_cue = tracker.ingest(cue(0.6, 100.0, None)).unwrap();
        assert_eq!(stale_cue.kind, UpdateKind::Dropped);
    }

    #[test]
    fn test_harmonic_cue_refreshes_classification() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let id = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id.unwrap();
        assert!(tracker.attach_classification(id, &classification(VesselType::Boat, 100.0), 1.0));
        // Older result is ignored
        assert!(!tracker.attach_classification(id, &classification(VesselType::Ship, 10.0), 0.5));

        tracker.ingest(cue(20.0, 301.0, None)).unwrap();
        tracker.ingest(cue(21.0, 150.0, None)).unwrap();
        let class = tracker
            .with_contact(id, |c| c.classification().cloned())
            .flatten()
            .unwrap();
        assert_eq!(class.vessel_type, VesselType::Boat);
        assert_eq!(class.refreshed_at, 20.0);
        assert_eq!(class.classified_at, 1.0);

        // Decay: stale 10 s after the refresh, then 10 s half-life
        let input = tracker.threat_input(id, 40.0).unwrap();
        assert!((input.classification_confidence - 0.45).abs() < 1e-9);
        assert_eq!(input.classification_timestamp, Some(1.0));
        assert_eq!(input.classification_refreshed_at, Some(20.0));
    }

    fn peak(timestamp: f64, freq: f64) -> AcousticPeak {
        AcousticPeak {
            timestamp,
            dominant_freq_hz: freq,
            power: 1.0,
            spectral_centroid_hz: 300.0,
            bearing_deg: None,
            bearing_variance: None,
        }
    }

    #[test]
    fn test_unknown_window_replaces_held_type() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let id = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id.unwrap();

        let rov = classification(VesselType::Rov, 100.0);
        let out = tracker.ingest_classified_cue(peak(0.5, 100.0), &rov).unwrap();
        assert_eq!(out, IngestOutcome::new(Some(id), UpdateKind::AcousticCue));
        let held = tracker.snapshot(id).unwrap().classification.unwrap();
        assert_eq!(held.vessel_type, VesselType::Rov);

        // Same line, but the window no longer supports the type
        let mut unknown = ClassificationResult::unknown();
        unknown.fundamental_hz = 100.0;
        tracker.ingest_classified_cue(peak(1.5, 100.0), &unknown).unwrap();
        let held = tracker.snapshot(id).unwrap().classification.unwrap();
        assert_eq!(held.vessel_type, VesselType::Unknown);
        assert_eq!(held.classified_at, 1.5);

        let input = tracker.threat_input(id, 2.0).unwrap();
        assert_eq!(input.vessel_type, VesselType::Unknown);
    }

    #[test]
    fn test_disagreeing_cue_does_not_refresh() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let id = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id.unwrap();
        assert!(tracker.attach_classification(id, &classification(VesselType::Submarine, 100.0), 1.0));

        // Checked before the window's own result is attached
        let unknown = ClassificationResult::unknown();
        tracker.ingest_acoustic(&peak(5.0, 200.0), Some(&unknown)).unwrap();
        let held = tracker.snapshot(id).unwrap().classification.unwrap();
        assert_eq!(held.refreshed_at, 1.0);

        let boat = classification(VesselType::Boat, 100.0);
        tracker.ingest_acoustic(&peak(6.0, 200.0), Some(&boat)).unwrap();
        let held = tracker.snapshot(id).unwrap().classification.unwrap();
        assert_eq!(held.refreshed_at, 1.0);

        let sub = classification(VesselType::Submarine, 100.0);
        tracker.ingest_acoustic(&peak(7.0, 200.0), Some(&sub)).unwrap();
        let held = tracker.snapshot(id).unwrap().classification.unwrap();
        assert_eq!(held.refreshed_at, 7.0);
    }

    #[test]
    fn test_numerical_fault_restores_and_forces_stale() {
        let config = TrackerConfig {
            process_noise_accel_var: 0.0,
            ..Default::default()
        };
        let tracker = ContactTracker::new(config);
        let a = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id.unwrap();
        let b = tracker.ingest(ranging(0.0, 300.0, 200.0)).unwrap().contact_id.unwrap();
        assert_ne!(a, b);
        tracker.advance(0.0);

        // Zero covariance with a negative noise model cannot be inverted
        let handle = read(&tracker.contacts).get(&a).cloned().unwrap();
        {
            let mut contact = lock(&handle);
            let x = *contact.filter.state();
            contact.filter = ContactFilter::with_state(x, StateCovariance::zeros());
        }
        let before_a = tracker.snapshot(a).unwrap();
        let before_b = tracker.snapshot(b).unwrap();
        let obs = PolarObservation {
            z: nalgebra::Vector3::new(101.0, 10f64.to_radians(), 0.0),
            noise: -nalgebra::Matrix3::identity(),
        };

        let err = tracker.correct(&handle, &obs, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, CoreError::NumericalInstability { contact, .. } if contact == a));

        let after_a = tracker.snapshot(a).unwrap();
        assert_eq!(after_a.status, ContactStatus::Stale);
        assert_eq!(after_a.position, before_a.position);
        assert_eq!(after_a.velocity, before_a.velocity);
        assert_eq!(after_a.last_update, before_a.last_update);
        assert_eq!(after_a.trail_points, before_a.trail_points);
        assert_eq!(tracker.snapshot(b).unwrap(), before_b);

        let events = tracker.advance(1.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].contact_id, a);
        assert_eq!(events[0].from, Some(ContactStatus::Tentative));
        assert_eq!(events[0].to, ContactStatus::Stale);
    }

    #[test]
    fn test_stale_and_expire_despite_acoustic() {
        let tracker = ContactTracker::new(TrackerConfig::default());
        let id = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id.unwrap();
        tracker.advance(0.0);

        for i in 1..=40 {
            tracker.ingest(cue(i as f64, 120.0, None)).unwrap();
        }
        let events = tracker.advance(6.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, ContactStatus::Stale);
        assert_eq!(tracker.snapshot(id).unwrap().status, ContactStatus::Stale);

        let events = tracker.advance(30.0);
        assert_eq!(events[0].to, ContactStatus::Expired);
        assert_eq!(tracker.contact_count(), 0);
        assert!(tracker.snapshot(id).is_none());
    }

    #[test]
    fn test_stale_contact_recovers() {
        let config = TrackerConfig {
            confirm_hits: 1,
            ..Default::default()
        };
        let tracker = ContactTracker::new(config);
        let id = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id.unwrap();
        tracker.ingest(ranging(1.0, 100.0, 10.0)).unwrap();
        tracker.advance(7.0);
        assert_eq!(tracker.snapshot(id).unwrap().status, ContactStatus::Stale);

        let out = tracker.ingest(ranging(8.0, 100.0, 10.0)).unwrap();
        assert_eq!(out.contact_id, Some(id));
        assert_eq!(tracker.snapshot(id).unwrap().status, ContactStatus::Confirmed);
    }

    #[test]
    fn test_bearing_fallback() {
        let config = TrackerConfig {
            acoustic_bearing_fallback: true,
            ..Default::default()
        };
        let tracker = ContactTracker::new(config);
        let id = tracker.ingest(ranging(0.0, 100.0, 10.0)).unwrap().contact_id;

        // Ranging not yet silent long enough
        let out = tracker.ingest(cue(1.0, 100.0, Some(11.0))).unwrap();
        assert_eq!(out.kind, UpdateKind::AcousticCue);

        let out = tracker.ingest(cue(3.0, 100.0, Some(12.0))).unwrap();
        assert_eq!(out, IngestOutcome::new(id, UpdateKind::BearingOnly));
        let snap = tracker.snapshot(id.unwrap()).unwrap();
        assert!(snap.bearing_deg > 10.0 && snap.bearing_deg < 12.0);
        assert_eq!(snap.last_update, 3.0);

        // Geometry-only update does not keep the contact fresh
        let events = tracker.advance(5.5);
        assert!(events.iter().any(|e| e.to == ContactStatus::Stale));
    }

    #[test]
    fn test_concurrent_ingest() {
        let tracker = Arc::new(ContactTracker::new(TrackerConfig::default()));
        let bearings = [0.0, 90.0, 180.0, 270.0];
        let threads: Vec<_> = bearings
            .iter()
            .map(|&az| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        tracker.ingest(ranging(i as f64 * 0.1, 300.0, az)).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(tracker.contact_count(), 4);
        for snap in tracker.snapshots() {
            assert_eq!(snap.status, ContactStatus::Confirmed);
        }
    }
}
