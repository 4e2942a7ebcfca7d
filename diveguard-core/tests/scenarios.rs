//! End-to-end scenarios through extraction, classification, fusion and assessment.

use std::f64::consts::PI;

use diveguard_core::{
    AcousticFeatureExtractor, AcousticConfig, AlertStage, ClassificationResult, ClassifierConfig,
    ContactStatus, ContactTracker, InertialHeading, Measurement, RangeBearing,
    SignatureClassifier, ThreatAssessmentEngine, ThreatConfig, TrackerConfig, UpdateKind,
    VesselType,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

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

fn heading(timestamp: f64, heading_deg: f64) -> Measurement {
    Measurement::InertialHeading(InertialHeading {
        timestamp,
        heading_deg,
        heading_variance: 0.1,
    })
}

fn boat(confidence: f64) -> ClassificationResult {
    ClassificationResult {
        vessel_type: VesselType::Boat,
        confidence,
        rpm_estimate: 2000.0,
        blade_count_estimate: 3,
        cavitation_level: 0.3,
        fundamental_hz: 100.0,
        probabilities: vec![(VesselType::Boat, confidence)],
    }
}

/// Propeller tone: blade-pass line with harmonics over broadband noise.
fn propeller_pcm(f0: f64, fs: f64, len: usize, seed: u64) -> Vec<i16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|i| {
            let t = i as f64 / fs;
            let x = 0.4 * (2.0 * PI * f0 * t).sin()
                + 0.25 * (2.0 * PI * 2.0 * f0 * t).sin()
                + 0.15 * (2.0 * PI * 3.0 * f0 * t).sin()
                + 0.01 * rng.gen_range(-1.0..1.0);
            (x * 32_767.0) as i16
        })
        .collect()
}

#[test]
fn test_approaching_boat_reaches_critical() {
    let tracker = ContactTracker::new(TrackerConfig::default());
    let engine = ThreatAssessmentEngine::new(ThreatConfig::default());

    tracker.ingest(heading(0.0, 90.0)).unwrap();
    let id = tracker
        .ingest(ranging(0.0, 200.0, 60.0))
        .unwrap()
        .contact_id
        .unwrap();
    assert!(tracker.attach_classification(id, &boat(0.85), 0.0));

    let mut last = None;
    for step in 1..=32 {
        let t = step as f64;
        let outcome = tracker.ingest(ranging(t, 200.0 - 5.0 * t, 60.0)).unwrap();
        assert_eq!(outcome.contact_id, Some(id));
        assert_eq!(outcome.kind, UpdateKind::Corrected);
        tracker.advance(t);
        if step % 10 == 0 {
            // Keep the classification fresh
            assert!(tracker.attach_classification(id, &boat(0.85), t));
        }
        last = tracker.assess_with(id, &engine, t);
    }

    let snapshot = tracker.snapshot(id).unwrap();
    assert_eq!(snapshot.status, ContactStatus::Confirmed);
    assert!((snapshot.bearing_deg - 150.0).abs() < 1.0, "{:?}", snapshot);

    let record = last.unwrap();
    assert!((record.distance_m - 40.0).abs() < 3.0, "{:?}", record);
    assert!((record.azimuth_deg - 60.0).abs() < 1.0, "{:?}", record);
    assert!(record.closing_speed_mps > 3.0, "{:?}", record);
    assert!(record.time_to_collision_s.is_finite());
    assert_eq!(record.vessel_type, VesselType::Boat);
    assert!(record.risk_level >= 8);
    assert_eq!(record.stage, AlertStage::Critical);
    assert!(record.recommendation.contains("to starboard"));
    assert!((record.evasion.relative_heading_deg - 240.0).abs() < 1.0);
}

#[test]
fn test_pcm_window_classifies_cued_contact() {
    let fs = 48_000.0;
    let extractor = AcousticFeatureExtractor::new(AcousticConfig::default());
    let classifier = SignatureClassifier::new(ClassifierConfig::default()).unwrap();
    let tracker = ContactTracker::new(TrackerConfig::default());

    let id = tracker
        .ingest(ranging(0.0, 150.0, 0.0))
        .unwrap()
        .contact_id
        .unwrap();

    let features = extractor.extract(&propeller_pcm(120.0, fs, 16_384, 3), fs).unwrap();
    let result = classifier.classify(&features).unwrap();
    assert!(result.blade_count_estimate >= 2, "{:?}", result);
    assert!((result.fundamental_hz - 120.0).abs() < 3.0, "{:?}", result);

    let peak = features.to_peak_measurement(0.5, None).unwrap();
    let outcome = tracker.ingest(Measurement::AcousticPeak(peak)).unwrap();
    assert_eq!(outcome.kind, UpdateKind::AcousticCue);
    assert_eq!(outcome.contact_id, Some(id));
    assert!(!outcome.state_changed());

    assert!(tracker.attach_classification(id, &result, 0.5));
    let attached = tracker.snapshot(id).unwrap().classification.unwrap();
    assert_eq!(attached.vessel_type, result.vessel_type);
    assert_eq!(attached.blade_count, result.blade_count_estimate);
}

#[test]
fn test_silent_contact_goes_stale_then_expires() {
    let tracker = ContactTracker::new(TrackerConfig::default());
    let engine = ThreatAssessmentEngine::new(ThreatConfig::default());
    let id = tracker
        .ingest(ranging(0.0, 300.0, 45.0))
        .unwrap()
        .contact_id
        .unwrap();
    for step in 1..=3 {
        tracker.ingest(ranging(step as f64, 300.0, 45.0)).unwrap();
    }
    let events = tracker.advance(3.0);
    assert!(events.iter().any(|e| e.to == ContactStatus::Confirmed));

    let events = tracker.advance(8.5);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to, ContactStatus::Stale);

    // A stale contact is still assessed
    let record = tracker.assess_with(id, &engine, 8.5).unwrap();
    assert_eq!(record.stage, AlertStage::Distant);
    assert_eq!(record.vessel_type, VesselType::Unknown);

    let events = tracker.advance(33.0);
    assert_eq!(events[0].to, ContactStatus::Expired);
    assert_eq!(tracker.contact_count(), 0);
    assert!(tracker.assess_with(id, &engine, 33.0).is_none());
}

#[test]
fn test_out_of_order_ranging_is_dropped() {
    let tracker = ContactTracker::new(TrackerConfig::default());
    let id = tracker
        .ingest(ranging(10.0, 100.0, 0.0))
        .unwrap()
        .contact_id
        .unwrap();
    tracker.ingest(ranging(11.0, 98.0, 0.0)).unwrap();
    let before = tracker.snapshot(id).unwrap();

    let outcome = tracker.ingest(ranging(10.5, 98.5, 0.0)).unwrap();
    assert_eq!(outcome.kind, UpdateKind::Dropped);
    assert_eq!(tracker.snapshot(id).unwrap(), before);
}
