//! Pipeline Subsystems
//!
//! Wires sensor drivers, the core estimators and the alert sink together as
//! graceful-shutdown subsystems.
//!
//! # Architecture
//!
//! ```text
//! compass ─────────────────────────────┐
//! sonar ───────────────────────────────┼─► fusion ──► alerts ──► sink
//! hydrophone ──► classifier (blocking) ┘  (head merge, tracker, engine)
//! ```
//!
//! Producers push into bounded drop-oldest queues. The fusion subsystem
//! merges the queue heads by timestamp, waiting at most `drainWaitMs` for a
//! missing stream, and assesses every contact whose state changed. Records go
//! to the alert subsystem through a bounded channel with `try_send`, so a
//! slow sink never stalls fusion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep_until, Instant};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

use diveguard_core::{
    AcousticFeatureExtractor, AcousticWindow, AlertStage, ClassificationResult,
    ClassificationSmoother, ContactId, ContactStatus, ContactTracker, CoreError, Measurement,
    SignatureClassifier, ThreatAssessmentEngine, ThreatRecord, Timestamp, UpdateKind,
};

use crate::error::PipelineError;
use crate::merge::{HeadMerge, Timestamped};
use crate::queue::SensorQueue;
use crate::settings::Settings;
use crate::sink::AlertSink;
use crate::sources::{AcousticSource, InertialSource, RangingSource, SensorSuite};
use crate::stats::{PipelineStats, QueueDrops, StatsSnapshot};

// Merge stream order; same-time heading applies before ranging before cues
const INERTIAL: usize = 0;
const RANGING: usize = 1;
const CUES: usize = 2;
const STREAMS: usize = 3;

const WINDOW_POLL: Duration = Duration::from_millis(500);

/// A measurement on its way to the tracker. Acoustic cues carry the
/// classification of the window that produced them.
#[derive(Debug, Clone)]
pub struct FusionInput {
    pub measurement: Measurement,
    pub classification: Option<ClassificationResult>,
}

impl FusionInput {
    pub fn sensor(measurement: Measurement) -> Self {
        FusionInput {
            measurement,
            classification: None,
        }
    }
}

impl Timestamped for FusionInput {
    fn timestamp(&self) -> Timestamp {
        self.measurement.timestamp()
    }
}

#[derive(Debug)]
pub struct Queues {
    pub ranging: SensorQueue<FusionInput>,
    pub windows: SensorQueue<AcousticWindow>,
    pub cues: SensorQueue<FusionInput>,
    pub inertial: SensorQueue<FusionInput>,
}

impl Queues {
    fn new(settings: &Settings) -> Self {
        let rt = &settings.runtime;
        Queues {
            ranging: SensorQueue::new("ranging", rt.ranging_queue_capacity),
            windows: SensorQueue::new("acoustic", rt.acoustic_queue_capacity),
            cues: SensorQueue::new("cues", rt.cue_queue_capacity),
            inertial: SensorQueue::new("inertial", rt.inertial_queue_capacity),
        }
    }

    pub fn drops(&self) -> QueueDrops {
        QueueDrops {
            ranging: self.ranging.dropped(),
            acoustic: self.windows.dropped(),
            cues: self.cues.dropped(),
            inertial: self.inertial.dropped(),
        }
    }
}

/// Everything the subsystems share. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<Settings>,
    tracker: Arc<ContactTracker>,
    engine: Arc<ThreatAssessmentEngine>,
    extractor: Arc<AcousticFeatureExtractor>,
    classifier: Arc<SignatureClassifier>,
    queues: Arc<Queues>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Build the core components. Backend and configuration errors are fatal here.
    pub fn new(settings: Settings) -> Result<Self, PipelineError> {
        settings.validate()?;
        let classifier = SignatureClassifier::new(settings.core.classifier.clone())?;
        log::info!("Classifier backend: {}", classifier.backend_name());
        Ok(Pipeline {
            tracker: Arc::new(ContactTracker::new(settings.core.tracker.clone())),
            engine: Arc::new(ThreatAssessmentEngine::new(settings.core.threat.clone())),
            extractor: Arc::new(AcousticFeatureExtractor::new(settings.core.acoustic.clone())),
            classifier: Arc::new(classifier),
            queues: Arc::new(Queues::new(&settings)),
            stats: Arc::new(PipelineStats::new()),
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tracker(&self) -> &ContactTracker {
        &self.tracker
    }

    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queues.drops())
    }

    /// Start every subsystem under `subsys`.
    pub fn start(&self, subsys: &SubsystemHandle, sensors: SensorSuite, sink: Box<dyn AlertSink>) {
        let (alert_tx, alert_rx) = mpsc::channel(self.settings.runtime.alert_channel_capacity);
        let SensorSuite {
            ranging,
            acoustic,
            inertial,
        } = sensors;

        let queues = Arc::clone(&self.queues);
        subsys.start(SubsystemBuilder::new("sonar", move |s| {
            produce_ranging(ranging, queues, s)
        }));
        let queues = Arc::clone(&self.queues);
        subsys.start(SubsystemBuilder::new("hydrophone", move |s| {
            produce_windows(acoustic, queues, s)
        }));
        let queues = Arc::clone(&self.queues);
        subsys.start(SubsystemBuilder::new("compass", move |s| {
            produce_headings(inertial, queues, s)
        }));

        let classification = ClassificationLoop::new(self.clone());
        subsys.start(SubsystemBuilder::new("classifier", move |s| {
            classification.run(s)
        }));

        let fusion = FusionLoop::new(self.clone(), alert_tx);
        subsys.start(SubsystemBuilder::new("fusion", move |s| fusion.run(s)));

        let stats = Arc::clone(&self.stats);
        subsys.start(SubsystemBuilder::new("alerts", move |s| {
            deliver_alerts(alert_rx, sink, stats, s)
        }));
    }
}

async fn produce_ranging(
    mut source: Box<dyn RangingSource>,
    queues: Arc<Queues>,
    subsys: SubsystemHandle,
) -> Result<(), PipelineError> {
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => return Ok(()),
            r = source.next_reading() => {
                if let Some(reading) = r? {
                    queues.ranging.push(FusionInput::sensor(Measurement::RangeBearing(reading)));
                }
            }
        }
    }
}

async fn produce_windows(
    mut source: Box<dyn AcousticSource>,
    queues: Arc<Queues>,
    subsys: SubsystemHandle,
) -> Result<(), PipelineError> {
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => return Ok(()),
            r = source.next_window() => {
                queues.windows.push(r?);
            }
        }
    }
}

async fn produce_headings(
    mut source: Box<dyn InertialSource>,
    queues: Arc<Queues>,
    subsys: SubsystemHandle,
) -> Result<(), PipelineError> {
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => return Ok(()),
            r = source.next_heading() => {
                queues.inertial.push(FusionInput::sensor(Measurement::InertialHeading(r?)));
            }
        }
    }
}

/// Feature extraction and classification on the blocking pool, one smoother
/// for the acoustic stream.
struct ClassificationLoop {
    pipeline: Pipeline,
    smoother: ClassificationSmoother,
}

impl ClassificationLoop {
    fn new(pipeline: Pipeline) -> Self {
        let smoother = pipeline.classifier.smoother();
        ClassificationLoop { pipeline, smoother }
    }

    async fn run(mut self, subsys: SubsystemHandle) -> Result<(), PipelineError> {
        log::debug!("classifier: started");
        loop {
            let window = tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::debug!("classifier: shutdown");
                    return Ok(());
                },
                w = self.pipeline.queues.windows.pop_timeout(WINDOW_POLL) => w,
            };
            if let Some(window) = window {
                self.process(window).await?;
            }
        }
    }

    async fn process(&mut self, window: AcousticWindow) -> Result<(), PipelineError> {
        let extractor = Arc::clone(&self.pipeline.extractor);
        let classifier = Arc::clone(&self.pipeline.classifier);
        let AcousticWindow {
            timestamp,
            sample_rate_hz,
            samples,
            bearing_deg,
        } = window;

        let outcome = tokio::task::spawn_blocking(move || {
            let features = extractor.extract(&samples, sample_rate_hz)?;
            let result = classifier.classify(&features)?;
            Ok::<_, CoreError>((features, result))
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?;

        let stats = &self.pipeline.stats;
        match outcome {
            Ok((features, result)) => {
                stats.window_classified();
                let smoothed = self.smoother.push(result);
                log::debug!(
                    "window {:.2}s: {} ({:.2}) f0 {:.1} Hz, {} blades",
                    timestamp,
                    smoothed.vessel_type,
                    smoothed.confidence,
                    smoothed.fundamental_hz,
                    smoothed.blade_count_estimate
                );
                match features.to_peak_measurement(timestamp, bearing_deg) {
                    Some(peak) => {
                        self.pipeline.queues.cues.push(FusionInput {
                            measurement: Measurement::AcousticPeak(peak),
                            classification: Some(smoothed),
                        });
                    }
                    None => log::debug!("window {:.2}s: no line above the noise floor", timestamp),
                }
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                stats.window_failed();
                log::warn!("window {:.2}s: {}", timestamp, e);
                Ok(())
            }
        }
    }
}

struct FusionLoop {
    pipeline: Pipeline,
    merge: HeadMerge<FusionInput>,
    alerts: mpsc::Sender<ThreatRecord>,
    stages: HashMap<ContactId, AlertStage>,
    /// Latest measurement time seen; drives the lifecycle clock
    now: Timestamp,
    next_stats: Instant,
}

impl FusionLoop {
    fn new(pipeline: Pipeline, alerts: mpsc::Sender<ThreatRecord>) -> Self {
        let next_stats = Instant::now() + pipeline.stats_interval();
        FusionLoop {
            pipeline,
            merge: HeadMerge::new(STREAMS),
            alerts,
            stages: HashMap::new(),
            now: 0.0,
            next_stats,
        }
    }

    fn refill(&mut self) {
        let queues = &self.pipeline.queues;
        self.merge.refill(INERTIAL, || queues.inertial.try_pop());
        self.merge.refill(RANGING, || queues.ranging.try_pop());
        self.merge.refill(CUES, || queues.cues.try_pop());
    }

    async fn run(mut self, subsys: SubsystemHandle) -> Result<(), PipelineError> {
        log::debug!("fusion: started");
        let drain_wait = Duration::from_millis(self.pipeline.settings.runtime.drain_wait_ms);
        let queues = Arc::clone(&self.pipeline.queues);

        loop {
            self.refill();
            let deadline = Instant::now() + drain_wait;
            while !self.merge.is_complete() {
                tokio::select! {
                    _ = subsys.on_shutdown_requested() => {
                        self.drain()?;
                        log::debug!("fusion: shutdown");
                        return Ok(());
                    },
                    _ = queues.inertial.notified() => {},
                    _ = queues.ranging.notified() => {},
                    _ = queues.cues.notified() => {},
                    _ = sleep_until(deadline) => break,
                }
                self.refill();
            }

            // A lagging stream is waited for once, then the queued heads drain
            let timed_out = !self.merge.is_complete();
            while let Some((_, input)) = self.merge.pop() {
                self.apply(input)?;
                self.refill();
                if !timed_out && !self.merge.is_complete() {
                    break;
                }
            }
            self.log_stats();
        }
    }

    /// Apply what is already queued, then stop.
    fn drain(&mut self) -> Result<(), PipelineError> {
        self.refill();
        while let Some((_, input)) = self.merge.pop() {
            self.apply(input)?;
            self.refill();
        }
        Ok(())
    }

    fn apply(&mut self, input: FusionInput) -> Result<(), PipelineError> {
        let started = std::time::Instant::now();
        let timestamp = input.measurement.timestamp();
        let stats = Arc::clone(&self.pipeline.stats);

        let tracker = &self.pipeline.tracker;
        let ingested = match (input.measurement, &input.classification) {
            (Measurement::AcousticPeak(peak), Some(result)) => {
                tracker.ingest_classified_cue(peak, result)
            }
            (measurement, _) => tracker.ingest(measurement),
        };
        match ingested {
            Ok(outcome) => {
                stats.applied();
                if outcome.kind == UpdateKind::Dropped {
                    stats.out_of_order();
                }
                if outcome.state_changed() {
                    if let Some(id) = outcome.contact_id {
                        self.assess(id, timestamp);
                    }
                }
            }
            Err(CoreError::NumericalInstability { .. }) => stats.numerical_fault(),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(_) => stats.rejected(),
        }

        self.now = self.now.max(timestamp);
        for event in self.pipeline.tracker.advance(self.now) {
            if event.to == ContactStatus::Expired {
                self.stages.remove(&event.contact_id);
            }
        }
        stats.record_processing(started.elapsed());
        Ok(())
    }

    fn assess(&mut self, id: ContactId, timestamp: Timestamp) {
        let Some(record) = self
            .pipeline
            .tracker
            .assess_with(id, &self.pipeline.engine, timestamp)
        else {
            return;
        };

        let previous = self.stages.insert(id, record.stage);
        if record.stage == AlertStage::Critical && previous != Some(AlertStage::Critical) {
            self.pipeline.stats.critical_event();
            log::warn!("{}: critical, {}", id, record.recommendation);
        }
        if record.stage < self.pipeline.settings.runtime.min_alert_stage {
            return;
        }

        self.pipeline.stats.threat_detected();
        match self.alerts.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.pipeline.stats.alert_dropped(),
            Err(TrySendError::Closed(_)) => {
                self.pipeline.stats.alert_dropped();
                log::debug!("{}: alert channel closed", id);
            }
        }
    }

    fn log_stats(&mut self) {
        if Instant::now() < self.next_stats {
            return;
        }
        self.next_stats = Instant::now() + self.pipeline.stats_interval();
        match serde_json::to_string(&self.pipeline.stats()) {
            Ok(json) => log::info!(
                "{} contacts, heading {:.1}°, stats {}",
                self.pipeline.tracker.contact_count(),
                self.pipeline.tracker.heading_deg(),
                json
            ),
            Err(e) => log::error!("Cannot serialise statistics: {}", e),
        }
    }
}

impl Pipeline {
    fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.settings.runtime.stats_interval_secs.max(1))
    }
}

async fn deliver_alerts(
    mut alerts: mpsc::Receiver<ThreatRecord>,
    mut sink: Box<dyn AlertSink>,
    stats: Arc<PipelineStats>,
    subsys: SubsystemHandle,
) -> Result<(), PipelineError> {
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => {
                while let Ok(record) = alerts.try_recv() {
                    sink.emit(&record)?;
                    stats.alert_emitted();
                }
                sink.flush()?;
                return Ok(());
            },
            r = alerts.recv() => match r {
                Some(record) => {
                    sink.emit(&record)?;
                    stats.alert_emitted();
                }
                None => {
                    sink.flush()?;
                    return Ok(());
                }
            }
        }
    }
}
