//! Sensor driver interfaces and the simulated drivers used when no hardware
//! is attached.
//!
//! # Scenarios
//!
//! - **approach**: a boat heads straight for the robot at 6 m/s from 400 m
//! - **crossing**: an ROV crosses ahead at 3 m/s with an 80 m closest approach
//! - **idle**: ambient noise only, no contact

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

use diveguard_core::{AcousticWindow, InertialHeading, RangeBearing, Timestamp};

use crate::error::PipelineError;

#[async_trait]
pub trait RangingSource: Send {
    /// Next ping. `Ok(None)` when the ping returned no echo.
    async fn next_reading(&mut self) -> Result<Option<RangeBearing>, PipelineError>;
}

#[async_trait]
pub trait AcousticSource: Send {
    async fn next_window(&mut self) -> Result<AcousticWindow, PipelineError>;
}

#[async_trait]
pub trait InertialSource: Send {
    async fn next_heading(&mut self) -> Result<InertialHeading, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Approach,
    Crossing,
    Idle,
}

/// Ground truth of the simulated vessel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedVessel {
    /// Absolute frame: x along heading 0°, y 90° clockwise, z up (m)
    pub position: [f64; 3],
    pub blade_pass_hz: f64,
    pub harmonics: usize,
    /// Broadband cavitation noise relative to the tonal level
    pub cavitation: f64,
}

impl SimulatedVessel {
    pub fn range_m(&self) -> f64 {
        let [x, y, z] = self.position;
        (x * x + y * y + z * z).sqrt()
    }

    pub fn bearing_deg(&self) -> f64 {
        self.position[1].atan2(self.position[0]).to_degrees().rem_euclid(360.0)
    }

    pub fn elevation_deg(&self) -> f64 {
        let [x, y, z] = self.position;
        z.atan2(x.hypot(y)).to_degrees()
    }
}

impl Scenario {
    pub fn vessel_at(&self, t: Timestamp) -> Option<SimulatedVessel> {
        match self {
            Scenario::Approach => {
                let start = 400.0;
                let range = (start - 6.0 * t).max(5.0);
                let bearing = 45f64.to_radians();
                Some(SimulatedVessel {
                    position: [range * bearing.cos(), range * bearing.sin(), -3.0],
                    blade_pass_hz: 100.0,
                    harmonics: 3,
                    cavitation: 0.25,
                })
            }
            Scenario::Crossing => Some(SimulatedVessel {
                position: [80.0, -600.0 + 3.0 * t, 0.0],
                blade_pass_hz: 300.0,
                harmonics: 2,
                cavitation: 0.05,
            }),
            Scenario::Idle => None,
        }
    }

    /// Own heading with a slow yaw oscillation (deg).
    pub fn heading_at(&self, t: Timestamp) -> f64 {
        (20.0 + 3.0 * (0.1 * t).sin()).rem_euclid(360.0)
    }
}

/// Simulated seconds since the pipeline started; shared by every simulated
/// driver. `speed` scales wall time (1.0 = realtime).
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
    speed: f64,
}

impl SimClock {
    pub fn start(speed: f64) -> Self {
        SimClock {
            origin: Instant::now(),
            speed,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.origin.elapsed().as_secs_f64() * self.speed
    }
}

/// Fixed-rate pacing. The interval is created on the first tick so drivers
/// can be built outside a runtime.
#[derive(Debug)]
struct Pacer {
    period: Duration,
    interval: Option<Interval>,
}

impl Pacer {
    fn new(rate_hz: f64) -> Self {
        Pacer {
            period: Duration::from_secs_f64(1.0 / rate_hz),
            interval: None,
        }
    }

    async fn tick(&mut self) {
        let period = self.period;
        self.interval
            .get_or_insert_with(|| {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            })
            .tick()
            .await;
    }
}

/// Zero-mean uniform noise with standard deviation `sigma`.
fn noise(rng: &mut StdRng, sigma: f64) -> f64 {
    rng.gen_range(-1.0..1.0) * sigma * 3f64.sqrt()
}

pub struct SimulatedRanging {
    scenario: Scenario,
    clock: SimClock,
    pacer: Pacer,
    rng: StdRng,
    max_range_m: f64,
    range_sigma_m: f64,
    angle_sigma_deg: f64,
}

impl SimulatedRanging {
    pub fn new(scenario: Scenario, clock: SimClock, rate_hz: f64, seed: u64) -> Self {
        SimulatedRanging {
            scenario,
            clock,
            pacer: Pacer::new(rate_hz),
            rng: StdRng::seed_from_u64(seed),
            max_range_m: 500.0,
            range_sigma_m: 0.5,
            angle_sigma_deg: 0.7,
        }
    }

    pub fn reading_at(&mut self, t: Timestamp) -> Option<RangeBearing> {
        let vessel = self.scenario.vessel_at(t)?;
        if vessel.range_m() > self.max_range_m {
            return None;
        }
        let heading = self.scenario.heading_at(t);
        let azimuth = vessel.bearing_deg() - heading + noise(&mut self.rng, self.angle_sigma_deg);
        Some(RangeBearing {
            timestamp: t,
            range_m: (vessel.range_m() + noise(&mut self.rng, self.range_sigma_m)).max(0.1),
            azimuth_deg: azimuth.rem_euclid(360.0),
            elevation_deg: vessel.elevation_deg() + noise(&mut self.rng, self.angle_sigma_deg),
            range_variance: self.range_sigma_m.powi(2),
            angle_variance: self.angle_sigma_deg.powi(2),
        })
    }
}

#[async_trait]
impl RangingSource for SimulatedRanging {
    async fn next_reading(&mut self) -> Result<Option<RangeBearing>, PipelineError> {
        self.pacer.tick().await;
        let t = self.clock.now();
        Ok(self.reading_at(t))
    }
}

pub struct SimulatedHydrophone {
    scenario: Scenario,
    clock: SimClock,
    pacer: Pacer,
    rng: StdRng,
    sample_rate_hz: f64,
    window_size: usize,
}

impl SimulatedHydrophone {
    pub fn new(
        scenario: Scenario,
        clock: SimClock,
        rate_hz: f64,
        sample_rate_hz: f64,
        window_size: usize,
        seed: u64,
    ) -> Self {
        SimulatedHydrophone {
            scenario,
            clock,
            pacer: Pacer::new(rate_hz),
            rng: StdRng::seed_from_u64(seed),
            sample_rate_hz,
            window_size,
        }
    }

    /// Propeller tone plus cavitation and ambient noise, louder as the vessel nears.
    pub fn window_at(&mut self, t: Timestamp) -> AcousticWindow {
        let vessel = self.scenario.vessel_at(t);
        let level = vessel.map_or(0.0, |v| (40.0 / v.range_m().max(1.0)).clamp(0.02, 0.4));
        let start = t - self.window_size as f64 / self.sample_rate_hz;

        let samples = (0..self.window_size)
            .map(|i| {
                let time = start + i as f64 / self.sample_rate_hz;
                let mut x = noise(&mut self.rng, 0.003);
                if let Some(v) = vessel {
                    for order in 1..=v.harmonics {
                        let k = order as f64;
                        x += level / k * (2.0 * PI * k * v.blade_pass_hz * time).sin();
                    }
                    x += noise(&mut self.rng, level * v.cavitation);
                }
                (x.clamp(-1.0, 1.0) * 32_767.0) as i16
            })
            .collect();

        AcousticWindow {
            timestamp: t,
            sample_rate_hz: self.sample_rate_hz,
            samples,
            bearing_deg: None,
        }
    }
}

#[async_trait]
impl AcousticSource for SimulatedHydrophone {
    async fn next_window(&mut self) -> Result<AcousticWindow, PipelineError> {
        self.pacer.tick().await;
        let t = self.clock.now();
        Ok(self.window_at(t))
    }
}

pub struct SimulatedCompass {
    scenario: Scenario,
    clock: SimClock,
    pacer: Pacer,
    rng: StdRng,
    jitter_deg: f64,
}

impl SimulatedCompass {
    pub fn new(scenario: Scenario, clock: SimClock, rate_hz: f64, seed: u64) -> Self {
        SimulatedCompass {
            scenario,
            clock,
            pacer: Pacer::new(rate_hz),
            rng: StdRng::seed_from_u64(seed),
            jitter_deg: 0.3,
        }
    }

    pub fn heading_at(&mut self, t: Timestamp) -> InertialHeading {
        let heading = self.scenario.heading_at(t) + noise(&mut self.rng, self.jitter_deg);
        InertialHeading {
            timestamp: t,
            heading_deg: heading.rem_euclid(360.0),
            heading_variance: self.jitter_deg.powi(2),
        }
    }
}

#[async_trait]
impl InertialSource for SimulatedCompass {
    async fn next_heading(&mut self) -> Result<InertialHeading, PipelineError> {
        self.pacer.tick().await;
        let t = self.clock.now();
        Ok(self.heading_at(t))
    }
}

/// One driver per modality.
pub struct SensorSuite {
    pub ranging: Box<dyn RangingSource>,
    pub acoustic: Box<dyn AcousticSource>,
    pub inertial: Box<dyn InertialSource>,
}

impl SensorSuite {
    pub fn simulated(
        scenario: Scenario,
        clock: SimClock,
        runtime: &crate::settings::RuntimeSettings,
        acoustic: &diveguard_core::AcousticConfig,
    ) -> Self {
        log::info!("Simulating scenario {:?} (seed {})", scenario, runtime.seed);
        SensorSuite {
            ranging: Box::new(SimulatedRanging::new(
                scenario,
                clock,
                runtime.ranging_rate_hz,
                runtime.seed,
            )),
            acoustic: Box::new(SimulatedHydrophone::new(
                scenario,
                clock,
                runtime.acoustic_rate_hz,
                acoustic.sample_rate_hz,
                acoustic.window_size,
                runtime.seed.wrapping_add(1),
            )),
            inertial: Box::new(SimulatedCompass::new(
                scenario,
                clock,
                runtime.inertial_rate_hz,
                runtime.seed.wrapping_add(2),
            )),
        }
    }
}
