use anyhow::Context;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use diveguard_server::sink::{AlertSink, JsonLinesSink, LogSink};
use diveguard_server::{Pipeline, PipelineError, Scenario, SensorSuite, Settings, SimClock, SinkKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Output {
    Log,
    Json,
}

/// Propeller-vessel threat estimation for an underwater robot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Settings file (JSON); defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated scenario driving the sensor drivers
    #[arg(short, long, value_enum, default_value_t = Scenario::Approach)]
    scenario: Scenario,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Alert output, overrides the settings file
    #[arg(short, long, value_enum)]
    output: Option<Output>,

    /// Simulation speed factor (1.0 = realtime), overrides the settings file
    #[arg(long)]
    speed: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let mut settings = Settings::load(cli.config.as_deref()).context("Cannot load settings")?;
    match cli.output {
        Some(Output::Log) => settings.runtime.sink = SinkKind::Log,
        Some(Output::Json) => settings.runtime.sink = SinkKind::Json,
        None => {}
    }
    if let Some(speed) = cli.speed {
        settings.runtime.simulation_speed = speed;
    }

    let sink: Box<dyn AlertSink> = match (settings.runtime.sink, &settings.runtime.json_path) {
        (SinkKind::Log, _) => Box::new(LogSink),
        (SinkKind::Json, Some(path)) => Box::new(JsonLinesSink::create(path)?),
        (SinkKind::Json, None) => Box::new(JsonLinesSink::stdout()),
    };

    let pipeline = Pipeline::new(settings).context("Cannot start pipeline")?;
    let shutdown_timeout = Duration::from_millis(pipeline.settings().runtime.shutdown_timeout_ms);
    let scenario = cli.scenario;
    let duration = cli.duration;

    let runner = pipeline.clone();
    let result = Toplevel::new(move |s| async move {
        let runtime = &runner.settings().runtime;
        let clock = SimClock::start(runtime.simulation_speed);
        let sensors = SensorSuite::simulated(scenario, clock, runtime, &runner.settings().core.acoustic);
        runner.start(&s, sensors, sink);

        if let Some(secs) = duration {
            s.start(SubsystemBuilder::new("timer", move |t: SubsystemHandle| async move {
                tokio::select! {
                    _ = t.on_shutdown_requested() => {},
                    _ = tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))) => {
                        log::info!("Run time of {:.1}s elapsed", secs);
                        t.request_shutdown();
                    }
                }
                Ok::<(), PipelineError>(())
            }));
        }
    })
    .catch_signals()
    .handle_shutdown_requests(shutdown_timeout)
    .await;

    let stats = pipeline.stats();
    log::info!(
        "Stopped with {} contacts: {}",
        pipeline.tracker().contact_count(),
        serde_json::to_string(&stats)?
    );
    result.context("Pipeline did not shut down cleanly")
}
