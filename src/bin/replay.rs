use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use run_telemetry::course::{CourseDefinition, CourseTracker};
use run_telemetry::ghost::GhostCoordinator;
use run_telemetry::pipeline::{SampleFeed, SensorAvailability, SensorPipeline};
use run_telemetry::storage::{self, GpxTrack, RunSummary};
use run_telemetry::types::{LocationSample, PressureSample, RunSample, StepSample, TimestampMs};
use run_telemetry::{RunAction, RunEngine, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay a recorded sensor log through the run telemetry engine", long_about = None)]
struct Args {
    /// Path to session_*.json[.gz] sensor log
    #[arg(long)]
    log: PathBuf,

    /// Course definition (JSON); enables course mode
    #[arg(long)]
    course: Option<PathBuf>,

    /// Ghost telemetry log (JSON lines); needs --course
    #[arg(long, requires = "course")]
    ghost: Option<PathBuf>,

    /// Tracker config overrides (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Playback speed relative to real time (0 = as fast as possible)
    #[arg(long, default_value = "0")]
    speed: f64,

    /// Write the telemetry log here (JSON lines)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write a GPX track here
    #[arg(long)]
    gpx: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
struct LocationReading {
    lat: f64,
    lng: f64,
    accuracy: f64,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    altitude_accuracy: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
struct Reading {
    timestamp: TimestampMs,
    #[serde(default)]
    location: Option<LocationReading>,
    /// hPa
    #[serde(default)]
    pressure: Option<f64>,
    /// Cumulative step counter
    #[serde(default)]
    steps: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum UserAction {
    Pause,
    Resume,
    Extend,
    Stop,
}

#[derive(Deserialize, Debug, Clone)]
struct TimedAction {
    at: TimestampMs,
    action: UserAction,
}

#[derive(Deserialize, Debug)]
struct LogFile {
    readings: Vec<Reading>,
    #[serde(default)]
    actions: Vec<TimedAction>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let reader = BufReader::new(storage::open_maybe_gz(path)?);
    let mut log: LogFile = serde_json::from_reader(reader)
        .with_context(|| format!("parsing {}", path.display()))?;
    log.readings.sort_by_key(|r| r.timestamp);
    log.actions.sort_by_key(|a| a.at);
    Ok(log)
}

fn detect_sensors(readings: &[Reading]) -> SensorAvailability {
    SensorAvailability {
        barometer: readings.iter().any(|r| r.pressure.is_some()),
        pedometer: readings.iter().any(|r| r.steps.is_some()),
    }
}

fn to_action(action: &TimedAction) -> RunAction {
    let at = action.at;
    match action.action {
        UserAction::Pause => RunAction::PauseUser { at },
        UserAction::Resume => RunAction::Resume { at },
        UserAction::Extend => RunAction::Extend { at },
        UserAction::Stop => RunAction::Stop { at },
    }
}

/// Background delivery: fuse readings in log order and publish each sample.
async fn deliver(readings: Vec<Reading>, mut pipeline: SensorPipeline, feed: SampleFeed, speed: f64) {
    let mut prev_ts: Option<TimestampMs> = None;
    let mut published = 0usize;

    for reading in readings {
        if let (Some(prev), true) = (prev_ts, speed > 0.0) {
            let gap_ms = ((reading.timestamp - prev).max(0) as f64 / speed) as u64;
            sleep(Duration::from_millis(gap_ms)).await;
        }
        prev_ts = Some(reading.timestamp);

        if let Some(hpa) = reading.pressure {
            pipeline.on_pressure(PressureSample {
                timestamp: reading.timestamp,
                pressure_hpa: hpa,
            });
        }
        if let Some(total_steps) = reading.steps {
            pipeline.on_steps(StepSample {
                timestamp: reading.timestamp,
                total_steps,
            });
        }
        let Some(loc) = reading.location else {
            continue;
        };
        let fix = LocationSample {
            timestamp: reading.timestamp,
            lat: loc.lat,
            lng: loc.lng,
            accuracy: loc.accuracy,
            altitude: loc.altitude,
            altitude_accuracy: loc.altitude_accuracy,
            speed: loc.speed,
        };
        if let Some(sample) = pipeline.on_location(fix) {
            feed.publish(sample);
            published += 1;
            // let the consumer see every sample when not paced
            tokio::task::yield_now().await;
        }
    }
    pipeline.reset();
    info!("delivery finished, {} samples published", published);
}

/// Foreground consumer: drive the engine with each published sample,
/// applying user actions that happened before it.
async fn consume(
    mut rx: watch::Receiver<Option<RunSample>>,
    mut engine: RunEngine,
    actions: Vec<TimedAction>,
) -> RunEngine {
    let mut pending = actions.into_iter().peekable();
    let mut last_ts = None;

    while rx.changed().await.is_ok() {
        let Some(sample) = rx.borrow_and_update().clone() else {
            continue;
        };
        while let Some(action) = pending.next_if(|a| a.at <= sample.timestamp) {
            engine.dispatch(to_action(&action));
        }
        last_ts = Some(sample.timestamp);
        engine.on_sample(sample);

        if let Some(live) = engine.take_live_activity() {
            info!("[live] {}", serde_json::to_string(&live).unwrap_or_default());
        }
    }

    for action in pending {
        engine.dispatch(to_action(&action));
    }
    if engine.status().has_session() {
        engine.dispatch(RunAction::Stop {
            at: last_ts.unwrap_or_default(),
        });
    }
    engine
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => TrackerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };

    let log = load_log(&args.log)?;
    let Some(first_ts) = log.readings.first().map(|r| r.timestamp) else {
        anyhow::bail!("{} has no readings", args.log.display());
    };

    let detected = detect_sensors(&log.readings);
    config.pipeline.sensors.barometer |= detected.barometer;
    config.pipeline.sensors.pedometer |= detected.pedometer;
    info!(
        "{} readings, {} actions, sensors {:?}",
        log.readings.len(),
        log.actions.len(),
        config.pipeline.sensors
    );

    let mut engine = RunEngine::with_event_log(&config);
    if let Some(path) = args.course.as_ref() {
        let course = CourseDefinition::from_json_file(path)
            .with_context(|| format!("loading course {}", path.display()))?;
        let tracker = CourseTracker::new(&course, config.course.clone())
            .with_context(|| format!("course {} is invalid", path.display()))?;
        engine = engine.with_course(tracker);
    }
    if let Some(path) = args.ghost.as_ref() {
        let trace = storage::load_telemetry_log(path)?;
        engine = engine.with_ghost(GhostCoordinator::new(trace, config.ghost.clone())?);
    }
    engine.start(first_ts);

    let feed = SampleFeed::new();
    let rx = feed.subscribe();
    let pipeline = SensorPipeline::new(config.pipeline.clone());

    let producer = tokio::spawn(deliver(log.readings, pipeline, feed, args.speed));
    let engine = consume(rx, engine, log.actions).await;
    producer.await?;

    let ctx = engine.context();
    let summary = RunSummary::from_context(ctx);

    if let Some(path) = args.out.as_ref() {
        storage::save_telemetry_log(path, &ctx.telemetries)?;
        info!("telemetry written to {}", path.display());
    }
    if let Some(path) = args.gpx.as_ref() {
        let name = ctx.session_id.clone().unwrap_or_else(|| "run".to_string());
        fs::write(path, GpxTrack::from_telemetry(&name, &ctx.telemetries).to_gpx_xml())?;
        info!("GPX written to {}", path.display());
    }
    if ctx.telemetries.is_empty() {
        warn!("no telemetry produced");
    }

    let events: Vec<_> = engine.sink().events().iter().map(|e| e.key()).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": summary,
            "events": events,
        }))?
    );
    Ok(())
}
