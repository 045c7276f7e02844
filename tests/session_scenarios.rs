use approx::assert_relative_eq;

use run_telemetry::course::{build_legs, CourseConfig, CourseTracker};
use run_telemetry::filters::PositionFilter;
use run_telemetry::geometry::from_local;
use run_telemetry::ghost::Leader;
use run_telemetry::pipeline::SensorPipeline;
use run_telemetry::session::{RunAction, RunContext, RunMode, RunStatus, RunVariant};
use run_telemetry::types::{Checkpoint, LatLng, LocationSample, RunSample, Telemetry};
use run_telemetry::{RunEngine, TrackerConfig};

const ORIGIN: LatLng = LatLng {
    lat: 37.5665,
    lng: 126.978,
};

fn sample(t: i64, east: f64, north: f64, distance: f64) -> RunSample {
    let p = from_local(ORIGIN, east, north);
    RunSample {
        timestamp: t,
        latitude: p.lat,
        longitude: p.lng,
        distance,
        steps: 3,
        accuracy: 5.0,
        ..Default::default()
    }
}

/// 500 m straight north, single leg
fn course() -> CourseTracker {
    let points: Vec<_> = (0..=50)
        .map(|i| {
            let p = from_local(ORIGIN, 0.0, i as f64 * 10.0);
            Telemetry::point(p.lat, p.lng)
        })
        .collect();
    let checkpoints = vec![
        Checkpoint::new(points[0].lat, points[0].lng),
        Checkpoint::new(points[50].lat, points[50].lng),
    ];
    CourseTracker::from_legs(build_legs(&points, &checkpoints).unwrap(), CourseConfig::default()).unwrap()
}

/// Course engine already past the start line and running at 10 m north.
fn running_course_engine() -> RunEngine {
    let mut engine = RunEngine::with_event_log(&TrackerConfig::default()).with_course(course());
    engine.start(0);
    engine.on_sample(sample(0, 0.0, 0.0, 0.0));
    engine.on_sample(sample(1_000, 0.0, 3.0, 3.0));
    engine.on_sample(sample(2_000, 0.0, 6.0, 3.0));
    assert_eq!(engine.status(), RunStatus::Running);
    engine
}

#[test]
fn resume_after_pause() {
    let mut ctx = RunContext::default()
        .reduce(RunAction::Start {
            mode: RunMode::Course,
            variant: RunVariant::Standard,
            at: 0,
        })
        .reduce(RunAction::Begin { at: 0 });

    for i in 0..5 {
        ctx = ctx.reduce(RunAction::AcceptSample(sample(i * 1_000, 0.0, i as f64 * 3.0, 3.0)));
    }
    ctx = ctx.reduce(RunAction::PauseUser { at: 5_000 });
    for i in 5..8 {
        ctx = ctx.reduce(RunAction::AcceptSample(sample(i * 1_000, 0.0, 12.0, 0.5)));
    }
    assert_eq!(ctx.paused_buffer.len(), 3);
    assert_eq!(ctx.telemetries.len(), 8);
    assert_eq!(ctx.segments.len(), 2);

    ctx = ctx.reduce(RunAction::Resume { at: 30_000 });
    assert_eq!(ctx.status, RunStatus::Running);
    assert_eq!(ctx.main_timeline.len(), 8);
    assert_eq!(ctx.telemetries.len(), 8);
    assert!(ctx.paused_buffer.is_empty());
    assert!(ctx.zero_dt_pending);

    let time_before = ctx.stats.total_time_ms;
    let dist_before = ctx.stats.total_distance_m;
    ctx = ctx.reduce(RunAction::AcceptSample(sample(31_000, 0.0, 60.0, 48.0)));
    assert_eq!(ctx.stats.total_time_ms, time_before);
    assert_eq!(ctx.stats.total_distance_m, dist_before);
    assert_eq!(ctx.stats.rolling_window.back().unwrap().dt_ms, 0);
    assert!(ctx.telemetries.last().unwrap().is_running);
    assert_eq!(ctx.segments.len(), 3);
}

#[test]
fn paused_records_freeze_stats() {
    let mut ctx = RunContext::default().reduce(RunAction::Start {
        mode: RunMode::Solo,
        variant: RunVariant::Standard,
        at: 0,
    });
    for i in 0..6 {
        let mut s = sample(i * 1_000, 0.0, i as f64 * 3.0, 3.0);
        s.bpm = Some(140 + i as u32);
        ctx = ctx.reduce(RunAction::AcceptSample(s));
    }
    let frozen = ctx.telemetries.last().unwrap().clone();

    ctx = ctx.reduce(RunAction::PauseUser { at: 6_000 });
    for i in 6..10 {
        let mut s = sample(i * 1_000, 5.0, 20.0, 2.0);
        s.bpm = Some(170);
        ctx = ctx.reduce(RunAction::AcceptSample(s));
        let t = ctx.telemetries.last().unwrap();
        assert!(!t.is_running);
        assert_eq!(t.dist, frozen.dist);
        assert_eq!(t.pace, frozen.pace);
        assert_eq!(t.cadence, frozen.cadence);
        assert_eq!(t.bpm, frozen.bpm);
        assert_eq!(t.time_stamp, frozen.time_stamp);
    }
}

#[test]
fn off_course_hysteresis() {
    let mut engine = running_course_engine();

    engine.on_sample(sample(3_000, 40.0, 50.0, 0.0));
    assert_eq!(engine.status(), RunStatus::PausedOffcourse);
    assert_eq!(engine.sink().count("run/off-course"), 1);

    engine.on_sample(sample(4_000, 20.0, 50.0, 0.0));
    assert_eq!(engine.status(), RunStatus::PausedOffcourse);

    engine.on_sample(sample(5_000, 15.0, 50.0, 0.0));
    assert_eq!(engine.status(), RunStatus::Running);
    assert_eq!(engine.sink().count("run/on-course"), 1);
    // off-course samples never reach the visible trace
    assert!(engine.context().muted_buffer.is_empty());
    assert_eq!(engine.context().telemetries.len(), 3);
}

#[test]
fn off_course_auto_stop_fires_once() {
    let mut engine = running_course_engine();
    engine.on_sample(sample(3_000, 80.0, 50.0, 0.0));
    assert_eq!(engine.status(), RunStatus::PausedOffcourse);

    // 11 minutes away from the course, one fix per second
    for s in 1..=660 {
        engine.on_sample(sample(3_000 + s * 1_000, 80.0, 50.0, 0.0));
    }

    assert_eq!(engine.status(), RunStatus::Stopped);
    assert_eq!(engine.sink().count("run/auto-stop"), 1);
    assert_eq!(engine.sink().count("run/stop"), 1);
    // one warning every 4 s until the stop at 600 s
    assert_eq!(engine.sink().count("nav/off-course-warning"), 150);
}

#[test]
fn leader_threshold() {
    assert_eq!(Leader::from_delta(4.0, 5.0), Leader::Tied);
    assert_ne!(Leader::from_delta(5.0, 5.0), Leader::Tied);
    assert_eq!(Leader::from_delta(5.0, 5.0), Leader::Ghost);
    assert_eq!(Leader::from_delta(-5.0, 5.0), Leader::Me);
}

#[test]
fn kalman_warm_up_first_sample() {
    let mut filter = PositionFilter::default();
    let out = filter.update(&LocationSample {
        timestamp: 0,
        lat: 37.0,
        lng: 127.0,
        accuracy: 5.0,
        altitude: None,
        altitude_accuracy: None,
        speed: None,
    });
    assert_eq!(out.lat, 37.0);
    assert_eq!(out.lng, 127.0);
    assert_relative_eq!(filter.lat_variance_m2().unwrap(), 25.0 * 50.0, epsilon = 1e-6);
}

#[test]
fn telemetry_distance_and_elevation_monotonic() {
    let mut engine = RunEngine::with_event_log(&TrackerConfig::default());
    engine.start(0);

    let altitudes = [10.0, 11.0, 10.5, 12.0, 9.0, 9.5, 9.5, 13.0];
    let mut t = 0;
    for round in 0..4 {
        for (i, alt) in altitudes.iter().enumerate() {
            let mut s = sample(t, 0.0, t as f64 / 400.0, if i % 3 == 0 { 40.0 } else { 2.5 });
            s.altitude = Some(*alt + round as f64);
            engine.on_sample(s);
            t += 1_000;
        }
        if round % 2 == 0 {
            engine.dispatch(RunAction::PauseUser { at: t });
        } else {
            engine.dispatch(RunAction::Resume { at: t });
        }
    }

    let ctx = engine.context();
    for pair in ctx.telemetries.windows(2) {
        assert!(pair[0].dist <= pair[1].dist);
    }
    assert!(ctx.stats.gain_m > 0.0);
    assert!(ctx.stats.loss_m > 0.0);
    assert!(ctx.segments.iter().any(|s| !s.is_running));
}

#[test]
fn solo_run_from_raw_fixes() {
    let mut pipeline = SensorPipeline::default();
    let mut engine = RunEngine::with_event_log(&TrackerConfig::default());
    engine.start(0);

    // 2.5 m/s north for a minute
    for s in 0..=60 {
        let p = from_local(ORIGIN, 0.0, s as f64 * 2.5);
        let fix = LocationSample {
            timestamp: s * 1_000,
            lat: p.lat,
            lng: p.lng,
            accuracy: 4.0,
            altitude: Some(20.0),
            altitude_accuracy: Some(3.0),
            speed: Some(2.5),
        };
        if let Some(sample) = pipeline.on_location(fix) {
            engine.on_sample(sample);
        }
    }

    let ctx = engine.context();
    assert_eq!(ctx.telemetries.len(), 61);
    assert_eq!(ctx.stats.total_time_ms, 60_000);
    assert!(ctx.stats.total_distance_m > 100.0 && ctx.stats.total_distance_m < 160.0);
    assert!(ctx.stats.current_pace_sec_per_km.is_some());
}
