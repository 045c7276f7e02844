use crate::stats::RunningStats;
use crate::types::{RunSample, SegmentMeta, Telemetry};

/// Derive the telemetry record for an accepted sample.
///
/// While not running, distance, pace, cadence, heart rate and the timestamp
/// are carried over from `prev` so the displayed stats freeze instead of
/// dropping to zero. Position and altitude always follow the sample.
pub fn build_telemetry(
    stats: &RunningStats,
    sample: &RunSample,
    prev: Option<&Telemetry>,
    is_running: bool,
) -> Telemetry {
    match (is_running, prev) {
        (false, Some(prev)) => Telemetry {
            time_stamp: prev.time_stamp,
            lat: sample.latitude,
            lng: sample.longitude,
            dist: prev.dist,
            pace: prev.pace,
            alt: sample.altitude,
            cadence: prev.cadence,
            bpm: prev.bpm,
            is_running: false,
        },
        _ => Telemetry {
            time_stamp: sample.timestamp,
            lat: sample.latitude,
            lng: sample.longitude,
            dist: stats.total_distance_km(),
            pace: stats.current_pace_sec_per_km,
            alt: sample.altitude,
            cadence: stats.cadence_spm,
            bpm: stats.bpm,
            is_running,
        },
    }
}

/// Extend the run-length segment view after one telemetry append.
/// `log_len` is the telemetry log length including the new record.
pub fn extend_segments(segments: &mut Vec<SegmentMeta>, log_len: usize, is_running: bool) {
    match segments.last_mut() {
        Some(last) if last.is_running == is_running && last.end + 1 == log_len => {
            last.end = log_len;
        }
        _ => segments.push(SegmentMeta {
            start: log_len - 1,
            end: log_len,
            is_running,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64, lat: f64) -> RunSample {
        RunSample {
            timestamp,
            latitude: lat,
            longitude: 127.0,
            altitude: Some(20.0),
            ..Default::default()
        }
    }

    fn stats(distance_m: f64) -> RunningStats {
        RunningStats {
            total_distance_m: distance_m,
            current_pace_sec_per_km: Some(330.0),
            cadence_spm: Some(172.0),
            bpm: Some(148),
            ..Default::default()
        }
    }

    #[test]
    fn test_running_record() {
        let t = build_telemetry(&stats(1500.0), &sample(5_000, 37.0), None, true);
        assert_eq!(t.time_stamp, 5_000);
        assert_eq!(t.dist, 1.5);
        assert_eq!(t.pace, Some(330.0));
        assert_eq!(t.cadence, Some(172.0));
        assert!(t.is_running);
    }

    #[test]
    fn test_paused_record_freezes() {
        let prev = build_telemetry(&stats(1500.0), &sample(5_000, 37.0), None, true);
        let paused = build_telemetry(&stats(9999.0), &sample(9_000, 37.001), Some(&prev), false);

        assert_eq!(paused.time_stamp, prev.time_stamp);
        assert_eq!(paused.dist, prev.dist);
        assert_eq!(paused.pace, prev.pace);
        assert_eq!(paused.cadence, prev.cadence);
        assert_eq!(paused.bpm, prev.bpm);
        assert_eq!(paused.lat, 37.001);
        assert!(!paused.is_running);
    }

    #[test]
    fn test_segments_run_length() {
        let flags = [true, true, false, false, false, true, false];
        let mut segments = Vec::new();
        for (i, flag) in flags.iter().enumerate() {
            extend_segments(&mut segments, i + 1, *flag);
        }

        assert_eq!(
            segments,
            vec![
                SegmentMeta { start: 0, end: 2, is_running: true },
                SegmentMeta { start: 2, end: 5, is_running: false },
                SegmentMeta { start: 5, end: 6, is_running: true },
                SegmentMeta { start: 6, end: 7, is_running: false },
            ]
        );
        // partition without gaps, neighbours differ
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_ne!(pair[0].is_running, pair[1].is_running);
        }
    }
}
