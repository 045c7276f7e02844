use log::debug;
use serde::Serialize;

use crate::error::{Result, TelemetryError};
use crate::geometry::{distance_m, nearest_vertex};
use crate::types::{Checkpoint, HasPosition, LatLng, Telemetry};

/// Nearest-vertex tolerance when a checkpoint has no exact match (m)
pub const CHECKPOINT_MATCH_EPSILON_M: f64 = 3.0;

const EXACT_MATCH_DEG: f64 = 1e-9;

/// Course section between two consecutive checkpoints
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CourseLeg {
    pub index: usize,
    pub start: Checkpoint,
    pub end: Checkpoint,
    /// Polyline indices of the two checkpoints, inclusive
    pub start_point: usize,
    pub end_point: usize,
    pub points: Vec<Telemetry>,
    pub leg_distance_m: f64,
    /// Course distance covered at the end of this leg
    pub cum_distance_m: f64,
    /// Distance from each leg vertex to the leg end, along the polyline
    remaining_from: Vec<f64>,
}

impl CourseLeg {
    fn new(
        index: usize,
        start: Checkpoint,
        end: Checkpoint,
        start_point: usize,
        end_point: usize,
        points: Vec<Telemetry>,
        cum_before_m: f64,
    ) -> Self {
        let mut remaining_from = vec![0.0; points.len()];
        for i in (0..points.len().saturating_sub(1)).rev() {
            remaining_from[i] =
                remaining_from[i + 1] + distance_m(points[i].position(), points[i + 1].position());
        }
        let leg_distance_m = remaining_from.first().copied().unwrap_or(0.0);

        CourseLeg {
            index,
            start,
            end,
            start_point,
            end_point,
            points,
            leg_distance_m,
            cum_distance_m: cum_before_m + leg_distance_m,
            remaining_from,
        }
    }

    /// Course distance at the start of this leg
    pub fn cum_start_m(&self) -> f64 {
        self.cum_distance_m - self.leg_distance_m
    }

    pub fn end_position(&self) -> LatLng {
        self.end.position()
    }

    /// Distance left along this leg: the polyline from the vertex nearest
    /// to `p` to the leg end, plus the gap from `p` to that vertex.
    pub fn remaining_m(&self, p: LatLng) -> f64 {
        match nearest_vertex(p, &self.points) {
            Some((i, gap)) => self.remaining_from[i] + gap,
            None => distance_m(p, self.end_position()),
        }
    }
}

/// Course distance covered by a runner at `p` while on leg `leg_index`.
/// Clamped to the leg's own span so a runner cannot jump legs by position.
pub fn progress_along_course(legs: &[CourseLeg], leg_index: usize, p: LatLng) -> f64 {
    let Some(leg) = legs.get(leg_index).or_else(|| legs.last()) else {
        return 0.0;
    };
    let covered = (leg.leg_distance_m - leg.remaining_m(p)).clamp(0.0, leg.leg_distance_m);
    leg.cum_start_m() + covered
}

pub fn total_distance_m(legs: &[CourseLeg]) -> f64 {
    legs.last().map(|leg| leg.cum_distance_m).unwrap_or(0.0)
}

/// Split a course polyline into legs at its checkpoints.
///
/// The cursor only moves forward: each checkpoint is searched for from the
/// vertex after the previous checkpoint's match, so no leg has zero length
/// and `cum_distance_m` strictly increases. This is also what lets a loop
/// course's finish match its closing vertex instead of the start. An exact
/// coordinate match wins, otherwise the nearest forward vertex within
/// [`CHECKPOINT_MATCH_EPSILON_M`]. A checkpoint that matches neither makes
/// the whole course invalid.
pub fn build_legs(points: &[Telemetry], checkpoints: &[Checkpoint]) -> Result<Vec<CourseLeg>> {
    if checkpoints.len() < 2 {
        return Err(TelemetryError::CourseTooShort {
            what: "checkpoints",
            needed: 2,
            got: checkpoints.len(),
        });
    }
    if points.len() < 2 {
        return Err(TelemetryError::CourseTooShort {
            what: "points",
            needed: 2,
            got: points.len(),
        });
    }

    let mut matched = Vec::with_capacity(checkpoints.len());
    let mut cursor = 0;
    for (index, checkpoint) in checkpoints.iter().enumerate() {
        let found = match_checkpoint(points, checkpoint.position(), cursor)
            .ok_or(TelemetryError::UnmatchedCheckpoint { index })?;
        debug!("checkpoint {} -> point {}", index, found);
        matched.push(found);
        cursor = found + 1;
    }

    let mut legs = Vec::with_capacity(checkpoints.len() - 1);
    let mut cum = 0.0;
    for (i, pair) in matched.windows(2).enumerate() {
        let (from, to) = (pair[0], pair[1]);
        let leg = CourseLeg::new(
            i,
            checkpoints[i].clone(),
            checkpoints[i + 1].clone(),
            from,
            to,
            points[from..=to].to_vec(),
            cum,
        );
        cum = leg.cum_distance_m;
        legs.push(leg);
    }
    Ok(legs)
}

fn match_checkpoint(points: &[Telemetry], target: LatLng, from: usize) -> Option<usize> {
    let forward = points.get(from..)?;

    let exact = forward.iter().position(|p| {
        (p.lat - target.lat).abs() < EXACT_MATCH_DEG && (p.lng - target.lng).abs() < EXACT_MATCH_DEG
    });
    if let Some(offset) = exact {
        return Some(from + offset);
    }

    match nearest_vertex(target, forward) {
        Some((offset, d)) if d <= CHECKPOINT_MATCH_EPSILON_M => Some(from + offset),
        _ => None,
    }
}
