//! Geodesy helpers shared by the position filter, course tracker and ghost
//! coordinator.
//!
//! Distances between fixes use the haversine formula from `geo`. Projection
//! onto polylines uses a local equirectangular frame centered on the query
//! point, which is accurate to well under a meter at course scale.

use geo::{HaversineDistance, Point};

use crate::types::{HasPosition, LatLng};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters spanned by one degree of latitude.
pub fn meters_per_degree_lat() -> f64 {
    EARTH_RADIUS_M.to_radians()
}

/// Meters spanned by one degree of longitude at `lat`.
pub fn meters_per_degree_lng(lat: f64) -> f64 {
    EARTH_RADIUS_M.to_radians() * lat.to_radians().cos()
}

/// Great-circle distance in meters.
pub fn distance_m(a: LatLng, b: LatLng) -> f64 {
    Point::new(a.lng, a.lat).haversine_distance(&Point::new(b.lng, b.lat))
}

/// Equirectangular offset of `p` from `origin`, in meters (east, north).
pub fn to_local(origin: LatLng, p: LatLng) -> (f64, f64) {
    let d_lat = (p.lat - origin.lat).to_radians();
    let d_lng = (p.lng - origin.lng).to_radians();
    let x = EARTH_RADIUS_M * d_lng * origin.lat.to_radians().cos();
    let y = EARTH_RADIUS_M * d_lat;
    (x, y)
}

/// Inverse of [`to_local`].
pub fn from_local(origin: LatLng, x: f64, y: f64) -> LatLng {
    let d_lat = y / EARTH_RADIUS_M;
    let d_lng = x / (EARTH_RADIUS_M * origin.lat.to_radians().cos());
    LatLng::new(origin.lat + d_lat.to_degrees(), origin.lng + d_lng.to_degrees())
}

/// Closest point on segment `a`-`b` to `p`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentProjection {
    /// Perpendicular (or endpoint) distance in meters
    pub distance_m: f64,
    /// Clamped projection parameter in [0, 1]
    pub t: f64,
    pub foot: LatLng,
}

/// Clamped projection of `p` onto segment `a`-`b`.
pub fn project_onto_segment(p: LatLng, a: LatLng, b: LatLng) -> SegmentProjection {
    let (ax, ay) = to_local(p, a);
    let (bx, by) = to_local(p, b);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;

    if len_sq < 1e-9 {
        return SegmentProjection {
            distance_m: ax.hypot(ay),
            t: 0.0,
            foot: a,
        };
    }

    // p sits at the local origin
    let t = ((-ax) * dx + (-ay) * dy) / len_sq;
    let t = t.clamp(0.0, 1.0);
    let fx = ax + dx * t;
    let fy = ay + dy * t;

    SegmentProjection {
        distance_m: fx.hypot(fy),
        t,
        foot: from_local(p, fx, fy),
    }
}

/// Closest point on a polyline to `p`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolylineProjection {
    pub distance_m: f64,
    /// Index of the segment start vertex
    pub segment_index: usize,
    pub t: f64,
    pub foot: LatLng,
}

/// Projects `p` onto every segment of `points` and keeps the nearest.
///
/// A single-vertex polyline degenerates to point distance. Returns `None`
/// for an empty polyline.
pub fn project_onto_polyline<T: HasPosition>(p: LatLng, points: &[T]) -> Option<PolylineProjection> {
    match points {
        [] => None,
        [only] => {
            let v = only.position();
            Some(PolylineProjection {
                distance_m: distance_m(p, v),
                segment_index: 0,
                t: 0.0,
                foot: v,
            })
        }
        _ => points
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let proj = project_onto_segment(p, w[0].position(), w[1].position());
                PolylineProjection {
                    distance_m: proj.distance_m,
                    segment_index: i,
                    t: proj.t,
                    foot: proj.foot,
                }
            })
            .fold(None, |best: Option<PolylineProjection>, cand| match best {
                Some(b) if b.distance_m <= cand.distance_m => Some(b),
                _ => Some(cand),
            }),
    }
}

/// Index and distance of the vertex nearest to `p`, first one wins on ties.
pub fn nearest_vertex<T: HasPosition>(p: LatLng, points: &[T]) -> Option<(usize, f64)> {
    points
        .iter()
        .enumerate()
        .map(|(i, v)| (i, distance_m(p, v.position())))
        .fold(None, |best, cand| match best {
            Some((_, d)) if d <= cand.1 => best,
            _ => Some(cand),
        })
}

/// Sum of segment lengths of `points`.
pub fn polyline_length<T: HasPosition>(points: &[T]) -> f64 {
    points
        .windows(2)
        .map(|w| distance_m(w[0].position(), w[1].position()))
        .sum()
}
