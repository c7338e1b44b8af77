//! Projection of raw positions onto a route polyline
//!
//! Segment projection uses a local equirectangular approximation scaled by
//! the cosine of the segment's mean latitude, which is accurate for the
//! segment lengths road routes are made of. Distances along the route are
//! haversine distances so they agree with [`Route::cumulative_distance`].

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::location::LatLng;
use crate::route::Route;

/// Orthogonal distances within this margin count as a tie
const TIE_EPSILON_M: f64 = 0.01;

/// Result of projecting a position onto a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Closest point lying on the route
    pub point: LatLng,
    /// Index of the segment containing `point` (segment `i` joins waypoints `i` and `i + 1`)
    pub segment_index: usize,
    /// Distance from the raw position to `point`, in meters
    pub distance_m: f64,
    /// Along-route distance from the route start to `point`, in meters
    pub along_route_m: f64,
}

/// Where along the route the next projection is expected to land
///
/// Only consulted when several segments are equally close, which happens on
/// self-intersecting and doubled-back routes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionHint {
    /// Expected along-route distance, in meters
    pub expected_along_m: f64,
}

impl ProjectionHint {
    /// Hint for a fix `moved_m` meters from the one that produced `previous`
    pub fn after(previous: &Projection, moved_m: f64) -> Self {
        Self {
            expected_along_m: previous.along_route_m + moved_m.max(0.0),
        }
    }
}

/// Project a position onto a route
///
/// When two segments are equally close the candidate whose along-route
/// distance is nearest the hint wins, ties going to the one further along.
/// Without a hint the earliest segment wins.
pub fn project(
    position: &LatLng,
    route: &Route,
    hint: Option<ProjectionHint>,
) -> Result<Projection> {
    let points = route.points();
    project_with(position, &points, hint, |i| {
        route.cumulative_distance(i).unwrap_or_else(|| route.total_length_m())
    })
}

/// Project a position onto a bare polyline
pub fn project_on_polyline(
    position: &LatLng,
    points: &[LatLng],
    hint: Option<ProjectionHint>,
) -> Result<Projection> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in points.windows(2) {
        total += pair[0].distance_to(&pair[1]);
        cumulative.push(total);
    }
    project_with(position, points, hint, |i| cumulative[i])
}

fn project_with<F>(
    position: &LatLng,
    points: &[LatLng],
    hint: Option<ProjectionHint>,
    cumulative: F,
) -> Result<Projection>
where
    F: Fn(usize) -> f64,
{
    if points.len() < 2 {
        return Err(CoreError::InvalidRoute(format!(
            "cannot project onto {} point(s)",
            points.len()
        )));
    }
    if !position.is_valid() {
        return Err(CoreError::InvalidCoordinate {
            lat: position.latitude,
            lon: position.longitude,
        });
    }

    let mut best: Option<Projection> = None;

    for (i, segment) in points.windows(2).enumerate() {
        let (a, b) = (&segment[0], &segment[1]);
        let projected = project_on_segment(position, a, b);
        let distance_m = position.distance_to(&projected);

        let segment_start = cumulative(i);
        let segment_end = cumulative(i + 1);
        let along_route_m = (segment_start + a.distance_to(&projected)).min(segment_end);

        let candidate = Projection {
            point: projected,
            segment_index: i,
            distance_m,
            along_route_m,
        };

        let replace = match &best {
            None => true,
            Some(current) => is_better(&candidate, current, hint),
        };
        if replace {
            best = Some(candidate);
        }
    }

    best.ok_or_else(|| CoreError::InvalidRoute("route has no segments".to_string()))
}

fn is_better(candidate: &Projection, current: &Projection, hint: Option<ProjectionHint>) -> bool {
    if candidate.distance_m < current.distance_m - TIE_EPSILON_M {
        return true;
    }
    if candidate.distance_m > current.distance_m + TIE_EPSILON_M {
        return false;
    }
    let Some(hint) = hint else {
        return false;
    };
    let candidate_gap = (candidate.along_route_m - hint.expected_along_m).abs();
    let current_gap = (current.along_route_m - hint.expected_along_m).abs();
    if (candidate_gap - current_gap).abs() <= TIE_EPSILON_M {
        return candidate.along_route_m > current.along_route_m;
    }
    candidate_gap < current_gap
}

/// Project a point onto the segment a-b, clamped to the endpoints
fn project_on_segment(p: &LatLng, a: &LatLng, b: &LatLng) -> LatLng {
    let cos_lat = ((a.latitude + b.latitude) / 2.0).to_radians().cos();

    let dx = (b.longitude - a.longitude) * cos_lat;
    let dy = b.latitude - a.latitude;
    let px = (p.longitude - a.longitude) * cos_lat;
    let py = p.latitude - a.latitude;

    let seg_len_sq = dx * dx + dy * dy;
    if seg_len_sq < 1e-20 {
        return *a;
    }

    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);
    a.lerp(b, t)
}
