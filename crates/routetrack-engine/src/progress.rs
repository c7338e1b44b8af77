//! Route progress tracking
//!
//! [`RouteProgressTracker`] turns a raw fix and the active route into a
//! [`RouteProgress`] snapshot. It remembers where the last fix projected
//! (so overlapping legs of a route resolve in driving order), how many
//! waypoints have been passed, and a short window of recent speeds for the
//! ETA.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use routetrack_core::{geo, LatLng, Location, Milestone, Projection, ProjectionHint, Route};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::error::Result;

/// Projected position paired with the raw fix it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationOnRoute {
    /// Closest point on the route
    pub projected: LatLng,
    /// Fix as reported by the location source
    pub raw: Location,
}

/// Progress snapshot for one fix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteProgress {
    /// Where the vehicle is on the route
    pub current_location_on_route: LocationOnRoute,
    /// Distance left to the destination along the route (meters)
    pub remaining_distance_m: f64,
    /// Estimated time left at the current speed estimate
    pub remaining_travel_time: Duration,
    /// Next maneuver ahead of the vehicle
    pub next_milestone: Option<Milestone>,
    /// Along-route distance to the next maneuver (meters)
    pub next_milestone_distance_m: Option<f64>,
    /// Index of the waypoint carrying `next_milestone`
    pub next_milestone_index: Option<usize>,
    /// Along-route distance already covered (meters)
    pub along_route_m: f64,
    /// Orthogonal distance between the fix and the route (meters)
    pub deviation_m: f64,
    /// Segment the fix projected onto
    pub segment_index: usize,
    /// Number of leading waypoints the vehicle has passed
    pub reached_waypoints: usize,
    /// Route this snapshot was computed against
    #[serde(skip)]
    pub route: Arc<Route>,
}

impl RouteProgress {
    /// Whether waypoint `index` has been passed
    pub fn is_waypoint_reached(&self, index: usize) -> bool {
        index < self.reached_waypoints
    }
}

/// Outcome of a tracker update
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    /// Still travelling
    Progress(RouteProgress),
    /// Within the arrival radius of the destination
    DestinationReached(RouteProgress),
}

impl TrackerUpdate {
    /// The snapshot regardless of arrival
    pub fn progress(&self) -> &RouteProgress {
        match self {
            TrackerUpdate::Progress(p) | TrackerUpdate::DestinationReached(p) => p,
        }
    }

    /// Consume into the snapshot
    pub fn into_progress(self) -> RouteProgress {
        match self {
            TrackerUpdate::Progress(p) | TrackerUpdate::DestinationReached(p) => p,
        }
    }

    pub fn is_destination_reached(&self) -> bool {
        matches!(self, TrackerUpdate::DestinationReached(_))
    }
}

/// Stateful progress tracker bound to one route at a time
#[derive(Debug, Clone)]
pub struct RouteProgressTracker {
    config: TrackerConfig,
    route_id: Option<Uuid>,
    /// Last distinct fix and where it projected
    previous: Option<(LatLng, Projection)>,
    reached: usize,
    speeds: VecDeque<f64>,
    last_fix: Option<Location>,
}

impl RouteProgressTracker {
    /// Create a tracker with no route bound yet
    pub fn new(config: TrackerConfig) -> Self {
        let window = config.speed_window;
        Self {
            config,
            route_id: None,
            previous: None,
            reached: 0,
            speeds: VecDeque::with_capacity(window),
            last_fix: None,
        }
    }

    /// Forget everything learned about the current route
    ///
    /// The speed window survives: the vehicle is the same after a reroute.
    pub fn reset(&mut self) {
        self.route_id = None;
        self.previous = None;
        self.reached = 0;
        self.last_fix = None;
    }

    /// Number of leading waypoints passed on the bound route
    pub fn reached_waypoints(&self) -> usize {
        self.reached
    }

    /// Rolling average of recent valid speeds
    pub fn average_speed(&self) -> Option<f64> {
        if self.speeds.is_empty() {
            return None;
        }
        Some(self.speeds.iter().sum::<f64>() / self.speeds.len() as f64)
    }

    /// Compute progress for a fix on `route`
    ///
    /// Calling this twice with the same fix and route yields identical
    /// snapshots.
    pub fn update(&mut self, location: &Location, route: &Arc<Route>) -> Result<TrackerUpdate> {
        if self.route_id != Some(route.id()) {
            debug!(route = %route.id(), "Tracker bound to new route");
            self.reset();
            self.route_id = Some(route.id());
        }

        let repeated = self.last_fix.as_ref() == Some(location);
        let hint = match &self.previous {
            Some((_, projection)) if repeated => Some(ProjectionHint::after(projection, 0.0)),
            Some((raw, projection)) => Some(ProjectionHint::after(
                projection,
                raw.distance_to(&location.lat_lng),
            )),
            None => None,
        };
        let projection = geo::project(&location.lat_lng, route, hint)?;
        self.advance_reached(route, &projection);

        if !repeated {
            self.previous = Some((location.lat_lng, projection));
            if let Some(speed) = location.speed_above(self.config.min_valid_speed_mps) {
                if self.speeds.len() == self.config.speed_window {
                    self.speeds.pop_front();
                }
                self.speeds.push_back(speed);
            }
            self.last_fix = Some(location.clone());
        }

        let total = route.total_length_m();
        let remaining_distance_m = (total - projection.along_route_m).max(0.0);
        let speed = self.speed_estimate(location, route);
        let remaining_travel_time =
            Duration::try_from_secs_f64(remaining_distance_m / speed).unwrap_or(Duration::MAX);

        let next = route
            .waypoints()
            .iter()
            .enumerate()
            .skip(self.reached)
            .find_map(|(i, wp)| wp.milestone.map(|m| (i, m)));

        let (next_milestone, next_milestone_distance_m, next_milestone_index) = match next {
            Some((index, milestone)) => {
                let at = route.cumulative_distance(index).unwrap_or(total);
                (
                    Some(milestone),
                    Some((at - projection.along_route_m).max(0.0)),
                    Some(index),
                )
            }
            None => (None, None, None),
        };

        let progress = RouteProgress {
            current_location_on_route: LocationOnRoute {
                projected: projection.point,
                raw: location.clone(),
            },
            remaining_distance_m,
            remaining_travel_time,
            next_milestone,
            next_milestone_distance_m,
            next_milestone_index,
            along_route_m: projection.along_route_m,
            deviation_m: projection.distance_m,
            segment_index: projection.segment_index,
            reached_waypoints: self.reached,
            route: Arc::clone(route),
        };

        if projection.along_route_m >= total - self.config.arrival_radius_m {
            return Ok(TrackerUpdate::DestinationReached(progress));
        }
        Ok(TrackerUpdate::Progress(progress))
    }

    /// Waypoints are reached once the projection passes them; never un-reached
    fn advance_reached(&mut self, route: &Route, projection: &Projection) {
        // The first waypoint is the origin
        self.reached = self.reached.max(1);
        let waypoints = route.waypoints().len();
        while self.reached < waypoints {
            match route.cumulative_distance(self.reached) {
                Some(at) if projection.along_route_m >= at => self.reached += 1,
                _ => break,
            }
        }
    }

    fn speed_estimate(&self, location: &Location, route: &Route) -> f64 {
        location
            .speed_above(self.config.min_valid_speed_mps)
            .or_else(|| self.average_speed())
            .or_else(|| route.implied_speed_mps())
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(self.config.fallback_speed_mps)
    }
}
