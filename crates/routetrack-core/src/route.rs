//! Immutable planned routes
//!
//! A [`Route`] is an ordered polyline of [`Waypoint`]s with precomputed
//! cumulative along-route distances. Routes are validated on construction
//! and never mutated afterwards; a reroute produces a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::location::LatLng;

/// Consecutive points closer than this are merged into one waypoint
const DUPLICATE_POINT_EPSILON_M: f64 = 0.01;

/// Maneuver to perform at a waypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnCommand {
    Depart,
    Straight,
    SlightLeft,
    Left,
    SharpLeft,
    SlightRight,
    Right,
    SharpRight,
    UTurn,
    Arrive,
}

impl TurnCommand {
    /// Classify a signed bearing change (positive = right) into a maneuver
    pub fn from_bearing_change(angle_deg: f64) -> Self {
        let abs_angle = angle_deg.abs();
        let right = angle_deg > 0.0;

        if abs_angle > 170.0 {
            TurnCommand::UTurn
        } else if abs_angle > 120.0 {
            if right { TurnCommand::SharpRight } else { TurnCommand::SharpLeft }
        } else if abs_angle > 60.0 {
            if right { TurnCommand::Right } else { TurnCommand::Left }
        } else if abs_angle > 20.0 {
            if right { TurnCommand::SlightRight } else { TurnCommand::SlightLeft }
        } else {
            TurnCommand::Straight
        }
    }

    /// Upper-case name as shown on turn panels
    pub fn name(&self) -> &'static str {
        match self {
            TurnCommand::Depart => "DEPART",
            TurnCommand::Straight => "STRAIGHT",
            TurnCommand::SlightLeft => "SLIGHT_LEFT",
            TurnCommand::Left => "LEFT",
            TurnCommand::SharpLeft => "SHARP_LEFT",
            TurnCommand::SlightRight => "SLIGHT_RIGHT",
            TurnCommand::Right => "RIGHT",
            TurnCommand::SharpRight => "SHARP_RIGHT",
            TurnCommand::UTurn => "U_TURN",
            TurnCommand::Arrive => "ARRIVE",
        }
    }
}

/// A turn or maneuver attached to a waypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// What to do at this point
    pub turn_command: TurnCommand,
}

impl Milestone {
    pub fn new(turn_command: TurnCommand) -> Self {
        Self { turn_command }
    }
}

/// A vertex of the route polyline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Position of the vertex
    pub lat_lng: LatLng,
    /// Maneuver at this vertex, if any
    pub milestone: Option<Milestone>,
}

impl Waypoint {
    /// A plain shape point without a maneuver
    pub fn new(lat_lng: LatLng) -> Self {
        Self {
            lat_lng,
            milestone: None,
        }
    }

    /// A waypoint carrying a maneuver
    pub fn with_turn(lat_lng: LatLng, turn_command: TurnCommand) -> Self {
        Self {
            lat_lng,
            milestone: Some(Milestone::new(turn_command)),
        }
    }
}

/// An immutable, validated route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    id: Uuid,
    waypoints: Vec<Waypoint>,
    /// `cumulative[i]` is the along-route distance from the start to waypoint `i`
    cumulative: Vec<f64>,
    expected_duration: Option<Duration>,
    created_at: DateTime<Utc>,
}

impl Route {
    /// Build a route from waypoints
    ///
    /// Consecutive duplicate points are merged, so cumulative distance is
    /// strictly increasing. The final waypoint always carries an
    /// [`TurnCommand::Arrive`] milestone.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self> {
        if waypoints.len() < 2 {
            return Err(CoreError::InvalidRoute(format!(
                "route needs at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }

        if let Some(bad) = waypoints.iter().find(|w| !w.lat_lng.is_valid()) {
            return Err(CoreError::InvalidCoordinate {
                lat: bad.lat_lng.latitude,
                lon: bad.lat_lng.longitude,
            });
        }

        let mut merged: Vec<Waypoint> = Vec::with_capacity(waypoints.len());
        for waypoint in waypoints {
            match merged.last_mut() {
                Some(last)
                    if last.lat_lng.distance_to(&waypoint.lat_lng) < DUPLICATE_POINT_EPSILON_M =>
                {
                    if waypoint.milestone.is_some() {
                        last.milestone = waypoint.milestone;
                    }
                }
                _ => merged.push(waypoint),
            }
        }

        if merged.len() < 2 {
            return Err(CoreError::InvalidRoute(
                "route has no extent: all waypoints coincide".to_string(),
            ));
        }

        if let Some(last) = merged.last_mut() {
            last.milestone = Some(Milestone::new(TurnCommand::Arrive));
        }

        let mut cumulative = Vec::with_capacity(merged.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in merged.windows(2) {
            total += pair[0].lat_lng.distance_to(&pair[1].lat_lng);
            cumulative.push(total);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            waypoints: merged,
            cumulative,
            expected_duration: None,
            created_at: Utc::now(),
        })
    }

    /// Build a route from bare coordinates (only the arrival milestone)
    pub fn from_points(points: &[LatLng]) -> Result<Self> {
        Self::new(points.iter().copied().map(Waypoint::new).collect())
    }

    /// Build a route and derive turn milestones from the geometry
    ///
    /// The first point departs, interior vertices get a maneuver when the
    /// bearing change is more than a gentle bend, the last point arrives.
    pub fn with_derived_turns(points: &[LatLng]) -> Result<Self> {
        let mut waypoints: Vec<Waypoint> = points.iter().copied().map(Waypoint::new).collect();

        if let Some(first) = waypoints.first_mut() {
            first.milestone = Some(Milestone::new(TurnCommand::Depart));
        }

        for i in 1..points.len().saturating_sub(1) {
            let inbound = points[i - 1].bearing_to(&points[i]);
            let outbound = points[i].bearing_to(&points[i + 1]);
            let turn = TurnCommand::from_bearing_change(normalize_angle(outbound - inbound));
            if turn != TurnCommand::Straight {
                waypoints[i].milestone = Some(Milestone::new(turn));
            }
        }

        Self::new(waypoints)
    }

    /// Attach the planner's travel time estimate
    pub fn with_expected_duration(mut self, duration: Duration) -> Self {
        self.expected_duration = Some(duration);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expected_duration(&self) -> Option<Duration> {
        self.expected_duration
    }

    /// Number of polyline segments
    pub fn segment_count(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// Endpoints of segment `index`
    pub fn segment(&self, index: usize) -> Option<(LatLng, LatLng)> {
        let start = self.waypoints.get(index)?;
        let end = self.waypoints.get(index + 1)?;
        Some((start.lat_lng, end.lat_lng))
    }

    /// Bearing of segment `index` in degrees
    pub fn segment_bearing(&self, index: usize) -> Option<f64> {
        self.segment(index).map(|(a, b)| a.bearing_to(&b))
    }

    /// Along-route distance from the start to waypoint `index`
    pub fn cumulative_distance(&self, index: usize) -> Option<f64> {
        self.cumulative.get(index).copied()
    }

    /// Total route length in meters
    pub fn total_length_m(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Average speed implied by the planner's duration estimate
    pub fn implied_speed_mps(&self) -> Option<f64> {
        let secs = self.expected_duration?.as_secs_f64();
        if secs > 0.0 {
            Some(self.total_length_m() / secs)
        } else {
            None
        }
    }

    pub fn origin(&self) -> LatLng {
        self.waypoints[0].lat_lng
    }

    pub fn destination(&self) -> LatLng {
        self.waypoints[self.waypoints.len() - 1].lat_lng
    }

    /// Coordinates of the route polyline, e.g. for drawing
    pub fn points(&self) -> Vec<LatLng> {
        self.waypoints.iter().map(|w| w.lat_lng).collect()
    }
}

/// Normalize an angle in degrees to (-180, 180]
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > 180.0 {
        angle -= 360.0;
    }
    while angle <= -180.0 {
        angle += 360.0;
    }
    angle
}
