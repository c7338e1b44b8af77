//! Route planning collaborator
//!
//! The engine treats route planning as a black box: given an origin fix,
//! a destination and a vehicle, produce a [`Route`] or fail. Two planners
//! ship with the engine: [`DirectPlanner`] draws a synthetic route between
//! the endpoints (demos, simulation) and [`ScriptedPlanner`] replays
//! queued responses (tests).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use routetrack_core::{LatLng, Location, Route, VehicleConfig};
use tracing::debug;

use crate::error::{NavigationError, Result};

/// Produces routes for the navigation service
#[async_trait]
pub trait RoutePlanner: Send + Sync + 'static {
    /// Plan a route from `origin` to `destination` for `vehicle`
    async fn request_route(
        &self,
        origin: &Location,
        destination: &LatLng,
        vehicle: &VehicleConfig,
    ) -> Result<Route>;
}

/// Geometry produced by [`DirectPlanner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteShape {
    /// Straight line between the endpoints
    #[default]
    Straight,
    /// North/south leg first, then east/west, like a street grid
    Grid,
}

/// Synthetic planner drawing routes without a road network
#[derive(Debug, Clone)]
pub struct DirectPlanner {
    shape: RouteShape,
    spacing_m: f64,
    latency: Duration,
}

impl Default for DirectPlanner {
    fn default() -> Self {
        Self {
            shape: RouteShape::Straight,
            spacing_m: 100.0,
            latency: Duration::ZERO,
        }
    }
}

impl DirectPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(mut self, shape: RouteShape) -> Self {
        self.shape = shape;
        self
    }

    /// Distance between generated waypoints (meters)
    pub fn with_spacing(mut self, spacing_m: f64) -> Self {
        self.spacing_m = spacing_m.max(1.0);
        self
    }

    /// Simulated service latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn cruise_speed_mps(vehicle: &VehicleConfig) -> f64 {
        match vehicle {
            VehicleConfig::Car => 13.9,
            VehicleConfig::Truck(_) => 11.1,
            VehicleConfig::Motorbike => 15.3,
        }
    }

    fn densify(&self, from: LatLng, to: LatLng, points: &mut Vec<LatLng>) {
        let steps = (from.distance_to(&to) / self.spacing_m).ceil().max(1.0) as usize;
        for i in 1..=steps {
            points.push(from.lerp(&to, i as f64 / steps as f64));
        }
    }
}

#[async_trait]
impl RoutePlanner for DirectPlanner {
    async fn request_route(
        &self,
        origin: &Location,
        destination: &LatLng,
        vehicle: &VehicleConfig,
    ) -> Result<Route> {
        vehicle.validate()?;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let start = origin.lat_lng;
        let mut points = vec![start];
        match self.shape {
            RouteShape::Straight => self.densify(start, *destination, &mut points),
            RouteShape::Grid => {
                let corner = LatLng::new(destination.latitude, start.longitude);
                if start.distance_to(&corner) > 1.0 {
                    self.densify(start, corner, &mut points);
                }
                let last = points[points.len() - 1];
                self.densify(last, *destination, &mut points);
            }
        }

        let route = Route::with_derived_turns(&points)?;
        let expected = route.total_length_m() / Self::cruise_speed_mps(vehicle);
        debug!(
            profile = vehicle.profile_name(),
            waypoints = route.waypoints().len(),
            length_m = route.total_length_m(),
            "Planned direct route"
        );
        Ok(route.with_expected_duration(Duration::from_secs_f64(expected)))
    }
}

/// One queued reply of a [`ScriptedPlanner`]
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    /// How long the request takes
    pub delay: Duration,
    /// Route geometry to return, or the failure
    pub outcome: std::result::Result<Vec<LatLng>, NavigationError>,
}

impl ScriptedResponse {
    pub fn route(points: Vec<LatLng>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(points),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(NavigationError::RouteRequestFailed {
                reason: reason.into(),
            }),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request seen by a [`ScriptedPlanner`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub origin: Location,
    pub destination: LatLng,
    pub vehicle: VehicleConfig,
}

/// Planner replaying queued responses in order
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next reply
    pub fn push(&self, response: ScriptedResponse) -> &Self {
        self.responses.lock().push_back(response);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl RoutePlanner for ScriptedPlanner {
    async fn request_route(
        &self,
        origin: &Location,
        destination: &LatLng,
        vehicle: &VehicleConfig,
    ) -> Result<Route> {
        self.requests.lock().push(RecordedRequest {
            origin: origin.clone(),
            destination: *destination,
            vehicle: vehicle.clone(),
        });

        let response = self.responses.lock().pop_front();
        let Some(response) = response else {
            return Err(NavigationError::RouteRequestFailed {
                reason: "no scripted response queued".into(),
            });
        };

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        let points = response.outcome?;
        Ok(Route::from_points(&points)?)
    }
}
