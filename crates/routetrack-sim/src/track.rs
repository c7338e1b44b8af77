//! Simulated vehicle motion along the engine's current route

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info};

use routetrack_core::{geo, LatLng, Route};

/// Fraction of the first route driven before the detour starts
const DETOUR_START_FRACTION: f64 = 0.4;

/// How long the vehicle drives away from the route, in simulated seconds
const DETOUR_DURATION_S: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Following,
    Detour { remaining_s: f64 },
    Rejoining,
}

/// A vehicle that drives along a route and reports noisy positions
pub struct SimulatedVehicle {
    position: LatLng,
    heading: f64,
    speed_mps: f64,
    noise_m: f64,
    detour_pending: bool,
    motion: Motion,
    route: Option<Arc<Route>>,
    along_m: f64,
    rng: StdRng,
}

impl SimulatedVehicle {
    pub fn new(start: LatLng, speed_mps: f64, noise_m: f64, detour: bool, rng: StdRng) -> Self {
        Self {
            position: start,
            heading: 0.0,
            speed_mps,
            noise_m: noise_m.max(0.0),
            detour_pending: detour,
            motion: Motion::Following,
            route: None,
            along_m: 0.0,
            rng,
        }
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn noise_m(&self) -> f64 {
        self.noise_m
    }

    /// Switch to `route` if it differs from the one being driven
    pub fn follow(&mut self, route: &Arc<Route>) {
        let current = self.route.as_ref().map(|r| r.id());
        if current == Some(route.id()) {
            return;
        }

        debug!("Vehicle switching to route {}", route.id());
        let first = self.route.is_none();
        self.route = Some(Arc::clone(route));
        if first {
            self.along_m = 0.0;
            self.motion = Motion::Following;
        } else if self.motion == Motion::Following {
            self.motion = Motion::Rejoining;
        }
    }

    /// Advance by `dt_s` simulated seconds
    pub fn step(&mut self, dt_s: f64) {
        let Some(route) = self.route.clone() else {
            return;
        };
        let distance = self.speed_mps * dt_s;

        match self.motion {
            Motion::Following => {
                self.along_m = (self.along_m + distance).min(route.total_length_m());
                let (position, bearing) = point_at(&route, self.along_m);
                self.position = position;
                self.heading = bearing;

                if self.detour_pending
                    && self.along_m >= route.total_length_m() * DETOUR_START_FRACTION
                {
                    info!("Leaving the route at {}", self.position);
                    self.detour_pending = false;
                    self.heading = (bearing + 90.0) % 360.0;
                    self.motion = Motion::Detour {
                        remaining_s: DETOUR_DURATION_S,
                    };
                }
            }
            Motion::Detour { remaining_s } => {
                self.position = self.position.offset(self.heading, distance);
                let remaining_s = remaining_s - dt_s;
                self.motion = if remaining_s > 0.0 {
                    Motion::Detour { remaining_s }
                } else {
                    Motion::Rejoining
                };
            }
            Motion::Rejoining => match geo::project(&self.position, &route, None) {
                Ok(projection) if projection.distance_m <= distance => {
                    self.position = projection.point;
                    self.along_m = projection.along_route_m;
                    self.motion = Motion::Following;
                }
                Ok(projection) => {
                    self.heading = self.position.bearing_to(&projection.point);
                    self.position = self.position.offset(self.heading, distance);
                }
                Err(e) => {
                    debug!("Cannot project onto route: {}", e);
                    self.motion = Motion::Following;
                }
            },
        }
    }

    /// Keep driving straight ahead, ignoring the route
    pub fn coast(&mut self, dt_s: f64) {
        self.position = self.position.offset(self.heading, self.speed_mps * dt_s);
    }

    /// The true position displaced by GPS noise
    pub fn observed_position(&mut self) -> LatLng {
        if self.noise_m <= 0.0 {
            return self.position;
        }
        let bearing = self.rng.gen_range(0.0..360.0);
        let distance = self.rng.gen_range(0.0..=self.noise_m);
        self.position.offset(bearing, distance)
    }
}

/// Point and segment bearing `along_m` meters from the route start
fn point_at(route: &Route, along_m: f64) -> (LatLng, f64) {
    for index in 0..route.segment_count() {
        let (Some((start, end)), Some(from), Some(to)) = (
            route.segment(index),
            route.cumulative_distance(index),
            route.cumulative_distance(index + 1),
        ) else {
            break;
        };
        if along_m <= to {
            let length = to - from;
            let t = if length > 0.0 { (along_m - from) / length } else { 0.0 };
            let bearing = route.segment_bearing(index).unwrap_or(0.0);
            return (start.lerp(&end, t.clamp(0.0, 1.0)), bearing);
        }
    }

    let last = route.segment_count().saturating_sub(1);
    (
        route.destination(),
        route.segment_bearing(last).unwrap_or(0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn line() -> Arc<Route> {
        Arc::new(
            Route::from_points(&[
                LatLng::new(0.0, 0.0),
                LatLng::new(0.0, 0.01),
                LatLng::new(0.0, 0.02),
            ])
            .unwrap(),
        )
    }

    fn vehicle(detour: bool) -> SimulatedVehicle {
        SimulatedVehicle::new(
            LatLng::new(0.0, 0.0),
            10.0,
            0.0,
            detour,
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn test_point_at_interpolates() {
        let route = line();
        let (point, bearing) = point_at(&route, route.total_length_m() / 4.0);
        assert!((point.longitude - 0.005).abs() < 1e-6);
        assert!((bearing - 90.0).abs() < 1e-6);

        let (end, _) = point_at(&route, route.total_length_m() + 100.0);
        assert_eq!(end, route.destination());
    }

    #[test]
    fn test_follows_route() {
        let mut vehicle = vehicle(false);
        vehicle.follow(&line());
        for _ in 0..10 {
            vehicle.step(1.0);
        }
        assert!((vehicle.position().distance_to(&LatLng::new(0.0, 0.0)) - 100.0).abs() < 0.5);
        assert!(vehicle.position().latitude.abs() < 1e-9);
    }

    #[test]
    fn test_detour_leaves_and_rejoins() {
        let route = line();
        let mut vehicle = vehicle(true);
        vehicle.follow(&route);

        let mut max_deviation: f64 = 0.0;
        for _ in 0..400 {
            vehicle.step(1.0);
            let projection = geo::project(&vehicle.position(), &route, None).unwrap();
            max_deviation = max_deviation.max(projection.distance_m);
        }

        assert!(max_deviation > 250.0);
        assert!(vehicle.position().distance_to(&route.destination()) < 0.5);
    }

    #[test]
    fn test_noise_stays_within_radius() {
        let mut vehicle = SimulatedVehicle::new(
            LatLng::new(10.0, 10.0),
            10.0,
            5.0,
            false,
            StdRng::seed_from_u64(1),
        );
        for _ in 0..50 {
            let observed = vehicle.observed_position();
            assert!(observed.distance_to(&vehicle.position()) <= 5.01);
        }
    }
}
