//! Routetrack Engine - Route progress and off-route tracking
//!
//! This crate consumes a live stream of noisy GPS fixes together with a
//! planned route and continuously reports where the vehicle is on the
//! route, how far and how long is left, which maneuver comes next, and
//! whether the vehicle has left the route.
//!
//! # Overview
//!
//! - **Progress tracking**: projection onto the route, remaining distance
//!   and time, next milestone, passed waypoints
//! - **Off-route detection**: accuracy-scaled thresholds with debounced
//!   verification and wrong-way detection
//! - **Rerouting**: verified deviations request a new route with retry,
//!   backoff and cooldown; late responses are discarded by session
//! - **Events**: per-kind listeners on a dedicated dispatcher task plus a
//!   broadcast stream
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use routetrack_core::{Destination, LatLng, Location, VehicleConfig};
//! use routetrack_engine::{DirectPlanner, EngineConfig, NavigationService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let planner = Arc::new(DirectPlanner::new());
//!     let (service, handle, mut events) =
//!         NavigationService::new(EngineConfig::default(), planner)?;
//!
//!     // Spawn the service
//!     tokio::spawn(async move {
//!         service.run().await.expect("Navigation service failed");
//!     });
//!
//!     let here = Location::new(LatLng::new(48.2082, 16.3738), chrono::Utc::now());
//!     handle.update_location(here).await?;
//!
//!     let destination = Destination::from_lat_lng(LatLng::new(48.2206, 16.3800));
//!     handle.start_navigation(destination, VehicleConfig::Car).await?;
//!
//!     // Listen for events
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event.kind());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod listener;
pub mod navigator;
pub mod off_route;
pub mod planner;
pub mod progress;
pub mod service;
pub mod state;


// Re-exports
pub use config::{EngineConfig, OffRouteConfig, RerouteConfig, TrackerConfig};
pub use error::{NavigationError, Result};
pub use event::{EventKind, NavigationEvent};
pub use listener::{EventDispatcher, ListenerId, ListenerRegistry, NavigationListener};
pub use navigator::{Effect, NavigationCore, RequestPurpose, RequestTicket, RouteRequest};
pub use off_route::{OffRouteDetector, OffRouteEvaluation, OffRouteSignal, OffRouteStatus};
pub use planner::{DirectPlanner, RoutePlanner, RouteShape, ScriptedPlanner, ScriptedResponse};
pub use progress::{LocationOnRoute, RouteProgress, RouteProgressTracker, TrackerUpdate};
pub use service::{NavigationCommand, NavigationHandle, NavigationService};
pub use state::{DestinationReachedResult, NavigationState, SessionId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tracker.fallback_speed_mps, 13.9);
        assert_eq!(config.reroute.max_retries, 2);
        assert_eq!(config.route_request_timeout.as_secs(), 10);
    }
}
