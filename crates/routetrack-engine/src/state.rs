//! Navigation state snapshots

use std::sync::Arc;

use routetrack_core::{Destination, Route, VehicleConfig};
use serde::Serialize;

use crate::off_route::OffRouteStatus;
use crate::progress::RouteProgress;

/// Identifier of one navigation session
///
/// Every `start_navigation` opens a new session; responses carrying an
/// older session id are discarded.
pub type SessionId = u64;

/// State of an active navigation
///
/// Exists only while navigating. Clones are cheap: the route is shared and
/// never mutated, so handing a clone to a listener never exposes live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationState {
    /// Session this state belongs to
    pub session: SessionId,
    /// Where the navigation is heading
    pub destination: Destination,
    /// Vehicle the route was planned for
    pub vehicle_config: VehicleConfig,
    /// Active route; replaced wholesale on reroute
    #[serde(skip)]
    pub route: Arc<Route>,
    /// Latest progress, `None` until the first fix on this session
    pub route_progress: Option<RouteProgress>,
    /// False once off-route detection is verified
    pub on_route: bool,
    /// Set on the first successful progress update of the session
    pub initialized: bool,
    /// Detector state behind `on_route`
    pub off_route_status: OffRouteStatus,
    /// Number of route replacements during this session
    pub reroute_count: u32,
}

impl NavigationState {
    /// Fresh state for a newly planned route
    pub fn new(
        session: SessionId,
        destination: Destination,
        vehicle_config: VehicleConfig,
        route: Arc<Route>,
    ) -> Self {
        Self {
            session,
            destination,
            vehicle_config,
            route,
            route_progress: None,
            on_route: true,
            initialized: false,
            off_route_status: OffRouteStatus::OnRoute,
            reroute_count: 0,
        }
    }

    /// Remaining distance of the latest progress, if any
    pub fn remaining_distance_m(&self) -> Option<f64> {
        self.route_progress.as_ref().map(|p| p.remaining_distance_m)
    }
}

/// Summary handed to listeners on arrival
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationReachedResult {
    /// Session that arrived
    pub session: SessionId,
    /// The destination reached
    pub destination: Destination,
    /// Final progress snapshot
    pub final_progress: RouteProgress,
    /// Number of reroutes on the way
    pub reroute_count: u32,
}
