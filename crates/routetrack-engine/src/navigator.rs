//! Navigation state machine
//!
//! [`NavigationCore`] owns the navigation session and performs every state
//! transition. It never does I/O: each operation returns the list of
//! [`Effect`]s the caller must apply (publish an event, start or cancel a
//! route request). The service actor executes effects; tests inspect them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use routetrack_core::{Destination, LatLng, Location, Projection, Route, VehicleConfig};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{NavigationError, Result};
use crate::event::NavigationEvent;
use crate::off_route::{OffRouteDetector, OffRouteSignal, OffRouteStatus};
use crate::progress::RouteProgressTracker;
use crate::state::{DestinationReachedResult, NavigationState, SessionId};

/// Identifies one route request within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTicket {
    pub session: SessionId,
    pub request_id: u64,
}

/// Why a route is being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPurpose {
    /// Initial route for a new session
    Start,
    /// Replacement after verified off-route
    Reroute,
    /// Replacement after the vehicle changed
    VehicleChange,
}

/// Route request to be executed by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub ticket: RequestTicket,
    pub purpose: RequestPurpose,
    pub origin: Location,
    pub destination: LatLng,
    pub vehicle: VehicleConfig,
    /// Retry number, 0 for the first try
    pub attempt: u32,
    /// Wait before sending the request
    pub delay: Duration,
}

/// Side effect requested by a state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Publish an event to listeners
    Emit(NavigationEvent),
    /// Start a route request; its result must come back via
    /// [`NavigationCore::route_response`]
    RequestRoute(RouteRequest),
    /// Abandon every in-flight route request
    CancelRouteRequests,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    request_id: u64,
    purpose: RequestPurpose,
    attempt: u32,
}

#[derive(Debug)]
struct Session {
    id: SessionId,
    destination: Destination,
    vehicle: VehicleConfig,
    state: Option<NavigationState>,
    pending: Option<PendingRequest>,
    awaiting_fix: bool,
    started_at: Instant,
    reroute_cooldown_until: Option<Instant>,
}

/// Single-owner navigation state machine
#[derive(Debug)]
pub struct NavigationCore {
    config: EngineConfig,
    tracker: RouteProgressTracker,
    detector: OffRouteDetector,
    session: Option<Session>,
    next_session: SessionId,
    next_request: u64,
    last_fix: Option<Location>,
    last_fix_at: Option<Instant>,
    unavailable_reported: bool,
    leaving_watch: Option<Destination>,
}

impl NavigationCore {
    /// Create an idle core
    pub fn new(config: EngineConfig) -> Self {
        Self {
            tracker: RouteProgressTracker::new(config.tracker.clone()),
            detector: OffRouteDetector::new(config.off_route.clone()),
            config,
            session: None,
            next_session: 1,
            next_request: 1,
            last_fix: None,
            last_fix_at: None,
            unavailable_reported: false,
            leaving_watch: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current navigation state, `None` when not navigating
    pub fn state(&self) -> Option<&NavigationState> {
        self.session.as_ref().and_then(|s| s.state.as_ref())
    }

    /// Whether a route is active
    pub fn is_navigating(&self) -> bool {
        self.state().is_some()
    }

    /// Current session id, including sessions still waiting for a route
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Last accepted fix
    pub fn last_fix(&self) -> Option<&Location> {
        self.last_fix.as_ref()
    }

    /// Begin navigating to `destination`
    ///
    /// Any active session is stopped first. Without a known fix the route
    /// request is deferred until the first valid location arrives.
    pub fn start_navigation(
        &mut self,
        destination: Destination,
        vehicle: VehicleConfig,
        now: Instant,
    ) -> Result<Vec<Effect>> {
        vehicle.validate()?;
        if !destination.lat_lng.is_valid() {
            return Err(NavigationError::InvalidLocation(format!(
                "destination {} is not a valid coordinate",
                destination.lat_lng
            )));
        }

        let mut effects = self.stop_navigation();
        self.leaving_watch = None;
        self.tracker.reset();
        self.detector.reset();

        let id = self.next_session;
        self.next_session += 1;
        info!(session = id, %destination, profile = vehicle.profile_name(), "Navigation session started");

        self.session = Some(Session {
            id,
            destination,
            vehicle,
            state: None,
            pending: None,
            awaiting_fix: false,
            started_at: now,
            reroute_cooldown_until: None,
        });

        match self.last_fix.clone() {
            Some(origin) => effects.extend(self.request_route(
                RequestPurpose::Start,
                origin,
                0,
                Duration::ZERO,
            )),
            None => {
                debug!(session = id, "No fix yet, deferring route request");
                if let Some(session) = self.session.as_mut() {
                    session.awaiting_fix = true;
                }
            }
        }

        Ok(effects)
    }

    /// End the current session, if any
    pub fn stop_navigation(&mut self) -> Vec<Effect> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };

        let mut effects = Vec::new();
        if session.pending.is_some() {
            effects.push(Effect::CancelRouteRequests);
        }
        if session.state.is_some() {
            info!(session = session.id, "Navigation stopped");
            effects.push(Effect::Emit(NavigationEvent::NavigationStopped {
                session: session.id,
            }));
        } else {
            debug!(session = session.id, "Session abandoned before a route was acquired");
        }
        effects
    }

    /// Change the vehicle; re-plans the route if navigating
    pub fn set_vehicle_config(&mut self, vehicle: VehicleConfig) -> Result<Vec<Effect>> {
        vehicle.validate()?;

        let origin = self.last_fix.clone();
        let Some(session) = self.session.as_mut() else {
            return Ok(Vec::new());
        };
        if session.vehicle == vehicle {
            return Ok(Vec::new());
        }

        info!(session = session.id, profile = vehicle.profile_name(), "Vehicle config changed");
        session.vehicle = vehicle.clone();

        if session.awaiting_fix {
            return Ok(Vec::new());
        }

        let (purpose, origin) = match session.state.as_mut() {
            Some(state) => {
                state.vehicle_config = vehicle;
                let origin = origin
                    .unwrap_or_else(|| Location::new(state.route.origin(), Utc::now()));
                (RequestPurpose::VehicleChange, origin)
            }
            // The pending start request was planned for the old vehicle
            None => match origin {
                Some(origin) => (RequestPurpose::Start, origin),
                None => return Ok(Vec::new()),
            },
        };

        let mut effects = Vec::new();
        if session.pending.is_some() {
            effects.push(Effect::CancelRouteRequests);
        }
        effects.extend(self.request_route(purpose, origin, 0, Duration::ZERO));
        Ok(effects)
    }

    /// Process a location fix
    pub fn update_location(&mut self, location: Location, now: Instant) -> Vec<Effect> {
        if !location.is_valid() {
            warn!(position = %location.lat_lng, "Rejecting invalid fix");
            return Vec::new();
        }
        // A fix is one sample: redeliveries must not count twice toward verification
        if let Some(last) = &self.last_fix {
            if location.timestamp <= last.timestamp {
                debug!(
                    fix = %location.timestamp,
                    last = %last.timestamp,
                    "Discarding repeated or out-of-order fix"
                );
                return Vec::new();
            }
        }

        self.last_fix = Some(location.clone());
        self.last_fix_at = Some(now);
        self.unavailable_reported = false;

        let mut effects = Vec::new();

        if let Some(destination) = &self.leaving_watch {
            let distance = location.lat_lng.distance_to(&destination.lat_lng);
            if distance > self.config.tracker.leaving_radius_m {
                info!(%destination, distance_m = distance, "Leaving destination");
                effects.push(Effect::Emit(NavigationEvent::LeavingDestination {
                    destination: destination.clone(),
                }));
                self.leaving_watch = None;
            }
        }

        let Some(session) = self.session.as_mut() else {
            return effects;
        };

        if session.awaiting_fix {
            session.awaiting_fix = false;
            effects.extend(self.request_route(RequestPurpose::Start, location, 0, Duration::ZERO));
            return effects;
        }
        if session.state.is_none() {
            return effects;
        }

        self.track(&location, now, &mut effects);
        effects
    }

    /// Deliver the result of a route request
    pub fn route_response(
        &mut self,
        ticket: RequestTicket,
        result: Result<Route>,
        now: Instant,
    ) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            let err = NavigationError::SessionStale {
                expected: 0,
                actual: ticket.session,
            };
            warn!(%err, "Discarding route response, not navigating");
            return Vec::new();
        };
        if session.id != ticket.session {
            let err = NavigationError::SessionStale {
                expected: session.id,
                actual: ticket.session,
            };
            warn!(%err, "Discarding route response for an old session");
            return Vec::new();
        }
        let pending = match session.pending {
            Some(pending) if pending.request_id == ticket.request_id => pending,
            _ => {
                debug!(request = ticket.request_id, "Discarding superseded route response");
                return Vec::new();
            }
        };
        session.pending = None;

        match result {
            Ok(route) => self.accept_route(pending, Arc::new(route)),
            Err(error) => self.route_failed(pending, error, now),
        }
    }

    /// Periodic check for a missing location feed
    pub fn check_staleness(&mut self, now: Instant) -> Vec<Effect> {
        let Some(session) = &self.session else {
            return Vec::new();
        };
        if self.unavailable_reported {
            return Vec::new();
        }

        let since = self.last_fix_at.unwrap_or(session.started_at).max(session.started_at);
        let stale = now.saturating_duration_since(since);
        if stale < self.config.location_staleness {
            return Vec::new();
        }

        self.unavailable_reported = true;
        let stale_ms = stale.as_millis() as u64;
        warn!(session = session.id, stale_ms, "Location unavailable, holding last progress");
        vec![Effect::Emit(NavigationEvent::LocationUnavailable { stale_ms })]
    }

    fn request_route(
        &mut self,
        purpose: RequestPurpose,
        origin: Location,
        attempt: u32,
        delay: Duration,
    ) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let request_id = self.next_request;
        self.next_request += 1;
        session.pending = Some(PendingRequest {
            request_id,
            purpose,
            attempt,
        });

        debug!(
            session = session.id,
            request = request_id,
            ?purpose,
            attempt,
            "Requesting route"
        );

        vec![Effect::RequestRoute(RouteRequest {
            ticket: RequestTicket {
                session: session.id,
                request_id,
            },
            purpose,
            origin,
            destination: session.destination.lat_lng,
            vehicle: session.vehicle.clone(),
            attempt,
            delay,
        })]
    }

    fn accept_route(&mut self, pending: PendingRequest, route: Arc<Route>) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(session) = self.session.as_mut() else {
            return effects;
        };

        info!(
            session = session.id,
            route = %route.id(),
            length_m = route.total_length_m(),
            purpose = ?pending.purpose,
            "Route acquired"
        );

        self.tracker.reset();
        self.detector.reset();
        session.reroute_cooldown_until = None;

        match session.state.as_mut() {
            None => {
                session.state = Some(NavigationState::new(
                    session.id,
                    session.destination.clone(),
                    session.vehicle.clone(),
                    route,
                ));
                effects.push(Effect::Emit(NavigationEvent::NavigationStarted {
                    destination: session.destination.clone(),
                }));
            }
            Some(state) => {
                state.route = Arc::clone(&route);
                state.reroute_count += 1;
                state.on_route = true;
                state.off_route_status = OffRouteStatus::OnRoute;
                effects.push(Effect::Emit(NavigationEvent::RouteUpdated { route }));

                if let Some(fix) = self.last_fix.clone() {
                    let now = self.last_fix_at.unwrap_or_else(Instant::now);
                    self.track(&fix, now, &mut effects);
                }
            }
        }
        effects
    }

    fn route_failed(
        &mut self,
        pending: PendingRequest,
        error: NavigationError,
        now: Instant,
    ) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        warn!(
            session = session.id,
            purpose = ?pending.purpose,
            attempt = pending.attempt,
            %error,
            "Route request failed"
        );

        let failed = Effect::Emit(NavigationEvent::RouteRequestFailed {
            error: error.clone(),
        });

        match pending.purpose {
            RequestPurpose::Start => {
                // The caller decides whether to start again
                self.session = None;
                vec![failed]
            }
            RequestPurpose::VehicleChange => vec![failed],
            RequestPurpose::Reroute => {
                let still_off_route = self.detector.status() == OffRouteStatus::Verified;
                let retries_left = pending.attempt < self.config.reroute.max_retries;

                if still_off_route && retries_left && error.is_retriable() {
                    let attempt = pending.attempt + 1;
                    let delay = self.config.reroute.backoff_for(attempt);
                    let origin = match self.last_fix.clone() {
                        Some(origin) => origin,
                        None => return vec![failed],
                    };
                    debug!(attempt, ?delay, "Retrying reroute");
                    return self.request_route(RequestPurpose::Reroute, origin, attempt, delay);
                }

                session.reroute_cooldown_until = Some(now + self.config.reroute.cooldown);
                vec![failed]
            }
        }
    }

    /// Run tracker and detector for a fix on the active route
    fn track(&mut self, location: &Location, now: Instant, effects: &mut Vec<Effect>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(state) = session.state.as_mut() else {
            return;
        };

        let update = match self.tracker.update(location, &state.route) {
            Ok(update) => update,
            Err(err) => {
                warn!(%err, "Progress update failed, holding last progress");
                return;
            }
        };

        let progress = update.progress();
        let projection = Projection {
            point: progress.current_location_on_route.projected,
            segment_index: progress.segment_index,
            distance_m: progress.deviation_m,
            along_route_m: progress.along_route_m,
        };
        let bearing = state.route.segment_bearing(progress.segment_index);
        let evaluation = self.detector.evaluate(location, &projection, bearing);

        // Clamped projections past the end only count as arrival when near the route
        let arrived = update.is_destination_reached()
            && evaluation.status != OffRouteStatus::Verified
            && evaluation.deviation_m < evaluation.threshold_m;

        state.route_progress = Some(update.into_progress());
        state.off_route_status = evaluation.status;
        state.on_route = evaluation.status != OffRouteStatus::Verified;

        if arrived {
            if let Some(final_progress) = state.route_progress.clone() {
                info!(session = session.id, destination = %session.destination, "Destination reached");
                effects.push(Effect::Emit(NavigationEvent::DestinationReached {
                    result: DestinationReachedResult {
                        session: session.id,
                        destination: session.destination.clone(),
                        final_progress,
                        reroute_count: state.reroute_count,
                    },
                }));
            }
            let destination = session.destination.clone();
            effects.extend(self.stop_navigation());
            self.leaving_watch = Some(destination);
            return;
        }

        if !state.initialized {
            state.initialized = true;
            debug!(session = session.id, "Navigation state initialized");
            effects.push(Effect::Emit(NavigationEvent::NavigationStateInitialized {
                state: state.clone(),
            }));
        }
        effects.push(Effect::Emit(NavigationEvent::NavigationStateUpdated {
            state: state.clone(),
        }));

        for signal in &evaluation.signals {
            match signal {
                OffRouteSignal::Detected => {
                    debug!(deviation_m = evaluation.deviation_m, "Off-route detected");
                    effects.push(Effect::Emit(NavigationEvent::OffRouteDetected {
                        deviation_m: evaluation.deviation_m,
                    }));
                }
                OffRouteSignal::Verified => {
                    info!(
                        session = session.id,
                        deviation_m = evaluation.deviation_m,
                        wrong_way = evaluation.wrong_way,
                        "Off-route verified"
                    );
                    effects.push(Effect::Emit(NavigationEvent::OffRouteVerified {
                        deviation_m: evaluation.deviation_m,
                    }));
                }
                OffRouteSignal::BackOnRoute => {
                    info!(session = session.id, "Back on route");
                    session.reroute_cooldown_until = None;
                    effects.push(Effect::Emit(NavigationEvent::BackOnRoute));
                }
            }
        }

        let cooled_down = session
            .reroute_cooldown_until
            .map_or(true, |until| now >= until);
        if evaluation.status == OffRouteStatus::Verified && session.pending.is_none() && cooled_down {
            session.reroute_cooldown_until = None;
            effects.extend(self.request_route(
                RequestPurpose::Reroute,
                location.clone(),
                0,
                Duration::ZERO,
            ));
        }
    }
}
