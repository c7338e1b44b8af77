//! Navigation events
//!
//! Events emitted by the navigation service for consumption by the UI,
//! camera, voice and any other listener.

use std::fmt;
use std::sync::Arc;

use routetrack_core::{Destination, Route};
use serde::{Deserialize, Serialize};

use crate::error::NavigationError;
use crate::state::{DestinationReachedResult, NavigationState, SessionId};

/// Events emitted by the navigation service
#[derive(Debug, Clone)]
pub enum NavigationEvent {
    /// A route was acquired and navigation began
    NavigationStarted {
        /// Destination being navigated to
        destination: Destination,
    },

    /// Navigation ended (explicit stop, new destination, or arrival)
    NavigationStopped {
        /// Session that ended
        session: SessionId,
    },

    /// First progress of the session was computed
    NavigationStateInitialized {
        /// Snapshot after the first fix
        state: NavigationState,
    },

    /// Progress changed
    NavigationStateUpdated {
        /// Snapshot after this fix
        state: NavigationState,
    },

    /// Arrived at the destination
    DestinationReached {
        /// Arrival summary
        result: DestinationReachedResult,
    },

    /// Moved away from a destination reached earlier
    LeavingDestination {
        /// The destination being left
        destination: Destination,
    },

    /// The active route was replaced
    RouteUpdated {
        /// The new route
        route: Arc<Route>,
    },

    /// A route request failed
    RouteRequestFailed {
        /// Failure reason
        error: NavigationError,
    },

    /// A fix exceeded the off-route threshold
    OffRouteDetected {
        /// Deviation of the triggering fix (meters)
        deviation_m: f64,
    },

    /// Off-route detection persisted; rerouting
    OffRouteVerified {
        /// Deviation of the verifying fix (meters)
        deviation_m: f64,
    },

    /// Back on the route after a verified deviation
    BackOnRoute,

    /// No fix within the staleness window
    LocationUnavailable {
        /// Age of the last fix (milliseconds)
        stale_ms: u64,
    },
}

/// Discriminant of [`NavigationEvent`], used to register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    NavigationStarted,
    NavigationStopped,
    NavigationStateInitialized,
    NavigationStateUpdated,
    DestinationReached,
    LeavingDestination,
    RouteUpdated,
    RouteRequestFailed,
    OffRouteDetected,
    OffRouteVerified,
    BackOnRoute,
    LocationUnavailable,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [EventKind; 12] = [
        EventKind::NavigationStarted,
        EventKind::NavigationStopped,
        EventKind::NavigationStateInitialized,
        EventKind::NavigationStateUpdated,
        EventKind::DestinationReached,
        EventKind::LeavingDestination,
        EventKind::RouteUpdated,
        EventKind::RouteRequestFailed,
        EventKind::OffRouteDetected,
        EventKind::OffRouteVerified,
        EventKind::BackOnRoute,
        EventKind::LocationUnavailable,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl NavigationEvent {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            NavigationEvent::NavigationStarted { .. } => EventKind::NavigationStarted,
            NavigationEvent::NavigationStopped { .. } => EventKind::NavigationStopped,
            NavigationEvent::NavigationStateInitialized { .. } => {
                EventKind::NavigationStateInitialized
            }
            NavigationEvent::NavigationStateUpdated { .. } => EventKind::NavigationStateUpdated,
            NavigationEvent::DestinationReached { .. } => EventKind::DestinationReached,
            NavigationEvent::LeavingDestination { .. } => EventKind::LeavingDestination,
            NavigationEvent::RouteUpdated { .. } => EventKind::RouteUpdated,
            NavigationEvent::RouteRequestFailed { .. } => EventKind::RouteRequestFailed,
            NavigationEvent::OffRouteDetected { .. } => EventKind::OffRouteDetected,
            NavigationEvent::OffRouteVerified { .. } => EventKind::OffRouteVerified,
            NavigationEvent::BackOnRoute => EventKind::BackOnRoute,
            NavigationEvent::LocationUnavailable { .. } => EventKind::LocationUnavailable,
        }
    }

    /// Check if this is a per-fix progress event
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            NavigationEvent::NavigationStateInitialized { .. }
                | NavigationEvent::NavigationStateUpdated { .. }
        )
    }

    /// State snapshot carried by the event, if any
    pub fn state(&self) -> Option<&NavigationState> {
        match self {
            NavigationEvent::NavigationStateInitialized { state }
            | NavigationEvent::NavigationStateUpdated { state } => Some(state),
            _ => None,
        }
    }
}
