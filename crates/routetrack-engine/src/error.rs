//! Navigation engine error types

use routetrack_core::CoreError;
use thiserror::Error;

/// Errors surfaced by the navigation engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    /// Route is malformed or too short; fatal to the request that produced it
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// Route planner failed (network or service error)
    #[error("Route request failed: {reason}")]
    RouteRequestFailed { reason: String },

    /// Route request did not complete in time
    #[error("Route request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// No recent fix within the staleness window
    #[error("Location unavailable for {stale_ms}ms")]
    LocationUnavailable { stale_ms: u64 },

    /// A response arrived for a session or request that is no longer current
    #[error("Stale session: expected {expected}, got {actual}")]
    SessionStale { expected: u64, actual: u64 },

    /// Fix with unusable coordinates or fields
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Vehicle parameters rejected
    #[error("Invalid vehicle config: {0}")]
    InvalidVehicleConfig(String),

    /// Channel error
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NavigationError {
    /// Check if the caller may retry the failed operation
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            NavigationError::RouteRequestFailed { .. } | NavigationError::Timeout { .. }
        )
    }

    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            NavigationError::InvalidRoute(_) => "INVALID_ROUTE",
            NavigationError::RouteRequestFailed { .. } => "ROUTE_REQUEST_FAILED",
            NavigationError::Timeout { .. } => "TIMEOUT",
            NavigationError::LocationUnavailable { .. } => "LOCATION_UNAVAILABLE",
            NavigationError::SessionStale { .. } => "SESSION_STALE",
            NavigationError::InvalidLocation(_) => "INVALID_LOCATION",
            NavigationError::InvalidVehicleConfig(_) => "INVALID_VEHICLE_CONFIG",
            NavigationError::Channel(_) => "CHANNEL_ERROR",
            NavigationError::Config(_) => "CONFIG_ERROR",
            NavigationError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<CoreError> for NavigationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRoute(reason) => NavigationError::InvalidRoute(reason),
            CoreError::InvalidCoordinate { .. } => NavigationError::InvalidLocation(err.to_string()),
            CoreError::InvalidVehicleConfig(reason) => NavigationError::InvalidVehicleConfig(reason),
        }
    }
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, NavigationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retriable() {
        assert!(NavigationError::Timeout { duration_ms: 10_000 }.is_retriable());
        assert!(NavigationError::RouteRequestFailed { reason: "503".into() }.is_retriable());
        assert!(!NavigationError::InvalidRoute("empty".into()).is_retriable());
    }

    #[test]
    fn test_from_core_error() {
        let err: NavigationError = CoreError::InvalidRoute("1 waypoint".into()).into();
        assert_eq!(err.error_code(), "INVALID_ROUTE");

        let err: NavigationError = CoreError::InvalidCoordinate { lat: 99.0, lon: 0.0 }.into();
        assert_eq!(err.error_code(), "INVALID_LOCATION");
    }
}
