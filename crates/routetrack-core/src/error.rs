//! Error types for the routetrack domain model
//!
//! These errors cover malformed input to the pure geometry and route
//! types. Runtime failures (route requests, stale sessions) live in the
//! engine crate.

use thiserror::Error;

/// Errors raised while building or querying domain values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Route is malformed or too short to navigate
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// Coordinate outside the WGS84 range or not finite
    #[error("Invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// Vehicle parameters that cannot be sent to a planner
    #[error("Invalid vehicle config: {0}")]
    InvalidVehicleConfig(String),
}

impl CoreError {
    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidRoute(_) => "INVALID_ROUTE",
            CoreError::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            CoreError::InvalidVehicleConfig(_) => "INVALID_VEHICLE_CONFIG",
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
