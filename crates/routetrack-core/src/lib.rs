//! Routetrack Core - Geographic and route primitives for navigation
//!
//! This crate provides the pure, synchronous building blocks used by the
//! routetrack engine: coordinates and GPS fixes, vehicle profiles,
//! validated routes with precomputed along-route distances, and the
//! projection of raw positions onto a route.
//!
//! # Modules
//!
//! - [`location`] - Coordinates, GPS fixes and destinations
//! - [`vehicle`] - Vehicle profiles for route requests
//! - [`route`] - Immutable routes, waypoints and turn milestones
//! - [`geo`] - Projection of positions onto route polylines
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust
//! use routetrack_core::{geo, LatLng, Route};
//!
//! let route = Route::from_points(&[
//!     LatLng::new(0.0, 0.0),
//!     LatLng::new(0.0, 0.01),
//!     LatLng::new(0.0, 0.02),
//! ])?;
//!
//! let projection = geo::project(&LatLng::new(0.0001, 0.005), &route, None)?;
//! assert_eq!(projection.segment_index, 0);
//! println!("{:.0} m along the route", projection.along_route_m);
//! # Ok::<(), routetrack_core::CoreError>(())
//! ```

pub mod error;
pub mod geo;
pub mod location;
pub mod route;
pub mod vehicle;

// Re-exports for convenience
pub use error::{CoreError, Result};
pub use geo::{Projection, ProjectionHint};
pub use location::{Destination, LatLng, Location};
pub use route::{Milestone, Route, TurnCommand, Waypoint};
pub use vehicle::{TruckConfig, VehicleConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
