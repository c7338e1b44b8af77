//! Vehicle profiles passed to route requests

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Physical truck parameters used by planners for restrictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckConfig {
    /// Gross weight in kilograms
    pub weight_kg: f64,
    /// Height in meters
    pub height_m: f64,
    /// Width in meters
    pub width_m: f64,
    /// Length in meters
    pub length_m: f64,
    /// Number of trailers
    pub trailer_count: u8,
}

impl Default for TruckConfig {
    fn default() -> Self {
        Self {
            weight_kg: 13_000.0,
            height_m: 3.5,
            width_m: 2.5,
            length_m: 16.5,
            trailer_count: 1,
        }
    }
}

/// Vehicle profile for a navigation session
///
/// Immutable once handed to the engine; changing it mid-navigation
/// replaces the value and invalidates the current route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VehicleConfig {
    #[default]
    Car,
    Truck(TruckConfig),
    Motorbike,
}

impl VehicleConfig {
    /// Short profile name for logs and planner requests
    pub fn profile_name(&self) -> &'static str {
        match self {
            VehicleConfig::Car => "car",
            VehicleConfig::Truck(_) => "truck",
            VehicleConfig::Motorbike => "motorbike",
        }
    }

    /// Reject dimensions a planner could not honour
    pub fn validate(&self) -> Result<()> {
        if let VehicleConfig::Truck(truck) = self {
            let dims = [
                ("weight_kg", truck.weight_kg),
                ("height_m", truck.height_m),
                ("width_m", truck.width_m),
                ("length_m", truck.length_m),
            ];
            for (name, value) in dims {
                if !value.is_finite() || value <= 0.0 {
                    return Err(CoreError::InvalidVehicleConfig(format!(
                        "{} must be positive, got {}",
                        name, value
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_car() {
        assert_eq!(VehicleConfig::default(), VehicleConfig::Car);
        assert_eq!(VehicleConfig::default().profile_name(), "car");
    }

    #[test]
    fn test_truck_validation() {
        assert!(VehicleConfig::Truck(TruckConfig::default()).validate().is_ok());

        let broken = VehicleConfig::Truck(TruckConfig {
            height_m: 0.0,
            ..Default::default()
        });
        let err = broken.validate().unwrap_err();
        assert!(err.to_string().contains("height_m"));
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&VehicleConfig::Motorbike).unwrap();
        assert_eq!(json, r#"{"type":"motorbike"}"#);

        let truck: VehicleConfig = serde_json::from_str(
            r#"{"type":"truck","weight_kg":7500.0,"height_m":3.2,"width_m":2.4,"length_m":9.0,"trailer_count":0}"#,
        )
        .unwrap();
        assert_eq!(truck.profile_name(), "truck");
    }
}
