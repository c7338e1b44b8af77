//! Engine configuration types
//!
//! Every threshold the tracker, detector and dispatcher use is exposed
//! here. Durations serialize as human-readable strings ("10s", "1m 30s").

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NavigationError, Result};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Route progress tracker settings
    pub tracker: TrackerConfig,
    /// Off-route detector settings
    pub off_route: OffRouteConfig,
    /// Reroute retry policy
    pub reroute: RerouteConfig,
    /// Maximum time a route request may take
    #[serde(with = "humantime_serde")]
    pub route_request_timeout: Duration,
    /// Age after which the last fix counts as unavailable
    #[serde(with = "humantime_serde")]
    pub location_staleness: Duration,
    /// How often the service checks for a stale fix
    #[serde(with = "humantime_serde")]
    pub staleness_check_interval: Duration,
    /// Capacity of the command queue into the navigation actor
    pub command_capacity: usize,
    /// Capacity of the event broadcast and listener dispatch queues
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            off_route: OffRouteConfig::default(),
            reroute: RerouteConfig::default(),
            route_request_timeout: Duration::from_secs(10),
            location_staleness: Duration::from_secs(10),
            staleness_check_interval: Duration::from_secs(1),
            command_capacity: 256,
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Check that all values are usable
    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.off_route.validate()?;
        self.reroute.validate()?;

        if self.route_request_timeout.is_zero() {
            return Err(NavigationError::Config(
                "route_request_timeout must be non-zero".into(),
            ));
        }
        if self.staleness_check_interval.is_zero() {
            return Err(NavigationError::Config(
                "staleness_check_interval must be non-zero".into(),
            ));
        }
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err(NavigationError::Config(
                "channel capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| NavigationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Route progress tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Remaining distance at which the destination counts as reached (meters)
    pub arrival_radius_m: f64,
    /// Distance from a reached destination that counts as leaving it (meters)
    pub leaving_radius_m: f64,
    /// Reported speeds below this are ignored for ETA (m/s)
    pub min_valid_speed_mps: f64,
    /// Number of recent valid speeds kept for the rolling average
    pub speed_window: usize,
    /// Speed used when neither the fix nor the route gives one (m/s)
    pub fallback_speed_mps: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            arrival_radius_m: 25.0,
            leaving_radius_m: 75.0,
            min_valid_speed_mps: 1.0,
            speed_window: 10,
            fallback_speed_mps: 13.9, // ~50 km/h
        }
    }
}

impl TrackerConfig {
    fn validate(&self) -> Result<()> {
        if !self.arrival_radius_m.is_finite() || self.arrival_radius_m < 0.0 {
            return Err(NavigationError::Config(
                "arrival_radius_m must be non-negative".into(),
            ));
        }
        if !self.leaving_radius_m.is_finite() || self.leaving_radius_m <= self.arrival_radius_m {
            return Err(NavigationError::Config(
                "leaving_radius_m must exceed arrival_radius_m".into(),
            ));
        }
        if !is_positive(self.fallback_speed_mps) || !is_positive(self.min_valid_speed_mps) {
            return Err(NavigationError::Config(
                "speeds must be positive".into(),
            ));
        }
        if self.speed_window == 0 {
            return Err(NavigationError::Config("speed_window must be at least 1".into()));
        }
        Ok(())
    }
}

/// Off-route detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffRouteConfig {
    /// Deviation threshold floor (meters)
    pub min_threshold_m: f64,
    /// Deviation threshold ceiling (meters)
    pub max_threshold_m: f64,
    /// Threshold grows with reported accuracy: accuracy × factor
    pub accuracy_factor: f64,
    /// Consecutive over-threshold samples needed to verify
    pub verification_samples: u32,
    /// Time off-route after which detection is verified regardless of sample count
    #[serde(with = "humantime_serde::option")]
    pub verification_window: Option<Duration>,
    /// Consecutive under-threshold samples needed to declare back on route
    pub back_on_route_samples: u32,
    /// Heading deviation from the segment bearing treated as wrong-way (degrees)
    pub max_heading_deviation_deg: Option<f64>,
    /// Heading is only trusted above this speed (m/s)
    pub min_heading_speed_mps: f64,
}

impl Default for OffRouteConfig {
    fn default() -> Self {
        Self {
            min_threshold_m: 50.0,
            max_threshold_m: 150.0,
            accuracy_factor: 1.5,
            verification_samples: 3,
            verification_window: Some(Duration::from_secs(10)),
            back_on_route_samples: 2,
            max_heading_deviation_deg: Some(150.0),
            min_heading_speed_mps: 3.0,
        }
    }
}

impl OffRouteConfig {
    /// Deviation threshold for a fix with the given accuracy
    pub fn threshold_for(&self, accuracy: Option<f64>) -> f64 {
        let scaled = accuracy.map_or(0.0, |a| a * self.accuracy_factor);
        scaled.max(self.min_threshold_m).min(self.max_threshold_m)
    }

    fn validate(&self) -> Result<()> {
        if !is_positive(self.min_threshold_m) || self.max_threshold_m < self.min_threshold_m {
            return Err(NavigationError::Config(
                "off-route thresholds must satisfy 0 < min <= max".into(),
            ));
        }
        if self.verification_samples == 0 || self.back_on_route_samples == 0 {
            return Err(NavigationError::Config(
                "off-route sample counts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Reroute retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerouteConfig {
    /// Automatic retries after a failed reroute request
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Wait before trying again once retries are exhausted while still off route
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            cooldown: Duration::from_secs(15),
        }
    }
}

impl RerouteConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn validate(&self) -> Result<()> {
        if self.max_backoff < self.initial_backoff {
            return Err(NavigationError::Config(
                "max_backoff must be at least initial_backoff".into(),
            ));
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

// Helper module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        s.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration
                .map(|d| humantime::format_duration(d).to_string())
                .serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.off_route.min_threshold_m, 50.0);
        assert_eq!(config.off_route.verification_samples, 3);
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"route_request_timeout\": \"10s\""));

        let recovered = EngineConfig::from_json(&json).unwrap();
        assert_eq!(recovered.route_request_timeout, config.route_request_timeout);
        assert_eq!(
            recovered.off_route.verification_window,
            config.off_route.verification_window
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "off_route": { "min_threshold_m": 30.0, "verification_window": null } }"#,
        )
        .unwrap();
        assert_eq!(config.off_route.min_threshold_m, 30.0);
        assert_eq!(config.off_route.verification_window, None);
        assert_eq!(config.off_route.verification_samples, 3);
        assert_eq!(config.tracker.arrival_radius_m, 25.0);
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let mut config = EngineConfig::default();
        config.off_route.max_threshold_m = 10.0;
        assert!(matches!(config.validate(), Err(NavigationError::Config(_))));

        let mut config = EngineConfig::default();
        config.tracker.leaving_radius_m = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_scales_with_accuracy() {
        let config = OffRouteConfig::default();
        assert_eq!(config.threshold_for(None), 50.0);
        assert_eq!(config.threshold_for(Some(10.0)), 50.0);
        assert_eq!(config.threshold_for(Some(60.0)), 90.0);
        assert_eq!(config.threshold_for(Some(500.0)), 150.0);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let reroute = RerouteConfig::default();
        assert_eq!(reroute.backoff_for(1), Duration::from_secs(1));
        assert_eq!(reroute.backoff_for(2), Duration::from_secs(2));
        assert_eq!(reroute.backoff_for(3), Duration::from_secs(4));
        assert_eq!(reroute.backoff_for(10), Duration::from_secs(8));
    }
}
