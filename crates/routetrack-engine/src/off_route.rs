//! Off-route detection with debounced verification
//!
//! The detector classifies every fix against a deviation threshold. A
//! single noisy fix never escalates: detection must persist for a number
//! of consecutive samples (or a time window) before it is verified, and a
//! single good fix while merely detected reverts to on-route.
//!
//! ```text
//! OnRoute --over--> Detected --debounce--> Verified --N under--> OnRoute (BackOnRoute)
//!                      |                       |
//!                      +--under--> OnRoute     +--new route--> OnRoute
//! ```

use chrono::{DateTime, Utc};
use routetrack_core::route::normalize_angle;
use routetrack_core::{Location, Projection};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OffRouteConfig;

/// Stable detector state between fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffRouteStatus {
    /// Following the route
    OnRoute,
    /// Deviation seen, not yet confirmed
    Detected,
    /// Deviation confirmed; a reroute is needed
    Verified,
}

/// Transition emitted on the fix that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffRouteSignal {
    /// First over-threshold fix after being on route
    Detected,
    /// Debounce satisfied
    Verified,
    /// Returned to the route after verification
    BackOnRoute,
}

/// Outcome of evaluating one fix
#[derive(Debug, Clone, PartialEq)]
pub struct OffRouteEvaluation {
    /// State after this fix
    pub status: OffRouteStatus,
    /// Transitions caused by this fix, in order
    pub signals: Vec<OffRouteSignal>,
    /// Orthogonal distance from the route (meters)
    pub deviation_m: f64,
    /// Threshold applied to this fix (meters)
    pub threshold_m: f64,
    /// Heading points against the route direction
    pub wrong_way: bool,
}

impl OffRouteEvaluation {
    /// Whether this fix produced the given transition
    pub fn has_signal(&self, signal: OffRouteSignal) -> bool {
        self.signals.contains(&signal)
    }
}

/// Stateful off-route evaluator
#[derive(Debug, Clone)]
pub struct OffRouteDetector {
    config: OffRouteConfig,
    status: OffRouteStatus,
    over_count: u32,
    under_count: u32,
    detected_at: Option<DateTime<Utc>>,
}

impl OffRouteDetector {
    /// Create a detector in the on-route state
    pub fn new(config: OffRouteConfig) -> Self {
        Self {
            config,
            status: OffRouteStatus::OnRoute,
            over_count: 0,
            under_count: 0,
            detected_at: None,
        }
    }

    /// Current state
    pub fn status(&self) -> OffRouteStatus {
        self.status
    }

    /// Return to on-route, e.g. after a new route was accepted
    pub fn reset(&mut self) {
        self.status = OffRouteStatus::OnRoute;
        self.over_count = 0;
        self.under_count = 0;
        self.detected_at = None;
    }

    /// Evaluate one fix against its projection onto the route
    ///
    /// `segment_bearing` is the bearing of the segment the fix projected
    /// onto; it enables wrong-way detection when the fix carries a heading.
    pub fn evaluate(
        &mut self,
        location: &Location,
        projection: &Projection,
        segment_bearing: Option<f64>,
    ) -> OffRouteEvaluation {
        let threshold_m = self.config.threshold_for(location.accuracy);
        let deviation_m = projection.distance_m;
        let wrong_way = self.is_wrong_way(location, segment_bearing);
        let over = deviation_m >= threshold_m || wrong_way;

        let mut signals = Vec::new();

        match self.status {
            OffRouteStatus::OnRoute => {
                if over {
                    self.status = OffRouteStatus::Detected;
                    self.over_count = 1;
                    self.detected_at = Some(location.timestamp);
                    signals.push(OffRouteSignal::Detected);

                    if self.debounce_satisfied(location.timestamp) {
                        self.verify();
                        signals.push(OffRouteSignal::Verified);
                    }
                }
            }
            OffRouteStatus::Detected => {
                if over {
                    self.over_count += 1;
                    if self.debounce_satisfied(location.timestamp) {
                        self.verify();
                        signals.push(OffRouteSignal::Verified);
                    }
                } else {
                    debug!(deviation_m, threshold_m, "Off-route detection cleared before verification");
                    self.reset();
                }
            }
            OffRouteStatus::Verified => {
                if over {
                    self.under_count = 0;
                } else {
                    self.under_count += 1;
                    if self.under_count >= self.config.back_on_route_samples {
                        self.reset();
                        signals.push(OffRouteSignal::BackOnRoute);
                    }
                }
            }
        }

        OffRouteEvaluation {
            status: self.status,
            signals,
            deviation_m,
            threshold_m,
            wrong_way,
        }
    }

    fn verify(&mut self) {
        self.status = OffRouteStatus::Verified;
        self.under_count = 0;
    }

    fn debounce_satisfied(&self, now: DateTime<Utc>) -> bool {
        if self.over_count >= self.config.verification_samples {
            return true;
        }
        match (self.config.verification_window, self.detected_at) {
            (Some(window), Some(since)) => (now - since)
                .to_std()
                .map(|elapsed| elapsed >= window && self.over_count > 1)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn is_wrong_way(&self, location: &Location, segment_bearing: Option<f64>) -> bool {
        let (Some(max_deviation), Some(heading), Some(bearing)) = (
            self.config.max_heading_deviation_deg,
            location.heading,
            segment_bearing,
        ) else {
            return false;
        };
        if location.speed_above(self.config.min_heading_speed_mps).is_none() {
            return false;
        }
        normalize_angle(heading - bearing).abs() > max_deviation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use routetrack_core::LatLng;
    use std::time::Duration;

    fn fix(seconds: i64) -> Location {
        let base = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Location::new(LatLng::new(0.0, 0.0), base + ChronoDuration::seconds(seconds))
    }

    fn projection(distance_m: f64) -> Projection {
        Projection {
            point: LatLng::new(0.0, 0.0),
            segment_index: 0,
            distance_m,
            along_route_m: 0.0,
        }
    }

    fn detector() -> OffRouteDetector {
        OffRouteDetector::new(OffRouteConfig {
            verification_window: None,
            ..Default::default()
        })
    }

    #[test]
    fn test_stays_on_route_below_threshold() {
        let mut d = detector();
        for i in 0..5 {
            let eval = d.evaluate(&fix(i), &projection(20.0), None);
            assert_eq!(eval.status, OffRouteStatus::OnRoute);
            assert!(eval.signals.is_empty());
        }
    }

    #[test]
    fn test_single_spike_never_verifies() {
        let mut d = detector();

        let first = d.evaluate(&fix(0), &projection(51.0), None);
        assert_eq!(first.signals, vec![OffRouteSignal::Detected]);
        assert_eq!(first.status, OffRouteStatus::Detected);

        let second = d.evaluate(&fix(1), &projection(10.0), None);
        assert_eq!(second.status, OffRouteStatus::OnRoute);
        assert!(second.signals.is_empty());
    }

    #[test]
    fn test_verifies_after_three_samples_exactly_once() {
        let mut d = detector();
        let mut verified = 0;

        for i in 0..6 {
            let eval = d.evaluate(&fix(i), &projection(200.0), None);
            if eval.has_signal(OffRouteSignal::Verified) {
                verified += 1;
                assert_eq!(i, 2, "verification must happen on the third fix");
            }
        }

        assert_eq!(verified, 1);
        assert_eq!(d.status(), OffRouteStatus::Verified);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut d = detector();
        let eval = d.evaluate(&fix(0), &projection(50.0), None);
        assert_eq!(eval.status, OffRouteStatus::Detected);
    }

    #[test]
    fn test_accuracy_raises_threshold() {
        let mut d = detector();
        let noisy = fix(0).with_accuracy(60.0);
        let eval = d.evaluate(&noisy, &projection(80.0), None);
        assert_eq!(eval.threshold_m, 90.0);
        assert_eq!(eval.status, OffRouteStatus::OnRoute);
    }

    #[test]
    fn test_back_on_route_needs_consecutive_samples() {
        let mut d = detector();
        for i in 0..3 {
            d.evaluate(&fix(i), &projection(200.0), None);
        }
        assert_eq!(d.status(), OffRouteStatus::Verified);

        let one = d.evaluate(&fix(3), &projection(5.0), None);
        assert_eq!(one.status, OffRouteStatus::Verified);

        // An over-threshold fix resets the count
        d.evaluate(&fix(4), &projection(200.0), None);
        d.evaluate(&fix(5), &projection(5.0), None);
        let back = d.evaluate(&fix(6), &projection(5.0), None);
        assert_eq!(back.signals, vec![OffRouteSignal::BackOnRoute]);
        assert_eq!(back.status, OffRouteStatus::OnRoute);
    }

    #[test]
    fn test_reset_clears_verification() {
        let mut d = detector();
        for i in 0..3 {
            d.evaluate(&fix(i), &projection(200.0), None);
        }
        d.reset();
        assert_eq!(d.status(), OffRouteStatus::OnRoute);

        let eval = d.evaluate(&fix(10), &projection(200.0), None);
        assert_eq!(eval.signals, vec![OffRouteSignal::Detected]);
    }

    #[test]
    fn test_time_window_verifies_sparse_fixes() {
        let mut d = OffRouteDetector::new(OffRouteConfig {
            verification_samples: 10,
            verification_window: Some(Duration::from_secs(10)),
            ..Default::default()
        });

        d.evaluate(&fix(0), &projection(200.0), None);
        let early = d.evaluate(&fix(5), &projection(200.0), None);
        assert_eq!(early.status, OffRouteStatus::Detected);

        let late = d.evaluate(&fix(12), &projection(200.0), None);
        assert!(late.has_signal(OffRouteSignal::Verified));
    }

    #[test]
    fn test_wrong_way_counts_as_deviation() {
        let mut d = detector();
        // Route heads east (90°), vehicle drives west at speed
        let reversing = fix(0).with_heading(270.0).with_speed(10.0);
        let eval = d.evaluate(&reversing, &projection(2.0), Some(90.0));
        assert!(eval.wrong_way);
        assert_eq!(eval.status, OffRouteStatus::Detected);
    }

    #[test]
    fn test_heading_ignored_when_slow() {
        let mut d = detector();
        let crawling = fix(0).with_heading(270.0).with_speed(0.5);
        let eval = d.evaluate(&crawling, &projection(2.0), Some(90.0));
        assert!(!eval.wrong_way);
        assert_eq!(eval.status, OffRouteStatus::OnRoute);
    }
}
