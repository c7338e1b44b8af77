//! Off-Route Integration Tests
//!
//! Tests for off-route detection through the running service:
//! - Verification after consecutive far fixes, exactly once
//! - Single noisy fixes never verifying
//! - Reroute acceptance keeping the session initialized
//! - Returning to the route without a reroute

mod helpers;

use std::time::Duration;

use helpers::navigator::equator_line;
use helpers::TestNavigator;
use routetrack_core::LatLng;
use routetrack_engine::{EventKind, OffRouteStatus, ScriptedResponse};

fn off_route_point() -> LatLng {
    // 200 m north of the first segment
    LatLng::new(0.0, 0.005).offset(0.0, 200.0)
}

/// Three fixes 200 m from the route verify off-route exactly once.
///
/// Setup:
/// - Threshold 50 m, 3-sample debounce (defaults)
/// - One fix on the route, then five fixes 200 m away
/// - The reroute response is held back so the state stays off-route
#[tokio::test]
async fn test_verified_exactly_once() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;
    nav.planner
        .push(ScriptedResponse::route(equator_line()).after(Duration::from_secs(3600)));

    nav.drive_to(LatLng::new(0.0, 0.004)).await;
    let off = off_route_point();
    for _ in 0..5 {
        nav.drive_to(off).await;
    }
    nav.settle().await;

    let kinds = nav.drain_kinds();
    let count = |kind| kinds.iter().filter(|k| **k == kind).count();
    assert_eq!(count(EventKind::OffRouteDetected), 1);
    assert_eq!(count(EventKind::OffRouteVerified), 1);

    let detected = kinds.iter().position(|k| *k == EventKind::OffRouteDetected);
    let verified = kinds.iter().position(|k| *k == EventKind::OffRouteVerified);
    assert!(detected < verified);

    let state = nav.handle.current_navigation_state().expect("still navigating");
    assert!(!state.on_route);
    assert_eq!(state.off_route_status, OffRouteStatus::Verified);

    // One start request plus one reroute from the off-route position
    nav.wait_for_requests(2).await;
    let requests = nav.planner.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].origin.lat_lng, off);

    nav.shutdown().await;
}

/// A single fix just beyond the threshold followed by an on-route fix never verifies.
#[tokio::test]
async fn test_single_spike_is_debounced() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;

    nav.drive_to(LatLng::new(0.0, 0.004)).await;
    nav.drive_to(LatLng::new(0.0, 0.005).offset(0.0, 51.0)).await;
    nav.drive_to(LatLng::new(0.0, 0.006)).await;
    nav.drive_to(LatLng::new(0.0, 0.007).offset(0.0, 51.0)).await;
    nav.drive_to(LatLng::new(0.0, 0.008)).await;
    nav.settle().await;

    let kinds = nav.drain_kinds();
    assert!(kinds.contains(&EventKind::OffRouteDetected));
    assert!(!kinds.contains(&EventKind::OffRouteVerified));

    let state = nav.handle.current_navigation_state().unwrap();
    assert_eq!(state.off_route_status, OffRouteStatus::OnRoute);
    assert_eq!(nav.planner.request_count(), 1);

    nav.shutdown().await;
}

/// A successful reroute replaces the route in place.
#[tokio::test]
async fn test_reroute_replaces_route() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;

    let off = off_route_point();
    nav.planner
        .push(ScriptedResponse::route(vec![off, LatLng::new(0.0, 0.02)]));

    nav.drive_to(LatLng::new(0.0, 0.004)).await;
    let initial = nav.expect(EventKind::NavigationStateInitialized).await;
    let old_route = initial.state().unwrap().route.id();

    for _ in 0..3 {
        nav.drive_to(off).await;
    }
    nav.expect(EventKind::OffRouteVerified).await;
    nav.expect(EventKind::RouteUpdated).await;
    nav.settle().await;

    let state = nav.handle.current_navigation_state().unwrap();
    assert_ne!(state.route.id(), old_route);
    assert!(state.initialized);
    assert!(state.on_route);
    assert_eq!(state.reroute_count, 1);

    // The new route starts where the vehicle is
    let progress = state.route_progress.unwrap();
    assert!(progress.along_route_m < 1.0);

    // No second initialization for the same session
    nav.drive_to_settled(off.offset(120.0, 30.0)).await;
    assert!(!nav.drain_kinds().contains(&EventKind::NavigationStateInitialized));

    nav.shutdown().await;
}

/// Returning to the route after verification fires BackOnRoute.
#[tokio::test]
async fn test_back_on_route() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;
    nav.planner
        .push(ScriptedResponse::route(equator_line()).after(Duration::from_secs(3600)));

    nav.drive_to(LatLng::new(0.0, 0.004)).await;
    for _ in 0..3 {
        nav.drive_to(off_route_point()).await;
    }
    nav.expect(EventKind::OffRouteVerified).await;

    nav.drive_to(LatLng::new(0.0, 0.006)).await;
    nav.drive_to(LatLng::new(0.0, 0.007)).await;
    nav.expect(EventKind::BackOnRoute).await;
    nav.settle().await;

    let state = nav.handle.current_navigation_state().unwrap();
    assert!(state.on_route);

    nav.shutdown().await;
}

/// Driving against the route direction counts as off-route even on the line.
#[tokio::test]
async fn test_wrong_way_verifies() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;
    nav.planner
        .push(ScriptedResponse::route(equator_line()).after(Duration::from_secs(3600)));

    for step in [9, 8, 7, 6] {
        let fix = nav
            .fix(LatLng::new(0.0, step as f64 * 0.001))
            .with_heading(270.0)
            .with_speed(12.0);
        nav.handle.update_location(fix).await.unwrap();
    }

    nav.expect(EventKind::OffRouteVerified).await;
    nav.shutdown().await;
}
