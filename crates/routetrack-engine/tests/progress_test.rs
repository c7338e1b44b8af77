//! Route Progress Integration Tests
//!
//! Drives a running navigation service along a straight route:
//! - Projection and remaining distance at the route midpoint
//! - Remaining distance shrinking as the vehicle advances
//! - Arrival, automatic stop and leaving the destination

mod helpers;

use helpers::navigator::equator_line;
use helpers::TestNavigator;
use routetrack_core::{LatLng, TurnCommand};
use routetrack_engine::{EventKind, NavigationEvent};

/// Vehicle halfway along the first segment of a three-point line.
///
/// Setup:
/// - Route (0,0) -> (0,0.01) -> (0,0.02)
/// - Fix at (0,0.005), 5 m/s
/// - Expect projection onto (0,0.005), ~556 m covered, arrival as next milestone
#[tokio::test]
async fn test_midpoint_projection() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;

    let fix = nav
        .fix(LatLng::new(0.0, 0.005))
        .with_heading(0.0)
        .with_speed(5.0);
    nav.handle.update_location(fix).await.unwrap();

    let event = nav.expect(EventKind::NavigationStateInitialized).await;
    let state = event.state().expect("state event");
    let progress = state.route_progress.as_ref().expect("progress after first fix");

    assert!((progress.current_location_on_route.projected.longitude - 0.005).abs() < 1e-9);
    assert!((progress.along_route_m - 556.0).abs() < 2.0);
    assert!((progress.remaining_distance_m - (state.route.total_length_m() - 556.0)).abs() < 2.0);
    assert_eq!(
        progress.next_milestone.map(|m| m.turn_command),
        Some(TurnCommand::Arrive)
    );
    assert!(state.on_route);

    nav.shutdown().await;
}

/// Remaining distance strictly decreases on a noise-free forward drive.
#[tokio::test]
async fn test_remaining_distance_decreases() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;

    for step in 1..=15 {
        nav.drive_to(LatLng::new(0.0, step as f64 * 0.001)).await;
    }
    nav.settle().await;

    let remaining: Vec<f64> = nav
        .drain()
        .iter()
        .filter(|e| e.kind() == EventKind::NavigationStateUpdated)
        .filter_map(|e| e.state()?.remaining_distance_m())
        .collect();

    assert_eq!(remaining.len(), 15);
    for pair in remaining.windows(2) {
        assert!(pair[1] < pair[0], "{} is not below {}", pair[1], pair[0]);
    }

    nav.shutdown().await;
}

/// Reaching the end stops navigation, then moving away fires LeavingDestination.
#[tokio::test]
async fn test_arrival_and_leaving() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;

    nav.drive_to(LatLng::new(0.0, 0.01)).await;
    nav.drive_to(LatLng::new(0.0, 0.0199)).await;

    let event = nav.expect(EventKind::DestinationReached).await;
    match event {
        NavigationEvent::DestinationReached { result } => {
            assert!(result.final_progress.remaining_distance_m <= 25.0);
            assert_eq!(result.reroute_count, 0);
        }
        other => panic!("Expected DestinationReached, got {:?}", other.kind()),
    }
    nav.expect(EventKind::NavigationStopped).await;
    assert!(!nav.handle.is_navigating());

    nav.drive_to(LatLng::new(0.0, 0.02).offset(90.0, 120.0)).await;
    nav.expect(EventKind::LeavingDestination).await;

    nav.shutdown().await;
}

/// Progress snapshots handed out are copies, not live state.
#[tokio::test]
async fn test_snapshot_is_detached() {
    let mut nav = TestNavigator::spawn();
    nav.start_on(equator_line()).await;

    nav.drive_to_settled(LatLng::new(0.0, 0.002)).await;
    let before = nav.handle.current_navigation_state().expect("navigating");

    nav.drive_to_settled(LatLng::new(0.0, 0.008)).await;
    let after = nav.handle.current_navigation_state().expect("navigating");

    assert!(before.remaining_distance_m() > after.remaining_distance_m());
    assert_eq!(before.route.id(), after.route.id());

    nav.shutdown().await;
}
