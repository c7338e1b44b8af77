//! TestNavigator - a running navigation service driven by scripted fixes
//!
//! Wraps a [`NavigationService`] backed by a [`ScriptedPlanner`], hands out
//! fixes with strictly increasing timestamps, and waits for events with a
//! timeout so a missing event fails the test instead of hanging it.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use routetrack_core::{Destination, LatLng, Location, VehicleConfig};
use routetrack_engine::{
    EngineConfig, EventKind, NavigationEvent, NavigationHandle, NavigationService, Result,
    ScriptedPlanner, ScriptedResponse,
};

/// Default wait for an expected event
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Straight route east along the equator, about 2.2 km
pub fn equator_line() -> Vec<LatLng> {
    vec![
        LatLng::new(0.0, 0.0),
        LatLng::new(0.0, 0.01),
        LatLng::new(0.0, 0.02),
    ]
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("routetrack_engine=debug")
        .with_test_writer()
        .try_init();
}

/// A spawned service plus everything needed to drive it
pub struct TestNavigator {
    pub handle: NavigationHandle,
    pub events: broadcast::Receiver<NavigationEvent>,
    pub planner: Arc<ScriptedPlanner>,
    task: JoinHandle<Result<()>>,
    clock: DateTime<Utc>,
}

impl TestNavigator {
    /// Spawn with the default configuration
    pub fn spawn() -> Self {
        Self::spawn_with(EngineConfig::default())
    }

    pub fn spawn_with(config: EngineConfig) -> Self {
        init_tracing();

        let planner = Arc::new(ScriptedPlanner::new());
        let (service, handle, events) = NavigationService::new(config, planner.clone())
            .expect("Failed to create navigation service");
        let task = tokio::spawn(service.run());

        Self {
            handle,
            events,
            planner,
            task,
            clock: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .expect("valid timestamp")
                .with_timezone(&Utc),
        }
    }

    /// Fix one second after the previous one, travelling at 10 m/s
    pub fn fix(&mut self, position: LatLng) -> Location {
        self.clock += ChronoDuration::seconds(1);
        Location::new(position, self.clock).with_speed(10.0)
    }

    /// Send a fix at `position`
    pub async fn drive_to(&mut self, position: LatLng) {
        let fix = self.fix(position);
        self.handle
            .update_location(fix)
            .await
            .expect("Failed to send location");
    }

    /// Send a fix and wait until the service has processed it
    pub async fn drive_to_settled(&mut self, position: LatLng) {
        self.drive_to(position).await;
        self.settle().await;
    }

    /// Wait until every command sent so far has been processed
    pub async fn settle(&self) {
        self.handle
            .navigation_state()
            .await
            .expect("Failed to query state");
    }

    /// Queue the route for the next request, send a first fix and start
    pub async fn start_on(&mut self, points: Vec<LatLng>) {
        self.planner.push(ScriptedResponse::route(points.clone()));
        self.drive_to(points[0]).await;
        self.handle
            .start_navigation(
                Destination::from_lat_lng(points[points.len() - 1]),
                VehicleConfig::Car,
            )
            .await
            .expect("Failed to start navigation");
        self.expect(EventKind::NavigationStarted).await;
    }

    /// Wait for the next event of `kind`, skipping others
    pub async fn expect(&mut self, kind: EventKind) -> NavigationEvent {
        self.expect_within(kind, EVENT_TIMEOUT).await
    }

    pub async fn expect_within(&mut self, kind: EventKind, limit: Duration) -> NavigationEvent {
        let events = &mut self.events;
        timeout(limit, async {
            loop {
                match events.recv().await {
                    Ok(event) if event.kind() == kind => return event,
                    Ok(_) => continue,
                    Err(e) => panic!("Event stream failed while waiting for {kind}: {e}"),
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {kind}"))
    }

    /// Wait until the planner has seen at least `count` requests
    pub async fn wait_for_requests(&self, count: usize) {
        let planner = &self.planner;
        timeout(EVENT_TIMEOUT, async {
            while planner.request_count() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {count} route requests"));
    }

    /// Every event already published, in order
    pub fn drain(&mut self) -> Vec<NavigationEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(n)) => panic!("Event stream lagged by {n}"),
            }
        }
        drained
    }

    /// Kinds of every already published event
    pub fn drain_kinds(&mut self) -> Vec<EventKind> {
        self.drain().iter().map(NavigationEvent::kind).collect()
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await.expect("Failed to send shutdown");
        self.task
            .await
            .expect("Service task panicked")
            .expect("Service returned an error");
    }
}
