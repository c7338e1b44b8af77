//! Navigation service implementation
//!
//! The service is an actor: it owns the [`NavigationCore`], receives
//! commands and route-request completions on one queue, and applies the
//! effects every transition returns. Clients talk to it through a
//! cloneable [`NavigationHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use routetrack_core::{Destination, Location, Route, VehicleConfig};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{NavigationError, Result};
use crate::event::{EventKind, NavigationEvent};
use crate::listener::{
    EventDispatcher, ListenerId, ListenerRegistry, ListenerTask, NavigationListener,
};
use crate::navigator::{Effect, NavigationCore, RequestTicket, RouteRequest};
use crate::planner::RoutePlanner;
use crate::state::NavigationState;

/// Commands that can be sent to the navigation service
#[derive(Debug)]
pub enum NavigationCommand {
    /// Start navigating to a destination
    StartNavigation {
        destination: Destination,
        vehicle: VehicleConfig,
        response: oneshot::Sender<Result<()>>,
    },
    /// Stop the current navigation
    StopNavigation,
    /// New fix from the location source
    UpdateLocation { location: Location },
    /// Change the vehicle profile
    SetVehicleConfig {
        vehicle: VehicleConfig,
        response: oneshot::Sender<Result<()>>,
    },
    /// Get the current state
    GetState {
        response: oneshot::Sender<Option<NavigationState>>,
    },
    /// Completion of a route request started by the service
    RouteResolved {
        ticket: RequestTicket,
        result: Result<Route>,
    },
    /// Shutdown the service
    Shutdown,
}

/// Handle for interacting with the navigation service
#[derive(Clone)]
pub struct NavigationHandle {
    command_tx: mpsc::Sender<NavigationCommand>,
    state: Arc<RwLock<Option<NavigationState>>>,
    listeners: Arc<ListenerRegistry>,
    event_tx: broadcast::Sender<NavigationEvent>,
}

impl std::fmt::Debug for NavigationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationHandle")
            .field("navigating", &self.is_navigating())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl NavigationHandle {
    /// Start navigating; any current navigation is stopped first
    pub async fn start_navigation(
        &self,
        destination: Destination,
        vehicle: VehicleConfig,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NavigationCommand::StartNavigation {
                destination,
                vehicle,
                response: tx,
            })
            .await
            .map_err(|_| NavigationError::Channel("Failed to send start command".into()))?;

        rx.await
            .map_err(|_| NavigationError::Channel("Failed to receive start response".into()))?
    }

    /// Stop the current navigation
    pub async fn stop_navigation(&self) -> Result<()> {
        self.command_tx
            .send(NavigationCommand::StopNavigation)
            .await
            .map_err(|_| NavigationError::Channel("Failed to send stop command".into()))
    }

    /// Feed a location fix
    pub async fn update_location(&self, location: Location) -> Result<()> {
        self.command_tx
            .send(NavigationCommand::UpdateLocation { location })
            .await
            .map_err(|_| NavigationError::Channel("Failed to send location update".into()))
    }

    /// Change the vehicle; triggers a new route if navigating with a different one
    pub async fn set_vehicle_config(&self, vehicle: VehicleConfig) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NavigationCommand::SetVehicleConfig {
                vehicle,
                response: tx,
            })
            .await
            .map_err(|_| NavigationError::Channel("Failed to send vehicle command".into()))?;

        rx.await
            .map_err(|_| NavigationError::Channel("Failed to receive vehicle response".into()))?
    }

    /// Get the state as seen by the actor, after all queued commands
    pub async fn navigation_state(&self) -> Result<Option<NavigationState>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NavigationCommand::GetState { response: tx })
            .await
            .map_err(|_| NavigationError::Channel("Failed to send get_state command".into()))?;

        rx.await
            .map_err(|_| NavigationError::Channel("Failed to receive state".into()))
    }

    /// Latest published state snapshot
    pub fn current_navigation_state(&self) -> Option<NavigationState> {
        self.state.read().clone()
    }

    /// Check if a route is active
    pub fn is_navigating(&self) -> bool {
        self.state.read().is_some()
    }

    /// Register a listener for one event kind
    pub fn add_listener(
        &self,
        kind: EventKind,
        listener: Arc<dyn NavigationListener>,
    ) -> ListenerId {
        self.listeners.add(kind, listener)
    }

    /// Unregister a listener, returning it
    pub fn remove_listener(&self, id: ListenerId) -> Option<Arc<dyn NavigationListener>> {
        self.listeners.remove(id)
    }

    /// Subscribe to the raw event stream
    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.event_tx.subscribe()
    }

    /// Shutdown the service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(NavigationCommand::Shutdown)
            .await
            .map_err(|_| NavigationError::Channel("Failed to send shutdown command".into()))
    }

    /// Handle wired to a bare command queue, for tests
    #[cfg(test)]
    pub(crate) fn mock() -> (Self, mpsc::Receiver<NavigationCommand>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, _) = broadcast::channel(64);
        let handle = Self {
            command_tx,
            state: Arc::new(RwLock::new(None)),
            listeners: Arc::new(ListenerRegistry::new()),
            event_tx,
        };
        (handle, command_rx)
    }
}

/// The navigation service owns the session and serializes every change to it
pub struct NavigationService {
    /// Navigation state machine
    core: NavigationCore,
    /// Route planning collaborator
    planner: Arc<dyn RoutePlanner>,
    /// Event fan-out
    dispatcher: EventDispatcher,
    /// Listener task, spawned when the service runs
    listener_task: Option<ListenerTask>,
    /// Command receiver
    command_rx: mpsc::Receiver<NavigationCommand>,
    /// Command sender (for route request tasks)
    command_tx: mpsc::Sender<NavigationCommand>,
    /// Snapshot read by handles
    state: Arc<RwLock<Option<NavigationState>>>,
    /// Route requests in flight by request id
    in_flight: HashMap<u64, JoinHandle<()>>,
}

impl NavigationService {
    /// Create a new navigation service
    pub fn new(
        config: EngineConfig,
        planner: Arc<dyn RoutePlanner>,
    ) -> Result<(Self, NavigationHandle, broadcast::Receiver<NavigationEvent>)> {
        config.validate()?;

        let listeners = Arc::new(ListenerRegistry::new());
        let (dispatcher, listener_task) =
            EventDispatcher::new(Arc::clone(&listeners), config.event_capacity);
        let event_rx = dispatcher.subscribe();
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let state = Arc::new(RwLock::new(None));

        let handle = NavigationHandle {
            command_tx: command_tx.clone(),
            state: Arc::clone(&state),
            listeners,
            event_tx: dispatcher.broadcast_sender(),
        };

        let service = Self {
            core: NavigationCore::new(config),
            planner,
            dispatcher,
            listener_task: Some(listener_task),
            command_rx,
            command_tx,
            state,
            in_flight: HashMap::new(),
        };

        Ok((service, handle, event_rx))
    }

    /// Run the service until shutdown
    pub async fn run(mut self) -> Result<()> {
        info!("Starting navigation service");

        let listener_task = self.listener_task.take().map(ListenerTask::spawn);

        let mut staleness = tokio::time::interval(self.core.config().staleness_check_interval);
        staleness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Main event loop
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                _ = staleness.tick() => {
                    let effects = self.core.check_staleness(Instant::now());
                    self.apply(effects);
                }
            }
        }

        let effects = self.core.stop_navigation();
        self.publish_state();
        self.apply(effects);
        self.cancel_requests();

        // Dropping the dispatcher lets the listener task drain and exit
        let Self { dispatcher, .. } = self;
        drop(dispatcher);
        if let Some(task) = listener_task {
            if let Err(e) = task.await {
                warn!("Listener task failed: {}", e);
            }
        }

        info!("Navigation service stopped");
        Ok(())
    }

    /// Handle a command, returns false if should shutdown
    fn handle_command(&mut self, cmd: NavigationCommand) -> bool {
        let now = Instant::now();

        let effects = match cmd {
            NavigationCommand::StartNavigation {
                destination,
                vehicle,
                response,
            } => match self.core.start_navigation(destination, vehicle, now) {
                Ok(effects) => {
                    let _ = response.send(Ok(()));
                    effects
                }
                Err(e) => {
                    warn!("Rejected start_navigation: {}", e);
                    let _ = response.send(Err(e));
                    Vec::new()
                }
            },

            NavigationCommand::StopNavigation => self.core.stop_navigation(),

            NavigationCommand::UpdateLocation { location } => {
                self.core.update_location(location, now)
            }

            NavigationCommand::SetVehicleConfig { vehicle, response } => {
                match self.core.set_vehicle_config(vehicle) {
                    Ok(effects) => {
                        let _ = response.send(Ok(()));
                        effects
                    }
                    Err(e) => {
                        warn!("Rejected vehicle config: {}", e);
                        let _ = response.send(Err(e));
                        Vec::new()
                    }
                }
            }

            NavigationCommand::GetState { response } => {
                let _ = response.send(self.core.state().cloned());
                return true;
            }

            NavigationCommand::RouteResolved { ticket, result } => {
                self.in_flight.remove(&ticket.request_id);
                self.core.route_response(ticket, result, now)
            }

            NavigationCommand::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        };

        self.publish_state();
        self.apply(effects);
        true
    }

    /// Make the core's state visible to handles before listeners hear about it
    fn publish_state(&self) {
        *self.state.write() = self.core.state().cloned();
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit(event) => self.dispatcher.publish(event),
                Effect::RequestRoute(request) => self.spawn_request(request),
                Effect::CancelRouteRequests => self.cancel_requests(),
            }
        }
    }

    fn spawn_request(&mut self, request: RouteRequest) {
        self.in_flight.retain(|_, task| !task.is_finished());

        let planner = Arc::clone(&self.planner);
        let command_tx = self.command_tx.clone();
        let timeout = self.core.config().route_request_timeout;
        let request_id = request.ticket.request_id;

        let task = tokio::spawn(async move {
            if !request.delay.is_zero() {
                tokio::time::sleep(request.delay).await;
            }

            let planned =
                planner.request_route(&request.origin, &request.destination, &request.vehicle);
            let result = match tokio::time::timeout(timeout, planned).await {
                Ok(result) => result,
                Err(_) => Err(NavigationError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                }),
            };

            let _ = command_tx
                .send(NavigationCommand::RouteResolved {
                    ticket: request.ticket,
                    result,
                })
                .await;
        });

        self.in_flight.insert(request_id, task);
    }

    fn cancel_requests(&mut self) {
        for (request_id, task) in self.in_flight.drain() {
            debug!(request = request_id, "Cancelling route request");
            task.abort();
        }
    }
}
