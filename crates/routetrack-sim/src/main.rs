//! Routetrack Sim - drives the navigation engine with a simulated GPS track
//!
//! The simulated vehicle follows whatever route the engine currently
//! holds, with optional GPS noise and an induced detour that forces an
//! off-route verification and a reroute. Every engine event is logged.

mod track;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use routetrack_core::{Destination, LatLng, Location, TruckConfig, VehicleConfig};
use routetrack_engine::{
    DirectPlanner, EngineConfig, EventKind, NavigationEvent, NavigationHandle, NavigationService,
    RouteShape,
};

use track::SimulatedVehicle;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Vehicle {
    Car,
    Truck,
    Motorbike,
}

impl From<Vehicle> for VehicleConfig {
    fn from(vehicle: Vehicle) -> Self {
        match vehicle {
            Vehicle::Car => VehicleConfig::Car,
            Vehicle::Truck => VehicleConfig::Truck(TruckConfig::default()),
            Vehicle::Motorbike => VehicleConfig::Motorbike,
        }
    }
}

#[derive(Parser)]
#[command(name = "routetrack-sim")]
#[command(about = "Simulated drive through the routetrack navigation engine")]
struct Args {
    /// Start position as "lat,lon"
    #[arg(long, default_value = "48.2082,16.3738", value_parser = parse_lat_lng)]
    start: LatLng,

    /// Destination as "lat,lon"
    #[arg(long, short, default_value = "48.2150,16.3900", value_parser = parse_lat_lng)]
    destination: LatLng,

    /// Vehicle profile
    #[arg(long, value_enum, default_value = "car")]
    vehicle: Vehicle,

    /// Cruise speed in m/s
    #[arg(long, default_value_t = 13.9)]
    speed: f64,

    /// GPS noise radius in meters
    #[arg(long, default_value_t = 3.0)]
    noise: f64,

    /// Leave the route partway to force a reroute
    #[arg(long)]
    detour: bool,

    /// Wall-clock delay between fixes in milliseconds (each fix is one simulated second)
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Random seed for reproducible noise
    #[arg(long)]
    seed: Option<u64>,

    /// Engine configuration file (JSON)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

fn parse_lat_lng(s: &str) -> Result<LatLng, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lon\", got {s:?}"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("longitude: {e}"))?;
    LatLng::checked(lat, lon).map_err(|e| e.to_string())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = EngineConfig::from_json(&json)
                .with_context(|| format!("parsing {}", path.display()))?;
            info!("Loaded engine config from {}", path.display());
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn log_event(event: &NavigationEvent) {
    match event {
        NavigationEvent::NavigationStarted { destination } => {
            info!("Navigation started to {}", destination)
        }
        NavigationEvent::NavigationStopped { session } => info!("Navigation {} stopped", session),
        NavigationEvent::NavigationStateInitialized { state } => {
            info!("Session {} initialized", state.session)
        }
        NavigationEvent::NavigationStateUpdated { state } => {
            if let Some(progress) = &state.route_progress {
                let next = progress
                    .next_milestone
                    .map(|m| m.turn_command.name())
                    .unwrap_or("-");
                info!(
                    "{:>7.0} m left, eta {:>4}s, next {} in {:.0} m{}",
                    progress.remaining_distance_m,
                    progress.remaining_travel_time.as_secs(),
                    next,
                    progress.next_milestone_distance_m.unwrap_or(0.0),
                    if state.on_route { "" } else { " [off route]" }
                );
            }
        }
        NavigationEvent::DestinationReached { result } => info!(
            "Arrived at {} after {} reroute(s)",
            result.destination, result.reroute_count
        ),
        NavigationEvent::LeavingDestination { destination } => {
            info!("Leaving {}", destination)
        }
        NavigationEvent::RouteUpdated { route } => info!(
            "Route updated: {:.0} m, {} waypoints",
            route.total_length_m(),
            route.waypoints().len()
        ),
        NavigationEvent::RouteRequestFailed { error } => {
            warn!("Route request failed: {} ({})", error, error.error_code())
        }
        NavigationEvent::OffRouteDetected { deviation_m } => {
            info!("Off route? deviation {:.0} m", deviation_m)
        }
        NavigationEvent::OffRouteVerified { deviation_m } => {
            warn!("Off route, deviation {:.0} m, rerouting", deviation_m)
        }
        NavigationEvent::BackOnRoute => info!("Back on route"),
        NavigationEvent::LocationUnavailable { stale_ms } => {
            warn!("No location for {} ms", stale_ms)
        }
    }
}

async fn wait_for_start(
    events: &mut tokio::sync::broadcast::Receiver<NavigationEvent>,
) -> anyhow::Result<()> {
    loop {
        match events.recv().await? {
            NavigationEvent::NavigationStarted { .. } => return Ok(()),
            NavigationEvent::RouteRequestFailed { error } => {
                bail!("could not plan a route: {}", error)
            }
            _ => {}
        }
    }
}

async fn send_fix(
    handle: &NavigationHandle,
    position: LatLng,
    at: DateTime<Utc>,
    vehicle: &SimulatedVehicle,
) -> anyhow::Result<()> {
    let fix = Location::new(position, at)
        .with_speed(vehicle.speed_mps())
        .with_heading(vehicle.heading())
        .with_accuracy(vehicle.noise_m().max(1.0))
        .with_provider("sim");
    handle.update_location(fix).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(args.config.as_ref())?;
    let vehicle_config: VehicleConfig = args.vehicle.into();
    info!(
        "Simulating {} drive from {} to {}",
        vehicle_config.profile_name(),
        args.start,
        args.destination
    );

    let planner = Arc::new(DirectPlanner::new().with_shape(RouteShape::Grid));
    let (service, handle, mut events) = NavigationService::new(config, planner)?;
    let service_task = tokio::spawn(service.run());

    // Log every event from the raw stream
    let mut log_rx = handle.subscribe();
    let logger = tokio::spawn(async move {
        while let Ok(event) = log_rx.recv().await {
            log_event(&event);
        }
    });

    let arrived = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let arrived_flag = Arc::clone(&arrived);
    handle.add_listener(
        EventKind::DestinationReached,
        Arc::new(move |_: &NavigationEvent| {
            arrived_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }),
    );

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut vehicle = SimulatedVehicle::new(args.start, args.speed, args.noise, args.detour, rng);
    let mut clock = Utc::now();
    let interval = Duration::from_millis(args.interval_ms);

    send_fix(&handle, vehicle.observed_position(), clock, &vehicle).await?;
    handle
        .start_navigation(
            Destination::from_lat_lng(args.destination).with_label("destination"),
            vehicle_config,
        )
        .await?;
    wait_for_start(&mut events).await?;

    // Generous bound so a misbehaving run still terminates
    let max_steps = 20_000;
    let mut steps = 0;
    while !arrived.load(std::sync::atomic::Ordering::SeqCst) {
        steps += 1;
        if steps > max_steps {
            bail!("gave up after {} simulated seconds", max_steps);
        }

        if let Some(state) = handle.current_navigation_state() {
            vehicle.follow(&state.route);
        }
        vehicle.step(1.0);
        clock += chrono::Duration::seconds(1);
        send_fix(&handle, vehicle.observed_position(), clock, &vehicle).await?;
        tokio::time::sleep(interval).await;
    }

    // Drive on past the destination
    for _ in 0..10 {
        vehicle.coast(1.0);
        clock += chrono::Duration::seconds(1);
        send_fix(&handle, vehicle.observed_position(), clock, &vehicle).await?;
        tokio::time::sleep(interval).await;
    }

    handle.shutdown().await?;
    service_task.await??;
    logger.abort();

    info!("Simulation finished after {} s of driving", steps);
    Ok(())
}
