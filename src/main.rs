mod config;
mod drive_model;
mod net;
mod physics;
mod state;
mod telemetry;
mod vehicle;

use crate::config::{VehicleConfig, DEFAULT_CONFIG_PATH};
use crate::net::start_websocket_server;
use crate::physics::PhysicsWorld;
use crate::state::SharedGameState;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9001";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config_path = std::env::var("VEHICLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match VehicleConfig::load(&config_path) {
        Ok(c) => c,
        Err(err) => {
            error!(path = %config_path.display(), %err, "invalid vehicle configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(
        path = %config_path.display(),
        wheels = config.wheels.len(),
        gears = config.drivetrain.gear_ratios.len(),
        tick_hz = config.tick_hz,
        "vehicle configuration loaded"
    );

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    let dt = config.fixed_dt();
    let config = Arc::new(config);
    let state = Arc::new(Mutex::new(SharedGameState::new()));
    let physics = Arc::new(Mutex::new(PhysicsWorld::new()));

    tokio::spawn(start_websocket_server(
        listener,
        Arc::clone(&state),
        Arc::clone(&physics),
        Arc::clone(&config),
    ));

    // Fixed timestep from the vehicle file
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut phys = physics.lock().await;
        let mut game = state.lock().await;

        // Latest input per player; shift presses are consumed here
        for (id, input) in game.take_inputs() {
            phys.set_input(&id, input);
        }

        // Step physics
        phys.step(dt);

        // Advance tick + broadcast snapshot
        game.tick += 1;
        game.broadcast_snapshot(&phys);
    }
}
