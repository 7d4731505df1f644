#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # devbridge
//!
//! Browser-to-device control relay. devbridge exposes a WebSocket on which a
//! browser client drives two managed devices — an Android emulator (over its
//! gRPC control endpoint) and a Linux desktop container (input injected over
//! `docker exec`, display viewed through noVNC) — and receives the emulator's
//! screen as a stream of binary frames.
//!
//! ## API surface
//!
//! | Method | Path                  | Description                         |
//! |--------|-----------------------|-------------------------------------|
//! | GET    | `/api/status`         | Device states and relay vitals      |
//! | POST   | `/api/emulator/start` | Start the emulator                  |
//! | POST   | `/api/emulator/stop`  | Stop the emulator                   |
//! | POST   | `/api/linux/start`    | Start the desktop container         |
//! | POST   | `/api/linux/stop`     | Stop the desktop container          |
//! | POST   | `/api/linux/reset`    | Restart the desktop container       |
//! | GET    | `/ws`                 | WebSocket relay (frames + input)    |
//! | GET    | `/*`                  | Static dashboard assets             |
//!
//! ## Architecture
//!
//! ```text
//! main.rs        — entry point, clap, router setup, graceful shutdown
//! config.rs      — TOML + env-var configuration
//! state.rs       — AppState, client registry, device state types
//! device/
//!   proto.rs     — emulator controller wire types
//!   emulator.rs  — dual-channel gRPC client (stream + input)
//! command.rs     — persistent input shells, one-shot output capture
//! keymap.rs      — browser key events → adb / xdotool command lines
//! gesture/
//!   scroll.rs    — wheel deltas → single-finger drag
//!   pinch.rs     — zoom deltas → two-finger spread, race-safe setup
//! stream.rs      — per-client frame pump (backpressure, rate cap)
//! reconnect.rs   — transport recovery with doubling backoff
//! lifecycle.rs   — device start/stop/reset, readiness probing
//! routes/        — REST handlers (status, lifecycle)
//! ws/            — WebSocket relay (session loop, pure dispatch)
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use devbridge::command::CommandChannel;
use devbridge::device::{Dimensions, EmulatorChannel};
use devbridge::lifecycle::{DeviceLifecycle, Probe};
use devbridge::reconnect::Reconnector;
use devbridge::state::ClientRegistry;
use devbridge::{routes, ws, AppState, Config};

/// Browser-to-device control relay.
#[derive(Parser)]
#[command(name = "devbridge", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = match cli.command {
        Some(Commands::Serve { config }) => config,
        None => None,
    };
    run_server(config_path.as_deref()).await;
}

#[allow(clippy::too_many_lines)]
async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("devbridge v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Emulator gRPC endpoint: {}", config.emulator.grpc_addr);
    info!("Desktop container: {}", config.linux.container);
    info!("Listening on {}", config.server.listen);

    let channel = EmulatorChannel::connect(&config.emulator.grpc_addr)
        .expect("Invalid emulator gRPC address");
    let channel = Arc::new(RwLock::new(Arc::new(channel)));
    let dims = Arc::new(RwLock::new(Dimensions::default()));

    let (status_events, _) = broadcast::channel(64);

    let emulator = Arc::new(DeviceLifecycle::new(
        "emulator",
        status_events.clone(),
        config.emulator.start_command.clone(),
        config.emulator.stop_command.clone(),
        String::new(),
        Probe::Emulator {
            channel: channel.clone(),
            dims: dims.clone(),
        },
    ));
    let linux = Arc::new(DeviceLifecycle::new(
        "desktop container",
        status_events.clone(),
        config.linux.start_command.clone(),
        config.linux.stop_command.clone(),
        config.linux.reset_command.clone(),
        Probe::Command(config.linux.probe_command.clone()),
    ));

    let adb = Arc::new(CommandChannel::new(
        "adb",
        config.emulator.adb_path.clone(),
        vec!["shell".to_string()],
    ));
    let linux_shell = Arc::new(CommandChannel::new(
        "container",
        "docker".to_string(),
        vec![
            "exec".to_string(),
            "-i".to_string(),
            config.linux.container.clone(),
            "/bin/sh".to_string(),
        ],
    ));

    let (failure_tx, failure_rx) = mpsc::channel(32);

    let state = AppState {
        config: Arc::new(config),
        start_time: Instant::now(),
        channel: channel.clone(),
        dims: dims.clone(),
        clients: Arc::new(ClientRegistry::default()),
        emulator: emulator.clone(),
        linux: linux.clone(),
        adb: adb.clone(),
        linux_shell: linux_shell.clone(),
        status_events,
        failure_tx: failure_tx.clone(),
    };

    let _reconnector_task = Reconnector {
        channel,
        dims,
        clients: state.clients.clone(),
        emulator: emulator.clone(),
        grpc_addr: state.config.emulator.grpc_addr.clone(),
        stream: state.config.stream,
        reconnect: state.config.reconnect,
        failure_tx,
    }
    .spawn(failure_rx);

    // Adopt devices that are already up from a previous run.
    tokio::spawn(async move {
        if emulator.probe_once().await {
            info!("Emulator already running, adopting");
            emulator.adopt_running().await;
            adb.prewarm().await;
        }
        if linux.probe_once().await {
            info!("Desktop container already running, adopting");
            linux.adopt_running().await;
            linux_shell.prewarm().await;
        }
    });

    let api_routes = Router::new()
        .route("/api/status", get(routes::status::get_status))
        .route("/api/emulator/start", post(routes::lifecycle::emulator_start))
        .route("/api/emulator/stop", post(routes::lifecycle::emulator_stop))
        .route("/api/linux/start", post(routes::lifecycle::linux_start))
        .route("/api/linux/stop", post(routes::lifecycle::linux_stop))
        .route("/api/linux/reset", post(routes::lifecycle::linux_reset))
        .layer(CorsLayer::permissive());

    let app = Router::new()
        .merge(api_routes)
        .route("/ws", get(ws::ws_upgrade))
        .fallback_service(ServeDir::new(&state.config.server.public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .expect("Failed to bind");

    info!("Server ready");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    info!("devbridge stopped");
}
