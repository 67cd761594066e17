//! Watch Room Service
//!
//! WebSocket server for synchronized video watching rooms.
//!
//! # Servers
//!
//! - HTTP/WebSocket server for clients (default: 0.0.0.0:3001)
//! - HTTP server for health and metrics endpoints (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Start the room registry actor
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Start the client server, then mark ready
//! 7. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use room_service::actors::{ActorMetrics, RegistryConfig, RoomRegistryHandle};
use room_service::config::Config;
use room_service::dispatch::Dispatcher;
use room_service::observability::{health_router, init_metrics_recorder, HealthState};
use room_service::session::SessionTable;
use room_service::transport::{self, TransportState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(config.log_json);

    info!("Starting Watch Room Service");
    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        allowed_origins = ?config.allowed_origins,
        max_rooms = config.max_rooms,
        max_members = config.room_limits.max_members,
        outbound_buffer = config.outbound_buffer,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::anyhow!(e)
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    let actor_metrics = ActorMetrics::new();
    let registry = RoomRegistryHandle::new(RegistryConfig::from(&config), Arc::clone(&actor_metrics));
    let dispatcher = Dispatcher::new(registry.clone(), Arc::new(SessionTable::new()));
    info!("Room registry started");

    // Servers and connections stop when the registry is cancelled
    let shutdown_token = registry.child_token();

    let health_addr: SocketAddr = config
        .health_bind_address
        .parse()
        .with_context(|| format!("Invalid health bind address: {}", config.health_bind_address))?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    // Bind listeners BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("Failed to bind health server to {health_addr}"))?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    let client_addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;

    let transport_state = Arc::new(TransportState::new(
        &config,
        dispatcher,
        Arc::clone(&actor_metrics),
        shutdown_token.child_token(),
    ));
    let client_app = transport::router(transport_state);

    let client_listener = tokio::net::TcpListener::bind(client_addr)
        .await
        .with_context(|| format!("Failed to bind client server to {client_addr}"))?;
    info!(addr = %client_addr, "Client server bound successfully");

    let client_shutdown_token = shutdown_token.child_token();
    let client_server = tokio::spawn(async move {
        let server = axum::serve(client_listener, client_app).with_graceful_shutdown(async move {
            client_shutdown_token.cancelled().await;
            info!("Client server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Client server failed");
        }
    });

    health_state.set_ready();
    info!("Watch Room Service running - press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Refuse new rooms and close open ones; cancels every child token
    if let Err(e) = registry.shutdown(config.shutdown_deadline).await {
        warn!(error = %e, "Room registry shutdown error");
    }
    shutdown_token.cancel();

    if tokio::time::timeout(config.shutdown_deadline, client_server)
        .await
        .is_err()
    {
        warn!("Client server did not stop before the shutdown deadline");
    }

    info!("Watch Room Service shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "room_service=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; without them the service
/// cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
