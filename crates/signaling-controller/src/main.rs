//! Signaling Controller
//!
//! Stateful WebSocket signaling server for real-time consultation rooms.
//!
//! # Servers
//!
//! One listener serves everything:
//! - `GET /ws` - client signaling WebSocket
//! - `POST /rooms`, `GET /rooms/{id}`, `GET /stats` - administrative surface
//! - `GET /health`, `GET /ready`, `GET /metrics` - probes and metrics
//!
//! # Startup Flow
//!
//! 1. Initialize tracing from the environment
//! 2. Load configuration from environment variables
//! 3. Install the Prometheus metrics recorder
//! 4. Connect to Redis if configured (failure degrades to in-memory only)
//! 5. Construct registry, store, router and lifecycle manager
//! 6. Spawn the janitor sweep task
//! 7. Serve HTTP/WebSocket traffic
//! 8. Wait for shutdown signal; drain via the cancellation-token hierarchy

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use common::secret::ExposeSecret;
use metrics_exporter_prometheus::PrometheusBuilder;
use signaling_controller::auth::JwtVerifier;
use signaling_controller::config::Config;
use signaling_controller::http::app_router;
use signaling_controller::lifecycle::RoomLifecycleManager;
use signaling_controller::observability::{health_router, CoreStats, HealthState};
use signaling_controller::registry::ConnectionRegistry;
use signaling_controller::router::SignalingRouter;
use signaling_controller::state::AppState;
use signaling_controller::store::{RoomPersistence, RoomStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long shutdown waits for in-flight work after cancelling.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signaling_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Signaling Controller");

    let config = Config::from_env()
        .inspect_err(|e| error!("Failed to load configuration: {e}"))
        .context("configuration")?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        max_participants = config.max_participants,
        room_retention_seconds = config.room_retention.as_secs(),
        sweep_interval_seconds = config.sweep_interval.as_secs(),
        idle_timeout_seconds = config.idle_timeout.as_secs(),
        durable_store = config.redis_url.is_some(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    let health_state = Arc::new(HealthState::new());

    // Durable store is optional; unavailability degrades to in-memory-only
    // operation rather than failing startup.
    let persistence = match config.redis_url.as_ref() {
        Some(url) => match RoomPersistence::connect(url.expose_secret()).await {
            Ok(persistence) => {
                info!("Redis connection established");
                Some(persistence)
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, continuing in-memory only");
                None
            }
        },
        None => {
            info!("No durable store configured, running in-memory only");
            None
        }
    };

    let shutdown_token = CancellationToken::new();

    let stats = Arc::new(CoreStats::new());
    let store = Arc::new(RoomStore::new(
        config.max_participants,
        config.room_retention,
        persistence,
    ));
    let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&stats)));
    let signal_router = Arc::new(SignalingRouter::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&stats),
    ));
    let lifecycle = Arc::new(RoomLifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&stats),
        config.ended_grace,
        shutdown_token.child_token(),
    ));

    let janitor = lifecycle.spawn_janitor(config.sweep_interval, config.room_retention);
    info!("Janitor task started");

    let state = AppState {
        store,
        registry,
        router: signal_router,
        lifecycle,
        verifier: Arc::new(JwtVerifier::new(config.token_secret.clone())),
        stats,
        idle_timeout: config.idle_timeout,
        admin_roles: Arc::new(config.admin_roles.clone()),
        shutdown: shutdown_token.clone(),
    };

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = app_router(state)
        .merge(health_router(Arc::clone(&health_state)))
        .merge(metrics_router)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address))?;

    // Bind before spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listener to {addr}"))?;
    info!(addr = %addr, "Listener bound successfully");

    let server_token = shutdown_token.child_token();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_token.cancelled().await;
        info!("Server shutting down");
    });

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!(error = %e, "Server failed");
        }
    });

    health_state.set_ready();
    info!("Signaling Controller running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Stop advertising readiness first so the load balancer drains us
    health_state.set_not_ready();

    shutdown_token.cancel();
    tokio::time::sleep(SHUTDOWN_DRAIN).await;

    janitor.abort();

    info!("Signaling Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; without them the service
/// could never shut down gracefully.
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
