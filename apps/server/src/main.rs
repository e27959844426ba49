use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use partyline_config::load as load_config;
use partyline_relay::{MemoryGateway, MessageRelay, RoomRegistry};

mod state;
mod ws;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("starting Partyline delivery server");

    let config = load_config().context("failed to load configuration")?;

    // The durable store is an external collaborator; the in-memory gateway
    // stands in for it until one is wired up.
    let registry = Arc::new(RoomRegistry::new());
    let gateway = Arc::new(MemoryGateway::new());
    let relay = Arc::new(
        MessageRelay::new(registry.clone(), gateway)
            .with_save_timeout(Duration::from_millis(config.delivery.save_timeout_ms)),
    );

    let state = AppState::new(relay, registry, config.delivery.outbound_buffer);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::websocket_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(state);

    let addr = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = ?err, "failed to listen for shutdown signal");
    }
}
