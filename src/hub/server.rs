//! Router assembly and the bound listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthVerifier;
use crate::breaker::CircuitBreaker;
use crate::core::constants::WS_UPGRADE_PATH;
use crate::core::shutdown::ShutdownService;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomEngine;
use crate::router::Dispatcher;
use crate::supervisor::Supervisor;

use super::ws;

/// Everything the WebSocket handler needs, cheap to clone (all fields are
/// `Arc`s or copy types) the way axum's `State` extractor expects.
#[derive(Clone)]
pub struct HubState {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<AuthVerifier>,
    pub rooms: Arc<RoomEngine>,
    pub breaker: Arc<CircuitBreaker>,
    pub supervisor: Arc<Supervisor>,
    pub shutdown: ShutdownService,
    pub bucket_capacity: u32,
    pub bucket_refill_per_sec: f64,
    pub max_payload_bytes: usize,
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
}

pub fn build_router(state: HubState) -> Router {
    Router::new()
        .route(WS_UPGRADE_PATH, get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the state's `ShutdownService` is triggered.
pub async fn serve(state: HubState, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, path = WS_UPGRADE_PATH, "hub listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.wait())
        .await
        .context("server error")?;

    Ok(())
}
