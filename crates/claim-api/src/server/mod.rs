use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use claim_core::{ClaimEngine, EngineError, EngineEvent};
use contracts::{
    ApiError, ErrorCode, HeatmapEntry, Identity, LogEntry, LootClaim, NewPlayer, NewSpot,
    Position, PresenceSnapshot, Route, Spot, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{bearer_token, CredentialService, EngineApi, PlayerIdCredentials};

include!("error.rs");
include!("state.rs");
include!("routes/players.rs");
include!("routes/spots.rs");
include!("routes/tracking.rs");
include!("routes/stream.rs");
include!("util.rs");

/// Serves the HTTP and WebSocket surface until ctrl-c, then writes a final
/// checkpoint when a store is attached.
pub async fn serve(addr: SocketAddr, api: EngineApi) -> Result<(), ServerError> {
    let state = AppState::new(api.clone());
    let worker = api.spawn_persistence_worker();

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, store = api.has_store(), "claim server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(worker) = worker {
        worker.abort();
    }
    let final_flush = api.clone();
    let flushed =
        tokio::task::spawn_blocking(move || final_flush.flush_persistence_if_enabled()).await;
    if let Err(err) = flushed {
        warn!(error = %err, "final checkpoint task panicked");
    }
    info!("claim server stopped");

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/players/register", post(register_player))
        .route("/players/{player_id}", get(get_player))
        .route("/players/{player_id}/position", post(update_position))
        .route("/players/{player_id}/loot", post(credit_loot))
        .route("/players/{player_id}/routes", get(list_player_routes))
        .route("/live-players", get(live_players))
        .route("/spots", get(list_spots).post(create_spot))
        .route("/spots/{spot_id}/logs", post(manual_log))
        .route("/spots/{spot_id}/auto-log", post(auto_log))
        .route("/logs", get(list_logs))
        .route("/heatmap/{player_id}", get(get_heatmap))
        .route("/tracking/start", post(start_route))
        .route("/tracking/{route_id}", get(get_route))
        .route("/tracking/{route_id}/point", post(append_route_point))
        .route("/tracking/{route_id}/stop", post(stop_route))
        .route("/stream", get(stream_events))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c; shutting down");
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    schema_version: String,
    status: &'static str,
    time: DateTime<Utc>,
    persistence_error: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        status: "ok",
        time: state.engine().now(),
        persistence_error: state.api.last_persistence_error(),
    })
}
