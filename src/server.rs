//! HTTP surface: layout queries, simulation control and static files

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::config::ServerConfig;
use crate::controller::{SimulationController, SimulationStatus};
use crate::error::LayoutError;
use crate::graph::LayoutSnapshot;

/// Shared state for the handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SimulationController>,
    pub stop_timeout: Duration,
}

impl AppState {
    pub fn new(controller: Arc<SimulationController>, stop_timeout: Duration) -> Self {
        Self {
            controller,
            stop_timeout,
        }
    }
}

/// Body of `POST /api/v1.0/simulation/stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    /// The stepping loop exited within the timeout
    pub stopped: bool,
    pub status: SimulationStatus,
}

/// JSON error body with an HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<LayoutError> for ApiError {
    fn from(err: LayoutError) -> Self {
        let status = match err {
            LayoutError::PreviousRunActive => StatusCode::CONFLICT,
            LayoutError::UnknownCenterTarget(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Handler for `GET /api/v1.0/get-graph-data`
pub async fn graph_data_handler(State(state): State<AppState>) -> Json<LayoutSnapshot> {
    Json(state.controller.layout())
}

/// Handler for `GET /api/v1.0/status`
pub async fn status_handler(State(state): State<AppState>) -> Json<SimulationStatus> {
    Json(state.controller.status())
}

/// Handler for `POST /api/v1.0/simulation/start`
pub async fn start_handler(
    State(state): State<AppState>,
) -> Result<Json<SimulationStatus>, ApiError> {
    state.controller.start()?;
    Ok(Json(state.controller.status()))
}

/// Handler for `POST /api/v1.0/simulation/stop`
pub async fn stop_handler(State(state): State<AppState>) -> Result<Json<StopResponse>, ApiError> {
    let controller = Arc::clone(&state.controller);
    let timeout = state.stop_timeout;
    let stopped = tokio::task::spawn_blocking(move || controller.stop(timeout))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(StopResponse {
        stopped,
        status: state.controller.status(),
    }))
}

/// Handler for `PUT /api/v1.0/center/{id}`
pub async fn set_center_handler(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<SimulationStatus>, ApiError> {
    if !state.controller.set_center_target(Some(&id)) {
        return Err(LayoutError::UnknownCenterTarget(id).into());
    }
    Ok(Json(state.controller.status()))
}

/// Handler for `DELETE /api/v1.0/center`
pub async fn clear_center_handler(State(state): State<AppState>) -> Json<SimulationStatus> {
    state.controller.set_center_target(None);
    Json(state.controller.status())
}

/// API routes, with `static_dir` served for every other path
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/v1.0/get-graph-data", get(graph_data_handler))
        .route("/api/v1.0/status", get(status_handler))
        .route("/api/v1.0/simulation/start", post(start_handler))
        .route("/api/v1.0/simulation/stop", post(stop_handler))
        .route("/api/v1.0/center/{id}", put(set_center_handler))
        .route("/api/v1.0/center", delete(clear_center_handler))
        .with_state(state);

    match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    }
}

/// Serve until Ctrl-C, then stop the simulation
pub async fn serve(
    controller: Arc<SimulationController>,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(&controller), config.stop_timeout());
    let app = router(state, config.static_dir.as_deref());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "graph server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("shutting down");
    let timeout = config.stop_timeout();
    let stopped = tokio::task::spawn_blocking(move || controller.stop(timeout)).await?;
    if !stopped {
        tracing::warn!("simulation still running at exit");
    }
    Ok(())
}
