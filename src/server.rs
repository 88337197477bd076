//! HTTP control plane: start and stop busy-work jobs.

use crate::manager::{RegistryError, WorkloadRegistry};
use crate::models::{AddBusyRequest, AddBusyResponse};
use crate::units::{parse_human_size, SizeParseError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    InvalidRate(#[from] SizeParseError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("id {0:?} not found")]
    JobNotFound(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ServerError::InvalidRate(_) => StatusCode::BAD_REQUEST,
            ServerError::Registry(RegistryError::InvalidParallelism)
            | ServerError::Registry(RegistryError::InvalidRate) => StatusCode::BAD_REQUEST,
            ServerError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Registry(RegistryError::Id(_))
            | ServerError::Registry(RegistryError::DuplicateId(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %self, "error during handling request");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Shared application state
pub struct AppState {
    pub registry: Arc<WorkloadRegistry>,
}

// ─── Route builder ───────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/busy", post(add_busy).get(list_busy))
        .route("/busy/:id", get(get_busy).delete(delete_busy))
        .with_state(state)
}

// ─── Handlers ────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "diskbusy",
    }))
}

async fn add_busy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddBusyRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let rate = parse_human_size(&req.rate_limit)?;
    let id = state.registry.start(req.parallelism, rate).await?;
    info!(
        %id,
        rate_limit = %req.rate_limit,
        threads = req.parallelism,
        "successfully added workload"
    );
    Ok((StatusCode::CREATED, Json(AddBusyResponse { id })))
}

async fn list_busy(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.jobs().await)
}

async fn get_busy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let Some(job) = state.registry.job(&id).await else {
        return Err(ServerError::JobNotFound(id));
    };
    Ok(Json(job))
}

async fn delete_busy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    if !state.registry.stop(&id).await {
        return Err(ServerError::JobNotFound(id));
    }
    Ok(StatusCode::OK)
}

// ─── Server startup ──────────────────────────────────────────────

/// Serves the control plane on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    registry: Arc<WorkloadRegistry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(Arc::new(AppState { registry }));
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "control plane listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
