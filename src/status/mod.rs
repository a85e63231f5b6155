//! Status server
//!
//! Small HTTP surface next to the reconciliation loop:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health/live` | liveness probe, 503 when the loop stalled |
//! | `GET /health` | loop state and pass progress |
//! | `GET /metrics` | Prometheus text exposition |
//! | `POST /events/server-created` | hand a newly joined server to the loop |

pub mod health;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::manager::{ReconciliationScheduler, ServerEvent};
use crate::metrics;
use crate::models::Group;

pub use health::{create_health_router, HealthStatus};

/// Status server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind status server: {0}")]
    BindError(String),

    #[error("Status server failed: {0}")]
    ServeError(String),
}

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Reconciliation scheduler
    pub scheduler: Arc<ReconciliationScheduler>,

    /// Channel into the scheduler's event loop
    pub events: mpsc::Sender<ServerEvent>,

    /// Time without progress before the loop counts as dead
    pub liveness_threshold: chrono::Duration,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        scheduler: Arc<ReconciliationScheduler>,
        events: mpsc::Sender<ServerEvent>,
        liveness_threshold: chrono::Duration,
    ) -> Self {
        Self {
            scheduler,
            events,
            liveness_threshold,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/events/server-created", post(server_created))
        .with_state(state.clone())
        .merge(create_health_router(state))
        .layer(TraceLayer::new_for_http())
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}"),
        ),
    }
}

async fn server_created(State(state): State<AppState>, Json(group): Json<Group>) -> StatusCode {
    let server_id = group.id.clone();
    match state.events.try_send(ServerEvent::Created(group)) {
        Ok(()) => {
            tracing::debug!(server_id = %server_id, "Queued new server event");
            StatusCode::ACCEPTED
        }
        Err(e) => {
            tracing::warn!(server_id = %server_id, error = %e, "Dropping new server event");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Serve the status router until `shutdown_signal` resolves
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let router = create_router(state);

    tracing::info!("Starting status server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::BindError(e.to_string()))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServerError::ServeError(e.to_string()))?;

    tracing::info!("Status server shutdown complete");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
