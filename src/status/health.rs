//! Health check endpoints
//!
//! - `/health/live`: fails once the reconciliation loop stopped making
//!   progress for longer than the liveness threshold
//! - `/health`: loop state and pass progress
//!
//! ```yaml
//! livenessProbe:
//!   httpGet:
//!     path: /health/live
//!     port: 8080
//!   periodSeconds: 30
//! ```

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use super::AppState;
use crate::manager::LoopState;

// ============================================================================
// Health Status Types
// ============================================================================

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Liveness probe response
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: HealthStatus,
    pub last_progress: String,
    pub stalled_secs: i64,
    pub timestamp: String,
}

/// Pass progress
#[derive(Debug, Serialize)]
pub struct PassProgress {
    pub generation: u64,
    pub position: usize,
    pub size: usize,
}

/// Comprehensive health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub state: LoopState,
    pub pass: PassProgress,
    pub last_progress: String,
    pub uptime_secs: u64,
    pub timestamp: String,
}

// ============================================================================
// Health Check Router
// ============================================================================

/// Create health check router
pub fn create_health_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(liveness_probe))
        .route("/health", get(health_check))
        .with_state(state)
}

fn liveness_status(state: &AppState) -> (HealthStatus, i64) {
    let stalled = state.scheduler.clock().elapsed_since(Utc::now());
    let status = if stalled > state.liveness_threshold {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Healthy
    };
    (status, stalled.num_seconds())
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Liveness probe handler
///
/// Returns 503 when the loop has not advanced within the threshold.
async fn liveness_probe(State(state): State<AppState>) -> impl IntoResponse {
    let (status, stalled_secs) = liveness_status(&state);

    let response = LivenessResponse {
        status,
        last_progress: state.scheduler.clock().last_progress().to_rfc3339(),
        stalled_secs,
        timestamp: Utc::now().to_rfc3339(),
    };

    (status.status_code(), Json(response))
}

/// Comprehensive health check handler
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let loop_status = state.scheduler.status().await;
    let (liveness, _) = liveness_status(&state);

    let status = match (liveness, loop_status.state) {
        (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
        (_, LoopState::Idle) => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: loop_status.state,
        pass: PassProgress {
            generation: loop_status.generation,
            position: loop_status.position,
            size: loop_status.size,
        },
        last_progress: loop_status.last_progress.to_rfc3339(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
    };

    (status.status_code(), Json(response))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_as_str() {
        assert_eq!(HealthStatus::Healthy.as_str(), "healthy");
        assert_eq!(HealthStatus::Degraded.as_str(), "degraded");
        assert_eq!(HealthStatus::Unhealthy.as_str(), "unhealthy");
    }

    #[test]
    fn test_health_status_code() {
        assert_eq!(HealthStatus::Healthy.status_code(), StatusCode::OK);
        assert_eq!(HealthStatus::Degraded.status_code(), StatusCode::OK);
        assert_eq!(
            HealthStatus::Unhealthy.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
