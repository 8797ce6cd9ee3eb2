//! Liveness and readiness endpoints.

use actix_web::{HttpResponse, web};

use tollgate_shared::dto::{HealthResponse, ReadyResponse};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Health check endpoint - returns server status.
///
/// GET /api/health
pub async fn health_check() -> HttpResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    };

    HttpResponse::Ok().json(response)
}

/// Readiness - one round trip to the shared store within the store deadline.
///
/// GET /api/ready
pub async fn readiness(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let deadline = state.limiter.config().store_timeout;

    match tokio::time::timeout(deadline, state.store.ping()).await {
        Ok(Ok(())) => Ok(HttpResponse::Ok().json(ReadyResponse {
            status: "ready".to_string(),
            store: "ok".to_string(),
        })),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Readiness check failed");
            Err(AppError::Unavailable {
                detail: "rate limit store unavailable".to_string(),
                key: None,
            })
        }
        Err(_) => {
            tracing::warn!(timeout_ms = deadline.as_millis() as u64, "Readiness check timed out");
            Err(AppError::Unavailable {
                detail: "rate limit store timed out".to_string(),
                key: None,
            })
        }
    }
}
