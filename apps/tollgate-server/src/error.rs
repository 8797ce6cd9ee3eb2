//! HTTP error type - RFC 7807 responses for limiter outcomes.

use actix_web::{HttpResponse, ResponseError, http::StatusCode, http::header};
use thiserror::Error;

use tollgate_core::{RateLimitError, StatsError};
use tollgate_shared::ErrorResponse;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Over the limit, or rejected because the store failed under fail-closed.
    #[error("{detail}")]
    RateLimited {
        detail: String,
        key: String,
        strategy: String,
        retry_after_secs: u64,
    },

    #[error("Service unavailable: {detail}")]
    Unavailable {
        detail: String,
        key: Option<(String, String)>,
    },
}

impl AppError {
    /// Replace the `Retry-After` hint of a rate limit rejection.
    pub fn with_retry_after(self, secs: u64) -> Self {
        match self {
            AppError::RateLimited {
                detail,
                key,
                strategy,
                ..
            } => AppError::RateLimited {
                detail,
                key,
                strategy,
                retry_after_secs: secs.max(1),
            },
            other => other,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::BadRequest(detail) => {
                HttpResponse::BadRequest().json(ErrorResponse::bad_request(detail))
            }
            AppError::NotFound(detail) => {
                HttpResponse::NotFound().json(ErrorResponse::not_found(detail))
            }
            AppError::RateLimited {
                detail,
                key,
                strategy,
                retry_after_secs,
            } => HttpResponse::TooManyRequests()
                .insert_header((header::RETRY_AFTER, retry_after_secs.to_string()))
                .json(ErrorResponse::too_many_requests(detail).with_key(key, strategy)),
            AppError::Unavailable { detail, key } => {
                let mut body = ErrorResponse::service_unavailable(detail);
                if let Some((key, strategy)) = key {
                    body = body.with_key(key, strategy);
                }
                HttpResponse::ServiceUnavailable().json(body)
            }
        }
    }
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        let detail = err.to_string();
        match err {
            RateLimitError::Exceeded { key } | RateLimitError::StoreRejected { key, .. } => {
                AppError::RateLimited {
                    detail,
                    strategy: key.strategy.to_string(),
                    key: key.to_string(),
                    retry_after_secs: 1,
                }
            }
            RateLimitError::Store { key, .. } => AppError::Unavailable {
                detail,
                key: Some((key.to_string(), key.strategy.to_string())),
            },
            RateLimitError::UnknownScope(_) => AppError::NotFound(detail),
        }
    }
}

impl From<StatsError> for AppError {
    fn from(err: StatsError) -> Self {
        let detail = err.to_string();
        match err {
            StatsError::UnknownScope(_) => AppError::NotFound(detail),
            StatsError::Store(e) => {
                tracing::error!(error = %e, "Stats read failed");
                AppError::Unavailable {
                    detail: "rate limit store unavailable".to_string(),
                    key: None,
                }
            }
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
