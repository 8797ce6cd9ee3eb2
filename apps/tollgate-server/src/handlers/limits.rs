//! Rate limit decision and stats handlers.

use actix_web::{HttpRequest, HttpResponse, web};

use tollgate_core::{RateLimitStats, Scope, StrategyConfig};
use tollgate_shared::dto::{AcquireResponse, StatsResponse};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Header naming the caller the limit is accounted to.
pub const PRINCIPAL_HEADER: &str = "X-Principal-Id";

fn principal(req: &HttpRequest) -> AppResult<String> {
    req.headers()
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(format!("missing {PRINCIPAL_HEADER} header")))
}

/// Seconds until a rejected caller can expect capacity again.
fn retry_after_secs(strategy: &StrategyConfig) -> u64 {
    let period = match strategy {
        // worst case: the oldest call in the window has just been recorded
        StrategyConfig::SlidingWindow(p) => p.window,
        StrategyConfig::TokenBucket(p) => p.refill_period,
        StrategyConfig::LeakyBucket(p) => p.leak_period,
    };
    (period.as_secs_f64().ceil() as u64).max(1)
}

fn stats_response(stats: RateLimitStats) -> StatsResponse {
    StatsResponse {
        utilization: stats.utilization(),
        key: stats.key.to_string(),
        scope: stats.key.scope.to_string(),
        strategy: stats.key.strategy.to_string(),
        principal: stats.key.principal,
        api: stats.key.api,
        request_count: stats.request_count,
        consumption: stats.consumption,
        capacity: stats.capacity,
        last_request_at: stats.last_request_at,
        allowed_rate_per_sec: stats.allowed_rate_per_sec,
    }
}

/// POST /api/v1/limits/{scope}/{api}
pub async fn acquire(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let (scope, api) = path.into_inner();
    let scope = Scope::from(scope.as_str());
    let principal = principal(&req)?;

    let key = state
        .limiter
        .acquire(&scope, &principal, &api)
        .await
        .map_err(|err| {
            let hint = state
                .limiter
                .config()
                .policy(&scope)
                .map(|policy| retry_after_secs(&policy.strategy))
                .unwrap_or(1);
            AppError::from(err).with_retry_after(hint)
        })?;

    Ok(HttpResponse::Ok().json(AcquireResponse {
        key: key.to_string(),
        strategy: key.strategy.to_string(),
        admitted: true,
    }))
}

/// GET /api/v1/limits/{scope}/{api}/stats
pub async fn stats(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let (scope, api) = path.into_inner();
    let principal = principal(&req)?;

    let stats = state
        .stats
        .snapshot_for(&Scope::from(scope.as_str()), &principal, &api)
        .await?;

    Ok(HttpResponse::Ok().json(stats_response(stats)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::http::StatusCode;
    use actix_web::{App, test};

    use tollgate_core::ports::NoopTelemetry;
    use tollgate_core::{LimiterConfig, ScopePolicy};
    use tollgate_infra::InMemoryStateStore;

    use super::*;
    use crate::handlers::configure_routes;

    fn state(config: LimiterConfig) -> AppState {
        AppState::with_store(
            config,
            Arc::new(InMemoryStateStore::new()),
            Arc::new(NoopTelemetry),
        )
    }

    fn one_per_minute() -> LimiterConfig {
        LimiterConfig::default().with_scope(
            Scope::CORPORATE,
            ScopePolicy::new(StrategyConfig::sliding_window(1, Duration::from_secs(60))),
        )
    }

    #[actix_web::test]
    async fn test_acquire_admits_then_rejects_with_retry_after() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(one_per_minute())))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/limits/corporate/orders")
            .insert_header((PRINCIPAL_HEADER, "acme"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: AcquireResponse = test::read_body_json(resp).await;
        assert_eq!(body.key, "sw:corporate:acme:orders");
        assert_eq!(body.strategy, "sliding_window");
        assert!(body.admitted);

        let req = test::TestRequest::post()
            .uri("/api/v1/limits/corporate/orders")
            .insert_header((PRINCIPAL_HEADER, "acme"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            resp.headers().get("retry-after").and_then(|v| v.to_str().ok()),
            Some("60")
        );
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], 429);
        assert_eq!(body["key"], "sw:corporate:acme:orders");
        assert_eq!(body["strategy"], "sliding_window");
    }

    #[actix_web::test]
    async fn test_missing_principal_is_a_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(LimiterConfig::default())))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/limits/corporate/orders")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_unknown_scope_is_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(LimiterConfig::default())))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/limits/partner/orders")
            .insert_header((PRINCIPAL_HEADER, "acme"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_stats_reflect_admitted_calls() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(LimiterConfig::default())))
                .configure(configure_routes),
        )
        .await;

        for _ in 0..3 {
            let req = test::TestRequest::post()
                .uri("/api/v1/limits/compliance/filings")
                .insert_header((PRINCIPAL_HEADER, "acme"))
                .to_request();
            assert!(test::call_service(&app, req).await.status().is_success());
        }

        let req = test::TestRequest::get()
            .uri("/api/v1/limits/compliance/filings/stats")
            .insert_header((PRINCIPAL_HEADER, "acme"))
            .to_request();
        let body: StatsResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.strategy, "leaky_bucket");
        assert_eq!(body.capacity, 10);
        assert_eq!(body.request_count, 3);
        // real clock: a few milliseconds of leak at most
        assert!(body.consumption > 2.9 && body.consumption <= 3.0);
        assert!(body.last_request_at.is_some());
    }

    #[::core::prelude::v1::test]
    fn test_retry_after_rounds_up_to_whole_seconds() {
        assert_eq!(retry_after_secs(&StrategyConfig::token_bucket(10, Duration::from_millis(10))), 1);
        assert_eq!(retry_after_secs(&StrategyConfig::leaky_bucket(10, Duration::from_millis(1500))), 2);
        assert_eq!(retry_after_secs(&StrategyConfig::sliding_window(5, Duration::from_secs(60))), 60);
    }
}
