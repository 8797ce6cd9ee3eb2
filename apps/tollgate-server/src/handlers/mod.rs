//! HTTP handlers and route configuration.

mod health;
mod limits;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Probes
            .route("/health", web::get().to(health::health_check))
            .route("/ready", web::get().to(health::readiness))
            // Decisions
            .service(
                web::scope("/v1/limits")
                    .route("/{scope}/{api}", web::post().to(limits::acquire))
                    .route("/{scope}/{api}/stats", web::get().to(limits::stats)),
            ),
    );
}
