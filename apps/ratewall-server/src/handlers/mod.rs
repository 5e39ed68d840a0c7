//! HTTP handlers and route configuration.

mod health;

use actix_web::{HttpResponse, web};

use crate::middleware::{GatekeeperConfig, RateLimitMiddleware};
use crate::state::AppState;

/// Configure all application routes.
///
/// Everything except the health check sits behind the rate limiter.
pub fn configure_routes(
    state: &AppState,
    gatekeeper: &GatekeeperConfig,
) -> impl FnOnce(&mut web::ServiceConfig) {
    let limiter = state.limiter.clone();
    let gatekeeper = gatekeeper.clone();

    move |cfg: &mut web::ServiceConfig| {
        cfg.route("/api/health", web::get().to(health::health_check))
            .service(
                web::scope("")
                    .wrap(RateLimitMiddleware::new(limiter, gatekeeper))
                    .route("/", web::get().to(index)),
            );
    }
}

/// The protected resource. Reaching it means the request was admitted.
///
/// GET /
async fn index() -> HttpResponse {
    HttpResponse::Ok().finish()
}
