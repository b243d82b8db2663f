use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Streaming session lifecycle
        .route("/session/start", post(crate::routes::session::start))
        .route("/session/cancel", post(crate::routes::session::cancel))
        .route("/session/status", get(crate::routes::session::status))
        // Aggregated views
        .route("/dashboard", get(crate::routes::dashboard::dashboard))
        .route("/dashboard/ws", get(crate::routes::ws::dashboard_ws))
        .route(
            "/metrics/fallback",
            get(crate::routes::dashboard::metrics_fallback),
        )
        // Durable cache
        .route("/cache/status", get(crate::routes::cache::status))
        .route("/cache/clear", post(crate::routes::cache::clear))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
