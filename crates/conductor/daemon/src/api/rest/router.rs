//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use crate::error::ApiError;
use axum::{
    handler::Handler,
    http::{header, Method, StatusCode},
    routing::{get, post, MethodRouter},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// POST endpoint that answers OPTIONS with an empty 200 and anything else with 405
fn post_only<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    post(handler)
        .options(|| async { StatusCode::OK })
        .fallback(|| async { ApiError::MethodNotAllowed })
}

/// Create the main API router
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::daemon_status))
        // Workflows
        .route("/trigger", post_only(handlers::trigger_workflow))
        .route("/retry", post_only(handlers::retry_workflow))
        .route("/complete-run", post_only(handlers::complete_run))
        .route("/cancel-queued", post_only(handlers::cancel_queued))
        .route("/get-detail", post_only(handlers::get_detail))
        // Config
        .route("/update-config", post_only(handlers::update_config));

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    if server.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    router.with_state(state)
}
