pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/purge", post(handlers::purge))
        .route(
            "/api/v1/events/theme-switched",
            post(handlers::theme_switched),
        )
        .route("/api/v1/events/hook", post(handlers::external_hook))
        .route("/api/v1/jobs/{id}", get(handlers::get_job))
        .route("/api/v1/status", get(handlers::get_status))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
