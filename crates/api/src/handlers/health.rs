//! Health check endpoint for load balancers and monitoring.
//!
//! Returns 200 OK if the cache backend is reachable, 503 Service Unavailable
//! otherwise. The in-memory fallback backend always reports healthy.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cache: bool,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache_ok = state.cache.ping().await;

    let response = HealthResponse {
        status: if cache_ok { "ok" } else { "unhealthy" },
        cache: cache_ok,
    };

    let status = if cache_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
