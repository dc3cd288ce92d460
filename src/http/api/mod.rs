//! HTTP API Endpoints

pub mod health;
pub mod stream;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::http::state::AppState;

pub use health::{health_check, HealthResponse};
pub use stream::{sse_body, test_flow, ErrorResponse, TestRequest};

/// Create the API router
///
/// Routes:
/// - GET /health - Liveness with version and uptime
/// - GET|POST /test - Run a UI flow test, streamed as SSE
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/test", get(test_flow).post(test_flow))
        .with_state(state)
}
