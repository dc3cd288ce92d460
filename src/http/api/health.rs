//! Health Check API
//!
//! Liveness endpoint for monitoring and load balancers.

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::http::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status
    pub status: &'static str,
    /// Human readable message
    pub message: &'static str,
    /// Application version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Server is running.",
        version: state.version,
        uptime_secs: state.uptime_secs(),
    })
}
