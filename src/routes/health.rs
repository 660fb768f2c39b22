//! Health check endpoint
//!
//! Liveness probe plus a snapshot of the outbound HTTP client state.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::client::ClientHealth;
use crate::routes::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
    pub uptime_secs: u64,
    pub node_id: String,
    pub database: &'static str,
    pub http_client: ClientHealth,
    pub timestamp: String,
}

/// GET /health, GET /healthz
pub async fn handle_health(state: Arc<AppState>) -> Response<BoxBody> {
    let http_client = state.http.health().await;

    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        built_at: env!("BUILD_TIMESTAMP"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        node_id: state.args.node_id.to_string(),
        database: "connected",
        http_client,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    json_response(StatusCode::OK, &response)
}
