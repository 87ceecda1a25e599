//! Health check endpoint

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::api::state::ApiState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub timestamp: String,
}

/// GET /health
///
/// Returns a simple health check response
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.storage.name().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
