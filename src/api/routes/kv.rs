//! Key-value endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::debug;

use crate::api::{error::ApiResult, state::ApiState};

/// PUT /v1/kv/*key
pub async fn put_entry(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    debug!("put {} ({} bytes)", key, body.len());
    state.storage.put(&key, body.to_vec()).await?;
    Ok(StatusCode::OK)
}

/// GET /v1/kv/*key
///
/// The stored bytes verbatim
pub async fn get_entry(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let value = state.storage.get(&key).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], value))
}

/// DELETE /v1/kv/*key
pub async fn delete_entry(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    state.storage.delete(&key).await?;
    Ok(StatusCode::OK)
}
