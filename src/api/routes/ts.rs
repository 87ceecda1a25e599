//! Timeseries endpoints
//!
//! Range bounds are integer Unix nanoseconds. A missing `from` means the
//! epoch, a missing or zero `to` means now.

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    api::{error::ApiResult, state::ApiState},
    storage::{Sample, codec, reduce_stream},
};

#[derive(Debug, Deserialize)]
pub struct AppendQuery {
    value: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    from: Option<i64>,
    to: Option<i64>,

    /// Approximate number of points to return, no reduction when absent or <= 0
    n: Option<i64>,
}

impl RangeQuery {
    fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = codec::from_nanos(self.from.unwrap_or(0));
        let to = match self.to {
            None | Some(0) => Utc::now(),
            Some(nanos) => codec::from_nanos(nanos),
        };
        (from, to)
    }
}

/// One element of a range response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub timestamp: i64,
    pub value: f64,
}

impl From<Sample> for SamplePoint {
    fn from(sample: Sample) -> Self {
        Self {
            timestamp: codec::timestamp_nanos(&sample.timestamp),
            value: sample.value,
        }
    }
}

/// POST /v1/ts/*key?value=
pub async fn add_value(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    query: Result<Query<AppendQuery>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(AppendQuery { value }) = query?;
    state.storage.add_value(&key, value).await?;
    Ok(StatusCode::OK)
}

/// GET /v1/ts/*key?from=&to=&n=
///
/// Streams a JSON array of samples. The body is written while the backend
/// is still scanning, so arbitrarily large ranges are never held in memory.
pub async fn get_range(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let (from, to) = query.bounds();

    let samples = state.storage.get_range(&key, from, to).await?;
    let samples = reduce_stream(samples, from, to, query.n.unwrap_or(0));

    let elements = samples.enumerate().map(|(i, sample)| {
        serde_json::to_string(&SamplePoint::from(sample))
            .map(|json| if i == 0 { json } else { format!(",{json}") })
    });
    let body = stream::once(async { Ok(String::from("[")) })
        .chain(elements)
        .chain(stream::once(async { Ok(String::from("]")) }));

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body),
    )
        .into_response())
}

/// DELETE /v1/ts/*key?from=&to=
pub async fn delete_range(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (from, to) = query.bounds();

    let deleted = state.storage.delete_range(&key, from, to).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
