//! HTTP front end for the storage proxy
//!
//! Every handler translates one request into one `StorageBackend` call.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check, names the active backend
//! - `PUT|GET|DELETE /v1/kv/*key` - Key-value entries, raw bytes in and out
//! - `POST /v1/ts/*key?value=` - Append a sample stamped with the current time
//! - `GET /v1/ts/*key?from=&to=&n=` - Stream a range as a JSON array,
//!   reduced to about `n` points when `n > 0`
//! - `DELETE /v1/ts/*key?from=&to=` - Delete a range

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:80")
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Build the router with all routes
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/v1/kv/*key",
            get(routes::kv::get_entry)
                .put(routes::kv::put_entry)
                .delete(routes::kv::delete_entry),
        )
        .route(
            "/v1/ts/*key",
            get(routes::ts::get_range)
                .post(routes::ts::add_value)
                .delete(routes::ts::delete_range),
        )
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("API server listening on {}", addr);

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {}", e);
        }
    });

    Ok(addr)
}

/// Serve in the foreground until `shutdown` resolves
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve(
    config: ApiConfig,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
