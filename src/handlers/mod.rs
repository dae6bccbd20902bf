//! HTTP adapter over [`Resolver`](crate::Resolver)
//!
//! ```text
//! GET /api/download ──▶ rate limit ──▶ Resolver::resolve ──▶ JSON
//! GET /health, /status, /metrics
//! ```
//!
//! Serve the router with
//! `into_make_service_with_connect_info::<SocketAddr>()`: the download handler
//! keys its rate limit on the peer address.

pub mod cors;
pub mod download;
pub mod rate_limit;
pub mod status;

pub use cors::{cors_layer, cors_layer_permissive};
pub use download::{download_handler, DownloadQuery, DownloadResponse, ErrorResponse};
pub use rate_limit::{ClientRateLimiter, RateDecision, RateLimiter};
pub use status::{status_router, AppState, HealthResponse, StatusResponse};

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Full application router
pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/download", get(download_handler))
        .merge(status_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
