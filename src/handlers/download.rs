//! `GET /api/download`
//!
//! Resolves `url` with the profile picked by `platform` (`pc`, `mobile` or
//! `auto`) and answers with the media URL, or a classified error whose HTTP
//! status comes from [`ErrorKind::http_status`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::rate_limit::RateDecision;
use super::status::AppState;
use crate::browser::DeviceProfile;
use crate::error::{ErrorKind, ResolutionError};
use crate::metrics::global_metrics;

/// Query parameters of `/api/download`
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadQuery {
    /// Share link as pasted by the user
    pub url: String,
    /// `pc`, `mobile` or `auto`
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    "auto".to_string()
}

/// Successful resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Always "success"
    pub status: String,
    /// Platform parameter as received
    pub platform: String,
    /// Link as received
    pub original_url: String,
    /// Canonical video page
    pub canonical_url: String,
    /// Numeric video id
    pub video_id: String,
    /// Direct media URL
    pub video_url: String,
    /// Media URL that triggers an attachment download
    pub download_url: String,
    /// Strategy that found the media URL
    pub source_strategy: String,
    /// RFC 3339 resolution time
    pub timestamp: String,
}

/// Failed resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always "error"
    pub status: String,
    /// Failure kind
    pub kind: ErrorKind,
    /// Human-readable detail
    pub detail: String,
    /// Whether retrying later may help
    pub retryable: bool,
}

impl From<ResolutionError> for ErrorResponse {
    fn from(err: ResolutionError) -> Self {
        Self {
            status: "error".to_string(),
            retryable: err.kind.is_retryable(),
            kind: err.kind,
            detail: err.detail,
        }
    }
}

fn error_response(err: ResolutionError) -> Response {
    let status =
        StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}

/// Resolve a share link
#[instrument(skip(state, query), fields(client = %addr.ip()))]
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    if let RateDecision::Limited { retry_after_secs } = state.limiter().check(addr.ip()) {
        warn!("Rate limit exceeded");
        global_metrics().record_rate_limited();
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "status": "error",
                "detail": "too many requests",
                "retry_after_secs": retry_after_secs,
            })),
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    let start = Instant::now();
    let profile = match DeviceProfile::from_platform_param(&query.platform) {
        Ok(profile) => profile,
        Err(e) => {
            warn!("Ignoring platform parameter: {}", e);
            None
        }
    };

    info!("Resolving {}", query.url);
    let outcome = state.resolver().resolve(&query.url, profile).await;
    state.record_latency(start.elapsed());

    match outcome {
        Ok(result) => {
            let body = DownloadResponse {
                status: "success".to_string(),
                platform: query.platform,
                original_url: query.url,
                canonical_url: result.video.canonical_url.clone(),
                video_id: result.video.video_id.clone(),
                download_url: result.download_url(),
                video_url: result.absolute_url,
                source_strategy: result.source_strategy,
                timestamp: result.resolved_at.to_rfc3339(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            state.record_error();
            error_response(err)
        }
    }
}
