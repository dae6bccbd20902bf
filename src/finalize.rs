//! Result finalization
//!
//! Turns the raw value a strategy found into an absolute media URL and,
//! when enabled, checks that the CDN actually answers for it.

use crate::browser::{DeviceProfile, PLATFORM_REFERER};
use crate::error::{Error, ExtractionError, FinalizeError, Result};
use crate::link::{CanonicalVideoRef, CANONICAL_HOST};
use chrono::{DateTime, Utc};
use reqwest::header::{RANGE, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Options for the result finalizer
#[derive(Debug, Clone)]
pub struct FinalizeOptions {
    /// Check the media URL answers before returning it (default: false)
    pub verify_reachability: bool,
    /// Reachability check timeout in milliseconds (default: 5000)
    pub reachability_timeout_ms: u64,
}

impl Default for FinalizeOptions {
    fn default() -> Self {
        Self {
            verify_reachability: false,
            reachability_timeout_ms: 5000,
        }
    }
}

/// A resolved media URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaResult {
    /// Absolute media URL with explicit scheme and host
    pub absolute_url: String,
    /// Name of the strategy that found it
    pub source_strategy: String,
    /// When resolution finished
    pub resolved_at: DateTime<Utc>,
    /// The video it belongs to
    pub video: CanonicalVideoRef,
}

impl MediaResult {
    /// The media URL with `download=1` appended, which makes the CDN send
    /// an attachment disposition
    pub fn download_url(&self) -> String {
        match Url::parse(&self.absolute_url) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("download", "1");
                url.into()
            }
            Err(_) => self.absolute_url.clone(),
        }
    }
}

/// Resolve a raw media reference against the video page
///
/// Protocol-relative values get `https:`, root-relative values the platform
/// host, other relative values are joined onto `canonical_url`. Absolute
/// values pass through, so applying this twice changes nothing.
pub fn absolutize(raw: &str, canonical_url: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExtractionError::UnusableValue("empty value".to_string()).into());
    }

    let parsed = if raw.starts_with("//") {
        Url::parse(&format!("https:{}", raw))
    } else if raw.starts_with('/') {
        Url::parse(&format!("https://{}{}", CANONICAL_HOST, raw))
    } else {
        match Url::parse(raw) {
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(canonical_url).and_then(|base| base.join(raw))
            }
            other => other,
        }
    };

    let url = parsed.map_err(|e| ExtractionError::UnusableValue(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractionError::UnusableValue(format!(
            "unsupported scheme {}",
            url.scheme()
        ))
        .into());
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ExtractionError::UnusableValue(format!("no host in {}", raw)).into());
    }

    Ok(url)
}

/// Absolutizes extracted values and optionally checks they answer
pub struct ResultFinalizer {
    client: Client,
    options: FinalizeOptions,
}

impl ResultFinalizer {
    /// Create a finalizer
    pub fn new(options: FinalizeOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(options.reachability_timeout_ms))
            .build()
            .map_err(|e| Error::generic(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { client, options })
    }

    /// Get the finalizer options
    pub fn options(&self) -> &FinalizeOptions {
        &self.options
    }

    /// Build the media result for a raw strategy hit
    #[instrument(skip(self, video), fields(video_id = %video.video_id))]
    pub async fn finalize(
        &self,
        raw: &str,
        strategy: &str,
        video: &CanonicalVideoRef,
    ) -> Result<MediaResult> {
        let url = absolutize(raw, &video.canonical_url)?;

        if self.options.verify_reachability {
            self.check_reachable(&url).await?;
        }

        Ok(MediaResult {
            absolute_url: url.into(),
            source_strategy: strategy.to_string(),
            resolved_at: Utc::now(),
            video: video.clone(),
        })
    }

    /// HEAD the media URL; a 405 is retried once as a one-byte ranged GET
    async fn check_reachable(&self, url: &Url) -> Result<()> {
        let head = self
            .client
            .head(url.clone())
            .header(USER_AGENT, DeviceProfile::Desktop.user_agent())
            .header(REFERER, PLATFORM_REFERER);
        let mut status = self.send(head).await?;

        if status == StatusCode::METHOD_NOT_ALLOWED {
            debug!("HEAD refused, retrying with ranged GET");
            let get = self
                .client
                .get(url.clone())
                .header(USER_AGENT, DeviceProfile::Desktop.user_agent())
                .header(REFERER, PLATFORM_REFERER)
                .header(RANGE, "bytes=0-0");
            status = self.send(get).await?;
        }

        if status.is_success() {
            debug!("Media URL answered {}", status);
            Ok(())
        } else {
            Err(FinalizeError::BadStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into())
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<StatusCode> {
        let timeout_ms = self.options.reachability_timeout_ms;
        let response = tokio::time::timeout(Duration::from_millis(timeout_ms), request.send())
            .await
            .map_err(|_| FinalizeError::Timeout(timeout_ms))?
            .map_err(|e| {
                if e.is_timeout() {
                    FinalizeError::Timeout(timeout_ms)
                } else {
                    FinalizeError::Unreachable(e.to_string())
                }
            })?;
        Ok(response.status())
    }
}
