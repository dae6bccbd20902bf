//! Short link redirect following
//!
//! Short links (`vm.tiktok.com/...`) only reveal the video they point to
//! after a redirect. This is a lightweight HTTP request that stops as soon as
//! a redirect lands on a recognizable video URL, so the video page itself is
//! never downloaded here.

use super::{CanonicalVideoRef, LinkNormalizer};
use crate::browser::DeviceProfile;
use crate::error::{BrowserError, Error, NavigationError, Result};
use reqwest::header::{HeaderValue, ACCEPT_LANGUAGE, LOCATION};
use reqwest::redirect::{Attempt, Policy};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Options for HTTP redirect following
#[derive(Debug, Clone)]
pub struct RedirectOptions {
    /// Follow short links over plain HTTP before falling back to the browser
    /// (default: true)
    pub enabled: bool,
    /// Timeout for the whole redirect chain in milliseconds (default: 8000)
    pub timeout_ms: u64,
    /// Maximum number of redirect hops (default: 10)
    pub max_hops: usize,
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 8000,
            max_hops: 10,
        }
    }
}

/// Follows short link redirects over HTTP
pub struct RedirectFollower {
    client: reqwest::Client,
    options: RedirectOptions,
}

impl RedirectFollower {
    /// Build a follower with its own HTTP client
    pub fn new(options: RedirectOptions) -> Result<Self> {
        let max_hops = options.max_hops;
        let policy = Policy::custom(move |attempt: Attempt| {
            if attempt.previous().len() > max_hops {
                attempt.error("too many redirects")
            } else if LinkNormalizer::reparse(attempt.url().as_str()).is_ok() {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .redirect(policy)
            .user_agent(DeviceProfile::Desktop.user_agent())
            .timeout(Duration::from_millis(options.timeout_ms))
            .build()
            .map_err(|e| BrowserError::ConfigError(e.to_string()))?;

        Ok(Self { client, options })
    }

    /// Whether HTTP following is enabled at all
    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// Follow a short link and return the URL it finally points to
    #[instrument(skip(self))]
    pub async fn follow(&self, short_url: &str) -> Result<String> {
        let request = self
            .client
            .get(short_url)
            .header(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"))
            .send();

        let response = tokio::time::timeout(Duration::from_millis(self.options.timeout_ms), request)
            .await
            .map_err(|_| NavigationError::Timeout(self.options.timeout_ms))?
            .map_err(|e| {
                if e.is_timeout() {
                    NavigationError::Timeout(self.options.timeout_ms)
                } else {
                    NavigationError::LoadFailed(e.to_string())
                }
            })?;

        let final_url = if response.status().is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    NavigationError::LoadFailed("redirect without Location header".to_string())
                })?;
            response
                .url()
                .join(location)
                .map_err(|e| NavigationError::InvalidUrl(e.to_string()))?
                .to_string()
        } else {
            response.url().to_string()
        };

        debug!("Short link {} -> {}", short_url, final_url);
        Ok(final_url)
    }

    /// Follow a short link and canonicalize its target
    #[instrument(skip(self))]
    pub async fn resolve(&self, short_url: &str) -> Result<CanonicalVideoRef> {
        let final_url = self.follow(short_url).await?;
        let video = LinkNormalizer::reparse(&final_url).map_err(Error::from)?;
        info!("Resolved short link to video {}", video.video_id);
        Ok(video)
    }
}
