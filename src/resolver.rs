//! The resolution pipeline
//!
//! ```text
//! share link ──▶ LinkNormalizer ──▶ (short? RedirectFollower)
//!                                         │
//!                 SessionPool::acquire ◀──┘
//!                        │
//!                        ▼
//!                 PageNavigator ──▶ ExtractionChain ──▶ release
//!                                                         │
//!                                                         ▼
//!                                                 ResultFinalizer ──▶ MediaResult
//! ```

use crate::browser::{
    BrowsingContext, ChromeLauncher, DeviceProfile, EngineLauncher, PageNavigator, PoolStats,
    SessionInfo, SessionPool,
};
use crate::config::ResolverConfig;
use crate::error::{Error, ErrorKind, ResolutionError, Result};
use crate::extraction::ExtractionChain;
use crate::finalize::{MediaResult, ResultFinalizer};
use crate::link::{CanonicalVideoRef, LinkNormalizer, NormalizedLink, RedirectFollower};
use crate::metrics::global_metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Resolves share links into direct media URLs
///
/// Cheap to clone; clones share one session pool.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    config: ResolverConfig,
    pool: SessionPool,
    redirects: RedirectFollower,
    chain: ExtractionChain,
    finalizer: ResultFinalizer,
}

impl Resolver {
    /// Resolver backed by headless Chromium
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let launcher = Arc::new(ChromeLauncher::new(config.engine_config()));
        Self::with_launcher(config, launcher)
    }

    /// Resolver backed by any engine
    pub fn with_launcher(config: ResolverConfig, launcher: Arc<dyn EngineLauncher>) -> Result<Self> {
        let chain = ExtractionChain::default_chain(&config.extraction);
        Self::with_chain(config, launcher, chain)
    }

    /// Resolver with an explicit extraction chain
    pub fn with_chain(
        config: ResolverConfig,
        launcher: Arc<dyn EngineLauncher>,
        chain: ExtractionChain,
    ) -> Result<Self> {
        let redirects = RedirectFollower::new(config.redirect.clone())?;
        let finalizer = ResultFinalizer::new(config.finalize.clone())?;
        let pool = SessionPool::new(launcher, config.pool.clone());

        Ok(Self {
            inner: Arc::new(ResolverInner {
                config,
                pool,
                redirects,
                chain,
                finalizer,
            }),
        })
    }

    /// Get the resolver configuration
    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Resolve a share link into a media URL
    ///
    /// `None` uses the configured default profile. The work runs on its own
    /// task: dropping the returned future does not interrupt context teardown.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        link: &str,
        profile: Option<DeviceProfile>,
    ) -> std::result::Result<MediaResult, ResolutionError> {
        let inner = Arc::clone(&self.inner);
        let link = link.to_string();
        let profile = profile.unwrap_or(inner.config.default_profile);

        match tokio::spawn(async move { inner.resolve_recorded(&link, profile).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Resolution task aborted: {}", e);
                global_metrics().record_failure(ErrorKind::Internal, Default::default());
                Err(ResolutionError::new(ErrorKind::Internal, "internal error"))
            }
        }
    }

    /// Close every browser session; later resolutions fail with
    /// `SessionUnavailable`
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }

    /// Session pool counters
    pub async fn stats(&self) -> PoolStats {
        self.inner.pool.stats().await
    }

    /// Per-session diagnostics
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.inner.pool.sessions().await
    }
}

impl ResolverInner {
    async fn resolve_recorded(
        &self,
        link: &str,
        profile: DeviceProfile,
    ) -> std::result::Result<MediaResult, ResolutionError> {
        let start = Instant::now();
        match self.run(link, profile).await {
            Ok(result) => {
                info!(
                    video_id = %result.video.video_id,
                    strategy = %result.source_strategy,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Resolved media URL"
                );
                global_metrics().record_success(&result.source_strategy, start.elapsed());
                Ok(result)
            }
            Err(e) => {
                let kind = e.kind();
                if kind == ErrorKind::Internal {
                    error!(link = %link, error = ?e, "Resolution failed with internal error");
                } else {
                    info!(kind = %kind, "Resolution failed: {}", e);
                }
                global_metrics().record_failure(kind, start.elapsed());
                Err(e.into())
            }
        }
    }

    async fn run(&self, link: &str, profile: DeviceProfile) -> Result<MediaResult> {
        let normalized = LinkNormalizer::normalize(link)?;
        let video = match &normalized {
            NormalizedLink::Canonical(video) => Some(video.clone()),
            NormalizedLink::ShortLink(short) => self.follow_short(short).await?,
        };
        let target = video
            .as_ref()
            .map_or_else(|| normalized.url().to_string(), |v| v.canonical_url.clone());

        let context = self.pool.acquire_context(profile).await?;
        let inspected = self.inspect(&context, &target, video).await;
        self.pool.release_context(context).await;

        let (strategy, raw, video) = inspected?;
        self.finalizer.finalize(&raw, strategy, &video).await
    }

    /// Follow a short link over HTTP; `None` leaves it to the browser
    async fn follow_short(&self, short: &str) -> Result<Option<CanonicalVideoRef>> {
        if !self.redirects.is_enabled() {
            return Ok(None);
        }
        match self.redirects.resolve(short).await {
            Ok(video) => Ok(Some(video)),
            Err(e @ Error::Link(_)) => Err(e),
            Err(e) => {
                debug!("HTTP redirect failed, navigating short link in browser: {}", e);
                Ok(None)
            }
        }
    }

    async fn inspect(
        &self,
        context: &BrowsingContext,
        target: &str,
        video: Option<CanonicalVideoRef>,
    ) -> Result<(&'static str, String, CanonicalVideoRef)> {
        let navigated = PageNavigator::goto(context.page(), target, &self.config.navigation).await;
        global_metrics().record_navigation();
        let navigated = navigated?;

        let video = match video {
            Some(video) => video,
            None => LinkNormalizer::reparse(&navigated.final_url)?,
        };

        let report = self.chain.extract(context.page()).await;
        debug!("Extraction report: {}", report);
        let (strategy, raw) = report.into_hit()?;
        Ok((strategy, raw, video))
    }
}
