//! Resolver configuration
//!
//! [`ResolverConfig`] composes the per-stage option structs. Every part has a
//! `Default`; the builder only touches what callers commonly tune.

use crate::browser::{BrowserConfig, DeviceProfile, NavigationOptions, PoolConfig};
use crate::extraction::ExtractionOptions;
use crate::finalize::FinalizeOptions;
use crate::link::RedirectOptions;

/// Configuration for [`Resolver`](crate::Resolver)
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Browser launch settings
    pub browser: BrowserConfig,
    /// Session pool sizing and lifetimes
    pub pool: PoolConfig,
    /// Navigation budgets
    pub navigation: NavigationOptions,
    /// Extraction waits
    pub extraction: ExtractionOptions,
    /// Reachability verification
    pub finalize: FinalizeOptions,
    /// Short link following over plain HTTP
    pub redirect: RedirectOptions,
    /// Profile used when the caller does not pick one
    pub default_profile: DeviceProfile,
}

impl ResolverConfig {
    /// Create a new config builder
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }

    /// Browser launch settings with the engine deadline stretched to the
    /// navigation budget, so a slow load surfaces as a navigation timeout
    pub fn engine_config(&self) -> BrowserConfig {
        let mut browser = self.browser.clone();
        browser.navigation_timeout_ms = browser
            .navigation_timeout_ms
            .max(self.navigation.timeout_ms);
        browser
    }
}

/// Builder for ResolverConfig
#[derive(Default)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// Replace the browser launch settings
    pub fn browser(mut self, browser: BrowserConfig) -> Self {
        self.config.browser = browser;
        self
    }

    /// Set the overall navigation budget
    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation.timeout_ms = ms;
        self
    }

    /// Set the network idle sub-budget
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation.idle_timeout_ms = ms;
        self
    }

    /// Set how long the element strategy waits for the `video` tag
    pub fn selector_wait_ms(mut self, ms: u64) -> Self {
        self.config.extraction.selector_wait_ms = ms;
        self
    }

    /// Set the engine process count
    pub fn max_sessions(mut self, n: usize) -> Self {
        self.config.pool.max_sessions = n;
        self
    }

    /// Set how many requests may hold a context at once
    pub fn max_contexts(mut self, n: usize) -> Self {
        self.config.pool.max_contexts = n;
        self
    }

    /// Set how many contexts a session serves before it is retired
    pub fn max_uses(mut self, n: u32) -> Self {
        self.config.pool.max_uses = n;
        self
    }

    /// Set the session time-to-live
    pub fn session_ttl_ms(mut self, ms: u64) -> Self {
        self.config.pool.session_ttl_ms = ms;
        self
    }

    /// Set how long an acquire may wait for a free slot
    pub fn acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.config.pool.acquire_timeout_ms = ms;
        self
    }

    /// Set consecutive context failures that retire a session
    pub fn fatal_failure_threshold(mut self, n: u32) -> Self {
        self.config.pool.fatal_failure_threshold = n;
        self
    }

    /// Set the default device profile
    pub fn default_profile(mut self, profile: DeviceProfile) -> Self {
        self.config.default_profile = profile;
        self
    }

    /// Enable/disable the reachability check
    pub fn verify_reachability(mut self, verify: bool) -> Self {
        self.config.finalize.verify_reachability = verify;
        self
    }

    /// Set the reachability check timeout
    pub fn reachability_timeout_ms(mut self, ms: u64) -> Self {
        self.config.finalize.reachability_timeout_ms = ms;
        self
    }

    /// Enable/disable following short links over HTTP
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.redirect.enabled = follow;
        self
    }

    /// Build the config
    pub fn build(self) -> ResolverConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_compose() {
        let config = ResolverConfig::default();
        assert_eq!(config.default_profile, DeviceProfile::Desktop);
        assert!(config.navigation.idle_timeout_ms < config.navigation.timeout_ms);
        assert!(!config.finalize.verify_reachability);
        assert!(config.redirect.enabled);
    }

    #[test]
    fn test_builder() {
        let config = ResolverConfig::builder()
            .navigation_timeout_ms(20000)
            .idle_timeout_ms(2000)
            .selector_wait_ms(1500)
            .max_contexts(8)
            .max_uses(10)
            .default_profile(DeviceProfile::Mobile)
            .verify_reachability(true)
            .follow_redirects(false)
            .build();

        assert_eq!(config.navigation.timeout_ms, 20000);
        assert_eq!(config.navigation.idle_timeout_ms, 2000);
        assert_eq!(config.extraction.selector_wait_ms, 1500);
        assert_eq!(config.pool.max_contexts, 8);
        assert_eq!(config.pool.max_uses, 10);
        assert_eq!(config.default_profile, DeviceProfile::Mobile);
        assert!(config.finalize.verify_reachability);
        assert!(!config.redirect.enabled);
    }

    #[test]
    fn test_engine_config_follows_navigation_budget() {
        let config = ResolverConfig::builder()
            .navigation_timeout_ms(90_000)
            .build();
        let engine = config.engine_config();
        assert_eq!(engine.navigation_timeout_ms, 90_000);
        assert!(engine.engine_request_timeout() > std::time::Duration::from_millis(90_000));

        let short = ResolverConfig::builder().navigation_timeout_ms(5000).build();
        assert_eq!(
            short.engine_config().navigation_timeout_ms,
            BrowserConfig::default().navigation_timeout_ms
        );
    }
}
