//! Page navigation with a bounded two-stage wait
//!
//! Stage one waits for the document load event. Stage two waits for network
//! quiescence, but only up to a shorter sub-budget: the video element is
//! injected after async data fetches, yet pages with background polling never
//! go fully quiet. Both stages run inside one overall budget whose expiry is
//! the only navigation timeout.

use super::engine::PageDriver;
use crate::error::{Error, NavigationError, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Slack kept between the idle wait and the overall budget
const IDLE_MARGIN: Duration = Duration::from_millis(250);

/// Options for page navigation
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    /// Overall navigation budget in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Sub-budget for the network quiescence wait in milliseconds (default: 5000)
    pub idle_timeout_ms: u64,
    /// Quiet period that counts as network idle in milliseconds (default: 500)
    pub idle_window_ms: u64,
    /// Simulate a short human-like pause and scroll (default: false)
    pub human_like: bool,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            idle_timeout_ms: 5000,
            idle_window_ms: 500,
            human_like: false,
        }
    }
}

/// Result of a navigation operation
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// Final URL after any redirects
    pub final_url: String,
    /// Whether the network went quiet within the idle sub-budget
    pub network_idle: bool,
    /// Navigation duration in milliseconds
    pub duration_ms: u64,
}

/// Page navigator
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate `page` to `url` and wait until it is usable
    #[instrument(skip(page, opts))]
    pub async fn goto(
        page: &dyn PageDriver,
        url: &str,
        opts: &NavigationOptions,
    ) -> Result<NavigationResult> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(NavigationError::InvalidUrl(format!(
                "URL must start with http:// or https://: {}",
                url
            ))
            .into());
        }

        info!("Navigating to: {}", url);
        let start = Instant::now();
        let budget = Duration::from_millis(opts.timeout_ms);

        let (final_url, network_idle) =
            tokio::time::timeout(budget, Self::navigate_once(page, url, opts, start, budget))
                .await
                .map_err(|_| NavigationError::Timeout(opts.timeout_ms))??;

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Navigation complete: {} -> {} in {}ms (idle: {})",
            url, final_url, duration_ms, network_idle
        );

        Ok(NavigationResult {
            final_url,
            network_idle,
            duration_ms,
        })
    }

    async fn navigate_once(
        page: &dyn PageDriver,
        url: &str,
        opts: &NavigationOptions,
        start: Instant,
        budget: Duration,
    ) -> Result<(String, bool)> {
        page.goto(url).await?;
        page.evaluate(LOAD_SCRIPT)
            .await
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        let remaining = budget.saturating_sub(start.elapsed());
        let idle_budget = Duration::from_millis(opts.idle_timeout_ms)
            .min(remaining.saturating_sub(IDLE_MARGIN));
        let network_idle = Self::wait_for_network_idle(page, opts.idle_window_ms, idle_budget).await;

        if opts.human_like {
            Self::simulate_human_behavior(page).await;
        }

        let final_url = page
            .current_url()
            .await?
            .unwrap_or_else(|| url.to_string());

        Ok::<_, Error>((final_url, network_idle))
    }

    /// Wait for no new resource loads during `window_ms`, up to `limit`
    ///
    /// Running out of `limit` is not an error.
    async fn wait_for_network_idle(page: &dyn PageDriver, window_ms: u64, limit: Duration) -> bool {
        if limit.is_zero() {
            return false;
        }
        let script = idle_script(window_ms);
        match tokio::time::timeout(limit, page.evaluate(&script)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Network idle wait failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Network still busy after {}ms; continuing", limit.as_millis());
                false
            }
        }
    }

    /// Simulate human-like behavior after navigation
    async fn simulate_human_behavior(page: &dyn PageDriver) {
        let delay = rand::random::<u64>() % 500 + 200;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let scroll_script = r#"
            window.scrollTo({
                top: Math.random() * 100 + 50,
                behavior: 'smooth'
            });
        "#;
        let _ = page.evaluate(scroll_script).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

const LOAD_SCRIPT: &str = r#"
    new Promise(resolve => {
        if (document.readyState === 'complete') {
            resolve(true);
        } else {
            window.addEventListener('load', () => resolve(true));
        }
    })
"#;

fn idle_script(window_ms: u64) -> String {
    format!(
        r#"
        new Promise(resolve => {{
            const windowMs = {window_ms};
            let lastActivity = Date.now();
            try {{
                new PerformanceObserver(() => {{ lastActivity = Date.now(); }})
                    .observe({{ type: 'resource', buffered: false }});
            }} catch (e) {{}}
            const tick = () => {{
                if (Date.now() - lastActivity >= windowMs) {{
                    resolve(true);
                }} else {{
                    setTimeout(tick, 100);
                }}
            }};
            tick();
        }})
    "#,
        window_ms = window_ms
    )
}
