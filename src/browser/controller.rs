//! Chromium engine over CDP
//!
//! This module handles browser launch, isolated context creation and
//! shutdown through chromiumoxide.

use super::engine::{EngineLauncher, EngineSession, PageDriver};
use super::stealth::{DeviceProfile, StealthMode};
use crate::error::{BrowserError, Error, NavigationError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Browser window width (default: 1920)
    pub width: u32,
    /// Browser window height (default: 1080)
    pub height: u32,
    /// Enable sandbox (default: false, containers rarely allow it)
    pub sandbox: bool,
    /// User agent override for every profile (None = profile default)
    pub user_agent: Option<String>,
    /// Launch timeout in milliseconds (default: 30000)
    pub launch_timeout_ms: u64,
    /// Timeout for single CDP commands in milliseconds (default: 10000)
    pub command_timeout_ms: u64,
    /// Page load deadline in milliseconds (default: 30000)
    ///
    /// chromiumoxide applies its request timeout to page loads too, so the
    /// engine is launched with the larger of this and `command_timeout_ms`.
    pub navigation_timeout_ms: u64,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Enable stealth mode (default: true)
    pub stealth: bool,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            width: 1920,
            height: 1080,
            sandbox: false,
            user_agent: None,
            launch_timeout_ms: 30000,
            command_timeout_ms: 10000,
            navigation_timeout_ms: 30000,
            chrome_path: None,
            stealth: true,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Create a new config builder
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }

    /// Request timeout handed to the engine
    ///
    /// Kept past the page load deadline so that a slow load surfaces as the
    /// navigator's own budget expiring.
    pub fn engine_request_timeout(&self) -> Duration {
        let longest = self.command_timeout_ms.max(self.navigation_timeout_ms);
        Duration::from_millis(longest) + ENGINE_TIMEOUT_SLACK
    }
}

/// Added on top of the longest deadline the engine must honour
const ENGINE_TIMEOUT_SLACK: Duration = Duration::from_secs(1);

/// Builder for BrowserConfig
#[derive(Default)]
pub struct BrowserConfigBuilder {
    config: BrowserConfig,
}

impl BrowserConfigBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Set window dimensions
    pub fn window(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set user agent
    pub fn user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.config.user_agent = Some(ua.into());
        self
    }

    /// Set launch timeout
    pub fn launch_timeout_ms(mut self, ms: u64) -> Self {
        self.config.launch_timeout_ms = ms;
        self
    }

    /// Set CDP command timeout
    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.command_timeout_ms = ms;
        self
    }

    /// Set page load deadline
    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation_timeout_ms = ms;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Enable/disable stealth mode
    pub fn stealth(mut self, stealth: bool) -> Self {
        self.config.stealth = stealth;
        self
    }

    /// Add extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    /// Build the config
    pub fn build(self) -> BrowserConfig {
        self.config
    }
}

/// Launches headless Chromium processes
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    /// Create a launcher for the given config
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    /// Get the browser configuration
    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Translate our config into chromiumoxide's launch config
    fn cdp_config(&self) -> Result<CdpBrowserConfig> {
        let config = &self.config;
        let mut builder = CdpBrowserConfig::builder()
            .window_size(config.width, config.height)
            .request_timeout(config.engine_request_timeout())
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--mute-audio");

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.arg("--no-sandbox");
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        for arg in &config.extra_args {
            builder = builder.arg(arg);
        }

        builder
            .build()
            .map_err(|e| BrowserError::ConfigError(e.to_string()).into())
    }
}

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    #[instrument(skip(self))]
    async fn launch(&self) -> Result<Arc<dyn EngineSession>> {
        info!(
            "Launching browser with config: headless={}",
            self.config.headless
        );

        let cdp_config = self.cdp_config()?;
        let (browser, mut handler) = tokio::time::timeout(
            Duration::from_millis(self.config.launch_timeout_ms),
            Browser::launch(cdp_config),
        )
        .await
        .map_err(|_| BrowserError::Timeout(self.config.launch_timeout_ms))?
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = Arc::clone(&alive);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("Browser handler event error");
                    break;
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            debug!("Browser handler finished");
        });

        info!("Browser launched successfully");

        Ok(Arc::new(ChromeSession {
            browser: Arc::new(Mutex::new(browser)),
            handler: Mutex::new(Some(handler_task)),
            alive,
            config: self.config.clone(),
        }))
    }
}

/// One running Chromium process
pub struct ChromeSession {
    browser: Arc<Mutex<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    alive: Arc<AtomicBool>,
    config: BrowserConfig,
}

impl ChromeSession {
    fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.config.command_timeout_ms)
    }

    async fn configure_page(&self, page: &Page, profile: DeviceProfile) -> Result<()> {
        StealthMode::emulate(page, profile, self.config.user_agent.as_deref()).await?;
        if self.config.stealth {
            StealthMode::apply(page, profile).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EngineSession for ChromeSession {
    #[instrument(skip(self))]
    async fn open_context(&self, profile: DeviceProfile) -> Result<Box<dyn PageDriver>> {
        let timeout = self.command_timeout();

        let (context_id, page) = tokio::time::timeout(timeout, async {
            let browser = self.browser.lock().await;
            let context_id = browser
                .execute(CreateBrowserContextParams::default())
                .await
                .map_err(|e| BrowserError::ContextCreationFailed(e.to_string()))?
                .result
                .browser_context_id;

            let target = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(BrowserError::ContextCreationFailed)?;

            let page = browser
                .new_page(target)
                .await
                .map_err(|e| BrowserError::ContextCreationFailed(e.to_string()))?;

            Ok::<_, Error>((context_id, page))
        })
        .await
        .map_err(|_| BrowserError::Timeout(self.config.command_timeout_ms))??;

        let driver = ChromePage {
            page,
            context_id,
            browser: Arc::clone(&self.browser),
            command_timeout: timeout,
            navigation_timeout_ms: self.config.navigation_timeout_ms,
        };

        if let Err(e) = tokio::time::timeout(timeout, self.configure_page(&driver.page, profile))
            .await
            .unwrap_or(Err(BrowserError::Timeout(self.config.command_timeout_ms).into()))
        {
            let _ = driver.close().await;
            return Err(BrowserError::ContextCreationFailed(e.to_string()).into());
        }

        debug!("Opened isolated browsing context");
        Ok(Box::new(driver))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    #[instrument(skip(self))]
    async fn close(&self) -> Result<()> {
        info!("Closing browser");

        let closed = tokio::time::timeout(self.command_timeout(), async {
            self.browser.lock().await.close().await
        })
        .await;

        match closed {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Browser close failed: {}", e),
            Err(_) => warn!("Browser close timed out"),
        }

        if let Some(handler) = self.handler.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), handler).await.is_err() {
                warn!("Browser handler did not finish in time");
            }
        }
        self.alive.store(false, Ordering::SeqCst);

        info!("Browser closed");
        Ok(())
    }
}

/// A page living in its own CDP browser context
pub struct ChromePage {
    page: Page,
    context_id: BrowserContextId,
    browser: Arc<Mutex<Browser>>,
    command_timeout: Duration,
    navigation_timeout_ms: u64,
}

impl ChromePage {
    /// Get the underlying chromiumoxide Page
    pub fn inner(&self) -> &Page {
        &self.page
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| goto_error(e, self.navigation_timeout_ms))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<()> {
        if tokio::time::timeout(self.command_timeout, self.page.clone().close())
            .await
            .map_or(true, |r| r.is_err())
        {
            debug!("Page close failed; disposing context anyway");
        }

        tokio::time::timeout(self.command_timeout, async {
            self.browser
                .lock()
                .await
                .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
                .await
        })
        .await
        .map_err(|_| BrowserError::Timeout(self.command_timeout.as_millis() as u64))??;

        Ok(())
    }
}

/// Classify a failed page load
///
/// The engine reports an expired load deadline as `CdpError::Timeout`; that
/// is a navigation timeout, not an unreachable page.
fn goto_error(err: CdpError, navigation_timeout_ms: u64) -> NavigationError {
    match err {
        CdpError::Timeout => NavigationError::Timeout(navigation_timeout_ms),
        other => NavigationError::LoadFailed(other.to_string()),
    }
}
