//! Scripted browser engine for integration tests
//!
//! Pages answer the pipeline's scripts from a shared [`Script`]: the load and
//! network-idle waits resolve immediately, extraction scripts return the
//! configured values, and every launch/open/close is counted.

#![allow(dead_code)]

use async_trait::async_trait;
use clipresolve::browser::{DeviceProfile, EngineLauncher, EngineSession, PageDriver};
use clipresolve::error::{BrowserError, Error, NavigationError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What pages opened by the fake engine do
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Delay before `goto` returns
    pub goto_delay: Duration,
    /// Make `goto` fail with a load error
    pub goto_error: Option<String>,
    /// Make `goto` fail the way an expired engine deadline does
    pub goto_timeout: bool,
    /// Make `current_url` fail with an engine command error
    pub url_error: Option<String>,
    /// Delay before `launch` returns a session
    pub launch_delay: Duration,
    /// URL reported after navigation (defaults to the requested URL)
    pub final_url: Option<String>,
    /// Result of the `video` element script
    pub video: Value,
    /// Result of the hydration state script
    pub state: Value,
    /// Result of the Open Graph script
    pub og_video: Value,
    /// Make `open_context` fail
    pub open_fails: bool,
}

impl Script {
    /// Page whose `video` element carries `src`
    pub fn video_src(src: &str) -> Self {
        Self {
            video: Value::String(src.to_string()),
            ..Self::default()
        }
    }
}

/// Lifecycle counters shared by every object of one fake engine
#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub opens: AtomicUsize,
    pub open_failures: AtomicUsize,
    pub page_closes: AtomicUsize,
    pub open_pages: AtomicI64,
    pub max_open_pages: AtomicI64,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }

    pub fn page_closes(&self) -> usize {
        self.page_closes.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> i64 {
        self.open_pages.load(Ordering::SeqCst)
    }

    pub fn max_open_pages(&self) -> i64 {
        self.max_open_pages.load(Ordering::SeqCst)
    }
}

/// Launcher for scripted sessions
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub script: Arc<Mutex<Script>>,
    pub counters: Arc<Counters>,
}

impl FakeLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn shared(&self) -> Arc<dyn EngineLauncher> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn EngineSession>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let delay = self.script.lock().unwrap().launch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(Arc::new(FakeSession {
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
            alive: AtomicBool::new(true),
        }))
    }
}

/// Launcher whose engine never starts
pub struct BrokenLauncher;

#[async_trait]
impl EngineLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<Arc<dyn EngineSession>> {
        Err(BrowserError::LaunchFailed("chrome not found".to_string()).into())
    }
}

struct FakeSession {
    script: Arc<Mutex<Script>>,
    counters: Arc<Counters>,
    alive: AtomicBool,
}

#[async_trait]
impl EngineSession for FakeSession {
    async fn open_context(&self, _profile: DeviceProfile) -> Result<Box<dyn PageDriver>> {
        let script = self.script.lock().unwrap().clone();
        if script.open_fails {
            self.counters.open_failures.fetch_add(1, Ordering::SeqCst);
            return Err(BrowserError::ContextCreationFailed("target crashed".to_string()).into());
        }

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let open = self.counters.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open_pages.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            script,
            counters: Arc::clone(&self.counters),
            url: Mutex::new(None),
        }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        self.counters.session_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    script: Script,
    counters: Arc<Counters>,
    url: Mutex<Option<String>>,
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        if !self.script.goto_delay.is_zero() {
            tokio::time::sleep(self.script.goto_delay).await;
        }
        if self.script.goto_timeout {
            return Err(NavigationError::Timeout(30_000).into());
        }
        if let Some(e) = &self.script.goto_error {
            return Err(NavigationError::LoadFailed(e.clone()).into());
        }
        let landed = self
            .script
            .final_url
            .clone()
            .unwrap_or_else(|| url.to_string());
        *self.url.lock().unwrap() = Some(landed);
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        if let Some(e) = &self.script.url_error {
            return Err(Error::cdp(e.clone()));
        }
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let value = if script.contains("document.readyState")
            || script.contains("PerformanceObserver")
        {
            Value::Bool(true)
        } else if script.contains("querySelector('video')") {
            self.script.video.clone()
        } else if script.contains("SIGI_STATE") {
            self.script.state.clone()
        } else if script.contains("og:video") {
            self.script.og_video.clone()
        } else {
            Value::Null
        };
        Ok(value)
    }

    async fn close(&self) -> Result<()> {
        self.counters.page_closes.fetch_add(1, Ordering::SeqCst);
        self.counters.open_pages.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
