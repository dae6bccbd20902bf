//! Browsing session pool
//!
//! Owns every engine process ([`EngineSession`]) and every per-request
//! [`BrowsingContext`]. Engine processes are reused across requests, but each
//! request gets a fresh isolated context that is torn down when the request
//! ends.
//!
//! ```text
//! acquire_context ──▶ permit (semaphore) ──▶ pick/launch session ──▶ open context
//!                                                 │
//! release_context ──▶ close context ──▶ retire session if capped/expired ──▶ drop permit
//! ```
//!
//! A session is retired once its use count reaches `max_uses`, its age passes
//! `session_ttl_ms`, its engine disconnects, or opening contexts on it failed
//! `fatal_failure_threshold` times in a row. A retiring session never issues
//! another context and is closed when its last context is released.

use super::engine::{EngineLauncher, EngineSession, PageDriver};
use super::stealth::DeviceProfile;
use crate::error::{BrowserError, Result};
use crate::metrics::global_metrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Session pool limits and lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum live engine processes (default: 1)
    pub max_sessions: usize,
    /// Maximum concurrently open browsing contexts (default: 4)
    pub max_contexts: usize,
    /// Contexts a session may issue before it is retired (default: 50)
    pub max_uses: u32,
    /// Session lifetime in milliseconds (default: 10 minutes)
    pub session_ttl_ms: u64,
    /// Maximum wait for a free context slot in milliseconds (default: 15000)
    pub acquire_timeout_ms: u64,
    /// Timeout for launching an engine in milliseconds (default: 30000)
    pub launch_timeout_ms: u64,
    /// Timeout for opening a context in milliseconds (default: 15000)
    pub open_timeout_ms: u64,
    /// Timeout for closing a context or session in milliseconds (default: 5000)
    pub teardown_timeout_ms: u64,
    /// Consecutive context-open failures that retire a session (default: 3)
    pub fatal_failure_threshold: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1,
            max_contexts: 4,
            max_uses: 50,
            session_ttl_ms: 10 * 60 * 1000,
            acquire_timeout_ms: 15000,
            launch_timeout_ms: 30000,
            open_timeout_ms: 15000,
            teardown_timeout_ms: 5000,
            fatal_failure_threshold: 3,
        }
    }
}

/// Lifecycle state of an engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Live, no contexts open
    Idle,
    /// Live, at least one context open
    Active,
    /// Issues no new contexts; closed once the last one is released
    Retiring,
}

/// Snapshot of one session, for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id (monotonic within the pool)
    pub id: u64,
    /// Current state
    pub state: SessionState,
    /// Contexts issued so far
    pub use_count: u32,
    /// Contexts currently open
    pub active_contexts: usize,
    /// Age in milliseconds
    pub age_ms: u64,
}

/// Pool counters, for diagnostics and leak checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Sessions able to issue contexts
    pub live_sessions: usize,
    /// Sessions waiting for their last context to close
    pub retiring_sessions: usize,
    /// Contexts opened and not yet released
    pub contexts_in_use: u64,
    /// Contexts successfully opened since start
    pub contexts_opened: u64,
    /// Contexts torn down since start
    pub contexts_released: u64,
    /// Engine processes launched since start
    pub sessions_launched: u64,
    /// Engine processes closed since start
    pub sessions_closed: u64,
    /// Whether `shutdown` has been called
    pub closed: bool,
}

struct BrowsingSession {
    id: u64,
    engine: Arc<dyn EngineSession>,
    created_at: Instant,
    use_count: u32,
    active_contexts: usize,
    consecutive_failures: u32,
    retiring: bool,
}

impl BrowsingSession {
    fn state(&self) -> SessionState {
        if self.retiring {
            SessionState::Retiring
        } else if self.active_contexts > 0 {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    fn is_stale(&self, config: &PoolConfig, now: Instant) -> bool {
        !self.engine.is_alive()
            || self.use_count >= config.max_uses
            || now.duration_since(self.created_at) >= Duration::from_millis(config.session_ttl_ms)
    }

    fn info(&self, now: Instant) -> SessionInfo {
        SessionInfo {
            id: self.id,
            state: self.state(),
            use_count: self.use_count,
            active_contexts: self.active_contexts,
            age_ms: now.duration_since(self.created_at).as_millis() as u64,
        }
    }
}

struct PoolShared {
    launcher: Arc<dyn EngineLauncher>,
    config: PoolConfig,
    sessions: Mutex<Vec<BrowsingSession>>,
    launching: Mutex<()>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    next_session_id: AtomicU64,
    contexts_opened: AtomicU64,
    contexts_released: AtomicU64,
    sessions_launched: AtomicU64,
    sessions_closed: AtomicU64,
}

impl PoolShared {
    /// Mark stale sessions retiring and detach the ones with nothing open
    fn sweep(&self, sessions: &mut Vec<BrowsingSession>, now: Instant) -> Vec<BrowsingSession> {
        for session in sessions.iter_mut() {
            if !session.retiring && session.is_stale(&self.config, now) {
                info!(
                    session = session.id,
                    uses = session.use_count,
                    "Retiring browser session"
                );
                session.retiring = true;
            }
        }

        let mut detached = Vec::new();
        let mut i = 0;
        while i < sessions.len() {
            if sessions[i].retiring && sessions[i].active_contexts == 0 {
                detached.push(sessions.swap_remove(i));
            } else {
                i += 1;
            }
        }
        detached
    }

    /// Pick a session able to issue a context, launching one if needed
    ///
    /// The session list is never locked across a launch. Launches are
    /// serialized by `launching`, and a session launched after `shutdown`
    /// began is closed instead of joining the pool.
    async fn checkout(&self) -> Result<(u64, Arc<dyn EngineSession>)> {
        if let Some(claimed) = self.claim_existing().await? {
            return Ok(claimed);
        }

        let _launching = self.launching.lock().await;
        if let Some(claimed) = self.claim_existing().await? {
            return Ok(claimed);
        }

        let engine = self.launch().await?;
        let mut sessions = self.sessions.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            drop(sessions);
            info!("Pool closed during launch, discarding browser session");
            self.discard(engine).await;
            return Err(BrowserError::PoolClosed.into());
        }

        sessions.push(BrowsingSession {
            id: self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1,
            engine,
            created_at: Instant::now(),
            use_count: 0,
            active_contexts: 0,
            consecutive_failures: 0,
            retiring: false,
        });
        let index = sessions.len() - 1;
        Ok(self.claim(&mut sessions[index]))
    }

    /// Claim a live session when one is idle or no more may be launched
    async fn claim_existing(&self) -> Result<Option<(u64, Arc<dyn EngineSession>)>> {
        let mut sessions = self.sessions.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::PoolClosed.into());
        }

        let detached = self.sweep(&mut sessions, Instant::now());
        self.close_in_background(detached);

        let live = sessions.iter().filter(|s| !s.retiring).count();
        let best = sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.retiring)
            .min_by_key(|(_, s)| s.active_contexts)
            .map(|(i, s)| (i, s.active_contexts));

        let index = match best {
            Some((i, 0)) => i,
            Some((i, _)) if live >= self.config.max_sessions => i,
            _ => return Ok(None),
        };
        Ok(Some(self.claim(&mut sessions[index])))
    }

    fn claim(&self, session: &mut BrowsingSession) -> (u64, Arc<dyn EngineSession>) {
        session.use_count += 1;
        session.active_contexts += 1;
        if session.use_count >= self.config.max_uses {
            info!(
                session = session.id,
                uses = session.use_count,
                "Browser session reached its use cap"
            );
            session.retiring = true;
        }
        (session.id, Arc::clone(&session.engine))
    }

    /// Close an engine that never joined the pool
    async fn discard(&self, engine: Arc<dyn EngineSession>) {
        let timeout = Duration::from_millis(self.config.teardown_timeout_ms);
        match tokio::time::timeout(timeout, engine.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Browser session close failed: {}", e),
            Err(_) => warn!("Browser session close timed out"),
        }
        self.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }

    async fn launch(&self) -> Result<Arc<dyn EngineSession>> {
        let engine = tokio::time::timeout(
            Duration::from_millis(self.config.launch_timeout_ms),
            self.launcher.launch(),
        )
        .await
        .map_err(|_| BrowserError::Timeout(self.config.launch_timeout_ms))??;

        self.sessions_launched.fetch_add(1, Ordering::SeqCst);
        Ok(engine)
    }

    /// Book-keeping after a context failed to open on `session_id`
    async fn record_open_failure(&self, session_id: u64) {
        let detached = {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
                session.active_contexts = session.active_contexts.saturating_sub(1);
                session.consecutive_failures += 1;
                if session.consecutive_failures >= self.config.fatal_failure_threshold {
                    warn!(
                        session = session_id,
                        failures = session.consecutive_failures,
                        "Browser session hit the fatal failure threshold"
                    );
                    session.retiring = true;
                }
            }
            self.sweep(&mut sessions, Instant::now())
        };
        self.close_sessions(detached).await;
    }

    async fn record_open_success(&self, session_id: u64) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
            session.consecutive_failures = 0;
        }
    }

    /// Close a context and settle its session; never fails
    async fn teardown(
        &self,
        context_id: Uuid,
        session_id: u64,
        page: Arc<dyn PageDriver>,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let timeout = Duration::from_millis(self.config.teardown_timeout_ms);
        match tokio::time::timeout(timeout, page.close()).await {
            Ok(Ok(())) => debug!(context = %context_id, "Browsing context closed"),
            Ok(Err(e)) => warn!(context = %context_id, "Browsing context close failed: {}", e),
            Err(_) => warn!(context = %context_id, "Browsing context close timed out"),
        }

        let detached = {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
                session.active_contexts = session.active_contexts.saturating_sub(1);
            }
            self.sweep(&mut sessions, Instant::now())
        };

        self.contexts_released.fetch_add(1, Ordering::SeqCst);
        global_metrics().record_context_closed();
        drop(permit);

        self.close_sessions(detached).await;
    }

    async fn close_sessions(&self, sessions: Vec<BrowsingSession>) {
        let timeout = Duration::from_millis(self.config.teardown_timeout_ms);
        for session in sessions {
            match tokio::time::timeout(timeout, session.engine.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(session = session.id, "Browser session close failed: {}", e),
                Err(_) => warn!(session = session.id, "Browser session close timed out"),
            }
            self.sessions_closed.fetch_add(1, Ordering::SeqCst);
            info!(
                session = session.id,
                uses = session.use_count,
                "Browser session closed"
            );
        }
    }

    fn close_in_background(&self, sessions: Vec<BrowsingSession>) {
        if sessions.is_empty() {
            return;
        }
        let timeout = Duration::from_millis(self.config.teardown_timeout_ms);
        for session in sessions {
            self.sessions_closed.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                if tokio::time::timeout(timeout, session.engine.close()).await.is_err() {
                    warn!(session = session.id, "Browser session close timed out");
                }
                info!(session = session.id, "Browser session closed");
            });
        }
    }
}

/// Process-wide pool of browser sessions
///
/// Nothing is launched until the first [`acquire_context`](Self::acquire_context);
/// [`shutdown`](Self::shutdown) must be called once at the end of the
/// process lifetime.
pub struct SessionPool {
    shared: Arc<PoolShared>,
}

impl SessionPool {
    /// Create a pool; engines are launched lazily
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: PoolConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_contexts.max(1)));
        Self {
            shared: Arc::new(PoolShared {
                launcher,
                config,
                sessions: Mutex::new(Vec::new()),
                launching: Mutex::new(()),
                permits,
                closed: AtomicBool::new(false),
                next_session_id: AtomicU64::new(0),
                contexts_opened: AtomicU64::new(0),
                contexts_released: AtomicU64::new(0),
                sessions_launched: AtomicU64::new(0),
                sessions_closed: AtomicU64::new(0),
            }),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Acquire a fresh isolated browsing context
    ///
    /// Must be paired with [`release_context`](Self::release_context).
    #[instrument(skip(self))]
    pub async fn acquire_context(&self, profile: DeviceProfile) -> Result<BrowsingContext> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::PoolClosed.into());
        }

        let permit = tokio::time::timeout(
            Duration::from_millis(shared.config.acquire_timeout_ms),
            Arc::clone(&shared.permits).acquire_owned(),
        )
        .await
        .map_err(|_| BrowserError::PoolExhausted(shared.config.acquire_timeout_ms))?
        .map_err(|_| BrowserError::PoolClosed)?;

        let (session_id, engine) = shared.checkout().await?;

        let opened = match tokio::time::timeout(
            Duration::from_millis(shared.config.open_timeout_ms),
            engine.open_context(profile),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(shared.config.open_timeout_ms).into()),
        };

        match opened {
            Ok(page) => {
                shared.record_open_success(session_id).await;
                shared.contexts_opened.fetch_add(1, Ordering::SeqCst);
                global_metrics().record_context_opened();

                let context = BrowsingContext {
                    id: Uuid::new_v4(),
                    session_id,
                    profile,
                    page: Arc::from(page),
                    permit: Some(permit),
                    pool: Arc::downgrade(&self.shared),
                    opened_at: Instant::now(),
                    released: false,
                };
                if shared.closed.load(Ordering::SeqCst) {
                    self.release_context(context).await;
                    return Err(BrowserError::PoolClosed.into());
                }
                debug!(context = %context.id, session = session_id, "Acquired browsing context");
                Ok(context)
            }
            Err(e) => {
                warn!(session = session_id, "Failed to open browsing context: {}", e);
                shared.record_open_failure(session_id).await;
                Err(BrowserError::ContextCreationFailed(e.to_string()).into())
            }
        }
    }

    /// Tear a context down; never fails and always frees its slot
    #[instrument(skip(self, context), fields(context = %context.id))]
    pub async fn release_context(&self, mut context: BrowsingContext) {
        context.released = true;
        let page = Arc::clone(&context.page);
        let permit = context.permit.take();
        self.shared
            .teardown(context.id, context.session_id, page, permit)
            .await;
    }

    /// Close every session and refuse further acquisitions
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down browser session pool");
        self.shared.permits.close();

        let sessions: Vec<BrowsingSession> = self.shared.sessions.lock().await.drain(..).collect();
        self.shared.close_sessions(sessions).await;
    }

    /// Counters snapshot
    pub async fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let sessions = shared.sessions.lock().await;
        let opened = shared.contexts_opened.load(Ordering::SeqCst);
        let released = shared.contexts_released.load(Ordering::SeqCst);
        PoolStats {
            live_sessions: sessions.iter().filter(|s| !s.retiring).count(),
            retiring_sessions: sessions.iter().filter(|s| s.retiring).count(),
            contexts_in_use: opened.saturating_sub(released),
            contexts_opened: opened,
            contexts_released: released,
            sessions_launched: shared.sessions_launched.load(Ordering::SeqCst),
            sessions_closed: shared.sessions_closed.load(Ordering::SeqCst),
            closed: shared.closed.load(Ordering::SeqCst),
        }
    }

    /// Per-session snapshot
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        self.shared
            .sessions
            .lock()
            .await
            .iter()
            .map(|s| s.info(now))
            .collect()
    }
}

/// One request's isolated browsing scope
///
/// Created by [`SessionPool::acquire_context`] and handed back through
/// [`SessionPool::release_context`]. Dropping it unreleased schedules the
/// teardown on the runtime instead.
pub struct BrowsingContext {
    id: Uuid,
    session_id: u64,
    profile: DeviceProfile,
    page: Arc<dyn PageDriver>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Weak<PoolShared>,
    opened_at: Instant,
    released: bool,
}

impl BrowsingContext {
    /// Context id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Id of the session this context was carved from
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Device profile the context emulates
    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    /// The context's page
    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    /// Time since the context was opened
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl std::fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowsingContext")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("profile", &self.profile)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for BrowsingContext {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Some(shared) = self.pool.upgrade() else {
            return;
        };

        let (id, session_id) = (self.id, self.session_id);
        let page = Arc::clone(&self.page);
        let permit = self.permit.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(context = %id, "Browsing context dropped without release; tearing down");
                handle.spawn(async move {
                    shared.teardown(id, session_id, page, permit).await;
                });
            }
            Err(_) => warn!(context = %id, "Browsing context dropped outside a runtime"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_sessions, 1);
        assert_eq!(config.max_contexts, 4);
        assert_eq!(config.max_uses, 50);
        assert_eq!(config.session_ttl_ms, 600_000);
        assert_eq!(config.fatal_failure_threshold, 3);
    }

    #[test]
    fn test_session_state_serialization() {
        let json = serde_json::to_string(&SessionState::Retiring).unwrap();
        assert_eq!(json, "\"retiring\"");
    }
}
