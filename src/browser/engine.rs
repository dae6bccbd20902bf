//! Browser engine abstraction
//!
//! The session pool, navigator and extraction strategies only talk to these
//! traits. [`ChromeLauncher`](super::ChromeLauncher) implements them over
//! chromiumoxide; tests plug in scripted engines.

use super::stealth::DeviceProfile;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One page inside an isolated browsing context
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and resolve once the document load event fired
    async fn goto(&self, url: &str) -> Result<()>;

    /// URL the page currently shows (after redirects)
    async fn current_url(&self) -> Result<Option<String>>;

    /// Evaluate a script, awaiting returned promises; `undefined` is `Null`
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Close the page and dispose its browsing context
    async fn close(&self) -> Result<()>;
}

/// A running engine process that can carve out isolated contexts
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Create a fresh context (own cookies/storage) configured for `profile`
    async fn open_context(&self, profile: DeviceProfile) -> Result<Box<dyn PageDriver>>;

    /// Whether the engine process is still connected
    fn is_alive(&self) -> bool;

    /// Shut the engine process down
    async fn close(&self) -> Result<()>;
}

/// Starts engine processes on demand
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Launch a new engine process
    async fn launch(&self) -> Result<Arc<dyn EngineSession>>;
}
