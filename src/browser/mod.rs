//! Browser automation module
//!
//! Engine abstraction, the Chromium implementation over CDP, the session pool
//! that hands out isolated browsing contexts, and bounded page navigation.

pub mod controller;
pub mod engine;
pub mod navigation;
pub mod session;
pub mod stealth;

pub use controller::{BrowserConfig, ChromeLauncher, ChromePage, ChromeSession};
pub use engine::{EngineLauncher, EngineSession, PageDriver};
pub use navigation::{NavigationOptions, NavigationResult, PageNavigator};
pub use session::{BrowsingContext, PoolConfig, PoolStats, SessionInfo, SessionPool, SessionState};
pub use stealth::{DeviceProfile, StealthMode, PLATFORM_REFERER};
