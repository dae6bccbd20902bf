//! clipresolve - share link to direct media URL resolution
//!
//! The platform renders its media reference client-side and gates it behind
//! bot detection, so resolution drives a stealth-configured headless Chromium
//! over CDP and reads the reference out of the rendered page.
//!
//! # Architecture
//!
//! ```text
//! share link ──▶ LinkNormalizer ──▶ SessionPool (isolated context)
//!                                         │
//!                                         ▼
//!                                  PageNavigator (bounded two-stage wait)
//!                                         │
//!                                         ▼
//!                     ExtractionChain: video element ─▶ hydration state ─▶ og:video
//!                                         │
//!                                         ▼
//!                                  ResultFinalizer ──▶ MediaResult
//! ```
//!
//! Every failure is classified into one [`ErrorKind`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use clipresolve::{Resolver, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::new(ResolverConfig::default())?;
//!
//!     let result = resolver
//!         .resolve("https://www.tiktok.com/@alice/video/1234567890123456789", None)
//!         .await?;
//!     println!("{}", result.absolute_url);
//!
//!     resolver.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod config;
pub mod error;
pub mod extraction;
pub mod finalize;
pub mod handlers;
pub mod link;
pub mod metrics;
pub mod resolver;

pub use browser::DeviceProfile;
pub use config::ResolverConfig;
pub use error::{Error, ErrorKind, ResolutionError, Result};
pub use finalize::MediaResult;
pub use link::{CanonicalVideoRef, LinkNormalizer, NormalizedLink};
pub use resolver::Resolver;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
