//! Media URL extraction
//!
//! An ordered chain of independent heuristics that each inspect a rendered
//! page for a media reference. The chain stops at the first hit; a strategy
//! that errors is recorded and treated as a miss.

pub mod metadata;
pub mod state;
pub mod video;

pub use metadata::OgVideoStrategy;
pub use state::HydrationStateStrategy;
pub use video::VideoElementStrategy;

use crate::browser::PageDriver;
use crate::error::{ExtractionError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Options for the extraction chain
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// How long the element strategy polls for a `video` tag in milliseconds (default: 5000)
    pub selector_wait_ms: u64,
    /// Hard deadline for a single strategy in milliseconds (default: 10000)
    pub strategy_timeout_ms: u64,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            selector_wait_ms: 5000,
            strategy_timeout_ms: 10000,
        }
    }
}

/// What one strategy saw on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// Raw media reference, possibly relative
    Hit(String),
    /// Nothing usable found
    Miss,
    /// The strategy itself failed
    Error(String),
}

/// A single strategy's attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionAttempt {
    /// Strategy name
    pub strategy: &'static str,
    /// What it found
    pub outcome: ExtractionOutcome,
}

/// Attempts made by one run of the chain, in order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    /// Every attempt, ending with the hit if there was one
    pub attempts: Vec<ExtractionAttempt>,
}

impl ExtractionReport {
    /// The winning strategy and its raw value
    pub fn hit(&self) -> Option<(&'static str, &str)> {
        self.attempts.iter().find_map(|a| match &a.outcome {
            ExtractionOutcome::Hit(value) => Some((a.strategy, value.as_str())),
            _ => None,
        })
    }

    /// Names of every strategy that was tried
    pub fn tried(&self) -> Vec<&'static str> {
        self.attempts.iter().map(|a| a.strategy).collect()
    }

    /// Turn the report into the hit, or a miss naming every strategy tried
    pub fn into_hit(self) -> Result<(&'static str, String)> {
        let tried = self.tried().join(", ");
        self.attempts
            .into_iter()
            .find_map(|a| match a.outcome {
                ExtractionOutcome::Hit(value) => Some((a.strategy, value)),
                _ => None,
            })
            .ok_or_else(|| ExtractionError::Miss(tried).into())
    }
}

impl fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            match &attempt.outcome {
                ExtractionOutcome::Hit(_) => write!(f, "{}: hit", attempt.strategy)?,
                ExtractionOutcome::Miss => write!(f, "{}: miss", attempt.strategy)?,
                ExtractionOutcome::Error(e) => write!(f, "{}: error ({})", attempt.strategy, e)?,
            }
        }
        Ok(())
    }
}

/// One heuristic for finding the media reference on a rendered page
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Stable name, reported as the result's source strategy
    fn name(&self) -> &'static str;

    /// Inspect the page; must not navigate or mutate it
    async fn inspect(&self, page: &dyn PageDriver) -> ExtractionOutcome;
}

/// Ordered extraction strategies
pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    strategy_timeout: Duration,
}

impl ExtractionChain {
    /// Chain over explicit strategies, tried in the given order
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>, opts: &ExtractionOptions) -> Self {
        Self {
            strategies,
            strategy_timeout: Duration::from_millis(opts.strategy_timeout_ms),
        }
    }

    /// Default order: video element, hydration state, Open Graph meta
    pub fn default_chain(opts: &ExtractionOptions) -> Self {
        Self::new(
            vec![
                Box::new(VideoElementStrategy::new(opts.selector_wait_ms)),
                Box::new(HydrationStateStrategy),
                Box::new(OgVideoStrategy),
            ],
            opts,
        )
    }

    /// Strategy names in order
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies in order until one hits
    #[instrument(skip(self, page))]
    pub async fn extract(&self, page: &dyn PageDriver) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        for strategy in &self.strategies {
            let name = strategy.name();
            let outcome = match tokio::time::timeout(self.strategy_timeout, strategy.inspect(page))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => ExtractionOutcome::Error(format!(
                    "timed out after {}ms",
                    self.strategy_timeout.as_millis()
                )),
            };

            match &outcome {
                ExtractionOutcome::Hit(value) => {
                    info!("Strategy {} found media reference", name);
                    debug!("Raw media reference: {}", value);
                }
                ExtractionOutcome::Miss => debug!("Strategy {} missed", name),
                ExtractionOutcome::Error(e) => warn!("Strategy {} failed: {}", name, e),
            }

            let hit = matches!(outcome, ExtractionOutcome::Hit(_));
            report.attempts.push(ExtractionAttempt {
                strategy: name,
                outcome,
            });
            if hit {
                break;
            }
        }

        report
    }
}

/// Classify a value returned by a page script
///
/// Strings are trimmed; empty strings, `null` and `blob:` object URLs are
/// misses since none of them can be fetched outside the page.
pub(crate) fn outcome_from_value(value: Value) -> ExtractionOutcome {
    match value {
        Value::Null => ExtractionOutcome::Miss,
        Value::String(s) => outcome_from_str(&s),
        other => ExtractionOutcome::Error(format!("unexpected script result: {}", other)),
    }
}

pub(crate) fn outcome_from_str(raw: &str) -> ExtractionOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with("blob:") {
        ExtractionOutcome::Miss
    } else {
        ExtractionOutcome::Hit(trimmed.to_string())
    }
}

/// Evaluate a script and classify its result
pub(crate) async fn evaluate_outcome(page: &dyn PageDriver, script: &str) -> ExtractionOutcome {
    match page.evaluate(script).await {
        Ok(value) => outcome_from_value(value),
        Err(e) => ExtractionOutcome::Error(e.to_string()),
    }
}
