//! Hydration state strategy
//!
//! The page ships its initial data as a JSON blob for client-side
//! hydration. Two layouts exist: the older `SIGI_STATE` with an `ItemModule`
//! map keyed by video id, and `__UNIVERSAL_DATA_FOR_REHYDRATION__` with the
//! item nested under the video-detail scope.
//!
//! `ItemModule` can also carry related videos. The entry keyed by the id in
//! the page URL wins; otherwise the first entry in page order is used.

use super::{outcome_from_str, ExtractionOutcome, ExtractionStrategy};
use crate::browser::PageDriver;
use crate::link::LinkNormalizer;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const STATE_SCRIPT: &str = r#"
    (() => {
        const text = (id) => {
            const el = document.getElementById(id);
            return el ? el.textContent : null;
        };
        let sigi = text('SIGI_STATE');
        if (!sigi && window.__SIGI_STATE__) {
            try { sigi = JSON.stringify(window.__SIGI_STATE__); } catch (e) {}
        }
        return {
            href: location.href,
            sigi: sigi || null,
            universal: text('__UNIVERSAL_DATA_FOR_REHYDRATION__')
        };
    })()
"#;

/// Reads the media address out of the page's hydration JSON
#[derive(Debug, Clone, Default)]
pub struct HydrationStateStrategy;

#[async_trait]
impl ExtractionStrategy for HydrationStateStrategy {
    fn name(&self) -> &'static str {
        "hydration-state"
    }

    async fn inspect(&self, page: &dyn PageDriver) -> ExtractionOutcome {
        let blobs = match page.evaluate(STATE_SCRIPT).await {
            Ok(value) => value,
            Err(e) => return ExtractionOutcome::Error(e.to_string()),
        };

        let sigi = blobs.get("sigi").and_then(Value::as_str);
        let universal = blobs.get("universal").and_then(Value::as_str);
        if sigi.is_none() && universal.is_none() {
            debug!("No hydration state on page");
            return ExtractionOutcome::Miss;
        }

        let page_video_id = blobs
            .get("href")
            .and_then(Value::as_str)
            .and_then(|href| LinkNormalizer::reparse(href).ok())
            .map(|video| video.video_id);

        let mut parse_error = None;
        for (label, text) in [("SIGI_STATE", sigi), ("UNIVERSAL_DATA", universal)] {
            let Some(text) = text else { continue };
            match serde_json::from_str::<Value>(text) {
                Ok(state) => {
                    let addr = match label {
                        "SIGI_STATE" => media_from_sigi(&state, page_video_id.as_deref()),
                        _ => media_from_universal(&state),
                    };
                    if let Some(addr) = addr {
                        if let hit @ ExtractionOutcome::Hit(_) = outcome_from_str(addr) {
                            return hit;
                        }
                    }
                    debug!("{} present but carries no media address", label);
                }
                Err(e) => parse_error = Some(format!("{} is not valid JSON: {}", label, e)),
            }
        }

        match parse_error {
            Some(e) => ExtractionOutcome::Error(e),
            None => ExtractionOutcome::Miss,
        }
    }
}

/// Pick `downloadAddr` (else `playAddr`) from a video object
fn address(video: &Value) -> Option<&str> {
    ["downloadAddr", "playAddr"]
        .iter()
        .filter_map(|key| video.get(*key).and_then(Value::as_str))
        .find(|addr| !addr.trim().is_empty())
}

/// Media address from `ItemModule`
///
/// The entry keyed by `video_id` is tried first, then every entry in the
/// order the page serialized them.
pub fn media_from_sigi<'a>(state: &'a Value, video_id: Option<&str>) -> Option<&'a str> {
    let items = state.get("ItemModule")?.as_object()?;
    video_id
        .and_then(|id| items.get(id))
        .and_then(|item| item.get("video"))
        .and_then(address)
        .or_else(|| {
            items
                .values()
                .find_map(|item| item.get("video").and_then(address))
        })
}

/// Media address from the video-detail scope of the universal blob
pub fn media_from_universal(state: &Value) -> Option<&str> {
    state
        .pointer("/__DEFAULT_SCOPE__/webapp.video-detail/itemInfo/itemStruct/video")
        .and_then(address)
}
