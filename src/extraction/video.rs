//! `video` element strategy
//!
//! The player injects its `video` tag after the page's data fetches settle,
//! so the script polls for it rather than reading the DOM once.

use super::{evaluate_outcome, ExtractionOutcome, ExtractionStrategy};
use crate::browser::PageDriver;
use async_trait::async_trait;

/// Reads `src` from the first `video` element, or its nested `source`
#[derive(Debug, Clone)]
pub struct VideoElementStrategy {
    selector_wait_ms: u64,
}

impl VideoElementStrategy {
    /// Strategy that polls for the element up to `selector_wait_ms`
    pub fn new(selector_wait_ms: u64) -> Self {
        Self { selector_wait_ms }
    }

    fn script(&self) -> String {
        format!(
            r#"
            new Promise(resolve => {{
                const deadline = Date.now() + {wait};
                const read = () => {{
                    const video = document.querySelector('video');
                    if (!video) return null;
                    const own = video.getAttribute('src');
                    if (own) return own;
                    const source = video.querySelector('source[src]');
                    return source ? source.getAttribute('src') : null;
                }};
                const poll = () => {{
                    const src = read();
                    if (src && !src.startsWith('blob:')) {{
                        resolve(src);
                    }} else if (Date.now() >= deadline) {{
                        resolve(src);
                    }} else {{
                        setTimeout(poll, 100);
                    }}
                }};
                poll();
            }})
        "#,
            wait = self.selector_wait_ms
        )
    }
}

#[async_trait]
impl ExtractionStrategy for VideoElementStrategy {
    fn name(&self) -> &'static str {
        "video-element"
    }

    async fn inspect(&self, page: &dyn PageDriver) -> ExtractionOutcome {
        evaluate_outcome(page, &self.script()).await
    }
}
