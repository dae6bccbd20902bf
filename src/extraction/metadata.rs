//! Open Graph video meta strategy
//!
//! Server-rendered pages advertise the media in `og:video:secure_url`, with
//! plain `og:video` on some variants. This is the last resort of the chain
//! because the tag is sometimes a player page rather than a media file.

use super::{evaluate_outcome, ExtractionOutcome, ExtractionStrategy};
use crate::browser::PageDriver;
use async_trait::async_trait;

const OG_VIDEO_SCRIPT: &str = r#"
    (() => {
        const read = (name) => {
            const meta = document.querySelector(`meta[property="${name}"]`)
                || document.querySelector(`meta[name="${name}"]`);
            const content = meta ? meta.getAttribute('content') : null;
            return content && content.trim() ? content : null;
        };
        return read('og:video:secure_url') || read('og:video');
    })()
"#;

/// Reads `og:video:secure_url`, falling back to `og:video`
#[derive(Debug, Clone, Default)]
pub struct OgVideoStrategy;

#[async_trait]
impl ExtractionStrategy for OgVideoStrategy {
    fn name(&self) -> &'static str {
        "og-video-meta"
    }

    async fn inspect(&self, page: &dyn PageDriver) -> ExtractionOutcome {
        evaluate_outcome(page, OG_VIDEO_SCRIPT).await
    }
}
